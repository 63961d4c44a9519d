//! Asynchronous record publishing.
//!
//! The publisher wraps the injected transport sink with routing-key
//! derivation, fire-and-forget sends whose only observable failure effect is
//! a counter increment plus a log line, and in-flight accounting so `flush`
//! can wait out everything enqueued during a tick.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gleaner_core::{MetricClass, MetricRecord, RecordCodec};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::config::ClientSettings;
use crate::errors::{ReporterError, Result, SinkError};
use crate::provision::TopicAdmin;
use crate::retry::{retry_bounded, Attempt, RetryError};

/// Base backoff between producer construction attempts.
const CREATE_BACKOFF: Duration = Duration::from_millis(500);

/// One keyed, timestamped message bound for the metrics topic.
#[derive(Debug, Clone)]
pub struct OutboundRecord {
    pub topic: String,
    pub key: String,
    pub time_ms: u64,
    pub payload: Vec<u8>,
}

/// The underlying record transport. Manages its own internal I/O concurrency
/// and batching; the reporter only enqueues, flushes and closes.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Submit one record; the future resolves when the send is acknowledged
    /// or has definitively failed.
    async fn send(&self, record: OutboundRecord) -> std::result::Result<(), SinkError>;

    /// Block until all outstanding sends are acknowledged or failed.
    async fn flush(&self) -> std::result::Result<(), SinkError>;

    /// Release the transport, returning within `timeout` regardless of
    /// outstanding work.
    async fn close(&self, timeout: Duration) -> std::result::Result<(), SinkError>;
}

/// Factory seam toward the external client library: builds the record sink
/// and the administrative client from the same transport settings.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn create_sink(
        &self,
        settings: &ClientSettings,
    ) -> std::result::Result<Arc<dyn RecordSink>, SinkError>;

    async fn create_admin(
        &self,
        settings: &ClientSettings,
    ) -> std::result::Result<Arc<dyn TopicAdmin>, crate::errors::AdminError>;
}

/// Deterministic routing-key derivation: topic-scoped records are keyed by
/// their topic name so one downstream sampler sees a topic's full picture;
/// everything else is keyed by the broker id.
pub fn routing_key(record: &MetricRecord) -> String {
    match (record.class, &record.topic) {
        (MetricClass::Topic, Some(topic)) => topic.clone(),
        _ => record.broker_id.to_string(),
    }
}

/// Tracks sends spawned during the current tick so flush can wait them out.
struct InFlight {
    active: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn new() -> Self {
        Self {
            active: AtomicUsize::new(0),
            idle: Notify::new(),
        }
    }

    fn begin(&self) {
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    fn end(&self) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.active.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

pub(crate) struct Publisher {
    sink: Arc<dyn RecordSink>,
    codec: Arc<dyn RecordCodec>,
    topic: String,
    failures: Arc<AtomicU32>,
    in_flight: Arc<InFlight>,
}

impl Publisher {
    /// Build the sink through the bounded retry executor. An unresolved
    /// bootstrap address is retryable (resolution may complete shortly after
    /// the broker itself starts listening); any other construction failure
    /// is terminal and the caller must treat the publisher as permanently
    /// unavailable.
    pub(crate) async fn create(
        transport: &dyn Transport,
        settings: &ClientSettings,
        topic: String,
        codec: Arc<dyn RecordCodec>,
        create_retries: u32,
    ) -> Result<Self> {
        let slot: Mutex<Option<Arc<dyn RecordSink>>> = Mutex::new(None);
        let slot_ref = &slot;

        let outcome = retry_bounded(create_retries, CREATE_BACKOFF, move || async move {
            match transport.create_sink(settings).await {
                Ok(sink) => {
                    *slot_ref.lock().expect("sink slot poisoned") = Some(sink);
                    Attempt::Done
                }
                Err(SinkError::UnresolvedAddress(addr)) => {
                    warn!(address = %addr, "unable to create metrics producer, address not yet resolvable");
                    Attempt::Retry
                }
                Err(e) => Attempt::Abort(e),
            }
        })
        .await;

        let sink = match outcome {
            Ok(()) => slot
                .lock()
                .expect("sink slot poisoned")
                .take()
                .ok_or_else(|| ReporterError::ProducerUnavailable("sink missing after create".into()))?,
            Err(RetryError::Exhausted) => {
                return Err(ReporterError::ProducerUnavailable(
                    "retry budget exhausted creating metrics producer".into(),
                ))
            }
            Err(RetryError::Aborted(e)) => {
                return Err(ReporterError::ProducerUnavailable(e.to_string()))
            }
        };

        info!(topic = %topic, "metrics producer created");
        Ok(Self {
            sink,
            codec,
            topic,
            failures: Arc::new(AtomicU32::new(0)),
            in_flight: Arc::new(InFlight::new()),
        })
    }

    /// Fire-and-forget send: never fails synchronously and never blocks the
    /// caller beyond enqueueing; a completion failure increments the tick's
    /// failure counter.
    pub(crate) fn send_record(&self, record: MetricRecord) {
        let payload = match self.codec.encode(&record) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(record = %record, error = %e, "failed to encode metric record");
                self.failures.fetch_add(1, Ordering::SeqCst);
                return;
            }
        };
        let outbound = OutboundRecord {
            topic: self.topic.clone(),
            key: routing_key(&record),
            time_ms: record.time_ms,
            payload,
        };
        debug!(record = %record, key = %outbound.key, "sending metric record");

        self.in_flight.begin();
        let sink = Arc::clone(&self.sink);
        let failures = Arc::clone(&self.failures);
        let in_flight = Arc::clone(&self.in_flight);
        tokio::spawn(async move {
            if let Err(e) = sink.send(outbound).await {
                warn!(record = %record, error = %e, "failed to send metric record");
                failures.fetch_add(1, Ordering::SeqCst);
            }
            in_flight.end();
        });
    }

    /// Wait until every send enqueued this tick is acknowledged or failed,
    /// then flush the transport itself.
    pub(crate) async fn flush(&self) -> std::result::Result<(), SinkError> {
        self.in_flight.wait_idle().await;
        self.sink.flush().await
    }

    /// Scoped release of the transport, guaranteed to return within
    /// `timeout` regardless of outstanding work.
    pub(crate) async fn close(&self, timeout: Duration) {
        if tokio::time::timeout(timeout, self.sink.close(timeout))
            .await
            .is_err()
        {
            warn!("metrics producer close timed out");
        }
    }

    pub(crate) fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    pub(crate) fn reset_failures(&self) {
        self.failures.store(0, Ordering::SeqCst);
    }
}
