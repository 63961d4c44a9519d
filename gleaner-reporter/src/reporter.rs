//! The sampling scheduler and the host plugin lifecycle surface.
//!
//! One background task executes provisioning and every loop iteration
//! strictly sequentially. The only structures it shares with other callers
//! are the interested-metric store (host notifications) and the publish
//! failure counter (send completions); everything else is owned by the loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use gleaner_core::{JsonRecordCodec, RecordCodec};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::collect::SampleCollector;
use crate::config::ReporterConfig;
use crate::errors::{Result, SinkError};
use crate::provision::{TopicProvisioner, TopicSpec};
use crate::publish::{Publisher, Transport};
use crate::resource::{probe_for, UtilizationProbe};
use crate::sources::{HostMetric, LegacyRegistry, SampleContext};
use crate::store::{InterestPredicate, InterestedMetrics};

/// Bound on releasing the producer during shutdown.
const PRODUCER_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);
/// Bound on waiting for the loop task to observe the shutdown flag.
const RUNNER_JOIN_TIMEOUT: Duration = Duration::from_secs(5);
/// Sleep slice between shutdown-flag re-checks; bounds shutdown latency.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Lifecycle surface the embedding broker drives.
#[async_trait]
pub trait ReporterLifecycle: Send + Sync {
    /// Parse configuration and construct the publisher (and, when enabled,
    /// the provisioning state). A terminal construction failure disables
    /// the reporter and surfaces the error.
    async fn configure(&mut self, configs: &HashMap<String, String>) -> Result<()>;

    /// Bulk-load the initial host metric set and start the sampling loop.
    async fn init(&mut self, initial_metrics: Vec<Arc<dyn HostMetric>>);

    /// Host notification: a metric appeared or changed.
    fn on_metric_added(&self, metric: Arc<dyn HostMetric>);

    /// Host notification: a metric went away.
    fn on_metric_removed(&self, name: &str);

    /// Request shutdown, wake the sleeping loop and release the transport
    /// within a bounded timeout.
    async fn close(&self);
}

/// Observable scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReporterState {
    Init = 0,
    Provisioning = 1,
    Running = 2,
    ShuttingDown = 3,
    Stopped = 4,
}

impl ReporterState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Init,
            1 => Self::Provisioning,
            2 => Self::Running,
            3 => Self::ShuttingDown,
            _ => Self::Stopped,
        }
    }
}

/// One-way shutdown flag plus a wake signal for the sleeping loop.
struct Shutdown {
    requested: AtomicBool,
    wake: Notify,
}

impl Shutdown {
    fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
            wake: Notify::new(),
        }
    }

    fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.wake.notify_waiters();
    }

    /// Sleep in short bounded slices until `until_ms`, re-checking the flag
    /// between slices so shutdown latency is bounded by the slice size.
    async fn sleep_until(&self, until_ms: u64) {
        while !self.is_requested() {
            let now = now_ms();
            if now >= until_ms {
                return;
            }
            let remaining = Duration::from_millis(until_ms - now).min(SLEEP_SLICE);
            tokio::select! {
                _ = tokio::time::sleep(remaining) => {}
                _ = self.wake.notified() => {}
            }
        }
    }
}

/// Broker-embedded metrics reporter.
pub struct MetricsReporter {
    registry: Arc<dyn LegacyRegistry>,
    transport: Arc<dyn Transport>,
    codec: Arc<dyn RecordCodec>,
    interested: Arc<InterestedMetrics>,
    probe: Option<Arc<dyn UtilizationProbe>>,
    shutdown: Arc<Shutdown>,
    state: Arc<AtomicU8>,

    config: Option<ReporterConfig>,
    publisher: Option<Arc<Publisher>>,
    provisioner: Option<TopicProvisioner>,
    runner: Mutex<Option<JoinHandle<()>>>,
}

impl MetricsReporter {
    pub fn new(
        registry: Arc<dyn LegacyRegistry>,
        transport: Arc<dyn Transport>,
        interest: InterestPredicate,
    ) -> Self {
        Self {
            registry,
            transport,
            codec: Arc::new(JsonRecordCodec),
            interested: Arc::new(InterestedMetrics::new(interest)),
            probe: None,
            shutdown: Arc::new(Shutdown::new()),
            state: Arc::new(AtomicU8::new(ReporterState::Init as u8)),
            config: None,
            publisher: None,
            provisioner: None,
            runner: Mutex::new(None),
        }
    }

    /// Replace the default JSON codec.
    pub fn with_codec(mut self, codec: Arc<dyn RecordCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Replace the probe picked from the resource-mode flag.
    pub fn with_probe(mut self, probe: Arc<dyn UtilizationProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn state(&self) -> ReporterState {
        ReporterState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn interested_metrics(&self) -> usize {
        self.interested.len()
    }

    fn set_state(state: &AtomicU8, value: ReporterState) {
        state.store(value as u8, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReporterLifecycle for MetricsReporter {
    async fn configure(&mut self, configs: &HashMap<String, String>) -> Result<()> {
        let config = ReporterConfig::from_map(configs)?;

        let publisher = match Publisher::create(
            self.transport.as_ref(),
            &config.client,
            config.topic.clone(),
            Arc::clone(&self.codec),
            config.create_retries,
        )
        .await
        {
            Ok(publisher) => Arc::new(publisher),
            Err(e) => {
                // Fatal construction: disable the reporter entirely
                warn!(error = %e, "metrics producer construction failed, reporter disabled");
                self.shutdown.request();
                Self::set_state(&self.state, ReporterState::Stopped);
                return Err(e);
            }
        };

        if config.auto_create {
            match TopicSpec::new(
                config.topic.clone(),
                config.num_partitions,
                config.replication_factor,
                config.retention_ms,
                config.min_insync_replicas,
            ) {
                Ok(spec) => match self.transport.create_admin(&config.client).await {
                    Ok(admin) => {
                        self.provisioner = Some(TopicProvisioner::new(
                            admin,
                            spec,
                            config.auto_create_timeout,
                            config.auto_create_retries,
                        ));
                    }
                    Err(e) => {
                        warn!(error = %e, "metrics topic auto creation was disabled: admin client unavailable");
                    }
                },
                Err(e) => {
                    warn!(error = %e, "metrics topic auto creation was disabled");
                }
            }
        }

        self.publisher = Some(publisher);
        self.config = Some(config);
        Ok(())
    }

    async fn init(&mut self, initial_metrics: Vec<Arc<dyn HostMetric>>) {
        for metric in initial_metrics {
            self.interested.add(metric);
        }
        info!(
            count = self.interested.len(),
            "added host metrics during initialization"
        );

        let (config, publisher) = match (self.config.clone(), self.publisher.clone()) {
            (Some(config), Some(publisher)) => (config, publisher),
            _ => {
                warn!("reporter is not configured, sampling loop not started");
                return;
            }
        };

        let probe = match &self.probe {
            Some(probe) => Arc::clone(probe),
            None => Arc::from(probe_for(config.resource_mode)),
        };
        let collector = SampleCollector::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.interested),
            probe,
        );

        let runner = Runner {
            collector,
            publisher,
            provisioner: self.provisioner.take(),
            shutdown: Arc::clone(&self.shutdown),
            state: Arc::clone(&self.state),
            broker_id: config.broker_id,
            interval: config.reporting_interval,
        };
        *self.runner.lock().expect("runner handle poisoned") = Some(tokio::spawn(runner.run()));
    }

    fn on_metric_added(&self, metric: Arc<dyn HostMetric>) {
        self.interested.add(metric);
    }

    fn on_metric_removed(&self, name: &str) {
        self.interested.remove(name);
    }

    async fn close(&self) {
        info!("closing metrics reporter");
        Self::set_state(&self.state, ReporterState::ShuttingDown);
        self.shutdown.request();

        let handle = self.runner.lock().expect("runner handle poisoned").take();
        if let Some(handle) = handle {
            if tokio::time::timeout(RUNNER_JOIN_TIMEOUT, handle).await.is_err() {
                warn!("sampling loop did not stop within the shutdown timeout");
            }
        }
        if let Some(publisher) = &self.publisher {
            publisher.close(PRODUCER_CLOSE_TIMEOUT).await;
        }
        Self::set_state(&self.state, ReporterState::Stopped);
    }
}

/// The scheduler loop, owned by its background task.
struct Runner {
    collector: SampleCollector,
    publisher: Arc<Publisher>,
    provisioner: Option<TopicProvisioner>,
    shutdown: Arc<Shutdown>,
    state: Arc<AtomicU8>,
    broker_id: i32,
    interval: Duration,
}

impl Runner {
    async fn run(mut self) {
        let interval_ms = self.interval.as_millis() as u64;
        info!(interval_ms, "starting metrics reporter");

        // One-shot provisioning; any failure is degraded inside and must not
        // prevent the loop from starting.
        if let Some(provisioner) = self.provisioner.take() {
            MetricsReporter::set_state(&self.state, ReporterState::Provisioning);
            provisioner.provision().await;
        }
        MetricsReporter::set_state(&self.state, ReporterState::Running);

        let mut last_report_ms = now_ms();
        while !self.shutdown.is_requested() {
            let now = now_ms();
            debug!(time = now, "reporting pass");

            if now.saturating_sub(last_report_ms) >= interval_ms {
                self.publisher.reset_failures();
                last_report_ms = now;
                self.report(now, interval_ms).await;
            }

            let failures = self.publisher.failure_count();
            if failures > 0 {
                warn!(failures, time = now, "failed to send metrics this interval");
            }
            self.publisher.reset_failures();

            // Next tick is anchored to this tick's start, not its
            // completion: a tick that overruns the interval makes the next
            // one fire with little or no delay.
            let next_tick = now + interval_ms;
            self.shutdown.sleep_until(next_tick).await;
        }

        if self.state.load(Ordering::SeqCst) != ReporterState::Stopped as u8 {
            MetricsReporter::set_state(&self.state, ReporterState::ShuttingDown);
        }
        info!("metrics reporter exited");
    }

    async fn report(&self, now: u64, interval_ms: u64) {
        let ctx = SampleContext {
            now_ms: now,
            broker_id: self.broker_id,
            interval_ms,
        };
        let records = self.collector.collect(ctx).await;
        for record in records {
            self.publisher.send_record(record);
        }
        match self.publisher.flush().await {
            Ok(()) => {}
            Err(SinkError::Interrupted) if self.shutdown.is_requested() => {
                info!("metrics reporter interrupted during flush due to shutdown request");
            }
            Err(e) => {
                // Logged and surfaced, never aborts the loop
                warn!(error = %e, "flush of metric records failed");
            }
        }
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
