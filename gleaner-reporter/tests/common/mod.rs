//! Shared mocks for reporter integration tests: an in-memory record sink,
//! a stateful admin client and stub metric sources.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gleaner_reporter::{
    AdminError, HostMetric, LegacyEntry, LegacyRegistry, OutboundRecord, RecordSink, SinkError,
    TopicAdmin, TopicInfo, TopicSpec, Transport, UtilizationProbe,
};

// ---------------------------------------------------------------------------
// Record sink
// ---------------------------------------------------------------------------

/// Kinds of injected flush failures; `SinkError` itself is not `Clone`.
#[derive(Debug, Clone, Copy)]
pub enum InjectedSinkError {
    Interrupted,
    Timeout,
}

impl InjectedSinkError {
    fn to_error(self) -> SinkError {
        match self {
            Self::Interrupted => SinkError::Interrupted,
            Self::Timeout => SinkError::Timeout,
        }
    }
}

#[derive(Default)]
pub struct MockSink {
    pub sends: Mutex<Vec<OutboundRecord>>,
    pub flushes: AtomicU32,
    pub closes: AtomicU32,
    pub fail_sends: AtomicBool,
    /// Every flush returns this error, after `flush_delay` if one is set.
    pub flush_error: Mutex<Option<InjectedSinkError>>,
    pub flush_delay: Mutex<Option<Duration>>,
}

impl MockSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<OutboundRecord> {
        self.sends.lock().expect("sends poisoned").clone()
    }
}

#[async_trait]
impl RecordSink for MockSink {
    async fn send(&self, record: OutboundRecord) -> Result<(), SinkError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(SinkError::Send("injected send failure".into()));
        }
        self.sends.lock().expect("sends poisoned").push(record);
        Ok(())
    }

    async fn flush(&self) -> Result<(), SinkError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        let delay = *self.flush_delay.lock().expect("flush delay poisoned");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(kind) = *self.flush_error.lock().expect("flush error poisoned") {
            return Err(kind.to_error());
        }
        Ok(())
    }

    async fn close(&self, _timeout: Duration) -> Result<(), SinkError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Admin client
// ---------------------------------------------------------------------------

pub struct AdminState {
    pub exists: bool,
    pub partitions: i32,
    pub config: HashMap<String, String>,
}

/// Kinds of injected admin failures; `AdminError` itself is not `Clone`.
#[derive(Debug, Clone, Copy)]
pub enum InjectedAdminError {
    Timeout,
    ReassignmentInProgress,
}

impl InjectedAdminError {
    fn to_error(self) -> AdminError {
        match self {
            Self::Timeout => AdminError::Timeout,
            Self::ReassignmentInProgress => AdminError::ReassignmentInProgress,
        }
    }
}

pub struct MockAdmin {
    pub state: Mutex<AdminState>,
    pub create_calls: AtomicU32,
    pub alter_calls: AtomicU32,
    pub partition_calls: AtomicU32,
    pub create_error: Mutex<Option<InjectedAdminError>>,
    pub partition_error: Mutex<Option<InjectedAdminError>>,
}

impl MockAdmin {
    /// An admin client for a cluster where the topic does not exist yet.
    pub fn without_topic() -> Arc<Self> {
        Self::with_state(AdminState {
            exists: false,
            partitions: 0,
            config: HashMap::new(),
        })
    }

    /// An admin client for a cluster where the topic already exists with the
    /// given live partition count and config.
    pub fn with_topic(partitions: i32, config: &[(&str, &str)]) -> Arc<Self> {
        Self::with_state(AdminState {
            exists: true,
            partitions,
            config: config
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
    }

    fn with_state(state: AdminState) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            create_calls: AtomicU32::new(0),
            alter_calls: AtomicU32::new(0),
            partition_calls: AtomicU32::new(0),
            create_error: Mutex::new(None),
            partition_error: Mutex::new(None),
        })
    }

    pub fn partitions(&self) -> i32 {
        self.state.lock().expect("admin state poisoned").partitions
    }

    pub fn live_config(&self) -> HashMap<String, String> {
        self.state.lock().expect("admin state poisoned").config.clone()
    }
}

#[async_trait]
impl TopicAdmin for MockAdmin {
    async fn create_topic(&self, spec: &TopicSpec) -> Result<(), AdminError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(kind) = *self.create_error.lock().expect("create error poisoned") {
            return Err(kind.to_error());
        }
        let mut state = self.state.lock().expect("admin state poisoned");
        if state.exists {
            return Err(AdminError::TopicAlreadyExists);
        }
        state.exists = true;
        state.partitions = spec.num_partitions;
        state.config = spec.create_configs().into_iter().collect();
        Ok(())
    }

    async fn describe_topic(&self, _name: &str) -> Result<TopicInfo, AdminError> {
        let state = self.state.lock().expect("admin state poisoned");
        Ok(TopicInfo {
            partitions: state.partitions,
        })
    }

    async fn describe_config(&self, _name: &str) -> Result<HashMap<String, String>, AdminError> {
        Ok(self.live_config())
    }

    async fn alter_config(
        &self,
        _name: &str,
        entries: Vec<(String, String)>,
    ) -> Result<(), AdminError> {
        self.alter_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().expect("admin state poisoned");
        for (key, value) in entries {
            state.config.insert(key, value);
        }
        Ok(())
    }

    async fn create_partitions(&self, _name: &str, count: i32) -> Result<(), AdminError> {
        self.partition_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(kind) = *self.partition_error.lock().expect("partition error poisoned") {
            return Err(kind.to_error());
        }
        self.state.lock().expect("admin state poisoned").partitions = count;
        Ok(())
    }

    async fn close(&self, _timeout: Duration) {}
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

pub struct MockTransport {
    pub sink: Arc<MockSink>,
    pub admin: Arc<MockAdmin>,
    pub sink_attempts: AtomicU32,
    /// Fail this many sink creations with `UnresolvedAddress` first.
    pub unresolved_failures: AtomicU32,
    /// Fail every sink creation terminally.
    pub sink_terminal: AtomicBool,
    pub admins_created: AtomicU32,
}

impl MockTransport {
    pub fn new(sink: Arc<MockSink>, admin: Arc<MockAdmin>) -> Arc<Self> {
        Arc::new(Self {
            sink,
            admin,
            sink_attempts: AtomicU32::new(0),
            unresolved_failures: AtomicU32::new(0),
            sink_terminal: AtomicBool::new(false),
            admins_created: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn create_sink(
        &self,
        _settings: &gleaner_reporter::ClientSettings,
    ) -> Result<Arc<dyn RecordSink>, SinkError> {
        self.sink_attempts.fetch_add(1, Ordering::SeqCst);
        if self.sink_terminal.load(Ordering::SeqCst) {
            return Err(SinkError::Closed);
        }
        let remaining = self.unresolved_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.unresolved_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(SinkError::UnresolvedAddress("bootstrap:9092".into()));
        }
        Ok(Arc::clone(&self.sink) as Arc<dyn RecordSink>)
    }

    async fn create_admin(
        &self,
        _settings: &gleaner_reporter::ClientSettings,
    ) -> Result<Arc<dyn TopicAdmin>, AdminError> {
        self.admins_created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.admin) as Arc<dyn TopicAdmin>)
    }
}

// ---------------------------------------------------------------------------
// Metric sources
// ---------------------------------------------------------------------------

pub struct MockRegistry {
    entries: Mutex<Vec<LegacyEntry>>,
}

impl MockRegistry {
    pub fn new(entries: Vec<LegacyEntry>) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(entries),
        })
    }

    pub fn empty() -> Arc<Self> {
        Self::new(Vec::new())
    }
}

impl LegacyRegistry for MockRegistry {
    fn sweep(&self) -> Vec<LegacyEntry> {
        self.entries.lock().expect("entries poisoned").clone()
    }
}

pub struct StaticMetric {
    pub name: String,
    pub value: f64,
}

impl HostMetric for StaticMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> f64 {
        self.value
    }
}

pub fn host_metric(name: &str, value: f64) -> Arc<dyn HostMetric> {
    Arc::new(StaticMetric {
        name: name.into(),
        value,
    })
}

pub struct MockProbe {
    pub value: Option<f64>,
}

#[async_trait]
impl UtilizationProbe for MockProbe {
    async fn cpu_percent(&self) -> anyhow::Result<f64> {
        match self.value {
            Some(value) => Ok(value),
            None => anyhow::bail!("probe unavailable"),
        }
    }
}

/// Install the fmt subscriber for the test binary; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}

/// Minimal host config map for tests.
pub fn reporter_config(broker_id: i32, interval_ms: u64, extra: &[(&str, &str)]) -> HashMap<String, String> {
    let mut configs: HashMap<String, String> = HashMap::new();
    configs.insert("broker.id".into(), broker_id.to_string());
    configs.insert("metrics.reporting.interval.ms".into(), interval_ms.to_string());
    for (key, value) in extra {
        configs.insert(key.to_string(), value.to_string());
    }
    configs
}
