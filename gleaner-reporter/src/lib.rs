//! Broker-embedded telemetry reporter.
//!
//! Runs inside the broker process, periodically harvests its runtime metrics
//! (legacy structured registry, native metric set, host CPU utilization),
//! normalizes them into canonical records and publishes them to a dedicated,
//! self-provisioning topic for an external optimization system.

pub mod config;
pub mod errors;
pub mod provision;
pub mod publish;
pub mod resource;
pub mod retry;
pub mod sources;
pub mod store;

mod collect;
mod reporter;

pub use config::{ClientSettings, ReporterConfig};
pub use errors::{AdminError, ReporterError, Result, SinkError};
pub use provision::{TopicAdmin, TopicInfo, TopicProvisioner, TopicSpec};
pub use publish::{routing_key, OutboundRecord, RecordSink, Transport};
pub use reporter::{MetricsReporter, ReporterLifecycle, ReporterState};
pub use resource::{ResourceMode, UtilizationProbe};
pub use retry::{retry_bounded, Attempt, RetryError};
pub use sources::{HostMetric, LegacyEntry, LegacyRegistry, LegacySnapshot};
pub use store::{InterestPredicate, InterestedMetrics};
