//! Seams toward the host's metric sources.
//!
//! The host exposes two heterogeneous sources: a legacy structured registry
//! (swept in full every tick) and its native metric set (tracked through the
//! interested-metric store). The registry abstraction is resolved once at
//! construction; there is exactly one registry shape per host process, so no
//! per-call detection happens in the sampling path.

use gleaner_core::MetricRecord;
use thiserror::Error;

/// Handle to a host-native metric. Read lazily at sample time; the value
/// reflects whatever the host reports at that instant.
pub trait HostMetric: Send + Sync {
    fn name(&self) -> &str;
    fn value(&self) -> f64;
}

/// Point-in-time reading of one legacy registry metric, dispatched by its
/// reporting capability.
#[derive(Debug, Clone)]
pub enum LegacySnapshot {
    /// Single scalar reading (gauge/counter capability).
    Scalar(f64),
    /// Distribution capability: event count over the reporting interval plus
    /// summary statistics.
    Distribution {
        count: u64,
        mean: f64,
        max: f64,
        p99: f64,
    },
}

/// One metric observed during a registry sweep.
#[derive(Debug, Clone)]
pub struct LegacyEntry {
    pub name: String,
    /// Topic the metric is tagged with, if any
    pub topic: Option<String>,
    pub snapshot: LegacySnapshot,
}

/// The legacy structured metrics registry of the host.
pub trait LegacyRegistry: Send + Sync {
    /// Full sweep of the registry's current metric set.
    fn sweep(&self) -> Vec<LegacyEntry>;
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("non-finite value for metric {0}")]
    NonFinite(String),
}

/// Per-tick context stamped onto every converted record.
#[derive(Debug, Clone, Copy)]
pub struct SampleContext {
    pub now_ms: u64,
    pub broker_id: i32,
    pub interval_ms: u64,
}

/// Convert one legacy entry into canonical records.
///
/// Scalar capability yields one record; distribution capability expands into
/// rate/mean/max/p99 records, the rate normalized over the reporting interval.
pub(crate) fn legacy_records(
    entry: &LegacyEntry,
    ctx: &SampleContext,
) -> Result<Vec<MetricRecord>, ConvertError> {
    let mut records = Vec::new();
    match &entry.snapshot {
        LegacySnapshot::Scalar(value) => {
            records.push(tagged(entry, &entry.name, *value, ctx)?);
        }
        LegacySnapshot::Distribution {
            count,
            mean,
            max,
            p99,
        } => {
            let rate = if ctx.interval_ms == 0 {
                0.0
            } else {
                (*count as f64) * 1000.0 / ctx.interval_ms as f64
            };
            records.push(tagged(entry, &format!("{}-rate", entry.name), rate, ctx)?);
            records.push(tagged(entry, &format!("{}-mean", entry.name), *mean, ctx)?);
            records.push(tagged(entry, &format!("{}-max", entry.name), *max, ctx)?);
            records.push(tagged(entry, &format!("{}-p99", entry.name), *p99, ctx)?);
        }
    }
    Ok(records)
}

fn tagged(
    entry: &LegacyEntry,
    name: &str,
    value: f64,
    ctx: &SampleContext,
) -> Result<MetricRecord, ConvertError> {
    if !value.is_finite() {
        return Err(ConvertError::NonFinite(entry.name.clone()));
    }
    Ok(match &entry.topic {
        Some(topic) => MetricRecord::topic(name, value, ctx.broker_id, ctx.now_ms, topic.clone()),
        None => MetricRecord::broker(name, value, ctx.broker_id, ctx.now_ms),
    })
}
