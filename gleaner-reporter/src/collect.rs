//! Per-tick sample collection.
//!
//! Turns the three metric sources into canonical records at a given instant:
//! a full sweep of the legacy registry, a snapshot of the interested-metric
//! store, and one host CPU utilization reading. Every stage is
//! failure-isolated; the collector keeps no state between calls.

use std::sync::Arc;

use gleaner_core::MetricRecord;
use tracing::{debug, warn};

use crate::resource::UtilizationProbe;
use crate::sources::{legacy_records, LegacyRegistry, SampleContext};
use crate::store::InterestedMetrics;

pub(crate) const CPU_UTILIZATION_METRIC: &str = "cpu-utilization";

pub(crate) struct SampleCollector {
    registry: Arc<dyn LegacyRegistry>,
    interested: Arc<InterestedMetrics>,
    probe: Arc<dyn UtilizationProbe>,
}

impl SampleCollector {
    pub(crate) fn new(
        registry: Arc<dyn LegacyRegistry>,
        interested: Arc<InterestedMetrics>,
        probe: Arc<dyn UtilizationProbe>,
    ) -> Self {
        Self {
            registry,
            interested,
            probe,
        }
    }

    /// Gather all records for one tick. Recomputed in full on every call.
    pub(crate) async fn collect(&self, ctx: SampleContext) -> Vec<MetricRecord> {
        let mut records = Vec::new();
        self.collect_legacy(&ctx, &mut records);
        self.collect_interested(&ctx, &mut records);
        self.collect_cpu(&ctx, &mut records).await;
        debug!(count = records.len(), time = ctx.now_ms, "collected sample records");
        records
    }

    /// Stage 1: sweep the legacy registry, dispatching each metric by its
    /// reporting capability. One broken metric never aborts the rest.
    fn collect_legacy(&self, ctx: &SampleContext, out: &mut Vec<MetricRecord>) {
        for entry in self.registry.sweep() {
            match legacy_records(&entry, ctx) {
                Ok(converted) => out.extend(converted),
                Err(e) => {
                    warn!(metric = %entry.name, error = %e, "skipping legacy metric that failed conversion");
                }
            }
        }
    }

    /// Stage 2: read the current value of every interested host metric.
    fn collect_interested(&self, ctx: &SampleContext, out: &mut Vec<MetricRecord>) {
        for metric in self.interested.snapshot() {
            out.push(MetricRecord::broker(
                metric.name(),
                metric.value(),
                ctx.broker_id,
                ctx.now_ms,
            ));
        }
    }

    /// Stage 3: exactly one CPU utilization record. A failed read is logged
    /// and simply yields no record for this tick.
    async fn collect_cpu(&self, ctx: &SampleContext, out: &mut Vec<MetricRecord>) {
        match self.probe.cpu_percent().await {
            Ok(percent) => out.push(MetricRecord::broker(
                CPU_UTILIZATION_METRIC,
                percent,
                ctx.broker_id,
                ctx.now_ms,
            )),
            Err(e) => {
                warn!(error = %e, "failed to read CPU utilization, no resource record this tick");
            }
        }
    }
}
