//! Registry of host metrics worth reporting.
//!
//! Mutated by asynchronous host notifications (metric added/removed) while
//! the scheduler thread iterates a snapshot each tick. Entries are lock-free
//! at individual granularity; a concurrent add or remove may become visible
//! one tick late, which is acceptable for best-effort telemetry.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, trace};

use crate::sources::HostMetric;

/// Allow-list predicate over metric names, supplied by the embedding host.
pub type InterestPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

pub struct InterestedMetrics {
    entries: DashMap<String, Arc<dyn HostMetric>>,
    interest: InterestPredicate,
}

impl InterestedMetrics {
    pub fn new(interest: InterestPredicate) -> Self {
        Self {
            entries: DashMap::new(),
            interest,
        }
    }

    /// Track `metric` if the allow-list matches its name; non-matching
    /// metrics are silently ignored.
    pub fn add(&self, metric: Arc<dyn HostMetric>) {
        let name = metric.name();
        trace!(metric = name, "checking host metric");
        if (self.interest)(name) {
            debug!(metric = name, "tracking interested metric");
            self.entries.insert(name.to_string(), metric);
        }
    }

    pub fn remove(&self, name: &str) {
        self.entries.remove(name);
    }

    /// Point-in-time snapshot for the sampling pass. No isolation guarantee
    /// against entries added or removed mid-iteration.
    pub fn snapshot(&self) -> Vec<Arc<dyn HostMetric>> {
        self.entries
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
