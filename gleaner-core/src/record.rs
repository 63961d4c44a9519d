use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Scope of a canonical metric record.
///
/// The class alone decides how a record is routed downstream: `Topic` records
/// are keyed by their topic name, every other class is keyed by broker id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricClass {
    Broker,
    Topic,
    Partition,
}

/// Canonical, immutable unit of telemetry produced once per sample.
///
/// Records are created by the sample collector at a given instant, consumed
/// once by the publisher and never mutated afterward. Persistence is the
/// destination topic's job, not this type's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Scope class, the sole input to routing-key derivation
    pub class: MetricClass,
    /// Id of the broker the sample was taken on
    pub broker_id: i32,
    /// Sample time, epoch milliseconds
    pub time_ms: u64,
    /// Topic the record describes; `Some` for topic- and partition-scoped records
    pub topic: Option<String>,
    /// Partition the record describes; `Some` only for partition-scoped records
    pub partition: Option<i32>,
    /// Canonical metric name
    pub name: String,
    /// Sampled value
    pub value: f64,
}

impl MetricRecord {
    /// A broker-scoped record (no topic association).
    pub fn broker(name: impl Into<String>, value: f64, broker_id: i32, time_ms: u64) -> Self {
        Self {
            class: MetricClass::Broker,
            broker_id,
            time_ms,
            topic: None,
            partition: None,
            name: name.into(),
            value,
        }
    }

    /// A topic-scoped record, routed by its topic name.
    pub fn topic(
        name: impl Into<String>,
        value: f64,
        broker_id: i32,
        time_ms: u64,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            class: MetricClass::Topic,
            broker_id,
            time_ms,
            topic: Some(topic.into()),
            partition: None,
            name: name.into(),
            value,
        }
    }

    /// A partition-scoped record; carries its topic but routes by broker id.
    pub fn partition(
        name: impl Into<String>,
        value: f64,
        broker_id: i32,
        time_ms: u64,
        topic: impl Into<String>,
        partition: i32,
    ) -> Self {
        Self {
            class: MetricClass::Partition,
            broker_id,
            time_ms,
            topic: Some(topic.into()),
            partition: Some(partition),
            name: name.into(),
            value,
        }
    }
}

impl Display for MetricRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:?}] {} broker: {} time: {} value: {}",
            self.class, self.name, self.broker_id, self.time_ms, self.value,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_labels_every_field() {
        let record = MetricRecord::broker("bytes-in-rate", 1.5, 3, 100);
        assert_eq!(
            record.to_string(),
            "[Broker] bytes-in-rate broker: 3 time: 100 value: 1.5"
        );

        let record = MetricRecord::topic("messages-in-rate", 2.0, 3, 100, "orders");
        assert_eq!(
            record.to_string(),
            "[Topic] messages-in-rate broker: 3 time: 100 value: 2"
        );
    }
}
