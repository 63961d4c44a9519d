//! Reporter configuration, parsed from the host's string-keyed config map.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{ReporterError, Result};
use crate::resource::ResourceMode;

pub const BROKER_ID_KEY: &str = "broker.id";
pub const BOOTSTRAP_SERVERS_KEY: &str = "bootstrap.servers";
pub const LISTENERS_KEY: &str = "listeners";
pub const PORT_KEY: &str = "port";
pub const TOPIC_KEY: &str = "metrics.topic";
pub const INTERVAL_MS_KEY: &str = "metrics.reporting.interval.ms";
pub const AUTO_CREATE_KEY: &str = "metrics.topic.auto.create";
pub const NUM_PARTITIONS_KEY: &str = "metrics.topic.num.partitions";
pub const REPLICATION_FACTOR_KEY: &str = "metrics.topic.replication.factor";
pub const RETENTION_MS_KEY: &str = "metrics.topic.retention.ms";
pub const MIN_INSYNC_REPLICAS_KEY: &str = "metrics.topic.min.insync.replicas";
pub const AUTO_CREATE_TIMEOUT_MS_KEY: &str = "metrics.topic.auto.create.timeout.ms";
pub const AUTO_CREATE_RETRIES_KEY: &str = "metrics.topic.auto.create.retries";
pub const CREATE_RETRIES_KEY: &str = "metrics.reporter.create.retries";
pub const CONTAINERIZED_KEY: &str = "metrics.reporter.containerized";

/// Host config entries under this prefix pass through to the transport.
pub const CLIENT_PREFIX: &str = "metrics.client.";

pub const DEFAULT_TOPIC: &str = "__gleaner_metrics";
const DEFAULT_BOOTSTRAP_HOST: &str = "localhost";
const DEFAULT_BOOTSTRAP_PORT: &str = "9092";
const DEFAULT_INTERVAL_MS: u64 = 60_000;
/// 5 days, the retention the downstream optimizer expects.
const DEFAULT_RETENTION_MS: u64 = 432_000_000;

/// Transport construction parameters handed to the injected client library.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientSettings {
    pub bootstrap_servers: String,
    /// Pass-through client properties; reporter defaults are filled only for
    /// keys the host did not set.
    pub properties: HashMap<String, String>,
}

impl ClientSettings {
    pub fn set_if_absent(&mut self, key: &str, value: &str) {
        self.properties
            .entry(key.to_string())
            .or_insert_with(|| value.to_string());
    }
}

/// Typed reporter configuration.
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    pub broker_id: i32,
    pub topic: String,
    pub reporting_interval: Duration,
    pub auto_create: bool,
    pub num_partitions: i32,
    pub replication_factor: i16,
    pub retention_ms: u64,
    pub min_insync_replicas: i16,
    pub auto_create_timeout: Duration,
    pub auto_create_retries: u32,
    pub create_retries: u32,
    pub resource_mode: ResourceMode,
    pub client: ClientSettings,
}

impl ReporterConfig {
    pub fn from_map(configs: &HashMap<String, String>) -> Result<Self> {
        let broker_id: i32 = parse_required(configs, BROKER_ID_KEY)?;

        let bootstrap = match configs.get(BOOTSTRAP_SERVERS_KEY) {
            Some(explicit) => explicit.clone(),
            None => {
                let derived = bootstrap_servers(configs);
                info!(bootstrap = %derived, "using bootstrap address derived from listener config");
                derived
            }
        };

        let mut client = ClientSettings {
            bootstrap_servers: bootstrap,
            properties: configs
                .iter()
                .filter_map(|(key, value)| {
                    key.strip_prefix(CLIENT_PREFIX)
                        .map(|stripped| (stripped.to_string(), value.clone()))
                })
                .collect(),
        };
        client.set_if_absent("client.id", "gleaner-metrics-reporter");
        client.set_if_absent("linger.ms", "30000");
        client.set_if_absent("batch.size", "800000");
        client.set_if_absent("retries", "5");
        client.set_if_absent("compression.type", "gzip");
        client.set_if_absent("acks", "all");

        Ok(Self {
            broker_id,
            topic: configs
                .get(TOPIC_KEY)
                .cloned()
                .unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
            reporting_interval: Duration::from_millis(parse_or(
                configs,
                INTERVAL_MS_KEY,
                DEFAULT_INTERVAL_MS,
            )?),
            auto_create: parse_or(configs, AUTO_CREATE_KEY, false)?,
            num_partitions: parse_or(configs, NUM_PARTITIONS_KEY, 1)?,
            replication_factor: parse_or(configs, REPLICATION_FACTOR_KEY, 1)?,
            retention_ms: parse_or(configs, RETENTION_MS_KEY, DEFAULT_RETENTION_MS)?,
            min_insync_replicas: parse_or(configs, MIN_INSYNC_REPLICAS_KEY, 0)?,
            auto_create_timeout: Duration::from_millis(parse_or(
                configs,
                AUTO_CREATE_TIMEOUT_MS_KEY,
                30_000,
            )?),
            auto_create_retries: parse_or(configs, AUTO_CREATE_RETRIES_KEY, 5)?,
            create_retries: parse_or(configs, CREATE_RETRIES_KEY, 2)?,
            resource_mode: if parse_or(configs, CONTAINERIZED_KEY, false)? {
                ResourceMode::Containerized
            } else {
                ResourceMode::Native
            },
            client,
        })
    }
}

/// Derive the bootstrap address from the host's listener configuration:
/// the first listener's host and port, with an explicit `port` entry taking
/// precedence and missing pieces falling back to `localhost:9092`.
pub(crate) fn bootstrap_servers(configs: &HashMap<String, String>) -> String {
    let port = configs.get(PORT_KEY).map(String::as_str);

    if let Some(listeners) = configs.get(LISTENERS_KEY).filter(|l| !l.is_empty()) {
        let first = listeners.split(',').next().unwrap_or("").trim();
        let parts: Vec<&str> = first.split(':').collect();
        if parts.len() >= 3 {
            // proto://host:port; an empty host ("//") means the default host
            let host = parts[1]
                .strip_prefix("//")
                .filter(|h| !h.is_empty())
                .unwrap_or(DEFAULT_BOOTSTRAP_HOST);
            let port_to_use = port.unwrap_or(parts[parts.len() - 1]);
            return format!("{}:{}", host, port_to_use);
        }
    }

    format!(
        "{}:{}",
        DEFAULT_BOOTSTRAP_HOST,
        port.unwrap_or(DEFAULT_BOOTSTRAP_PORT)
    )
}

fn parse_required<T>(configs: &HashMap<String, String>, key: &str) -> Result<T>
where
    T: FromStr,
{
    let raw = configs
        .get(key)
        .ok_or_else(|| ReporterError::InvalidConfig(format!("missing required config {}", key)))?;
    raw.parse::<T>()
        .map_err(|_| ReporterError::InvalidConfig(format!("invalid value {:?} for {}", raw, key)))
}

fn parse_or<T>(configs: &HashMap<String, String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
{
    match configs.get(key) {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|_| {
            ReporterError::InvalidConfig(format!("invalid value {:?} for {}", raw, key))
        }),
    }
}
