//! One-shot create-or-reconcile provisioning of the metrics topic.
//!
//! Runs at most once, on the scheduler task, before the sampling loop
//! starts. Holds the administrative client only for this phase and releases
//! it with a bounded timeout regardless of outcome. Provisioning failures
//! degrade gracefully: reporting proceeds without a guaranteed-provisioned
//! topic.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::errors::{AdminError, ReporterError, Result};
use crate::retry::{retry_bounded, Attempt, RetryError};

/// Managed topic config keys; reconciliation touches exactly these two.
pub const RETENTION_MS_KEY: &str = "retention.ms";
pub const CLEANUP_POLICY_KEY: &str = "cleanup.policy";
pub const MIN_INSYNC_REPLICAS_KEY: &str = "min.insync.replicas";

pub const CLEANUP_POLICY_DELETE: &str = "delete";

/// Bounded wait applied to every administrative RPC outside create.
const ADMIN_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Bound on releasing the admin client after the one-shot protocol.
const ADMIN_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);
/// Base backoff between create attempts.
const CREATE_BACKOFF: Duration = Duration::from_millis(500);

/// Desired declarative state of the destination topic. Built once from
/// configuration, never mutated; compared against live topic state.
#[derive(Debug, Clone)]
pub struct TopicSpec {
    pub name: String,
    pub num_partitions: i32,
    pub replication_factor: i16,
    pub retention_ms: u64,
    /// Fixed to "delete"; the metrics topic is never compacted.
    pub cleanup_policy: &'static str,
    /// 0 means unset: use the cluster default.
    pub min_insync_replicas: i16,
}

impl TopicSpec {
    /// Validates the declarative invariants up front. A violation fails
    /// fast and disables provisioning for this run only.
    pub fn new(
        name: impl Into<String>,
        num_partitions: i32,
        replication_factor: i16,
        retention_ms: u64,
        min_insync_replicas: i16,
    ) -> Result<Self> {
        if num_partitions < 1 || replication_factor < 1 {
            return Err(ReporterError::InvalidTopicSpec(
                "the topic configuration must explicitly set the replication factor and the num partitions"
                    .into(),
            ));
        }
        if min_insync_replicas > 0 && replication_factor < min_insync_replicas {
            return Err(ReporterError::InvalidTopicSpec(format!(
                "the configured topic replication factor ({}) must be greater than or equal to the configured topic minimum insync replicas ({})",
                replication_factor, min_insync_replicas
            )));
        }
        Ok(Self {
            name: name.into(),
            num_partitions,
            replication_factor,
            retention_ms,
            cleanup_policy: CLEANUP_POLICY_DELETE,
            min_insync_replicas,
        })
    }

    /// Full config set passed on create; includes min ISR only when the
    /// host set one, otherwise the cluster default applies.
    pub fn create_configs(&self) -> Vec<(String, String)> {
        let mut configs = self.managed_configs();
        if self.min_insync_replicas > 0 {
            configs.push((
                MIN_INSYNC_REPLICAS_KEY.to_string(),
                self.min_insync_replicas.to_string(),
            ));
        }
        configs
    }

    /// The two config entries reconciliation manages.
    pub fn managed_configs(&self) -> Vec<(String, String)> {
        vec![
            (RETENTION_MS_KEY.to_string(), self.retention_ms.to_string()),
            (CLEANUP_POLICY_KEY.to_string(), self.cleanup_policy.to_string()),
        ]
    }
}

/// Live partition layout of a topic.
#[derive(Debug, Clone)]
pub struct TopicInfo {
    pub partitions: i32,
}

/// Administrative client seam. Every method is an async RPC; the provisioner
/// bounds each call with its own timeout.
#[async_trait]
pub trait TopicAdmin: Send + Sync {
    async fn create_topic(&self, spec: &TopicSpec) -> std::result::Result<(), AdminError>;

    async fn describe_topic(&self, name: &str) -> std::result::Result<TopicInfo, AdminError>;

    async fn describe_config(
        &self,
        name: &str,
    ) -> std::result::Result<HashMap<String, String>, AdminError>;

    async fn alter_config(
        &self,
        name: &str,
        entries: Vec<(String, String)>,
    ) -> std::result::Result<(), AdminError>;

    async fn create_partitions(&self, name: &str, count: i32)
        -> std::result::Result<(), AdminError>;

    async fn close(&self, timeout: Duration);
}

pub struct TopicProvisioner {
    admin: Arc<dyn TopicAdmin>,
    spec: TopicSpec,
    create_timeout: Duration,
    create_retries: u32,
}

impl TopicProvisioner {
    pub fn new(
        admin: Arc<dyn TopicAdmin>,
        spec: TopicSpec,
        create_timeout: Duration,
        create_retries: u32,
    ) -> Self {
        Self {
            admin,
            spec,
            create_timeout,
            create_retries,
        }
    }

    /// Run the one-shot protocol: create the topic, or reconcile an existing
    /// one, then release the admin client. Never fails the caller.
    pub async fn provision(&self) {
        match self.create_metrics_topic().await {
            Ok(()) => {
                info!(topic = %self.spec.name, "metrics topic created");
            }
            Err(RetryError::Aborted(AdminError::TopicAlreadyExists)) => {
                debug!(topic = %self.spec.name, "metrics topic already exists, reconciling");
                self.reconcile_config().await;
                self.reconcile_partitions().await;
            }
            Err(RetryError::Aborted(e)) => {
                warn!(topic = %self.spec.name, error = %e, "metrics topic creation failed");
            }
            Err(RetryError::Exhausted) => {
                warn!(topic = %self.spec.name, "metrics topic creation retries exhausted, abandoning provisioning for this run");
            }
        }
        self.admin.close(ADMIN_CLOSE_TIMEOUT).await;
    }

    /// Issue create-topic through the retry executor. "Already exists" is a
    /// terminal outcome of a distinguished kind that redirects into the
    /// reconcile path; everything else (timeout, execution error,
    /// interruption) is retried up to the configured bound.
    async fn create_metrics_topic(&self) -> std::result::Result<(), RetryError<AdminError>> {
        retry_bounded(self.create_retries, CREATE_BACKOFF, move || async move {
            let create = tokio::time::timeout(
                self.create_timeout,
                self.admin.create_topic(&self.spec),
            )
            .await
            .unwrap_or(Err(AdminError::Timeout));

            match create {
                Ok(()) => Attempt::Done,
                Err(AdminError::TopicAlreadyExists) => Attempt::Abort(AdminError::TopicAlreadyExists),
                Err(e) => {
                    warn!(topic = %self.spec.name, error = %e, "unable to create metrics topic");
                    Attempt::Retry
                }
            }
        })
        .await
    }

    /// Bring the two managed config entries in line with the spec. When the
    /// live config already matches, no administrative write is issued.
    async fn reconcile_config(&self) {
        let live = match tokio::time::timeout(
            ADMIN_REQUEST_TIMEOUT,
            self.admin.describe_config(&self.spec.name),
        )
        .await
        .unwrap_or(Err(AdminError::Timeout))
        {
            Ok(live) => live,
            Err(e) => {
                warn!(topic = %self.spec.name, error = %e, "unable to read metrics topic config");
                return;
            }
        };

        let diff: Vec<(String, String)> = self
            .spec
            .managed_configs()
            .into_iter()
            .filter(|(key, desired)| live.get(key) != Some(desired))
            .collect();

        if diff.is_empty() {
            debug!(topic = %self.spec.name, "metrics topic config already matches spec");
            return;
        }

        info!(topic = %self.spec.name, entries = diff.len(), "updating metrics topic config");
        if let Err(e) = tokio::time::timeout(
            ADMIN_REQUEST_TIMEOUT,
            self.admin.alter_config(&self.spec.name, diff),
        )
        .await
        .unwrap_or(Err(AdminError::Timeout))
        {
            warn!(topic = %self.spec.name, error = %e, "unable to update metrics topic config");
        }
    }

    /// Raise the live partition count to the desired count when it lags.
    /// The count is monotonically non-decreasing for the life of the topic:
    /// a desired count below the live one is a no-op, never a decrease.
    async fn reconcile_partitions(&self) {
        let live = match tokio::time::timeout(
            ADMIN_REQUEST_TIMEOUT,
            self.admin.describe_topic(&self.spec.name),
        )
        .await
        .unwrap_or(Err(AdminError::Timeout))
        {
            Ok(info) => info,
            Err(e) => {
                warn!(topic = %self.spec.name, error = %e, "unable to describe metrics topic");
                return;
            }
        };

        if live.partitions >= self.spec.num_partitions {
            debug!(topic = %self.spec.name, live = live.partitions, "partition count already at or above spec");
            return;
        }

        match tokio::time::timeout(
            ADMIN_REQUEST_TIMEOUT,
            self.admin
                .create_partitions(&self.spec.name, self.spec.num_partitions),
        )
        .await
        .unwrap_or(Err(AdminError::Timeout))
        {
            Ok(()) => {
                info!(topic = %self.spec.name, partitions = self.spec.num_partitions, "increased metrics topic partition count");
            }
            Err(AdminError::ReassignmentInProgress) => {
                warn!(topic = %self.spec.name, desired = self.spec.num_partitions, "partition count increase skipped due to ongoing reassignment");
            }
            Err(e) => {
                warn!(topic = %self.spec.name, desired = self.spec.num_partitions, error = %e, "partition count increase failed");
            }
        }
    }
}
