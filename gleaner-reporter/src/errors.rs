use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReporterError>;

/// Top-level reporter errors surfaced through the host lifecycle.
#[derive(Debug, Error)]
pub enum ReporterError {
    #[error("invalid reporter configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid metrics topic spec: {0}")]
    InvalidTopicSpec(String),

    /// The publisher could not be built for a non-retryable reason; the
    /// reporter must disable itself and release its resources.
    #[error("metrics producer is permanently unavailable: {0}")]
    ProducerUnavailable(String),

    #[error("codec error: {0}")]
    Codec(#[from] gleaner_core::CodecError),

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("admin error: {0}")]
    Admin(#[from] AdminError),
}

/// Failures of the record transport (producer client analogue).
#[derive(Debug, Error)]
pub enum SinkError {
    /// The bootstrap address did not resolve. Retryable during construction:
    /// resolution may complete shortly after the broker starts listening.
    #[error("bootstrap address could not be resolved: {0}")]
    UnresolvedAddress(String),

    /// The blocked operation was interrupted. Expected when it coincides
    /// with a shutdown request.
    #[error("transport operation interrupted")]
    Interrupted,

    #[error("transport operation timed out")]
    Timeout,

    #[error("record send failed: {0}")]
    Send(String),

    #[error("transport is closed")]
    Closed,
}

/// Failures of the administrative client used during provisioning.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Expected steady-state, not an operational error: redirects the
    /// provisioner into the reconcile path.
    #[error("topic already exists")]
    TopicAlreadyExists,

    /// A partition reassignment is in flight; the partition increase is
    /// skipped for this run.
    #[error("partition reassignment in progress")]
    ReassignmentInProgress,

    #[error("admin request timed out")]
    Timeout,

    #[error("admin request interrupted")]
    Interrupted,

    #[error("admin request failed: {0}")]
    Admin(String),
}
