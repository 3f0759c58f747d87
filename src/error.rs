//! Error types for mailshot.

use thiserror::Error;

/// Errors that can occur while dispatching emails.
///
/// Batch-level variants (`Configuration`, `Connectivity`) abort a bulk send
/// before any job runs. Job-level variants (`AttachmentRead`, `Send`) are
/// folded into a [`JobOutcome`](crate::JobOutcome) during bulk sends and only
/// surface as errors from single sends.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// No dispatcher configured and none could be created from the environment.
    #[error("Dispatcher not configured")]
    NotConfigured,

    /// Malformed endpoint or service configuration. Raised before any
    /// connection attempt.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Transport verification failed: unreachable host, TLS failure or
    /// rejected credentials.
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// An attachment could not be materialized.
    #[error("Failed to read attachment: {0}")]
    AttachmentRead(String),

    /// The transport rejected or failed to deliver a message.
    #[error("Send error: {0}")]
    Send(String),

    /// Input failed validation. Each entry is one human-readable issue.
    #[error("Validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),

    /// The transport was used after it was closed.
    #[error("Transport is closed")]
    Closed,

    /// A job task panicked or was aborted before producing an outcome.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// Whether this error describes bad input rather than a runtime failure.
    ///
    /// The HTTP layer answers 400 for these and 500 for everything else.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Whether this error aborts a whole batch rather than a single job.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            Self::NotConfigured | Self::Configuration(_) | Self::Connectivity(_)
        )
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(vec![err.to_string()])
    }
}

#[cfg(feature = "smtp")]
impl From<lettre::error::Error> for DispatchError {
    fn from(err: lettre::error::Error) -> Self {
        Self::Send(err.to_string())
    }
}

#[cfg(feature = "smtp")]
impl From<lettre::transport::smtp::Error> for DispatchError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        Self::Send(err.to_string())
    }
}

#[cfg(feature = "smtp")]
impl From<lettre::address::AddressError> for DispatchError {
    fn from(err: lettre::address::AddressError) -> Self {
        Self::Send(format!("invalid address: {}", err))
    }
}
