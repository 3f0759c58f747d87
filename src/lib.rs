//! # Mailshot
//!
//! Send one email or a batch of emails through a caller-supplied SMTP server,
//! with bounded concurrency and per-message failure isolation.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mailshot::{EmailJob, SmtpEndpoint, send, send_bulk};
//!
//! let endpoint = SmtpEndpoint::new("smtp.example.com", "me@example.com", "secret");
//!
//! let job = EmailJob::new()
//!     .from("me@example.com")
//!     .to("user@example.com")
//!     .subject("Welcome!")
//!     .text("Hello");
//!
//! let receipt = send(&endpoint, &job).await?;
//!
//! let report = send_bulk(&endpoint, vec![job.clone(), job]).await?;
//! println!("{} of {} sent", report.successful, report.total);
//! ```
//!
//! ## Single vs bulk
//!
//! - [`send`] opens a non-pooled transport with connect/greeting/socket
//!   timeouts, verifies it, sends, and closes it. Any failure is returned.
//! - [`send_bulk`] opens one pooled transport (5 connections, 100 messages
//!   per connection by default), verifies it once and runs every job
//!   concurrently. A failing job becomes a failed [`JobOutcome`]; only
//!   configuration and connectivity failures abort the batch.
//!
//! [`BatchReport::success`] is true whenever the batch ran, even if every
//! job failed. Check [`BatchReport::failed`].
//!
//! ## Environment Variables
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `MAILSHOT_POOL_MAX_CONNECTIONS` | Connections per bulk transport (default: 5) |
//! | `MAILSHOT_POOL_MAX_MESSAGES` | Messages per connection before recycling (default: 100) |
//! | `MAILSHOT_CONNECTION_TIMEOUT_SECS` | Single-send connect timeout (default: 10) |
//! | `MAILSHOT_GREETING_TIMEOUT_SECS` | Single-send greeting timeout (default: 5) |
//! | `MAILSHOT_SOCKET_TIMEOUT_SECS` | Single-send socket timeout (default: 10) |
//! | `MAILSHOT_BIND` | Listen address for `mailshot-server` (default: `0.0.0.0:3000`) |
//!
//! ## Feature Flags
//!
//! - `smtp` (default) - SMTP transport via lettre
//! - `server` - axum router and the `mailshot-server` binary
//! - `memory` - `MemoryTransport`/`MemoryFactory` for development and testing
//! - `metrics` - Prometheus-style metrics (counters/histograms)
//!
//! ## Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `mailshot_emails_total` | Counter | mode, status | Emails attempted |
//! | `mailshot_delivery_duration_seconds` | Histogram | mode | Send or batch duration |
//! | `mailshot_batch_total` | Counter | | Batches run to completion |
//! | `mailshot_batch_size` | Histogram | | Jobs per batch |

/// The version of the mailshot crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

mod attachment;
mod bulk;
mod config;
mod dispatch;
mod endpoint;
mod error;
mod job;
mod message;
mod report;

pub mod transport;

#[cfg(feature = "server")]
pub mod server;

use parking_lot::RwLock;
use std::sync::Arc;

// Re-exports
pub use attachment::{materialize, Attachment, AttachmentSource};
pub use bulk::dispatch_batch;
pub use config::DispatchConfig;
pub use dispatch::{send_one, Dispatcher};
pub use endpoint::{Credentials, SmtpEndpoint};
pub use error::DispatchError;
pub use job::{EmailJob, Priority, Recipients};
pub use message::OutgoingMessage;
pub use report::{BatchReport, JobOutcome};
pub use transport::{
    PoolSettings, SendReceipt, Timeouts, Transport, TransportFactory, TransportMode,
};

#[cfg(any(test, feature = "memory"))]
pub use transport::{MemoryFactory, MemoryTransport};

// ============================================================================
// Global Dispatcher
// ============================================================================

/// Global dispatcher - swappable for testing
static DISPATCHER: RwLock<Option<Arc<Dispatcher>>> = RwLock::new(None);

#[cfg(feature = "smtp")]
fn create_dispatcher_from_env() -> Result<Dispatcher, DispatchError> {
    Dispatcher::from_env()
}

#[cfg(not(feature = "smtp"))]
fn create_dispatcher_from_env() -> Result<Dispatcher, DispatchError> {
    Err(DispatchError::NotConfigured)
}

/// Get or initialize the global dispatcher.
fn get_dispatcher() -> Result<Arc<Dispatcher>, DispatchError> {
    // Fast path: already configured
    if let Some(dispatcher) = DISPATCHER.read().as_ref() {
        return Ok(Arc::clone(dispatcher));
    }

    let created = Arc::new(create_dispatcher_from_env()?);
    let mut guard = DISPATCHER.write();
    // Another caller may have won the race while we were building.
    Ok(Arc::clone(guard.get_or_insert(created)))
}

/// Send one email using the global dispatcher.
///
/// Initializes an SMTP dispatcher from environment variables on first use.
pub async fn send(endpoint: &SmtpEndpoint, job: &EmailJob) -> Result<SendReceipt, DispatchError> {
    get_dispatcher()?.send(endpoint, job).await
}

/// Send a batch using the global dispatcher.
///
/// Initializes an SMTP dispatcher from environment variables on first use.
pub async fn send_bulk(
    endpoint: &SmtpEndpoint,
    jobs: Vec<EmailJob>,
) -> Result<BatchReport, DispatchError> {
    get_dispatcher()?.send_bulk(endpoint, jobs).await
}

/// Replace the global dispatcher.
///
/// ```rust,ignore
/// use mailshot::{configure, Dispatcher, MemoryFactory};
///
/// configure(Dispatcher::new(MemoryFactory::new()));
/// ```
pub fn configure(dispatcher: Dispatcher) {
    *DISPATCHER.write() = Some(Arc::new(dispatcher));
}

/// Reset the global dispatcher (useful for tests).
///
/// The next `send()` re-initializes from environment variables.
pub fn reset() {
    *DISPATCHER.write() = None;
}

/// The configured global dispatcher, if initialized.
pub fn dispatcher() -> Option<Arc<Dispatcher>> {
    DISPATCHER.read().clone()
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::AttachmentSource;
    pub use crate::BatchReport;
    pub use crate::DispatchError;
    pub use crate::Dispatcher;
    pub use crate::EmailJob;
    pub use crate::JobOutcome;
    pub use crate::Priority;
    pub use crate::SmtpEndpoint;
    pub use crate::{send, send_bulk};
}
