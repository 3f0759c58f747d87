//! Mail transports and the factory that opens them.
//!
//! A [`Transport`] is a live or on-demand connection to one SMTP endpoint.
//! It can verify reachability and credentials, send messages, and be closed.
//! [`TransportFactory`] turns an [`SmtpEndpoint`] plus a [`TransportMode`]
//! into a transport without sending anything.
//!
//! # Why `async_trait`?
//!
//! The dispatcher holds its factory as `Arc<dyn TransportFactory>` and hands
//! `Arc<dyn Transport>` to every job task of a batch. Native async trait
//! methods are not object safe, so the trait boxes its futures.
//!
//! ## Available transports
//!
//! | Transport | Feature | Description |
//! |-----------|---------|-------------|
//! | [`SmtpTransport`] | `smtp` | lettre-backed, explicit connection pool |
//! | `MemoryTransport` | `memory` | Records sends in memory for tests |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::endpoint::SmtpEndpoint;
use crate::error::DispatchError;
use crate::message::OutgoingMessage;

#[cfg(any(test, feature = "memory"))]
mod memory;
#[cfg(any(test, feature = "memory"))]
pub use memory::{MemoryFactory, MemoryTransport, SentMessage};

#[cfg(feature = "smtp")]
mod lanes;
#[cfg(feature = "smtp")]
mod smtp;
#[cfg(feature = "smtp")]
pub use smtp::{SmtpFactory, SmtpTransport};

/// Acknowledgment of one accepted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    /// `Message-ID` of the accepted message.
    pub message_id: String,
    /// Server response line, e.g. `250 2.0.0 OK queued`.
    pub response: String,
}

impl SendReceipt {
    /// Create a receipt.
    pub fn new(message_id: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            response: response.into(),
        }
    }
}

/// Per-connection timeouts for single sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Time allowed to establish the TCP/TLS connection.
    pub connection: Duration,
    /// Time allowed for the server greeting after connecting.
    pub greeting: Duration,
    /// Inactivity limit on an established socket.
    pub socket: Duration,
}

impl Timeouts {
    /// Upper bound for a full handshake (connect plus greeting).
    pub fn handshake(&self) -> Duration {
        self.connection + self.greeting
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connection: Duration::from_secs(10),
            greeting: Duration::from_secs(5),
            socket: Duration::from_secs(10),
        }
    }
}

/// Connection pool limits for bulk sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// Maximum simultaneously open connections. Also the number of jobs the
    /// bulk engine admits at once.
    pub max_connections: usize,
    /// Messages sent over one connection before it is recycled.
    pub max_messages: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 5,
            max_messages: 100,
        }
    }
}

/// How a transport should manage its connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// One connection for one send, with explicit timeouts.
    Single(Timeouts),
    /// A bounded pool of reusable connections.
    Pooled(PoolSettings),
}

impl TransportMode {
    /// Whether connections are pooled.
    pub fn is_pooled(&self) -> bool {
        matches!(self, Self::Pooled(_))
    }
}

/// A handle to one SMTP endpoint.
///
/// Implementations must be safe to use from many tasks at once. `close` is
/// only called after every task using the handle has finished.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform a handshake proving the endpoint is reachable and accepts the
    /// credentials. Nothing is sent.
    async fn verify(&self) -> Result<(), DispatchError>;

    /// Send one message.
    async fn send(&self, message: &OutgoingMessage) -> Result<SendReceipt, DispatchError>;

    /// Release every connection held by this handle.
    async fn close(&self);

    /// Transport name (for logging).
    fn name(&self) -> &'static str {
        "unknown"
    }
}

/// Builds transports from endpoint parameters.
pub trait TransportFactory: Send + Sync {
    /// Open a transport. Never sends and never blocks on the network.
    ///
    /// Malformed parameters fail here with `Configuration`, distinct from the
    /// `Connectivity` errors a later [`Transport::verify`] reports.
    fn open(
        &self,
        endpoint: &SmtpEndpoint,
        mode: TransportMode,
    ) -> Result<Arc<dyn Transport>, DispatchError>;
}
