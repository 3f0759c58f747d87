//! In-memory transport for development and testing (feature `memory`).
//!
//! Records every accepted message and can simulate the failure modes of a
//! real server: verification failure, per-recipient rejection and slow
//! sends.
//!
//! ```rust,ignore
//! use mailshot::{Dispatcher, MemoryFactory};
//!
//! let factory = MemoryFactory::new();
//! let transport = factory.transport();
//! transport.reject("bounce@example.com");
//!
//! let dispatcher = Dispatcher::new(factory);
//! let report = dispatcher.send_bulk(&endpoint, jobs).await?;
//!
//! assert_eq!(report.failed, 1);
//! assert_eq!(transport.close_count(), 1);
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{SendReceipt, Transport, TransportFactory, TransportMode};
use crate::endpoint::SmtpEndpoint;
use crate::error::DispatchError;
use crate::message::OutgoingMessage;

/// Default response line returned for accepted messages.
pub const DEFAULT_RESPONSE: &str = "250 2.0.0 OK: queued";

/// A message accepted by a [`MemoryTransport`].
#[derive(Debug, Clone)]
pub struct SentMessage {
    /// Message id returned to the caller.
    pub message_id: String,
    /// The message as handed to the transport.
    pub message: OutgoingMessage,
    /// When the message was accepted.
    pub sent_at: DateTime<Utc>,
}

/// Transport that keeps messages in memory.
pub struct MemoryTransport {
    sent: Mutex<Vec<SentMessage>>,
    verify_failure: RwLock<Option<String>>,
    rejected: RwLock<HashSet<String>>,
    panicking: RwLock<HashSet<String>>,
    delays: RwLock<HashMap<String, Duration>>,
    message_id: RwLock<Option<String>>,
    response: RwLock<String>,
    verify_calls: AtomicUsize,
    send_calls: AtomicUsize,
    close_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MemoryTransport {
    /// Create a transport that accepts everything.
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            verify_failure: RwLock::new(None),
            rejected: RwLock::new(HashSet::new()),
            panicking: RwLock::new(HashSet::new()),
            delays: RwLock::new(HashMap::new()),
            message_id: RwLock::new(None),
            response: RwLock::new(DEFAULT_RESPONSE.to_string()),
            verify_calls: AtomicUsize::new(0),
            send_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Create a transport wrapped in an Arc for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    // =========================================================================
    // Failure Simulation
    // =========================================================================

    /// Make `verify()` fail with a connectivity error.
    pub fn fail_verify(&self, message: impl Into<String>) {
        *self.verify_failure.write() = Some(message.into());
    }

    /// Reject any message addressed to `addr` (to, cc or bcc).
    pub fn reject(&self, addr: impl Into<String>) {
        self.rejected.write().insert(addr.into().to_lowercase());
    }

    /// Panic inside `send()` for messages addressed to `addr`.
    pub fn panic_on(&self, addr: impl Into<String>) {
        self.panicking.write().insert(addr.into().to_lowercase());
    }

    /// Delay sends addressed to `addr`.
    pub fn delay(&self, addr: impl Into<String>, delay: Duration) {
        self.delays.write().insert(addr.into().to_lowercase(), delay);
    }

    /// Return this message id for every send instead of the message's own.
    pub fn echo_message_id(&self, id: impl Into<String>) {
        *self.message_id.write() = Some(id.into());
    }

    /// Set the response line returned for accepted messages.
    pub fn set_response(&self, response: impl Into<String>) {
        *self.response.write() = response.into();
    }

    /// Clear every simulated failure and delay.
    pub fn reset_failures(&self) {
        *self.verify_failure.write() = None;
        self.rejected.write().clear();
        self.panicking.write().clear();
        self.delays.write().clear();
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// All accepted messages, in acceptance order.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    /// Number of accepted messages.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Whether a message to `addr` was accepted.
    pub fn sent_to(&self, addr: &str) -> bool {
        self.sent.lock().iter().any(|s| {
            s.message
                .recipients()
                .any(|r| r.eq_ignore_ascii_case(addr))
        })
    }

    /// Number of `send()` calls, accepted or not.
    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    /// Number of `verify()` calls.
    pub fn verify_count(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    /// Number of `close()` calls.
    pub fn close_count(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Highest number of sends that were in progress at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn delay_for(&self, message: &OutgoingMessage) -> Option<Duration> {
        let delays = self.delays.read();
        message
            .recipients()
            .filter_map(|r| delays.get(&r.to_lowercase()).copied())
            .max()
    }

    fn rejected_recipient(&self, message: &OutgoingMessage) -> Option<String> {
        listed_recipient(&self.rejected.read(), message)
    }

    fn panicking_recipient(&self, message: &OutgoingMessage) -> Option<String> {
        listed_recipient(&self.panicking.read(), message)
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn listed_recipient(list: &HashSet<String>, message: &OutgoingMessage) -> Option<String> {
    message
        .recipients()
        .find(|r| list.contains(&r.to_lowercase()))
        .map(str::to_string)
}

/// Decrements the in-flight counter when a send finishes, however it ends.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn verify(&self) -> Result<(), DispatchError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        match self.verify_failure.read().clone() {
            Some(message) => Err(DispatchError::Connectivity(message)),
            None => Ok(()),
        }
    }

    async fn send(&self, message: &OutgoingMessage) -> Result<SendReceipt, DispatchError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay_for(message) {
            tokio::time::sleep(delay).await;
        }

        if let Some(addr) = self.panicking_recipient(message) {
            panic!("simulated transport panic for <{}>", addr);
        }

        if let Some(addr) = self.rejected_recipient(message) {
            return Err(DispatchError::Send(format!(
                "550 5.1.1 <{}>: Recipient address rejected",
                addr
            )));
        }

        let message_id = self
            .message_id
            .read()
            .clone()
            .unwrap_or_else(|| message.message_id.clone());
        let response = self.response.read().clone();

        self.sent.lock().push(SentMessage {
            message_id: message_id.clone(),
            message: message.clone(),
            sent_at: Utc::now(),
        });

        Ok(SendReceipt::new(message_id, response))
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Factory that always hands out the same [`MemoryTransport`].
///
/// Endpoint parameters are checked exactly as the SMTP factory checks them,
/// so configuration errors can be exercised without a server.
pub struct MemoryFactory {
    transport: Arc<MemoryTransport>,
    opened: Mutex<Vec<TransportMode>>,
}

impl MemoryFactory {
    /// Create a factory with a fresh transport.
    pub fn new() -> Self {
        Self::with_transport(MemoryTransport::shared())
    }

    /// Create a factory around an existing transport.
    pub fn with_transport(transport: Arc<MemoryTransport>) -> Self {
        Self {
            transport,
            opened: Mutex::new(Vec::new()),
        }
    }

    /// The transport every `open()` returns.
    pub fn transport(&self) -> Arc<MemoryTransport> {
        Arc::clone(&self.transport)
    }

    /// Modes passed to `open()`, in call order.
    pub fn opened(&self) -> Vec<TransportMode> {
        self.opened.lock().clone()
    }
}

impl Default for MemoryFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportFactory for MemoryFactory {
    fn open(
        &self,
        endpoint: &SmtpEndpoint,
        mode: TransportMode,
    ) -> Result<Arc<dyn Transport>, DispatchError> {
        endpoint.check()?;
        self.opened.lock().push(mode);
        let transport: Arc<dyn Transport> = self.transport.clone();
        Ok(transport)
    }
}
