//! SMTP transport using lettre.
//!
//! Connections are held in lanes (see `lanes.rs`). Each lane wraps a lettre
//! transport whose internal pool is capped at one connection, so a lane is
//! exactly one reusable SMTP session.
//!
//! # Example
//!
//! ```rust,ignore
//! use mailshot::transport::{SmtpTransport, Transport, TransportMode, PoolSettings};
//!
//! let transport = SmtpTransport::open(&endpoint, TransportMode::Pooled(PoolSettings::default()))?;
//! transport.verify().await?;
//! let receipt = transport.send(&message).await?;
//! transport.close().await;
//! ```

use async_trait::async_trait;
use lettre::{
    message::{
        header::{ContentType, Header, HeaderName, HeaderValue},
        Attachment as LettreAttachment, Mailbox, Mailboxes, MultiPart, SinglePart,
    },
    transport::smtp::{authentication::Credentials, response::Response, PoolConfig},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;
use std::time::Duration;

use super::lanes::LanePool;
use super::{SendReceipt, Transport, TransportFactory, TransportMode};
use crate::endpoint::SmtpEndpoint;
use crate::error::DispatchError;
use crate::job::Priority;
use crate::message::OutgoingMessage;

/// Opens [`SmtpTransport`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmtpFactory;

impl TransportFactory for SmtpFactory {
    fn open(
        &self,
        endpoint: &SmtpEndpoint,
        mode: TransportMode,
    ) -> Result<Arc<dyn Transport>, DispatchError> {
        let transport: Arc<dyn Transport> = Arc::new(SmtpTransport::open(endpoint, mode)?);
        Ok(transport)
    }
}

/// Parameters for building one lane.
struct LaneSpec {
    host: String,
    port: u16,
    secure: bool,
    credentials: Credentials,
    timeout: Option<Duration>,
}

impl LaneSpec {
    fn build(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, DispatchError> {
        let builder = if self.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)
        }
        .map_err(|e| {
            DispatchError::Configuration(format!("invalid SMTP host '{}': {}", self.host, e))
        })?;

        let mut builder = builder
            .port(self.port)
            .credentials(self.credentials.clone())
            .pool_config(PoolConfig::new().max_size(1));
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(Some(timeout));
        }

        Ok(builder.build())
    }
}

/// SMTP transport with an explicit, bounded connection pool.
///
/// In single mode the pool holds one connection, socket operations are
/// bounded by the socket timeout and `verify()` by connect plus greeting
/// timeouts. In pooled mode up to `max_connections` sessions are open at
/// once, each recycled after `max_messages` sends.
pub struct SmtpTransport {
    host: String,
    port: u16,
    handshake_timeout: Option<Duration>,
    lanes: LanePool<AsyncSmtpTransport<Tokio1Executor>>,
}

impl SmtpTransport {
    /// Build a transport for `endpoint`. Does not connect.
    ///
    /// # Errors
    ///
    /// `Configuration` if the endpoint parameters are malformed.
    pub fn open(endpoint: &SmtpEndpoint, mode: TransportMode) -> Result<Self, DispatchError> {
        endpoint.check()?;

        let (timeout, handshake_timeout, connections, max_messages) = match mode {
            TransportMode::Single(timeouts) => {
                (Some(timeouts.socket), Some(timeouts.handshake()), 1, usize::MAX)
            }
            TransportMode::Pooled(pool) => (None, None, pool.max_connections, pool.max_messages),
        };

        let spec = LaneSpec {
            host: endpoint.host.trim().to_string(),
            port: endpoint.effective_port(),
            secure: endpoint.is_secure(),
            credentials: Credentials::new(endpoint.auth.user.clone(), endpoint.auth.pass.clone()),
            timeout,
        };
        let host = spec.host.clone();
        let port = spec.port;

        tracing::debug!(
            host = %host,
            port,
            secure = spec.secure,
            pooled = mode.is_pooled(),
            connections,
            "SMTP transport opened"
        );

        // The first lane is built here so malformed parameters fail at open.
        let lanes = LanePool::new(connections, max_messages, move || spec.build())?;

        Ok(Self {
            host,
            port,
            handshake_timeout,
            lanes,
        })
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn verify(&self) -> Result<(), DispatchError> {
        let lease = self.lanes.checkout().await?;

        let probe = lease.conn.test_connection();
        let result = match self.handshake_timeout {
            Some(limit) => tokio::time::timeout(limit, probe).await.map_err(|_| {
                DispatchError::Connectivity(format!(
                    "no response from {}:{} within {:?}",
                    self.host, self.port, limit
                ))
            })?,
            None => probe.await,
        };

        match result {
            Ok(true) => {
                self.lanes.checkin(lease);
                Ok(())
            }
            Ok(false) => Err(DispatchError::Connectivity(format!(
                "{}:{} did not accept the connection test",
                self.host, self.port
            ))),
            Err(e) => Err(DispatchError::Connectivity(e.to_string())),
        }
    }

    async fn send(&self, message: &OutgoingMessage) -> Result<SendReceipt, DispatchError> {
        let email = build_message(message)?;
        let mut lease = self.lanes.checkout().await?;

        match lease.conn.send(email).await {
            Ok(response) => {
                lease.record_sent();
                self.lanes.checkin(lease);
                Ok(SendReceipt::new(
                    message.message_id.clone(),
                    format_response(&response),
                ))
            }
            Err(e) => {
                // A permanent rejection leaves the session usable.
                if e.is_permanent() {
                    self.lanes.checkin(lease);
                }
                Err(DispatchError::Send(e.to_string()))
            }
        }
    }

    async fn close(&self) {
        let dropped = self.lanes.close();
        tracing::debug!(
            host = %self.host,
            idle = dropped,
            built = self.lanes.built(),
            "SMTP transport closed"
        );
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}

/// `250 2.0.0 OK queued` style summary of a server response.
fn format_response(response: &Response) -> String {
    let text = response
        .message()
        .collect::<Vec<_>>()
        .join(" ");
    format!("{} {}", response.code(), text).trim_end().to_string()
}

macro_rules! text_header {
    ($ty:ident, $name:literal) => {
        #[derive(Debug, Clone)]
        struct $ty(String);

        impl Header for $ty {
            fn name() -> HeaderName {
                HeaderName::new_from_ascii_str($name)
            }

            fn parse(s: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
                Ok(Self(s.to_string()))
            }

            fn display(&self) -> HeaderValue {
                HeaderValue::new(Self::name(), self.0.clone())
            }
        }
    };
}

text_header!(XPriority, "X-Priority");
text_header!(XMsMailPriority, "X-MSMail-Priority");
text_header!(Importance, "Importance");

/// Build a lettre Message from an outgoing message.
fn build_message(message: &OutgoingMessage) -> Result<Message, DispatchError> {
    let from: Mailbox = message.from.parse()?;

    let mut builder = Message::builder()
        .message_id(Some(message.message_id.clone()))
        .from(from)
        .subject(&message.subject);

    for to in message.to.parse::<Mailboxes>()? {
        builder = builder.to(to);
    }
    if let Some(cc) = &message.cc {
        for cc in cc.parse::<Mailboxes>()? {
            builder = builder.cc(cc);
        }
    }
    if let Some(bcc) = &message.bcc {
        for bcc in bcc.parse::<Mailboxes>()? {
            builder = builder.bcc(bcc);
        }
    }
    if let Some(reply_to) = &message.reply_to {
        builder = builder.reply_to(reply_to.parse()?);
    }

    if message.priority != Priority::Normal {
        if let Some(value) = message.priority.x_priority() {
            builder = builder.header(XPriority(value.to_string()));
        }
        if let Some(value) = message.priority.importance() {
            builder = builder
                .header(XMsMailPriority(value.to_string()))
                .header(Importance(value.to_string()));
        }
    }

    let email = if message.attachments.is_empty() {
        match (&message.html, &message.text) {
            (Some(html), Some(text)) => {
                builder.multipart(MultiPart::alternative_plain_html(text.clone(), html.clone()))?
            }
            (Some(html), None) => builder.header(ContentType::TEXT_HTML).body(html.clone())?,
            (None, Some(text)) => builder.header(ContentType::TEXT_PLAIN).body(text.clone())?,
            (None, None) => builder
                .header(ContentType::TEXT_PLAIN)
                .body(String::new())?,
        }
    } else {
        let body_part = match (&message.html, &message.text) {
            (Some(html), Some(text)) => {
                MultiPart::alternative_plain_html(text.clone(), html.clone())
            }
            (Some(html), None) => MultiPart::mixed().singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_HTML)
                    .body(html.clone()),
            ),
            (None, Some(text)) => MultiPart::mixed().singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_PLAIN)
                    .body(text.clone()),
            ),
            (None, None) => MultiPart::mixed().singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_PLAIN)
                    .body(String::new()),
            ),
        };

        let mut multipart = MultiPart::mixed().multipart(body_part);
        for attachment in &message.attachments {
            let content_type = ContentType::parse(&attachment.content_type)
                .or_else(|_| ContentType::parse("application/octet-stream"))
                .map_err(|e| DispatchError::Send(format!("invalid content type: {}", e)))?;
            multipart = multipart.singlepart(
                LettreAttachment::new(attachment.filename.clone())
                    .body(attachment.data.clone(), content_type),
            );
        }

        builder.multipart(multipart)?
    };

    Ok(email)
}
