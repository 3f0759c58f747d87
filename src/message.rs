//! Transport-ready messages.

use crate::attachment::Attachment;
use crate::job::{EmailJob, Priority, Recipients};

/// The normalized form of an [`EmailJob`] handed to a transport.
///
/// Multi-valued address fields are joined into single comma-separated
/// strings and attachments are already in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// `Message-ID` header value, including angle brackets.
    pub message_id: String,
    /// Sender.
    pub from: String,
    /// Comma-joined primary recipients.
    pub to: String,
    /// Comma-joined CC recipients.
    pub cc: Option<String>,
    /// Comma-joined BCC recipients.
    pub bcc: Option<String>,
    /// Reply-to address.
    pub reply_to: Option<String>,
    /// Subject line.
    pub subject: String,
    /// Plain text body.
    pub text: Option<String>,
    /// HTML body.
    pub html: Option<String>,
    /// Materialized attachments, in request order.
    pub attachments: Vec<Attachment>,
    /// Priority.
    pub priority: Priority,
}

impl OutgoingMessage {
    /// Build from a job and its materialized attachments.
    pub fn new(job: &EmailJob, attachments: Vec<Attachment>) -> Self {
        Self {
            message_id: generate_message_id(&job.from),
            from: job.from.clone(),
            to: job.to.joined(),
            cc: join_optional(job.cc.as_ref()),
            bcc: join_optional(job.bcc.as_ref()),
            reply_to: job.reply_to.clone(),
            subject: job.subject.clone(),
            text: job.text.clone(),
            html: job.html.clone(),
            attachments,
            priority: job.priority,
        }
    }

    /// Every envelope recipient (to, cc and bcc), split back into addresses.
    pub fn recipients(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.to.as_str())
            .chain(self.cc.as_deref())
            .chain(self.bcc.as_deref())
            .flat_map(|list| list.split(','))
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
    }
}

fn join_optional(recipients: Option<&Recipients>) -> Option<String> {
    recipients
        .filter(|r| !r.is_empty())
        .map(Recipients::joined)
}

/// Generate a `<uuid@domain>` message id, taking the domain from the sender.
fn generate_message_id(from: &str) -> String {
    let domain = from
        .rsplit_once('@')
        .map(|(_, domain)| domain.trim_end_matches('>').trim())
        .filter(|domain| !domain.is_empty())
        .unwrap_or("mailshot.localhost");
    format!("<{}@{}>", uuid::Uuid::new_v4(), domain)
}
