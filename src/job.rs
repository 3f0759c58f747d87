//! Email jobs: one outbound message as requested by the caller.

use email_address::EmailAddress;
use serde::{Deserialize, Deserializer, Serialize};

use crate::attachment::AttachmentSource;

/// One address or a list of addresses, preserving the shape the caller used.
///
/// Transports accept a single address string, so lists are joined with
/// `", "` before sending (see [`Recipients::joined`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Recipients {
    /// A single address.
    One(String),
    /// Several addresses.
    Many(Vec<String>),
}

impl Recipients {
    /// Add an address, widening `One` into `Many` as needed.
    pub fn push(&mut self, addr: impl Into<String>) {
        let addr = addr.into();
        match self {
            Self::Many(list) if list.is_empty() => *self = Self::One(addr),
            Self::Many(list) => list.push(addr),
            Self::One(first) => {
                let first = std::mem::take(first);
                *self = Self::Many(vec![first, addr]);
            }
        }
    }

    /// Iterate over the addresses.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let slice: &[String] = match self {
            Self::One(addr) => std::slice::from_ref(addr),
            Self::Many(list) => list,
        };
        slice.iter().map(String::as_str)
    }

    /// Number of addresses.
    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(list) => list.len(),
        }
    }

    /// Whether there are no addresses.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Normalize to the comma-joined form handed to transports.
    ///
    /// ```
    /// use mailshot::Recipients;
    ///
    /// let many = Recipients::Many(vec!["a@example.com".into(), "b@example.com".into()]);
    /// assert_eq!(many.joined(), "a@example.com, b@example.com");
    /// ```
    pub fn joined(&self) -> String {
        match self {
            Self::One(addr) => addr.clone(),
            Self::Many(list) => list.join(", "),
        }
    }
}

impl Default for Recipients {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl From<&str> for Recipients {
    fn from(addr: &str) -> Self {
        Self::One(addr.to_string())
    }
}

impl From<String> for Recipients {
    fn from(addr: String) -> Self {
        Self::One(addr)
    }
}

impl From<Vec<String>> for Recipients {
    fn from(list: Vec<String>) -> Self {
        Self::Many(list)
    }
}

impl From<Vec<&str>> for Recipients {
    fn from(list: Vec<&str>) -> Self {
        Self::Many(list.into_iter().map(String::from).collect())
    }
}

/// Message priority, rendered as `X-Priority`/`Importance` headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Flag the message as urgent.
    High,
    /// No priority headers.
    #[default]
    Normal,
    /// Flag the message as low importance.
    Low,
}

impl Priority {
    /// `X-Priority` header value, if any.
    pub fn x_priority(self) -> Option<&'static str> {
        match self {
            Self::High => Some("1 (Highest)"),
            Self::Normal => None,
            Self::Low => Some("5 (Lowest)"),
        }
    }

    /// `Importance` / `X-MSMail-Priority` header value, if any.
    pub fn importance(self) -> Option<&'static str> {
        match self {
            Self::High => Some("High"),
            Self::Normal => None,
            Self::Low => Some("Low"),
        }
    }
}

/// One outbound email as requested by the caller.
///
/// Built with the builder methods or deserialized from camelCase JSON:
///
/// ```
/// use mailshot::EmailJob;
///
/// let job = EmailJob::new()
///     .from("sender@example.com")
///     .to("one@example.com")
///     .to("two@example.com")
///     .subject("Hello")
///     .text("Plain text")
///     .html("<p>HTML</p>");
///
/// assert_eq!(job.to.joined(), "one@example.com, two@example.com");
/// assert!(job.validate().is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailJob {
    /// Sender, either `addr@host` or `Name <addr@host>`.
    pub from: String,
    /// Primary recipients.
    pub to: Recipients,
    /// Carbon copy recipients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cc: Option<Recipients>,
    /// Blind carbon copy recipients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bcc: Option<Recipients>,
    /// Reply-to address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    /// Subject line.
    pub subject: String,
    /// Plain text body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// HTML body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    /// Attachments, one object or a list.
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub attachments: Vec<AttachmentSource>,
    /// Message priority.
    #[serde(default)]
    pub priority: Priority,
}

impl EmailJob {
    /// Create an empty job.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sender.
    pub fn from(mut self, addr: impl Into<String>) -> Self {
        self.from = addr.into();
        self
    }

    /// Add a recipient.
    pub fn to(mut self, addr: impl Into<String>) -> Self {
        self.to.push(addr);
        self
    }

    /// Replace all recipients.
    pub fn put_to(mut self, recipients: impl Into<Recipients>) -> Self {
        self.to = recipients.into();
        self
    }

    /// Add a CC recipient.
    pub fn cc(mut self, addr: impl Into<String>) -> Self {
        self.cc.get_or_insert_with(Recipients::default).push(addr);
        self
    }

    /// Add a BCC recipient.
    pub fn bcc(mut self, addr: impl Into<String>) -> Self {
        self.bcc.get_or_insert_with(Recipients::default).push(addr);
        self
    }

    /// Set the reply-to address.
    pub fn reply_to(mut self, addr: impl Into<String>) -> Self {
        self.reply_to = Some(addr.into());
        self
    }

    /// Set the subject line.
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Set the plain text body.
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.text = Some(body.into());
        self
    }

    /// Set the HTML body.
    pub fn html(mut self, body: impl Into<String>) -> Self {
        self.html = Some(body.into());
        self
    }

    /// Add an attachment.
    pub fn attachment(mut self, source: AttachmentSource) -> Self {
        self.attachments.push(source);
        self
    }

    /// Set the priority.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Collect input issues in the shape the HTTP layer reports them.
    ///
    /// An empty list means the job is well-formed. Dispatch itself does not
    /// call this; callers validate at their boundary.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.to.is_empty() {
            issues.push("At least one recipient is required".to_string());
        }
        let recipients = self
            .to
            .iter()
            .chain(self.cc.iter().flat_map(|r| r.iter()))
            .chain(self.bcc.iter().flat_map(|r| r.iter()));
        for addr in recipients {
            if !EmailAddress::is_valid(addr) {
                issues.push(format!("Invalid recipient email address: {}", addr));
            }
        }
        if let Some(reply_to) = &self.reply_to {
            if !EmailAddress::is_valid(reply_to) {
                issues.push(format!("Invalid reply-to email address: {}", reply_to));
            }
        }
        if self.subject.is_empty() {
            issues.push("Subject is required".to_string());
        }
        if self.text.as_deref() == Some("") {
            issues.push("Text body is required".to_string());
        }
        if self.html.as_deref() == Some("") {
            issues.push("HTML body is required".to_string());
        }
        for (i, attachment) in self.attachments.iter().enumerate() {
            if attachment.content.is_none() && attachment.path.is_none() {
                issues.push(format!("Attachment {} content is required", i));
            }
        }

        issues
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match Option::<OneOrMany<T>>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(item)) => vec![item],
        Some(OneOrMany::Many(items)) => items,
    })
}
