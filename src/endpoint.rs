//! SMTP endpoint parameters supplied by the caller.

use email_address::EmailAddress;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DispatchError;

/// Implicit-TLS submission port.
pub const SECURE_PORT: u16 = 465;
/// STARTTLS submission port.
pub const SUBMISSION_PORT: u16 = 587;

/// SMTP login credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Login name (an email address).
    pub user: String,
    /// Password.
    pub pass: String,
}

impl Credentials {
    /// Create credentials from a user and password.
    pub fn new(user: impl Into<String>, pass: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            pass: pass.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("pass", &"<redacted>")
            .finish()
    }
}

/// Connection parameters for one SMTP server.
///
/// Shared by reference across every job of a batch and never mutated once
/// validated.
///
/// ```
/// use mailshot::SmtpEndpoint;
///
/// let endpoint = SmtpEndpoint::new("smtp.example.com", "user@example.com", "secret");
/// assert_eq!(endpoint.effective_port(), 587);
///
/// let endpoint = endpoint.secure(true);
/// assert_eq!(endpoint.effective_port(), 465);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmtpEndpoint {
    /// Server host name or IP address.
    pub host: String,
    /// Server port. Defaults to 465 when `secure`, else 587.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Connect with implicit TLS instead of STARTTLS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    /// Login credentials.
    pub auth: Credentials,
}

impl SmtpEndpoint {
    /// Create an endpoint using STARTTLS on the default port.
    pub fn new(host: impl Into<String>, user: impl Into<String>, pass: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            secure: None,
            auth: Credentials::new(user, pass),
        }
    }

    /// Set an explicit port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set whether to use implicit TLS.
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = Some(secure);
        self
    }

    /// Whether implicit TLS is requested.
    pub fn is_secure(&self) -> bool {
        self.secure.unwrap_or(false)
    }

    /// The port to connect to, applying the secure/STARTTLS default.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(if self.is_secure() {
            SECURE_PORT
        } else {
            SUBMISSION_PORT
        })
    }

    /// Check that the parameters can be turned into a connection at all.
    ///
    /// This is the configuration gate run before a transport is built. It
    /// never touches the network.
    pub fn check(&self) -> Result<(), DispatchError> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(DispatchError::Configuration("SMTP host is empty".into()));
        }
        if !host.chars().all(is_host_char) {
            return Err(DispatchError::Configuration(format!(
                "SMTP host '{}' is not a valid host name or address",
                self.host
            )));
        }
        if self.port == Some(0) {
            return Err(DispatchError::Configuration(
                "SMTP port must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Collect input issues in the shape the HTTP layer reports them.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.host.is_empty() {
            issues.push("SMTP host is required".to_string());
        }
        if self.port == Some(0) {
            issues.push("SMTP port must be positive".to_string());
        }
        if !EmailAddress::is_valid(&self.auth.user) {
            issues.push("Invalid email address".to_string());
        }
        if self.auth.pass.is_empty() {
            issues.push("Password is required".to_string());
        }
        issues
    }
}

fn is_host_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':' | '[' | ']')
}
