//! HTTP front for the dispatcher.
//!
//! | Route | Body | Response |
//! |-------|------|----------|
//! | `GET /health` | | `{status: "OK", timestamp}` |
//! | `POST /email` | job fields + `smtpConfig` | `{message, messageId, response}` |
//! | `POST /bulk-email` | `{smtpConfig, emails: [..]}` | [`BatchReport`] |
//!
//! Malformed JSON and validation issues answer 400 with `{"error": [..]}`.
//! Every other failure answers 500 with `{"error": "message"}`.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mailshot::{server, Dispatcher};
//!
//! let app = server::router(Arc::new(Dispatcher::from_env()?));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! ```

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::DispatchConfig;
use crate::dispatch::Dispatcher;
use crate::endpoint::SmtpEndpoint;
use crate::error::DispatchError;
use crate::job::EmailJob;
use crate::report::BatchReport;

pub const BIND: &str = "MAILSHOT_BIND";
pub const DEFAULT_BIND: &str = "0.0.0.0:3000";

/// Listen address and dispatch tuning for `mailshot-server`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub dispatch: DispatchConfig,
}

impl ServerConfig {
    /// Read `MAILSHOT_BIND` and the dispatch variables.
    pub fn from_env() -> Result<Self, DispatchError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read settings through `lookup`, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DispatchError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = lookup(BIND).unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = raw.trim().parse().map_err(|e| {
            DispatchError::Configuration(format!("{} has invalid value '{}': {}", BIND, raw, e))
        })?;

        Ok(Self {
            bind,
            dispatch: DispatchConfig::from_lookup(lookup)?,
        })
    }
}

/// Body of `POST /email`: the job fields plus the endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailRequest {
    pub smtp_config: SmtpEndpoint,
    #[serde(flatten)]
    pub email: EmailJob,
}

/// Body of `POST /bulk-email`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkEmailRequest {
    pub smtp_config: SmtpEndpoint,
    pub emails: Vec<EmailJob>,
}

/// Response of `POST /email`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailResponse {
    pub message: String,
    pub message_id: String,
    pub response: String,
}

/// Response of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

/// Build the router around a shared dispatcher.
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/email", post(send_email))
        .route("/bulk-email", post(send_bulk_email))
        .with_state(dispatcher)
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

/// POST /email
async fn send_email(
    State(dispatcher): State<Arc<Dispatcher>>,
    body: Bytes,
) -> Result<Json<SendEmailResponse>, ApiError> {
    let request: SendEmailRequest = serde_json::from_slice(&body)?;

    let mut issues = request.smtp_config.validate();
    issues.extend(request.email.validate());
    if !issues.is_empty() {
        return Err(DispatchError::Validation(issues).into());
    }

    let receipt = dispatcher
        .send(&request.smtp_config, &request.email)
        .await?;

    Ok(Json(SendEmailResponse {
        message: "Email sent successfully".to_string(),
        message_id: receipt.message_id,
        response: receipt.response,
    }))
}

/// POST /bulk-email
async fn send_bulk_email(
    State(dispatcher): State<Arc<Dispatcher>>,
    body: Bytes,
) -> Result<Json<BatchReport>, ApiError> {
    let request: BulkEmailRequest = serde_json::from_slice(&body)?;

    let mut issues = request.smtp_config.validate();
    for (i, email) in request.emails.iter().enumerate() {
        issues.extend(
            email
                .validate()
                .into_iter()
                .map(|issue| format!("emails[{}]: {}", i, issue)),
        );
    }
    if !issues.is_empty() {
        return Err(DispatchError::Validation(issues).into());
    }

    let report = dispatcher
        .send_bulk(&request.smtp_config, request.emails)
        .await?;

    Ok(Json(report))
}

/// A [`DispatchError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(DispatchError);

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        Self(err)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            DispatchError::Validation(issues) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": issues }))).into_response()
            }
            other => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": other.to_string() })),
            )
                .into_response(),
        }
    }
}
