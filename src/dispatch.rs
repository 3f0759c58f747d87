//! Single dispatch and the [`Dispatcher`] facade.

use std::sync::Arc;
use tracing::Instrument;

#[cfg(feature = "metrics")]
use std::time::Instant;

use crate::attachment;
use crate::bulk;
use crate::config::DispatchConfig;
use crate::endpoint::SmtpEndpoint;
use crate::error::DispatchError;
use crate::job::EmailJob;
use crate::message::OutgoingMessage;
use crate::report::BatchReport;
use crate::transport::{SendReceipt, Transport, TransportFactory, TransportMode};

/// Materialize a job's attachments, normalize it and submit it.
///
/// Does not verify the transport. Shared by single and bulk dispatch.
pub(crate) async fn deliver_job(
    transport: &dyn Transport,
    job: &EmailJob,
) -> Result<SendReceipt, DispatchError> {
    let attachments = attachment::materialize(&job.attachments).await?;
    let message = OutgoingMessage::new(job, attachments);
    transport.send(&message).await
}

/// Send exactly one job through `transport`.
///
/// The transport is verified first, so an unreachable host or rejected
/// credentials fail before any attachment is read or message submitted.
/// Any failure is returned to the caller.
pub async fn send_one(
    transport: &dyn Transport,
    job: &EmailJob,
) -> Result<SendReceipt, DispatchError> {
    transport.verify().await?;
    deliver_job(transport, job).await
}

/// Opens transports for endpoints and runs single and bulk sends.
///
/// ```rust,ignore
/// use mailshot::{Dispatcher, EmailJob, SmtpEndpoint};
///
/// let dispatcher = Dispatcher::smtp();
/// let endpoint = SmtpEndpoint::new("smtp.example.com", "me@example.com", "secret");
///
/// let receipt = dispatcher.send(&endpoint, &job).await?;
/// let report = dispatcher.send_bulk(&endpoint, jobs).await?;
/// ```
#[derive(Clone)]
pub struct Dispatcher {
    factory: Arc<dyn TransportFactory>,
    config: DispatchConfig,
}

impl Dispatcher {
    /// Create a dispatcher around a transport factory with default limits.
    pub fn new<F: TransportFactory + 'static>(factory: F) -> Self {
        Self::with_factory(Arc::new(factory))
    }

    /// Create a dispatcher around a shared factory.
    pub fn with_factory(factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            factory,
            config: DispatchConfig::default(),
        }
    }

    /// Dispatcher using real SMTP connections and default limits.
    #[cfg(feature = "smtp")]
    pub fn smtp() -> Self {
        Self::new(crate::transport::SmtpFactory)
    }

    /// Dispatcher using real SMTP connections, tuned from the environment.
    #[cfg(feature = "smtp")]
    pub fn from_env() -> Result<Self, DispatchError> {
        Ok(Self::smtp().config(DispatchConfig::from_env()?))
    }

    /// Replace the pool limits and timeouts.
    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Current pool limits and timeouts.
    pub fn settings(&self) -> &DispatchConfig {
        &self.config
    }

    /// Send one job over a fresh, non-pooled transport.
    ///
    /// The transport is closed after the attempt whether it succeeded or not.
    pub async fn send(
        &self,
        endpoint: &SmtpEndpoint,
        job: &EmailJob,
    ) -> Result<SendReceipt, DispatchError> {
        let span = tracing::info_span!(
            "mailshot.send",
            host = %endpoint.host,
            to = %job.to.joined(),
            subject = %job.subject,
        );

        async {
            #[cfg(feature = "metrics")]
            let start = Instant::now();

            let result = self.send_inner(endpoint, job).await;

            #[cfg(feature = "metrics")]
            {
                let status = if result.is_ok() { "success" } else { "error" };
                metrics::counter!("mailshot_emails_total", "mode" => "single", "status" => status)
                    .increment(1);
                metrics::histogram!("mailshot_delivery_duration_seconds", "mode" => "single")
                    .record(start.elapsed().as_secs_f64());
            }

            match &result {
                Ok(receipt) => tracing::info!(message_id = %receipt.message_id, "Email sent"),
                Err(e) => tracing::error!(error = %e, "Email send failed"),
            }

            result
        }
        .instrument(span)
        .await
    }

    async fn send_inner(
        &self,
        endpoint: &SmtpEndpoint,
        job: &EmailJob,
    ) -> Result<SendReceipt, DispatchError> {
        let transport = self
            .factory
            .open(endpoint, TransportMode::Single(self.config.timeouts))?;
        tracing::debug!(transport = transport.name(), "Transport opened");

        let result = send_one(transport.as_ref(), job).await;
        transport.close().await;
        result
    }

    /// Send a batch over one pooled transport.
    ///
    /// See [`bulk::dispatch_batch`] for the failure model. Must be called
    /// from within a Tokio runtime.
    pub async fn send_bulk(
        &self,
        endpoint: &SmtpEndpoint,
        jobs: Vec<EmailJob>,
    ) -> Result<BatchReport, DispatchError> {
        bulk::dispatch_batch(self.factory.as_ref(), endpoint, jobs, self.config.pool).await
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryFactory, MemoryTransport};

    fn job() -> EmailJob {
        EmailJob::new()
            .from("sender@example.com")
            .to("recipient@example.com")
            .subject("Hello")
            .text("Plain")
            .html("<p>Rich</p>")
    }

    #[tokio::test]
    async fn test_send_one_verifies_before_sending() {
        let transport = MemoryTransport::new();
        transport.fail_verify("connection refused");

        let err = send_one(&transport, &job()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Connectivity(_)));
        assert_eq!(transport.send_calls(), 0);
    }

    #[tokio::test]
    async fn test_dispatcher_uses_single_mode_and_closes() {
        let factory = MemoryFactory::new();
        let transport = factory.transport();
        let dispatcher = Dispatcher::new(factory);

        dispatcher
            .send(&SmtpEndpoint::new("smtp.example.com", "u@example.com", "p"), &job())
            .await
            .unwrap();

        assert_eq!(transport.close_count(), 1);
        assert_eq!(transport.verify_count(), 1);
    }

    #[tokio::test]
    async fn test_dispatcher_closes_after_failed_send() {
        let factory = MemoryFactory::new();
        let transport = factory.transport();
        transport.reject("recipient@example.com");
        let dispatcher = Dispatcher::new(factory);

        let result = dispatcher
            .send(&SmtpEndpoint::new("smtp.example.com", "u@example.com", "p"), &job())
            .await;

        assert!(matches!(result, Err(DispatchError::Send(_))));
        assert_eq!(transport.close_count(), 1);
    }
}
