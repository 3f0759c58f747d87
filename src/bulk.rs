//! Bulk dispatch engine.
//!
//! A batch opens one pooled transport, verifies it once, then runs every job
//! as its own task. Admission is bounded by a semaphore sized to the pool's
//! connection cap, so at most `max_connections` jobs are in flight at once
//! and the rest wait for a permit.
//!
//! Every job task returns a [`JobOutcome`]; attachment, address and send
//! errors become failed outcomes instead of unwinding into sibling jobs.
//! The engine waits for all tasks, closes the transport exactly once and
//! returns the outcomes in request order.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::Instrument;

#[cfg(feature = "metrics")]
use std::time::Instant;

use crate::dispatch::deliver_job;
use crate::endpoint::SmtpEndpoint;
use crate::error::DispatchError;
use crate::job::{EmailJob, Recipients};
use crate::report::{BatchReport, JobOutcome};
use crate::transport::{PoolSettings, Transport, TransportFactory, TransportMode};

/// Send `jobs` concurrently over one pooled transport.
///
/// # Errors
///
/// Only batch-level failures are returned as errors:
/// - `Configuration` when the endpoint is malformed (no transport opened)
/// - `Connectivity` when verification fails (transport opened, then closed,
///   no outcomes produced)
///
/// Everything that goes wrong inside a job is reported in that job's
/// outcome. There is no mid-batch cancellation: once jobs are launched the
/// batch runs every job to completion.
pub async fn dispatch_batch(
    factory: &dyn TransportFactory,
    endpoint: &SmtpEndpoint,
    jobs: Vec<EmailJob>,
    pool: PoolSettings,
) -> Result<BatchReport, DispatchError> {
    let count = jobs.len();
    let span = tracing::info_span!("mailshot.bulk", host = %endpoint.host, count);

    async move {
        #[cfg(feature = "metrics")]
        let start = Instant::now();

        let transport = match factory.open(endpoint, TransportMode::Pooled(pool)) {
            Ok(transport) => transport,
            Err(e) => {
                tracing::error!(error = %e, "Could not open transport, batch aborted");
                return Err(e);
            }
        };

        if let Err(e) = transport.verify().await {
            tracing::error!(error = %e, "Transport verification failed, batch aborted");
            transport.close().await;
            return Err(e);
        }

        let outcomes = run_jobs(Arc::clone(&transport), jobs, pool.max_connections).await;
        transport.close().await;

        let report = BatchReport::from_outcomes(outcomes);

        #[cfg(feature = "metrics")]
        {
            metrics::counter!("mailshot_emails_total", "mode" => "bulk", "status" => "success")
                .increment(report.successful as u64);
            metrics::counter!("mailshot_emails_total", "mode" => "bulk", "status" => "error")
                .increment(report.failed as u64);
            metrics::counter!("mailshot_batch_total").increment(1);
            metrics::histogram!("mailshot_batch_size").record(count as f64);
            metrics::histogram!("mailshot_delivery_duration_seconds", "mode" => "bulk")
                .record(start.elapsed().as_secs_f64());
        }

        tracing::info!(
            total = report.total,
            successful = report.successful,
            failed = report.failed,
            "Batch complete"
        );

        Ok(report)
    }
    .instrument(span)
    .await
}

/// Run every job as its own task and collect outcomes in input order.
async fn run_jobs(
    transport: Arc<dyn Transport>,
    jobs: Vec<EmailJob>,
    concurrency: usize,
) -> Vec<JobOutcome> {
    let admission = Arc::new(Semaphore::new(concurrency.max(1)));

    let tasks: Vec<(Recipients, _)> = jobs
        .into_iter()
        .enumerate()
        .map(|(index, job)| {
            let to = job.to.clone();
            let transport = Arc::clone(&transport);
            let admission = Arc::clone(&admission);
            let span = tracing::info_span!("mailshot.job", index, to = %to.joined());

            let handle = tokio::spawn(
                async move {
                    let _permit = match admission.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            let err = DispatchError::Internal("admission closed".into());
                            return JobOutcome::failed(job.to, err.to_string());
                        }
                    };
                    run_job(transport.as_ref(), job).await
                }
                .instrument(span),
            );

            (to, handle)
        })
        .collect();

    let mut outcomes = Vec::with_capacity(tasks.len());
    for (to, handle) in tasks {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "Job task did not complete");
                let err = DispatchError::Internal(format!("job task did not complete: {}", e));
                JobOutcome::failed(to, err.to_string())
            }
        };
        outcomes.push(outcome);
    }
    outcomes
}

/// Attempt one job, converting any failure into a failed outcome.
async fn run_job(transport: &dyn Transport, job: EmailJob) -> JobOutcome {
    match deliver_job(transport, &job).await {
        Ok(receipt) => {
            tracing::debug!(message_id = %receipt.message_id, "Email sent");
            JobOutcome::sent(job.to, receipt.message_id)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Email failed");
            JobOutcome::failed(job.to, e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryFactory;

    fn endpoint() -> SmtpEndpoint {
        SmtpEndpoint::new("smtp.example.com", "u@example.com", "p")
    }

    fn job(to: &str) -> EmailJob {
        EmailJob::new()
            .from("sender@example.com")
            .to(to)
            .subject("Hello")
            .text("Hi")
    }

    #[tokio::test]
    async fn test_opens_pooled_transport() {
        let factory = MemoryFactory::new();
        let pool = PoolSettings {
            max_connections: 3,
            max_messages: 10,
        };

        dispatch_batch(&factory, &endpoint(), vec![job("a@example.com")], pool)
            .await
            .unwrap();

        assert_eq!(factory.opened(), vec![TransportMode::Pooled(pool)]);
    }

    #[tokio::test]
    async fn test_configuration_error_opens_nothing() {
        let factory = MemoryFactory::new();
        let bad = SmtpEndpoint::new("bad host", "u@example.com", "p");

        let err = dispatch_batch(&factory, &bad, vec![job("a@example.com")], PoolSettings::default())
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Configuration(_)));
        assert!(factory.opened().is_empty());
        assert_eq!(factory.transport().verify_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_job_keeps_its_recipients() {
        let factory = MemoryFactory::new();
        factory.transport().reject("b@example.com");
        let multi = EmailJob::new()
            .from("sender@example.com")
            .to("a@example.com")
            .to("b@example.com")
            .subject("Hi")
            .text("Hi");

        let report = dispatch_batch(&factory, &endpoint(), vec![multi], PoolSettings::default())
            .await
            .unwrap();

        assert_eq!(
            report.results[0].to,
            Recipients::Many(vec!["a@example.com".into(), "b@example.com".into()])
        );
        assert!(!report.results[0].success);
        assert!(report.results[0].error.as_deref().unwrap().contains("b@example.com"));
    }
}
