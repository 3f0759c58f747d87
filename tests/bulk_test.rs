//! Bulk dispatch tests against the in-memory transport.

use std::sync::Arc;
use std::time::Duration;

use mailshot::{
    AttachmentSource, DispatchConfig, DispatchError, Dispatcher, EmailJob, MemoryFactory,
    PoolSettings, Recipients, SmtpEndpoint, TransportMode,
};

fn endpoint() -> SmtpEndpoint {
    SmtpEndpoint::new("smtp.example.com", "sender@example.com", "secret")
}

fn job(to: &str) -> EmailJob {
    EmailJob::new()
        .from("sender@example.com")
        .to(to)
        .subject("Newsletter")
        .text("Hello")
}

fn jobs(count: usize) -> Vec<EmailJob> {
    (0..count)
        .map(|i| job(&format!("user{}@example.com", i)))
        .collect()
}

fn setup() -> (Arc<MemoryFactory>, Dispatcher) {
    let factory = Arc::new(MemoryFactory::new());
    let dispatcher = Dispatcher::with_factory(factory.clone());
    (factory, dispatcher)
}

// ============================================================================
// Outcomes
// ============================================================================

#[tokio::test]
async fn all_jobs_succeed() {
    let (factory, dispatcher) = setup();

    let report = dispatcher.send_bulk(&endpoint(), jobs(3)).await.unwrap();

    assert!(report.success);
    assert_eq!((report.total, report.successful, report.failed), (3, 3, 0));
    assert!(report.results.iter().all(|r| r.success && r.message_id.is_some()));
    assert_eq!(factory.transport().sent_count(), 3);
}

#[tokio::test]
async fn one_rejected_job_does_not_affect_siblings() {
    let (factory, dispatcher) = setup();
    factory.transport().reject("user1@example.com");

    let report = dispatcher.send_bulk(&endpoint(), jobs(3)).await.unwrap();

    assert!(report.success);
    assert_eq!((report.total, report.successful, report.failed), (3, 2, 1));
    assert!(report.results[0].success);
    assert!(!report.results[1].success);
    assert!(report.results[2].success);

    let failure = &report.results[1];
    assert_eq!(failure.to, Recipients::One("user1@example.com".into()));
    assert!(failure.message_id.is_none());
    assert!(failure.error.as_deref().unwrap().contains("Recipient address rejected"));
}

#[tokio::test]
async fn every_job_failing_is_still_a_successful_batch() {
    let (factory, dispatcher) = setup();
    let transport = factory.transport();
    for i in 0..3 {
        transport.reject(format!("user{}@example.com", i));
    }

    let report = dispatcher.send_bulk(&endpoint(), jobs(3)).await.unwrap();

    assert!(report.success);
    assert_eq!((report.successful, report.failed), (0, 3));
    assert_eq!(transport.close_count(), 1);
}

#[tokio::test]
async fn panicking_job_becomes_an_internal_failure() {
    let (factory, dispatcher) = setup();
    let transport = factory.transport();
    transport.panic_on("user1@example.com");

    let report = dispatcher.send_bulk(&endpoint(), jobs(3)).await.unwrap();

    assert_eq!((report.total, report.successful, report.failed), (3, 2, 1));
    let error = report.results[1].error.as_deref().unwrap();
    assert!(error.starts_with("Internal error: job task did not complete"));
    assert_eq!(report.results[1].to, Recipients::One("user1@example.com".into()));
    assert_eq!(transport.close_count(), 1);
}

#[tokio::test]
async fn attachment_failure_is_isolated_to_its_job() {
    let (factory, dispatcher) = setup();
    let mut batch = jobs(3);
    batch[1] = batch[1]
        .clone()
        .attachment(AttachmentSource::from_path("/nonexistent/mailshot/report.pdf"));

    let report = dispatcher.send_bulk(&endpoint(), batch).await.unwrap();

    assert_eq!((report.successful, report.failed), (2, 1));
    let error = report.results[1].error.as_deref().unwrap();
    assert!(error.contains("Failed to read attachment"));
    assert!(!factory.transport().sent_to("user1@example.com"));
}

#[tokio::test]
async fn attachments_are_materialized_per_job() {
    let (factory, dispatcher) = setup();
    let batch = vec![job("a@example.com")
        .attachment(AttachmentSource::from_bytes("notes.txt", b"hello"))];

    let report = dispatcher.send_bulk(&endpoint(), batch).await.unwrap();
    assert!(report.all_succeeded());

    let sent = factory.transport().sent();
    let attachment = &sent[0].message.attachments[0];
    assert_eq!(attachment.filename, "notes.txt");
    assert_eq!(attachment.content_type, "text/plain");
    assert_eq!(attachment.data, b"hello");
}

// ============================================================================
// Ordering and concurrency
// ============================================================================

#[tokio::test(start_paused = true)]
async fn results_follow_request_order_not_completion_order() {
    let (factory, dispatcher) = setup();
    factory
        .transport()
        .delay("user0@example.com", Duration::from_millis(500));

    let report = dispatcher.send_bulk(&endpoint(), jobs(3)).await.unwrap();

    let order: Vec<_> = report.results.iter().map(|r| r.to.joined()).collect();
    assert_eq!(
        order,
        vec!["user0@example.com", "user1@example.com", "user2@example.com"]
    );

    // The slow job finished last.
    let sent = factory.transport().sent();
    assert_eq!(sent.last().unwrap().message.to, "user0@example.com");
}

#[tokio::test(start_paused = true)]
async fn in_flight_sends_never_exceed_max_connections() {
    let factory = Arc::new(MemoryFactory::new());
    let transport = factory.transport();
    let dispatcher = Dispatcher::with_factory(factory.clone()).config(DispatchConfig {
        pool: PoolSettings {
            max_connections: 2,
            max_messages: 100,
        },
        ..DispatchConfig::default()
    });
    for i in 0..8 {
        transport.delay(format!("user{}@example.com", i), Duration::from_millis(50));
    }

    let report = dispatcher.send_bulk(&endpoint(), jobs(8)).await.unwrap();

    assert_eq!(report.successful, 8);
    assert_eq!(transport.peak_in_flight(), 2);
}

// ============================================================================
// Transport lifecycle
// ============================================================================

#[tokio::test]
async fn opens_one_pooled_transport_and_closes_it_once() {
    let (factory, dispatcher) = setup();

    dispatcher.send_bulk(&endpoint(), jobs(5)).await.unwrap();

    assert_eq!(
        factory.opened(),
        vec![TransportMode::Pooled(PoolSettings::default())]
    );
    let transport = factory.transport();
    assert_eq!(transport.verify_count(), 1);
    assert_eq!(transport.close_count(), 1);
}

#[tokio::test]
async fn verify_failure_aborts_before_any_job() {
    let (factory, dispatcher) = setup();
    let transport = factory.transport();
    transport.fail_verify("535 5.7.8 Authentication credentials invalid");

    let err = dispatcher.send_bulk(&endpoint(), jobs(3)).await.unwrap_err();

    assert!(matches!(err, DispatchError::Connectivity(_)));
    assert!(err.is_batch_fatal());
    assert_eq!(transport.send_calls(), 0);
    assert_eq!(transport.close_count(), 1);
}

#[tokio::test]
async fn malformed_endpoint_is_a_configuration_error() {
    let (factory, dispatcher) = setup();
    let bad = SmtpEndpoint::new("", "sender@example.com", "secret");

    let err = dispatcher.send_bulk(&bad, jobs(2)).await.unwrap_err();

    assert!(matches!(err, DispatchError::Configuration(_)));
    assert!(factory.opened().is_empty());
    assert_eq!(factory.transport().close_count(), 0);
}

#[tokio::test]
async fn empty_batch_still_verifies_and_closes() {
    let (factory, dispatcher) = setup();

    let report = dispatcher.send_bulk(&endpoint(), Vec::new()).await.unwrap();

    assert!(report.success);
    assert_eq!((report.total, report.successful, report.failed), (0, 0, 0));
    assert!(report.results.is_empty());
    let transport = factory.transport();
    assert_eq!(transport.verify_count(), 1);
    assert_eq!(transport.close_count(), 1);
}

// ============================================================================
// Normalization
// ============================================================================

#[tokio::test]
async fn multi_valued_addresses_are_joined() {
    let (factory, dispatcher) = setup();
    let multi = EmailJob::new()
        .from("sender@example.com")
        .to("a@example.com")
        .to("b@example.com")
        .cc("c@example.com")
        .cc("d@example.com")
        .bcc("e@example.com")
        .subject("Team update")
        .html("<p>Hi all</p>");

    let report = dispatcher.send_bulk(&endpoint(), vec![multi]).await.unwrap();

    assert_eq!(
        report.results[0].to,
        Recipients::Many(vec!["a@example.com".into(), "b@example.com".into()])
    );
    let sent = factory.transport().sent();
    let message = &sent[0].message;
    assert_eq!(message.to, "a@example.com, b@example.com");
    assert_eq!(message.cc.as_deref(), Some("c@example.com, d@example.com"));
    assert_eq!(message.bcc.as_deref(), Some("e@example.com"));
}
