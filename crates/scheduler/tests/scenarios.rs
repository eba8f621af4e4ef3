//! End-to-end scheduling scenarios over the in-memory backends.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use fleetpay_billing::{
    Card, Customer, STATEMENT_CADENCE_SECS, ShippingStatus, StatementPeriod, Transaction,
};
use fleetpay_core::{CardId, CustomerId, TransactionId};
use fleetpay_scheduler::{
    DeliveryStatusHandler, DocumentRenderer, EntityStore, FixedClock, InMemoryEntityStore,
    InMemoryMetadataStore, InMemoryObjectStorage, InMemoryTimeIndexedQueue, JobQueue,
    JsonStatementRenderer, QueueError, RenderError, SchedulingService, StatementGenerationHandler,
    StatementWindow, SweepError, Sweeper, SweeperConfig, TimeIndexedQueue,
};

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;
const T0: i64 = 1_767_225_600;

fn job_queue() -> JobQueue {
    JobQueue::new(
        Arc::new(InMemoryTimeIndexedQueue::new()),
        Arc::new(InMemoryMetadataStore::new()),
    )
}

fn customer() -> Customer {
    Customer {
        id: CustomerId::new(),
        name: "Harbor Transport".to_string(),
        contact_email: "finance@harbor.test".to_string(),
    }
}

fn qualifying(customer_id: CustomerId, amount: i64, occurred_at: i64) -> Transaction {
    Transaction {
        id: TransactionId::new(),
        customer_id,
        amount,
        occurred_at,
        description: "fuel purchase".to_string(),
        qualifying: true,
    }
}

/// JSON renderer that can be taken offline.
struct FlakyRenderer {
    offline: AtomicBool,
}

impl FlakyRenderer {
    fn offline() -> Self {
        Self {
            offline: AtomicBool::new(true),
        }
    }

    fn recover(&self) {
        self.offline.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentRenderer for FlakyRenderer {
    fn extension(&self) -> &'static str {
        JsonStatementRenderer.extension()
    }

    async fn render(&self, kind: &str, data: &serde_json::Value) -> Result<Vec<u8>, RenderError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RenderError::Failed("renderer offline".to_string()));
        }
        JsonStatementRenderer.render(kind, data).await
    }
}

/// Queue whose range query always fails.
struct UnavailableQueue;

#[async_trait]
impl TimeIndexedQueue for UnavailableQueue {
    async fn enqueue_or_update(&self, _key: &str, _score: i64) -> Result<(), QueueError> {
        Err(QueueError::Unavailable("connection refused".into()))
    }

    async fn remove(&self, _key: &str) -> Result<bool, QueueError> {
        Err(QueueError::Unavailable("connection refused".into()))
    }

    async fn range_by_score(&self, _min: i64, _max: i64) -> Result<Vec<String>, QueueError> {
        Err(QueueError::Unavailable("connection refused".into()))
    }

    async fn contains(&self, _key: &str) -> Result<bool, QueueError> {
        Err(QueueError::Unavailable("connection refused".into()))
    }

    async fn score(&self, _key: &str) -> Result<Option<i64>, QueueError> {
        Err(QueueError::Unavailable("connection refused".into()))
    }

    async fn len(&self) -> Result<usize, QueueError> {
        Err(QueueError::Unavailable("connection refused".into()))
    }
}

#[tokio::test]
async fn shipped_card_is_delivered_after_due_window() {
    let entities = Arc::new(InMemoryEntityStore::new());
    let card = Card::new(CardId::new(), CustomerId::new(), ShippingStatus::Shipped);
    entities.insert_card(card.clone());

    let deliveries = job_queue();
    let service = SchedulingService::new(deliveries.clone(), job_queue());
    service
        .schedule_card_delivery(card.id, T0 + 2 * DAY)
        .await
        .unwrap();

    let clock = Arc::new(FixedClock::new(T0 + 2 * DAY + 30 * MINUTE));
    let sweeper = Sweeper::new(
        deliveries.clone(),
        Arc::new(DeliveryStatusHandler::new(entities.clone())),
        clock,
        SweeperConfig::default().with_name("card-delivery"),
    );

    let report = sweeper.run_once().await.unwrap();
    assert_eq!((report.due, report.succeeded), (1, 1));

    let after = entities.get_card(card.id).await.unwrap().unwrap();
    assert_eq!(after.shipping_status, ShippingStatus::Delivered);
    assert!(!deliveries.contains(&card.id.to_string()).await.unwrap());
}

#[tokio::test]
async fn late_sweep_still_delivers_card() {
    let entities = Arc::new(InMemoryEntityStore::new());
    let card = Card::new(CardId::new(), CustomerId::new(), ShippingStatus::Shipped);
    entities.insert_card(card.clone());

    let deliveries = job_queue();
    SchedulingService::new(deliveries.clone(), job_queue())
        .schedule_card_delivery(card.id, T0)
        .await
        .unwrap();

    // Worker was down; the first sweep lands well past the tolerance window.
    let sweeper = Sweeper::new(
        deliveries.clone(),
        Arc::new(DeliveryStatusHandler::new(entities.clone())),
        Arc::new(FixedClock::new(T0 + 3 * HOUR)),
        SweeperConfig::default(),
    );

    let report = sweeper.run_once().await.unwrap();
    assert!(!report.window.contains(T0));
    assert_eq!((report.due, report.succeeded), (1, 1));

    let after = entities.get_card(card.id).await.unwrap().unwrap();
    assert_eq!(after.shipping_status, ShippingStatus::Delivered);
    assert!(!deliveries.contains(&card.id.to_string()).await.unwrap());
}

#[tokio::test]
async fn hourly_sweeps_starting_late_deliver_on_first_tick() {
    let entities = Arc::new(InMemoryEntityStore::new());
    let card = Card::new(CardId::new(), CustomerId::new(), ShippingStatus::Shipped);
    entities.insert_card(card.clone());

    let deliveries = job_queue();
    SchedulingService::new(deliveries.clone(), job_queue())
        .schedule_card_delivery(card.id, T0)
        .await
        .unwrap();

    let clock = Arc::new(FixedClock::new(T0 + 3 * HOUR));
    let sweeper = Sweeper::new(
        deliveries.clone(),
        Arc::new(DeliveryStatusHandler::new(entities.clone())),
        clock.clone(),
        SweeperConfig::default(),
    );

    for hour in 0..48 {
        clock.set(T0 + 3 * HOUR + hour * HOUR);
        sweeper.run_once().await.unwrap();
    }

    let after = entities.get_card(card.id).await.unwrap().unwrap();
    assert_eq!(after.shipping_status, ShippingStatus::Delivered);
    assert!(!deliveries.contains(&card.id.to_string()).await.unwrap());
    let stats = sweeper.stats();
    assert_eq!((stats.sweeps, stats.processed, stats.succeeded), (48, 1, 1));
}

#[tokio::test]
async fn two_immediate_sweeps_transition_a_card_once() {
    let entities = Arc::new(InMemoryEntityStore::new());
    let card = Card::new(CardId::new(), CustomerId::new(), ShippingStatus::Shipped);
    entities.insert_card(card.clone());

    let deliveries = job_queue();
    SchedulingService::new(deliveries.clone(), job_queue())
        .schedule_card_delivery(card.id, T0)
        .await
        .unwrap();

    let sweeper = Sweeper::new(
        deliveries,
        Arc::new(DeliveryStatusHandler::new(entities.clone())),
        Arc::new(FixedClock::new(T0)),
        SweeperConfig::default(),
    );

    let first = sweeper.run_once().await.unwrap();
    let second = sweeper.run_once().await.unwrap();
    assert_eq!(first.succeeded, 1);
    assert_eq!(second.due, 0);
    assert_eq!(sweeper.stats().succeeded, 1);
}

#[tokio::test]
async fn weekly_statement_is_generated_and_rescheduled() {
    let entities = Arc::new(InMemoryEntityStore::new());
    let storage = Arc::new(InMemoryObjectStorage::new("https://files.fleetpay.test"));
    let c = customer();
    entities.insert_customer(c.clone());
    entities.insert_transaction(qualifying(c.id, 3_000, T0 + DAY));
    entities.insert_transaction(qualifying(c.id, 2_000, T0 + 3 * DAY));

    let statements = job_queue();
    let service = SchedulingService::new(job_queue(), statements.clone());
    assert!(service
        .schedule_statement_window(c.id, T0, T0 + 7 * DAY, &c.contact_email)
        .await
        .unwrap());

    let now = T0 + 7 * DAY + 10 * MINUTE;
    let sweeper = Sweeper::new(
        statements.clone(),
        Arc::new(StatementGenerationHandler::new(
            entities.clone(),
            Arc::new(JsonStatementRenderer),
            storage.clone(),
            statements.clone(),
        )),
        Arc::new(FixedClock::new(now)),
        SweeperConfig::default().with_name("statements"),
    );

    let report = sweeper.run_once().await.unwrap();
    assert_eq!(report.succeeded, 1);

    let generated = entities.statements();
    assert_eq!(generated.len(), 1);
    assert_eq!(generated[0].total_amount, 5_000);
    assert!(generated[0]
        .document_url
        .starts_with("https://files.fleetpay.test/statements/"));

    let key = c.id.to_string();
    assert_eq!(statements.score(&key).await.unwrap(), Some(now + 7 * DAY));
    let window = StatementWindow::from_fields(&statements.fields(&key).await.unwrap()).unwrap();
    assert_eq!(window.period, StatementPeriod::new(now, now + 7 * DAY).unwrap());
    assert_eq!(window.contact_email, c.contact_email);
}

#[tokio::test]
async fn render_failure_leaves_schedule_untouched() {
    let entities = Arc::new(InMemoryEntityStore::new());
    let storage = Arc::new(InMemoryObjectStorage::default());
    let c = customer();
    entities.insert_customer(c.clone());
    entities.insert_transaction(qualifying(c.id, 900, T0 + HOUR));

    let statements = job_queue();
    SchedulingService::new(job_queue(), statements.clone())
        .schedule_statement_window(c.id, T0, T0 + 7 * DAY, &c.contact_email)
        .await
        .unwrap();

    let key = c.id.to_string();
    let fields_before = statements.fields(&key).await.unwrap();
    let score_before = statements.score(&key).await.unwrap();

    let sweeper = Sweeper::new(
        statements.clone(),
        Arc::new(StatementGenerationHandler::new(
            entities.clone(),
            Arc::new(FlakyRenderer::offline()),
            storage.clone(),
            statements.clone(),
        )),
        Arc::new(FixedClock::new(T0 + 7 * DAY)),
        SweeperConfig::default(),
    );

    let report = sweeper.run_once().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(statements.fields(&key).await.unwrap(), fields_before);
    assert_eq!(statements.score(&key).await.unwrap(), score_before);
    assert!(entities.statements().is_empty());
    assert!(storage.is_empty());
}

#[tokio::test]
async fn statement_recovers_after_outage_longer_than_tolerance() {
    let entities = Arc::new(InMemoryEntityStore::new());
    let storage = Arc::new(InMemoryObjectStorage::default());
    let c = customer();
    entities.insert_customer(c.clone());
    entities.insert_transaction(qualifying(c.id, 1_200, T0 + DAY));

    let statements = job_queue();
    SchedulingService::new(job_queue(), statements.clone())
        .schedule_statement_window(c.id, T0, T0 + 7 * DAY, &c.contact_email)
        .await
        .unwrap();

    let renderer = Arc::new(FlakyRenderer::offline());
    let clock = Arc::new(FixedClock::new(T0 + 7 * DAY));
    let sweeper = Sweeper::new(
        statements.clone(),
        Arc::new(StatementGenerationHandler::new(
            entities.clone(),
            renderer.clone(),
            storage.clone(),
            statements.clone(),
        )),
        clock.clone(),
        SweeperConfig::default(),
    );

    let key = c.id.to_string();
    for hour in 0..4 {
        clock.set(T0 + 7 * DAY + hour * HOUR);
        let report = sweeper.run_once().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(statements.score(&key).await.unwrap(), Some(T0 + 7 * DAY));
    }
    assert!(entities.statements().is_empty());

    renderer.recover();
    let now = T0 + 7 * DAY + 4 * HOUR;
    clock.set(now);
    let report = sweeper.run_once().await.unwrap();
    assert_eq!(report.succeeded, 1);

    let generated = entities.statements();
    assert_eq!(generated.len(), 1);
    assert_eq!(generated[0].period_start, T0);
    assert_eq!(generated[0].period_end, T0 + 7 * DAY);
    assert_eq!(generated[0].total_amount, 1_200);
    assert_eq!(statements.score(&key).await.unwrap(), Some(now + 7 * DAY));
}

#[tokio::test]
async fn recurring_score_tracks_invocation_time() {
    let entities = Arc::new(InMemoryEntityStore::new());
    let c = customer();
    entities.insert_customer(c.clone());

    let statements = job_queue();
    SchedulingService::new(job_queue(), statements.clone())
        .schedule_statement_window(c.id, T0, T0 + STATEMENT_CADENCE_SECS, &c.contact_email)
        .await
        .unwrap();

    let clock = Arc::new(FixedClock::new(T0 + STATEMENT_CADENCE_SECS));
    let sweeper = Sweeper::new(
        statements.clone(),
        Arc::new(StatementGenerationHandler::new(
            entities.clone(),
            Arc::new(JsonStatementRenderer),
            Arc::new(InMemoryObjectStorage::default()),
            statements.clone(),
        )),
        clock.clone(),
        SweeperConfig::default(),
    );

    let key = c.id.to_string();
    // Each tick lands a little late; the next due time follows the tick, not the old period end.
    for lateness in [0, 5 * MINUTE, 20 * MINUTE, 59 * MINUTE] {
        let due = statements.score(&key).await.unwrap().unwrap();
        clock.set(due + lateness);

        let report = sweeper.run_once().await.unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(
            statements.score(&key).await.unwrap(),
            Some(due + lateness + STATEMENT_CADENCE_SECS)
        );
    }
    assert_eq!(entities.statements().len(), 4);
}

#[tokio::test]
async fn unavailable_queue_aborts_sweep() {
    let entities = Arc::new(InMemoryEntityStore::new());
    let jobs = JobQueue::new(
        Arc::new(UnavailableQueue),
        Arc::new(InMemoryMetadataStore::new()),
    );
    let sweeper = Sweeper::new(
        jobs,
        Arc::new(DeliveryStatusHandler::new(entities)),
        Arc::new(FixedClock::new(T0)),
        SweeperConfig::default(),
    );

    let err = sweeper.run_once().await.unwrap_err();
    assert!(matches!(err, SweepError::Queue(QueueError::Unavailable(_))));
    assert_eq!(sweeper.stats().aborted, 1);
}
