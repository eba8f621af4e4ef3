//! Entry points used by the rest of the platform to schedule work.

use tracing::{debug, info};

use fleetpay_billing::StatementPeriod;
use fleetpay_core::{CardId, CustomerId, DomainError};

use crate::metadata::{FieldMap, StatementWindow};
use crate::queue::QueueError;
use crate::schedule::JobQueue;

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Schedules card deliveries and statement windows.
#[derive(Debug, Clone)]
pub struct SchedulingService {
    deliveries: JobQueue,
    statements: JobQueue,
}

impl SchedulingService {
    pub fn new(deliveries: JobQueue, statements: JobQueue) -> Self {
        Self {
            deliveries,
            statements,
        }
    }

    /// Called when a card ships. Re-scheduling the same card moves its due time.
    pub async fn schedule_card_delivery(
        &self,
        card_id: CardId,
        expected_delivery_epoch: i64,
    ) -> Result<(), QueueError> {
        self.deliveries
            .schedule(&card_id.to_string(), expected_delivery_epoch, &FieldMap::new())
            .await?;
        info!(card_id = %card_id, due = expected_delivery_epoch, "card delivery scheduled");
        Ok(())
    }

    /// Called on a customer's first qualifying transaction.
    ///
    /// Returns `false` without touching anything if the customer is already
    /// scheduled. The entry is due at `period_end`.
    pub async fn schedule_statement_window(
        &self,
        customer_id: CustomerId,
        period_start: i64,
        period_end: i64,
        contact_email: &str,
    ) -> Result<bool, ScheduleError> {
        let period = StatementPeriod::new(period_start, period_end)?;
        let key = customer_id.to_string();

        if self.statements.contains(&key).await? {
            debug!(customer_id = %customer_id, "statement window already scheduled");
            return Ok(false);
        }

        let window = StatementWindow::new(period, contact_email);
        self.statements
            .schedule(&key, period.end(), &window.to_fields())
            .await?;
        info!(
            customer_id = %customer_id,
            period_start,
            period_end,
            "statement window scheduled"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::metadata::InMemoryMetadataStore;
    use crate::queue::InMemoryTimeIndexedQueue;

    fn job_queue() -> JobQueue {
        JobQueue::new(
            Arc::new(InMemoryTimeIndexedQueue::new()),
            Arc::new(InMemoryMetadataStore::new()),
        )
    }

    #[tokio::test]
    async fn card_delivery_is_keyed_by_card_id() {
        let deliveries = job_queue();
        let service = SchedulingService::new(deliveries.clone(), job_queue());
        let card = CardId::new();

        service.schedule_card_delivery(card, 100).await.unwrap();
        service.schedule_card_delivery(card, 200).await.unwrap();

        assert_eq!(deliveries.score(&card.to_string()).await.unwrap(), Some(200));
        assert_eq!(deliveries.queue().len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn statement_window_is_scheduled_once() {
        let statements = job_queue();
        let service = SchedulingService::new(job_queue(), statements.clone());
        let customer = CustomerId::new();

        assert!(service
            .schedule_statement_window(customer, 0, 100, "a@b.test")
            .await
            .unwrap());
        assert!(!service
            .schedule_statement_window(customer, 50, 500, "other@b.test")
            .await
            .unwrap());

        let key = customer.to_string();
        assert_eq!(statements.score(&key).await.unwrap(), Some(100));
        let window = StatementWindow::from_fields(&statements.fields(&key).await.unwrap()).unwrap();
        assert_eq!(window.contact_email, "a@b.test");
        assert_eq!(window.period, StatementPeriod::new(0, 100).unwrap());
    }

    #[tokio::test]
    async fn inverted_window_is_rejected() {
        let statements = job_queue();
        let service = SchedulingService::new(job_queue(), statements.clone());

        let err = service
            .schedule_statement_window(CustomerId::new(), 100, 0, "a@b.test")
            .await
            .unwrap_err();
        assert!(matches!(err, ScheduleError::Domain(DomainError::Validation(_))));
        assert_eq!(statements.queue().len().await.unwrap(), 0);
    }
}
