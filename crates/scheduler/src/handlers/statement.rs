//! Weekly statement generation.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use fleetpay_billing::{GeneratedStatement, StatementDocument, StatementPeriod};
use fleetpay_core::{CustomerId, DomainError};

use crate::handler::{DueEntry, JobError, JobHandler, Recurrence};
use crate::metadata::StatementWindow;
use crate::ports::{DocumentRenderer, EntityStore, ObjectStorage, RenderError, STATEMENT_KIND};
use crate::schedule::JobQueue;

/// Object path of a rendered statement.
pub fn statement_object_path(customer_id: CustomerId, period: StatementPeriod, ext: &str) -> String {
    format!(
        "statements/{}/{}-{}.{}",
        customer_id,
        period.start(),
        period.end(),
        ext
    )
}

/// Recurring handler for the statement queue. Keys are customer ids; fields
/// carry the [`StatementWindow`] to bill.
///
/// Steps run strictly in order and the reschedule is last, so any earlier
/// failure leaves the stored window and score untouched for the next tick.
pub struct StatementGenerationHandler {
    entities: Arc<dyn EntityStore>,
    renderer: Arc<dyn DocumentRenderer>,
    storage: Arc<dyn ObjectStorage>,
    jobs: JobQueue,
}

impl StatementGenerationHandler {
    pub fn new(
        entities: Arc<dyn EntityStore>,
        renderer: Arc<dyn DocumentRenderer>,
        storage: Arc<dyn ObjectStorage>,
        jobs: JobQueue,
    ) -> Self {
        Self {
            entities,
            renderer,
            storage,
            jobs,
        }
    }
}

#[async_trait]
impl JobHandler for StatementGenerationHandler {
    fn name(&self) -> &'static str {
        "statement-generation"
    }

    fn recurrence(&self) -> Recurrence {
        Recurrence::Recurring
    }

    async fn process(&self, entry: &DueEntry) -> Result<(), JobError> {
        let customer_id: CustomerId = entry.key.parse()?;
        let window = StatementWindow::from_fields(&entry.fields)?;
        let period = window.period;

        let customer = self
            .entities
            .get_customer(customer_id)
            .await?
            .ok_or_else(|| DomainError::not_found("customer", customer_id))?;

        let transactions = self
            .entities
            .list_transactions(customer_id, period.start(), period.end())
            .await?;
        debug!(
            customer_id = %customer_id,
            period_start = period.start(),
            period_end = period.end(),
            transactions = transactions.len(),
            "building statement"
        );

        let document = StatementDocument::build(&customer, period, &transactions)?;
        let data =
            serde_json::to_value(&document).map_err(|e| RenderError::InvalidData(e.to_string()))?;
        let bytes = self.renderer.render(STATEMENT_KIND, &data).await?;

        let path = statement_object_path(customer_id, period, self.renderer.extension());
        let url = self.storage.store(bytes, &path).await?;

        let statement = GeneratedStatement::new(customer_id, period, document.total_amount, url);
        self.entities.create_statement(&statement).await?;

        let next = StatementPeriod::starting_at(entry.now);
        self.jobs
            .reschedule(&entry.key, next.end(), &StatementWindow::period_fields(next))
            .await?;

        info!(
            customer_id = %customer_id,
            statement_id = %statement.statement_id,
            total_amount = statement.total_amount,
            next_due = next.end(),
            "statement generated"
        );
        Ok(())
    }
}
