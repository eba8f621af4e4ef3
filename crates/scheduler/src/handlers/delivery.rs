//! Marks shipped cards as delivered once their expected delivery time passes.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use fleetpay_core::CardId;

use crate::handler::{DueEntry, JobError, JobHandler, Recurrence};
use crate::ports::EntityStore;

/// One-shot handler for the card delivery queue. Keys are card ids.
///
/// Anything that can't be acted on (unparseable key, unknown card, card not in
/// `shipped`) is a successful no-op: the entry is dropped because retrying
/// would not change the outcome.
pub struct DeliveryStatusHandler {
    entities: Arc<dyn EntityStore>,
}

impl DeliveryStatusHandler {
    pub fn new(entities: Arc<dyn EntityStore>) -> Self {
        Self { entities }
    }
}

#[async_trait]
impl JobHandler for DeliveryStatusHandler {
    fn name(&self) -> &'static str {
        "card-delivery"
    }

    fn recurrence(&self) -> Recurrence {
        Recurrence::OneShot
    }

    async fn process(&self, entry: &DueEntry) -> Result<(), JobError> {
        let card_id: CardId = match entry.key.parse() {
            Ok(id) => id,
            Err(e) => {
                debug!(key = %entry.key, error = %e, "dropping unparseable card key");
                return Ok(());
            }
        };

        let Some(mut card) = self.entities.get_card(card_id).await? else {
            debug!(card_id = %card_id, "card not found; nothing to deliver");
            return Ok(());
        };

        if !card.can_mark_delivered() {
            debug!(
                card_id = %card_id,
                status = %card.shipping_status,
                "card not in shipped state; skipping"
            );
            return Ok(());
        }

        card.mark_delivered()?;
        self.entities
            .update_card_status(card_id, card.shipping_status)
            .await?;

        info!(card_id = %card_id, customer_id = %card.customer_id, "card marked delivered");
        Ok(())
    }
}
