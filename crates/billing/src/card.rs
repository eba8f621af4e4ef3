use core::str::FromStr;

use serde::{Deserialize, Serialize};

use fleetpay_core::{CardId, CustomerId, DomainError, DomainResult};

/// Physical card shipping lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShippingStatus {
    Pending,
    Shipped,
    Delivered,
}

impl ShippingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShippingStatus::Pending => "pending",
            ShippingStatus::Shipped => "shipped",
            ShippingStatus::Delivered => "delivered",
        }
    }
}

impl core::fmt::Display for ShippingStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShippingStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ShippingStatus::Pending),
            "shipped" => Ok(ShippingStatus::Shipped),
            "delivered" => Ok(ShippingStatus::Delivered),
            other => Err(DomainError::validation(format!(
                "unknown shipping status: {other}"
            ))),
        }
    }
}

/// Snapshot of an issued card as read from the entity store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub customer_id: CustomerId,
    pub shipping_status: ShippingStatus,
}

impl Card {
    pub fn new(id: CardId, customer_id: CustomerId, shipping_status: ShippingStatus) -> Self {
        Self {
            id,
            customer_id,
            shipping_status,
        }
    }

    /// Invariant: only a shipped card can become delivered.
    pub fn can_mark_delivered(&self) -> bool {
        self.shipping_status == ShippingStatus::Shipped
    }

    pub fn mark_delivered(&mut self) -> DomainResult<()> {
        if !self.can_mark_delivered() {
            return Err(DomainError::invariant(format!(
                "card {} cannot move from {} to delivered",
                self.id, self.shipping_status
            )));
        }
        self.shipping_status = ShippingStatus::Delivered;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(status: ShippingStatus) -> Card {
        Card::new(CardId::new(), CustomerId::new(), status)
    }

    #[test]
    fn shipped_card_becomes_delivered() {
        let mut c = card(ShippingStatus::Shipped);
        c.mark_delivered().unwrap();
        assert_eq!(c.shipping_status, ShippingStatus::Delivered);
    }

    #[test]
    fn pending_and_delivered_cards_are_rejected() {
        for status in [ShippingStatus::Pending, ShippingStatus::Delivered] {
            let mut c = card(status);
            assert!(matches!(
                c.mark_delivered(),
                Err(DomainError::InvariantViolation(_))
            ));
            assert_eq!(c.shipping_status, status);
        }
    }

    #[test]
    fn status_string_form_matches_serde() {
        for status in [
            ShippingStatus::Pending,
            ShippingStatus::Shipped,
            ShippingStatus::Delivered,
        ] {
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json, serde_json::json!(status.as_str()));
            assert_eq!(status.as_str().parse::<ShippingStatus>().unwrap(), status);
        }
    }
}
