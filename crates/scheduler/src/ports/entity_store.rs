//! Business-entity persistence port.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use fleetpay_billing::{Card, Customer, GeneratedStatement, ShippingStatus, Transaction};
use fleetpay_core::{CardId, CustomerId, StatementId};

/// Entity store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntityStoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },
    #[error("entity storage error: {0}")]
    Storage(String),
}

/// Read/write access to cards, customers, transactions and statements.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn get_card(&self, id: CardId) -> Result<Option<Card>, EntityStoreError>;

    /// Overwrite a card's shipping status.
    async fn update_card_status(
        &self,
        id: CardId,
        status: ShippingStatus,
    ) -> Result<(), EntityStoreError>;

    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>, EntityStoreError>;

    /// Qualifying transactions for `customer` with `from <= occurred_at <= to`,
    /// oldest first.
    async fn list_transactions(
        &self,
        customer: CustomerId,
        from: i64,
        to: i64,
    ) -> Result<Vec<Transaction>, EntityStoreError>;

    /// Persist a statement record. Records are immutable; a duplicate id is an error.
    async fn create_statement(&self, statement: &GeneratedStatement)
    -> Result<(), EntityStoreError>;
}

#[derive(Debug, Default)]
struct Entities {
    cards: HashMap<CardId, Card>,
    customers: HashMap<CustomerId, Customer>,
    transactions: Vec<Transaction>,
    statements: HashMap<StatementId, GeneratedStatement>,
}

/// In-memory entity store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    inner: RwLock<Entities>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_card(&self, card: Card) {
        self.inner.write().expect("entity store lock poisoned").cards.insert(card.id, card);
    }

    pub fn insert_customer(&self, customer: Customer) {
        self.inner
            .write()
            .expect("entity store lock poisoned")
            .customers
            .insert(customer.id, customer);
    }

    pub fn insert_transaction(&self, transaction: Transaction) {
        self.inner.write().expect("entity store lock poisoned").transactions.push(transaction);
    }

    /// All persisted statements, ordered by period start.
    pub fn statements(&self) -> Vec<GeneratedStatement> {
        let mut out: Vec<_> = self
            .inner
            .read()
            .expect("entity store lock poisoned")
            .statements
            .values()
            .cloned()
            .collect();
        out.sort_by_key(|s| (s.period_start, s.period_end));
        out
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn get_card(&self, id: CardId) -> Result<Option<Card>, EntityStoreError> {
        Ok(self.inner.read().expect("entity store lock poisoned").cards.get(&id).cloned())
    }

    async fn update_card_status(
        &self,
        id: CardId,
        status: ShippingStatus,
    ) -> Result<(), EntityStoreError> {
        let mut inner = self.inner.write().expect("entity store lock poisoned");
        let card = inner
            .cards
            .get_mut(&id)
            .ok_or_else(|| EntityStoreError::NotFound {
                entity: "card",
                id: id.to_string(),
            })?;
        card.shipping_status = status;
        Ok(())
    }

    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>, EntityStoreError> {
        Ok(self.inner.read().expect("entity store lock poisoned").customers.get(&id).cloned())
    }

    async fn list_transactions(
        &self,
        customer: CustomerId,
        from: i64,
        to: i64,
    ) -> Result<Vec<Transaction>, EntityStoreError> {
        let inner = self.inner.read().expect("entity store lock poisoned");
        let mut out: Vec<_> = inner
            .transactions
            .iter()
            .filter(|t| {
                t.customer_id == customer
                    && t.qualifying
                    && from <= t.occurred_at
                    && t.occurred_at <= to
            })
            .cloned()
            .collect();
        out.sort_by_key(|t| t.occurred_at);
        Ok(out)
    }

    async fn create_statement(
        &self,
        statement: &GeneratedStatement,
    ) -> Result<(), EntityStoreError> {
        let mut inner = self.inner.write().expect("entity store lock poisoned");
        if inner.statements.contains_key(&statement.statement_id) {
            return Err(EntityStoreError::AlreadyExists {
                entity: "statement",
                id: statement.statement_id.to_string(),
            });
        }
        inner
            .statements
            .insert(statement.statement_id, statement.clone());
        Ok(())
    }
}
