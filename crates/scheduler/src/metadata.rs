//! Per-key field maps stored alongside queue entries.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use fleetpay_billing::StatementPeriod;
use fleetpay_core::{DomainError, DomainResult};

use crate::queue::QueueError;

/// Flat string field map attached to a queue key.
pub type FieldMap = BTreeMap<String, String>;

pub const PERIOD_START_FIELD: &str = "period_start";
pub const PERIOD_END_FIELD: &str = "period_end";
pub const CONTACT_EMAIL_FIELD: &str = "contact_email";

/// Storage for per-key metadata.
///
/// Shares the queue's backend in production, so failures surface as
/// [`QueueError`].
#[async_trait]
pub trait EntryMetadataStore: Send + Sync {
    /// Merge `fields` into the map for `key`. Fields not named are left alone.
    async fn set_fields(&self, key: &str, fields: &FieldMap) -> Result<(), QueueError>;

    /// All fields for `key`; empty if the key has none.
    async fn get_fields(&self, key: &str) -> Result<FieldMap, QueueError>;

    /// Drop every field for `key`.
    async fn delete(&self, key: &str) -> Result<(), QueueError>;
}

/// In-memory metadata store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    entries: RwLock<HashMap<String, FieldMap>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntryMetadataStore for InMemoryMetadataStore {
    async fn set_fields(&self, key: &str, fields: &FieldMap) -> Result<(), QueueError> {
        let mut entries = self.entries.write().expect("metadata lock poisoned");
        let entry = entries.entry(key.to_string()).or_default();
        for (name, value) in fields {
            entry.insert(name.clone(), value.clone());
        }
        Ok(())
    }

    async fn get_fields(&self, key: &str) -> Result<FieldMap, QueueError> {
        let entries = self.entries.read().expect("metadata lock poisoned");
        Ok(entries.get(key).cloned().unwrap_or_default())
    }

    async fn delete(&self, key: &str) -> Result<(), QueueError> {
        self.entries.write().expect("metadata lock poisoned").remove(key);
        Ok(())
    }
}

/// Typed view of a statement entry's metadata: the period to bill next and
/// where to send it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementWindow {
    pub period: StatementPeriod,
    pub contact_email: String,
}

impl StatementWindow {
    pub fn new(period: StatementPeriod, contact_email: impl Into<String>) -> Self {
        Self {
            period,
            contact_email: contact_email.into(),
        }
    }

    /// Parse from a stored field map.
    ///
    /// Fails when a period bound is missing or not an integer, or when the
    /// bounds are inverted. A missing email is read as empty.
    pub fn from_fields(fields: &FieldMap) -> DomainResult<Self> {
        let start = parse_ts(fields, PERIOD_START_FIELD)?;
        let end = parse_ts(fields, PERIOD_END_FIELD)?;
        let period = StatementPeriod::new(start, end)?;
        let contact_email = fields
            .get(CONTACT_EMAIL_FIELD)
            .cloned()
            .unwrap_or_default();
        Ok(Self {
            period,
            contact_email,
        })
    }

    pub fn to_fields(&self) -> FieldMap {
        let mut fields = Self::period_fields(self.period);
        fields.insert(CONTACT_EMAIL_FIELD.to_string(), self.contact_email.clone());
        fields
    }

    /// Only the period bounds; used when advancing a window so the stored
    /// email is kept.
    pub fn period_fields(period: StatementPeriod) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert(PERIOD_START_FIELD.to_string(), period.start().to_string());
        fields.insert(PERIOD_END_FIELD.to_string(), period.end().to_string());
        fields
    }
}

fn parse_ts(fields: &FieldMap, name: &str) -> DomainResult<i64> {
    let raw = fields
        .get(name)
        .ok_or_else(|| DomainError::validation(format!("missing field {name}")))?;
    raw.parse::<i64>()
        .map_err(|e| DomainError::validation(format!("field {name}={raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_fields_merges() {
        let store = InMemoryMetadataStore::new();
        let window = StatementWindow::new(StatementPeriod::new(1, 2).unwrap(), "a@b.test");
        store.set_fields("k", &window.to_fields()).await.unwrap();

        let next = StatementPeriod::new(10, 20).unwrap();
        store
            .set_fields("k", &StatementWindow::period_fields(next))
            .await
            .unwrap();

        let fields = store.get_fields("k").await.unwrap();
        assert_eq!(fields.get(PERIOD_START_FIELD).unwrap(), "10");
        assert_eq!(fields.get(PERIOD_END_FIELD).unwrap(), "20");
        assert_eq!(fields.get(CONTACT_EMAIL_FIELD).unwrap(), "a@b.test");
    }

    #[tokio::test]
    async fn unknown_key_has_no_fields() {
        let store = InMemoryMetadataStore::new();
        assert!(store.get_fields("missing").await.unwrap().is_empty());

        store.delete("missing").await.unwrap();
    }

    #[tokio::test]
    async fn delete_drops_everything() {
        let store = InMemoryMetadataStore::new();
        let mut fields = FieldMap::new();
        fields.insert("x".into(), "1".into());
        store.set_fields("k", &fields).await.unwrap();
        store.delete("k").await.unwrap();
        assert!(store.get_fields("k").await.unwrap().is_empty());
    }

    #[test]
    fn window_round_trips_through_fields() {
        let window = StatementWindow::new(StatementPeriod::new(100, 200).unwrap(), "ops@x.test");
        assert_eq!(StatementWindow::from_fields(&window.to_fields()).unwrap(), window);
    }

    #[test]
    fn window_rejects_bad_fields() {
        let mut fields = FieldMap::new();
        assert!(StatementWindow::from_fields(&fields).is_err());

        fields.insert(PERIOD_START_FIELD.into(), "soon".into());
        fields.insert(PERIOD_END_FIELD.into(), "200".into());
        assert!(matches!(
            StatementWindow::from_fields(&fields),
            Err(DomainError::Validation(_))
        ));

        fields.insert(PERIOD_START_FIELD.into(), "300".into());
        assert!(StatementWindow::from_fields(&fields).is_err());
    }
}
