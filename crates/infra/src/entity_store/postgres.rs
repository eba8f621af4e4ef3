//! Postgres-backed entity store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | EntityStoreError |
//! |------------|----------------------|------------------|
//! | Database (unique violation) | `23505` | `AlreadyExists` |
//! | Database (other) | Any other | `Storage` |
//! | PoolClosed / Io / other | N/A | `Storage` |
//!
//! Timestamps are `TIMESTAMPTZ` columns; the scheduler works in unix seconds,
//! so rows are converted at this boundary.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{Span, instrument};

use fleetpay_billing::{Card, Customer, GeneratedStatement, ShippingStatus, Transaction};
use fleetpay_core::{CardId, CustomerId, TransactionId};
use fleetpay_scheduler::{EntityStore, EntityStoreError};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS customers (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        contact_email TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cards (
        id UUID PRIMARY KEY,
        customer_id UUID NOT NULL REFERENCES customers (id),
        shipping_status TEXT NOT NULL
            CHECK (shipping_status IN ('pending', 'shipped', 'delivered'))
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transactions (
        id UUID PRIMARY KEY,
        customer_id UUID NOT NULL REFERENCES customers (id),
        amount BIGINT NOT NULL,
        occurred_at TIMESTAMPTZ NOT NULL,
        description TEXT NOT NULL,
        qualifying BOOLEAN NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS transactions_customer_occurred_at
        ON transactions (customer_id, occurred_at)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS statements (
        id UUID PRIMARY KEY,
        customer_id UUID NOT NULL REFERENCES customers (id),
        period_start TIMESTAMPTZ NOT NULL,
        period_end TIMESTAMPTZ NOT NULL,
        total_amount BIGINT NOT NULL,
        document_url TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
];

/// Entity store over a shared connection pool.
#[derive(Debug, Clone)]
pub struct PostgresEntityStore {
    pool: Arc<PgPool>,
}

impl PostgresEntityStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the tables if they don't exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), EntityStoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl EntityStore for PostgresEntityStore {
    #[instrument(skip(self), fields(card_id = %id), err)]
    async fn get_card(&self, id: CardId) -> Result<Option<Card>, EntityStoreError> {
        let row = sqlx::query("SELECT id, customer_id, shipping_status FROM cards WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_card", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let status: String = row
            .try_get("shipping_status")
            .map_err(|e| map_sqlx_error("get_card", e))?;
        let shipping_status: ShippingStatus = status
            .parse()
            .map_err(|e| EntityStoreError::Storage(format!("card {id}: {e}")))?;
        let customer_id: uuid::Uuid = row
            .try_get("customer_id")
            .map_err(|e| map_sqlx_error("get_card", e))?;

        Ok(Some(Card::new(
            id,
            CustomerId::from_uuid(customer_id),
            shipping_status,
        )))
    }

    #[instrument(skip(self), fields(card_id = %id, status = %status), err)]
    async fn update_card_status(
        &self,
        id: CardId,
        status: ShippingStatus,
    ) -> Result<(), EntityStoreError> {
        let result = sqlx::query("UPDATE cards SET shipping_status = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(status.as_str())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_card_status", e))?;

        if result.rows_affected() == 0 {
            return Err(EntityStoreError::NotFound {
                entity: "card",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    #[instrument(skip(self), fields(customer_id = %id), err)]
    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>, EntityStoreError> {
        let row = sqlx::query("SELECT name, contact_email FROM customers WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_customer", e))?;

        row.map(|row| -> Result<Customer, sqlx::Error> {
            Ok(Customer {
                id,
                name: row.try_get("name")?,
                contact_email: row.try_get("contact_email")?,
            })
        })
        .transpose()
        .map_err(|e| map_sqlx_error("get_customer", e))
    }

    #[instrument(
        skip(self),
        fields(customer_id = %customer, transaction_count = tracing::field::Empty),
        err
    )]
    async fn list_transactions(
        &self,
        customer: CustomerId,
        from: i64,
        to: i64,
    ) -> Result<Vec<Transaction>, EntityStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, amount, occurred_at, description, qualifying
            FROM transactions
            WHERE customer_id = $1
              AND qualifying
              AND occurred_at BETWEEN $2 AND $3
            ORDER BY occurred_at ASC, id ASC
            "#,
        )
        .bind(customer.as_uuid())
        .bind(to_timestamp(from)?)
        .bind(to_timestamp(to)?)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_transactions", e))?;

        let mut transactions = Vec::with_capacity(rows.len());
        for row in rows {
            let tx = transaction_from_row(customer, &row)
                .map_err(|e| map_sqlx_error("list_transactions", e))?;
            transactions.push(tx);
        }

        Span::current().record("transaction_count", transactions.len());
        Ok(transactions)
    }

    #[instrument(
        skip(self, statement),
        fields(statement_id = %statement.statement_id, customer_id = %statement.customer_id),
        err
    )]
    async fn create_statement(
        &self,
        statement: &GeneratedStatement,
    ) -> Result<(), EntityStoreError> {
        sqlx::query(
            r#"
            INSERT INTO statements
                (id, customer_id, period_start, period_end, total_amount, document_url)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(statement.statement_id.as_uuid())
        .bind(statement.customer_id.as_uuid())
        .bind(to_timestamp(statement.period_start)?)
        .bind(to_timestamp(statement.period_end)?)
        .bind(statement.total_amount)
        .bind(&statement.document_url)
        .execute(&*self.pool)
        .await
        .map_err(|e| match map_sqlx_error("create_statement", e) {
            EntityStoreError::AlreadyExists { .. } => EntityStoreError::AlreadyExists {
                entity: "statement",
                id: statement.statement_id.to_string(),
            },
            other => other,
        })?;
        Ok(())
    }
}

fn transaction_from_row(
    customer_id: CustomerId,
    row: &sqlx::postgres::PgRow,
) -> Result<Transaction, sqlx::Error> {
    let id: uuid::Uuid = row.try_get("id")?;
    let occurred_at: DateTime<Utc> = row.try_get("occurred_at")?;
    Ok(Transaction {
        id: TransactionId::from_uuid(id),
        customer_id,
        amount: row.try_get("amount")?,
        occurred_at: occurred_at.timestamp(),
        description: row.try_get("description")?,
        qualifying: row.try_get("qualifying")?,
    })
}

fn to_timestamp(secs: i64) -> Result<DateTime<Utc>, EntityStoreError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| EntityStoreError::Storage(format!("timestamp out of range: {secs}")))
}

/// Map SQLx errors to EntityStoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> EntityStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => EntityStoreError::AlreadyExists {
                    entity: "row",
                    id: msg,
                },
                _ => EntityStoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            EntityStoreError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => EntityStoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}
