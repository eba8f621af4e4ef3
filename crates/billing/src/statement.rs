use serde::{Deserialize, Serialize};

use fleetpay_core::{CustomerId, DomainError, DomainResult, StatementId, TransactionId};

/// Fixed statement cadence: one statement every 7 days.
pub const STATEMENT_CADENCE_SECS: i64 = 7 * 24 * 60 * 60;

/// Billed account holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub contact_email: String,
}

/// Card transaction as read from the entity store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub customer_id: CustomerId,
    /// Amount in smallest currency unit (e.g., cents). Refunds are negative.
    pub amount: i64,
    /// Unix seconds.
    pub occurred_at: i64,
    pub description: String,
    /// Only qualifying transactions are billed on a statement.
    pub qualifying: bool,
}

/// Inclusive billing period bounds, in Unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementPeriod {
    start: i64,
    end: i64,
}

impl StatementPeriod {
    pub fn new(start: i64, end: i64) -> DomainResult<Self> {
        if start > end {
            return Err(DomainError::validation(format!(
                "statement period start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// The period that starts at `now` and runs for one cadence.
    ///
    /// Derived from `now` rather than from the previous period end, so a late
    /// sweep shifts the period instead of compounding.
    pub fn starting_at(now: i64) -> Self {
        Self {
            start: now,
            end: now.saturating_add(STATEMENT_CADENCE_SECS),
        }
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    pub fn contains(&self, ts: i64) -> bool {
        self.start <= ts && ts <= self.end
    }
}

/// Sum of transaction amounts; fails rather than wrapping on overflow.
pub fn total_amount(transactions: &[Transaction]) -> DomainResult<i64> {
    transactions.iter().try_fold(0i64, |acc, t| {
        acc.checked_add(t.amount).ok_or_else(|| {
            DomainError::invariant(format!("statement total overflows at transaction {}", t.id))
        })
    })
}

/// One line on a rendered statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementLine {
    pub transaction_id: TransactionId,
    pub occurred_at: i64,
    pub description: String,
    pub amount: i64,
}

/// Renderer input: customer + period + lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementDocument {
    pub customer_id: CustomerId,
    pub customer_name: String,
    pub contact_email: String,
    pub period_start: i64,
    pub period_end: i64,
    pub lines: Vec<StatementLine>,
    pub total_amount: i64,
}

impl StatementDocument {
    pub fn build(
        customer: &Customer,
        period: StatementPeriod,
        transactions: &[Transaction],
    ) -> DomainResult<Self> {
        let total_amount = total_amount(transactions)?;
        let mut lines: Vec<StatementLine> = transactions
            .iter()
            .map(|t| StatementLine {
                transaction_id: t.id,
                occurred_at: t.occurred_at,
                description: t.description.clone(),
                amount: t.amount,
            })
            .collect();
        lines.sort_by_key(|l| l.occurred_at);

        Ok(Self {
            customer_id: customer.id,
            customer_name: customer.name.clone(),
            contact_email: customer.contact_email.clone(),
            period_start: period.start(),
            period_end: period.end(),
            lines,
            total_amount,
        })
    }
}

/// Persisted statement record. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedStatement {
    pub statement_id: StatementId,
    pub customer_id: CustomerId,
    pub period_start: i64,
    pub period_end: i64,
    pub total_amount: i64,
    pub document_url: String,
}

impl GeneratedStatement {
    pub fn new(
        customer_id: CustomerId,
        period: StatementPeriod,
        total_amount: i64,
        document_url: impl Into<String>,
    ) -> Self {
        Self {
            statement_id: StatementId::new(),
            customer_id,
            period_start: period.start(),
            period_end: period.end(),
            total_amount,
            document_url: document_url.into(),
        }
    }
}
