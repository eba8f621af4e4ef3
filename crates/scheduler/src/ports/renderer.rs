//! Document rendering port.

use async_trait::async_trait;

use fleetpay_billing::StatementDocument;

/// Document kind for billing statements.
pub const STATEMENT_KIND: &str = "statement";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("unsupported document kind: {0}")]
    UnsupportedKind(String),
    #[error("invalid document data: {0}")]
    InvalidData(String),
    #[error("render failed: {0}")]
    Failed(String),
}

/// Turns structured data into document bytes.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    /// File extension of rendered documents, without the dot.
    fn extension(&self) -> &'static str;

    async fn render(&self, kind: &str, data: &serde_json::Value) -> Result<Vec<u8>, RenderError>;
}

/// Renders statements as pretty-printed JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonStatementRenderer;

#[async_trait]
impl DocumentRenderer for JsonStatementRenderer {
    fn extension(&self) -> &'static str {
        "json"
    }

    async fn render(&self, kind: &str, data: &serde_json::Value) -> Result<Vec<u8>, RenderError> {
        if kind != STATEMENT_KIND {
            return Err(RenderError::UnsupportedKind(kind.to_string()));
        }
        // Validate shape before emitting anything.
        let document: StatementDocument = serde_json::from_value(data.clone())
            .map_err(|e| RenderError::InvalidData(e.to_string()))?;
        serde_json::to_vec_pretty(&document).map_err(|e| RenderError::Failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetpay_billing::{Customer, StatementPeriod};
    use fleetpay_core::CustomerId;

    #[tokio::test]
    async fn renders_statement_as_json() {
        let customer = Customer {
            id: CustomerId::new(),
            name: "Northwind Freight".to_string(),
            contact_email: "billing@northwind.test".to_string(),
        };
        let doc = StatementDocument::build(&customer, StatementPeriod::new(0, 10).unwrap(), &[]).unwrap();
        let data = serde_json::to_value(&doc).unwrap();

        let bytes = JsonStatementRenderer.render(STATEMENT_KIND, &data).await.unwrap();
        let back: StatementDocument = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, doc);
    }

    #[tokio::test]
    async fn rejects_unknown_kind_and_bad_data() {
        let renderer = JsonStatementRenderer;
        assert!(matches!(
            renderer.render("invoice", &serde_json::json!({})).await,
            Err(RenderError::UnsupportedKind(k)) if k == "invoice"
        ));
        assert!(matches!(
            renderer
                .render(STATEMENT_KIND, &serde_json::json!({"total_amount": "lots"}))
                .await,
            Err(RenderError::InvalidData(_))
        ));
    }
}
