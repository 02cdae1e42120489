//! Search index client and bulk batching
//!
//! [`client::ElasticClient`] is a thin REST client over the index endpoint;
//! [`bulk::BulkBatcher`] accumulates compound upserts into bounded batches
//! and dispatches them with a bounded in-flight window. The two meet at the
//! [`BulkSink`] seam so the batcher can be exercised without a live index.

pub mod bulk;
pub mod client;

pub use bulk::{BatchEvent, BulkBatcher};
pub use client::ElasticClient;

use async_trait::async_trait;
use serde::Deserialize;
use unichem_common::Result;

use crate::model::Compound;

/// One buffered upsert operation, keyed by UCI
#[derive(Debug, Clone)]
pub struct BulkOperation {
    pub id: String,
    pub doc: serde_json::Value,
}

impl BulkOperation {
    /// Build the upsert operation for a finished compound document
    pub fn upsert(compound: &Compound) -> Result<Self> {
        let doc = serde_json::to_value(compound)
            .map_err(|e| unichem_common::IndexError::parse("compound document", e.to_string()))?;
        Ok(Self {
            id: compound.uci.to_string(),
            doc,
        })
    }
}

/// Where dispatched batches go
///
/// The production implementation is [`ElasticClient`]; tests substitute an
/// in-memory sink.
#[async_trait]
pub trait BulkSink: Send + Sync + 'static {
    /// Send one batch and return its folded outcome
    async fn send_bulk(&self, operations: &[BulkOperation]) -> Result<BulkSummary>;
}

/// Folded outcome of one bulk request
#[derive(Debug, Clone, Default)]
pub struct BulkSummary {
    pub succeeded: usize,
    pub indexed: usize,
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
    /// Milliseconds the index spent on the request
    pub took: u64,
    /// Per-item failures, for diagnostics only
    pub failed_items: Vec<FailedUpsert>,
    /// Highest UCI confirmed by this batch
    pub last_succeeded_uci: Option<i64>,
}

/// A single failed item from a bulk response
#[derive(Debug, Clone)]
pub struct FailedUpsert {
    pub id: String,
    pub reason: String,
}

/// Raw `_bulk` response body
#[derive(Debug, Clone, Deserialize)]
pub struct BulkResponse {
    pub took: u64,
    pub errors: bool,
    pub items: Vec<BulkItem>,
}

/// One `_bulk` item, keyed by the action that produced it
#[derive(Debug, Clone, Deserialize)]
pub struct BulkItem {
    pub update: Option<BulkItemDetail>,
    pub index: Option<BulkItemDetail>,
    pub create: Option<BulkItemDetail>,
}

impl BulkItem {
    pub fn detail(&self) -> Option<&BulkItemDetail> {
        self.update
            .as_ref()
            .or(self.index.as_ref())
            .or(self.create.as_ref())
    }
}

/// Per-item outcome inside a bulk response
#[derive(Debug, Clone, Deserialize)]
pub struct BulkItemDetail {
    #[serde(rename = "_id")]
    pub id: String,
    pub status: u16,
    pub result: Option<String>,
    pub error: Option<BulkItemError>,
}

impl BulkItemDetail {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.status < 300
    }
}

/// Error detail of a failed bulk item
#[derive(Debug, Clone, Deserialize)]
pub struct BulkItemError {
    #[serde(rename = "type")]
    pub kind: String,
    pub reason: Option<String>,
}

impl BulkResponse {
    /// Fold the raw response into the summary the pipeline consumes
    pub fn summarize(&self) -> BulkSummary {
        let mut summary = BulkSummary {
            took: self.took,
            ..BulkSummary::default()
        };
        for item in &self.items {
            let Some(detail) = item.detail() else {
                continue;
            };
            if detail.is_success() {
                summary.succeeded += 1;
                match detail.result.as_deref() {
                    Some("created") => summary.created += 1,
                    Some("updated") => summary.updated += 1,
                    _ => {}
                }
                if let Ok(uci) = detail.id.parse::<i64>() {
                    summary.last_succeeded_uci =
                        Some(summary.last_succeeded_uci.map_or(uci, |max| max.max(uci)));
                }
            } else {
                summary.failed += 1;
                summary.failed_items.push(FailedUpsert {
                    id: detail.id.clone(),
                    reason: detail
                        .error
                        .as_ref()
                        .map(|e| {
                            e.reason
                                .clone()
                                .unwrap_or_else(|| e.kind.clone())
                        })
                        .unwrap_or_else(|| format!("status {}", detail.status)),
                });
            }
        }
        summary.indexed = summary.created + summary.updated;
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarizes_successful_response() {
        let body = r#"{
            "took": 12,
            "errors": false,
            "items": [
                {"update": {"_id": "10", "status": 200, "result": "updated"}},
                {"update": {"_id": "11", "status": 201, "result": "created"}}
            ]
        }"#;
        let response: BulkResponse = serde_json::from_str(body).unwrap();
        let summary = response.summarize();
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.created, 1);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.indexed, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.last_succeeded_uci, Some(11));
        assert_eq!(summary.took, 12);
    }

    #[test]
    fn summarizes_partial_failure() {
        let body = r#"{
            "took": 5,
            "errors": true,
            "items": [
                {"update": {"_id": "20", "status": 200, "result": "updated"}},
                {"update": {"_id": "21", "status": 429, "error": {"type": "es_rejected_execution_exception", "reason": "queue full"}}}
            ]
        }"#;
        let response: BulkResponse = serde_json::from_str(body).unwrap();
        let summary = response.summarize();
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failed_items[0].id, "21");
        assert_eq!(summary.failed_items[0].reason, "queue full");
        assert_eq!(summary.last_succeeded_uci, Some(20));
    }

    #[test]
    fn upsert_operation_is_keyed_by_uci() {
        let compound = Compound {
            uci: 42,
            ..Compound::default()
        };
        let op = BulkOperation::upsert(&compound).unwrap();
        assert_eq!(op.id, "42");
        assert_eq!(op.doc["uci"], 42);
        assert_eq!(op.doc["is_sourceless"], false);
    }
}
