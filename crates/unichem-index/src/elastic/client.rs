//! REST client for the search index
//!
//! A deliberately thin layer over the index HTTP API: bulk upserts for the
//! pipeline, plus the handful of count/search/aggregation calls the update
//! and validation paths need. Every method maps transport and non-2xx
//! failures to [`IndexError::Index`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};
use unichem_common::{IndexError, Result};

use super::{BulkOperation, BulkResponse, BulkSink, BulkSummary};
use crate::config::ElasticAuth;
use crate::model::UciCount;

/// Default request timeout for index calls.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Terms-aggregation bucket budget for the per-source counts; comfortably
/// above the number of registered sources.
const SOURCE_AGG_SIZE: usize = 3000;

/// Client for one logical index on one endpoint
#[derive(Debug, Clone)]
pub struct ElasticClient {
    http: Client,
    host: String,
    index: String,
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct ClusterInfo {
    version: ClusterVersion,
}

#[derive(Debug, Deserialize)]
struct ClusterVersion {
    number: String,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: i64,
}

#[derive(Debug, Deserialize)]
struct AcknowledgedResponse {
    #[serde(default)]
    acknowledged: bool,
}

impl ElasticClient {
    /// Create a client for the given endpoint and index
    pub fn new(host: &str, auth: &ElasticAuth, index: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| IndexError::index("client init", e.to_string()))?;

        Ok(Self {
            http,
            host: host.trim_end_matches('/').to_string(),
            index: index.to_string(),
            username: auth.username.clone(),
            password: auth.password.clone(),
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        if self.username.is_empty() {
            builder
        } else {
            builder.basic_auth(&self.username, Some(&self.password))
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.host, path)
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        operation: &'static str,
        builder: RequestBuilder,
    ) -> Result<T> {
        let response = self
            .authed(builder)
            .send()
            .await
            .map_err(|e| IndexError::index(operation, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IndexError::index(
                operation,
                format!("status {}: {}", status, body),
            ));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| IndexError::index(operation, e.to_string()))
    }

    /// Ping the endpoint and log the server version
    pub async fn ping(&self) -> Result<()> {
        let info: ClusterInfo = self
            .send_json("ping", self.http.get(self.url("")))
            .await?;
        info!(version = %info.version.number, "Connected to the index endpoint");
        Ok(())
    }

    /// Create the index with the configured mapping unless it already exists
    ///
    /// Returns true when this call created the index.
    pub async fn ensure_index(&self, settings_json: &str) -> Result<bool> {
        let response = self
            .authed(self.http.head(self.url(&self.index)))
            .send()
            .await
            .map_err(|e| IndexError::index("index exists", e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                debug!(index = %self.index, "Index exists, skipping creation");
                return Ok(false);
            }
            StatusCode::NOT_FOUND => {}
            status => {
                return Err(IndexError::index(
                    "index exists",
                    format!("status {}", status),
                ))
            }
        }

        let body: Value = serde_json::from_str(settings_json)
            .map_err(|e| IndexError::config(format!("ESIndexSettings is not valid JSON: {}", e)))?;

        info!(index = %self.index, "Creating index");
        let ack: AcknowledgedResponse = self
            .send_json(
                "create index",
                self.http.put(self.url(&self.index)).json(&body),
            )
            .await?;
        if !ack.acknowledged {
            return Err(IndexError::index(
                "create index",
                "creation not acknowledged".to_string(),
            ));
        }
        Ok(true)
    }

    /// Render the ndjson `_bulk` body for a batch of upserts
    fn bulk_body(&self, operations: &[BulkOperation]) -> String {
        let mut body = String::new();
        for op in operations {
            let action = json!({"update": {"_index": self.index, "_id": op.id}});
            let doc = json!({"doc": op.doc, "doc_as_upsert": true});
            body.push_str(&action.to_string());
            body.push('\n');
            body.push_str(&doc.to_string());
            body.push('\n');
        }
        body
    }

    /// Total document count in the index
    pub async fn count(&self) -> Result<i64> {
        let response: CountResponse = self
            .send_json(
                "count",
                self.http.get(self.url(&format!("{}/_count", self.index))),
            )
            .await?;
        Ok(response.count)
    }

    /// UCI of the newest indexed document, None when the index is empty
    pub async fn last_indexed_uci(&self) -> Result<Option<i64>> {
        let body = json!({
            "size": 1,
            "query": {"match_all": {}},
            "sort": [{"uci": {"order": "desc"}}]
        });
        let response: Value = self
            .send_json(
                "last indexed UCI",
                self.http
                    .post(self.url(&format!("{}/_search", self.index)))
                    .json(&body),
            )
            .await?;
        Ok(response["hits"]["hits"][0]["_source"]["uci"].as_i64())
    }

    /// The older of max(`sources.last_updated`) and max(`sources.created_at`)
    ///
    /// Drives the source-change sweep cutoff; None when the index holds no
    /// dated sources.
    pub async fn oldest_source_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        let body = json!({
            "size": 0,
            "query": {"match_all": {}},
            "aggs": {
                "max_last_updated": {"max": {"field": "sources.last_updated"}},
                "max_created": {"max": {"field": "sources.created_at"}}
            }
        });
        let response: Value = self
            .send_json(
                "oldest source timestamp",
                self.http
                    .post(self.url(&format!("{}/_search", self.index)))
                    .json(&body),
            )
            .await?;

        let millis = |agg: &str| -> Option<i64> {
            response["aggregations"][agg]["value"]
                .as_f64()
                .map(|v| v as i64)
        };
        let (Some(last_updated), Some(created)) = (millis("max_last_updated"), millis("max_created"))
        else {
            return Ok(None);
        };
        Ok(DateTime::<Utc>::from_timestamp_millis(
            last_updated.min(created),
        ))
    }

    /// Per-source document counts via a terms aggregation on `sources.id`
    pub async fn uci_count_by_source(&self) -> Result<HashMap<i32, UciCount>> {
        let body = json!({
            "size": 0,
            "aggs": {
                "uci_by_sources_count": {
                    "terms": {
                        "field": "sources.id",
                        "size": SOURCE_AGG_SIZE,
                        "order": {"_count": "desc"}
                    }
                }
            }
        });
        let response: Value = self
            .send_json(
                "UCI count by source",
                self.http
                    .post(self.url(&format!("{}/_search", self.index)))
                    .json(&body),
            )
            .await?;

        let buckets = response["aggregations"]["uci_by_sources_count"]["buckets"]
            .as_array()
            .ok_or_else(|| {
                IndexError::index("UCI count by source", "aggregation missing from response")
            })?;

        let mut counts = HashMap::with_capacity(buckets.len());
        for bucket in buckets {
            let source = bucket["key"].as_i64().ok_or_else(|| {
                IndexError::index("UCI count by source", "non-numeric source id bucket")
            })? as i32;
            let total_uci = bucket["doc_count"].as_i64().unwrap_or_default();
            counts.insert(
                source,
                UciCount {
                    total_uci,
                    source,
                },
            );
        }
        Ok(counts)
    }
}

#[async_trait]
impl BulkSink for ElasticClient {
    async fn send_bulk(&self, operations: &[BulkOperation]) -> Result<BulkSummary> {
        let body = self.bulk_body(operations);
        let response: BulkResponse = self
            .send_json(
                "bulk upsert",
                self.http
                    .post(self.url("_bulk"))
                    .header("Content-Type", "application/x-ndjson")
                    .body(body),
            )
            .await?;
        Ok(response.summarize())
    }
}
