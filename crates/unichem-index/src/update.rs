//! Incremental update modes
//!
//! Two bounded recovery passes instead of a change feed:
//!
//! 1. **Extend from the last indexed UCI**: new compounds appended to the
//!    catalog since the last full run. The range re-does a small guard
//!    window below the watermark so a partially indexed boundary batch is
//!    repaired, then reaches a fixed horizon above it.
//! 2. **Source-change sweep**: rows whose cross-references were updated or
//!    removed recently. Everything touched since 15 days before the oldest
//!    index-side source timestamp is re-extracted through a single worker.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use unichem_common::{IndexError, Result};

use crate::config::{
    Config, QueryRange, UPDATE_GUARD_UCIS, UPDATE_HORIZON_UCIS, UPDATE_SWEEP_GRACE_DAYS,
};
use crate::db;
use crate::elastic::ElasticClient;
use crate::pipeline::{self, RunSummary};

/// Workers for the extend pass; the window is small, a wide fan-out is not
/// worth the connection churn.
const EXTEND_MAX_CONCURRENT: usize = 2;

/// Extend the index from the highest UCI it already holds
pub async fn update_from_last_uci(
    config: &Config,
    cancel: &CancellationToken,
) -> Result<RunSummary> {
    info!("STARTING UPDATE FROM LAST INDEXED UCI");

    let client = ElasticClient::new(&config.elastic_host, &config.elastic_auth, &config.index)?;
    let last_uci = client.last_indexed_uci().await?.ok_or_else(|| {
        IndexError::index("last indexed UCI", "the index holds no documents yet")
    })?;
    info!(last_uci, "Found last indexed UCI");

    let mut config = config.clone();
    config.query_max = QueryRange {
        start: last_uci - UPDATE_GUARD_UCIS,
        finish: last_uci + UPDATE_HORIZON_UCIS,
    };
    config.max_concurrent = EXTEND_MAX_CONCURRENT;

    Ok(pipeline::run_extraction(Arc::new(config), cancel.clone()).await)
}

/// Re-extract compounds whose source rows changed recently
pub async fn update_changed_sources(
    config: &Config,
    cancel: &CancellationToken,
) -> Result<RunSummary> {
    info!("Updating compounds with changed sources");

    let client = ElasticClient::new(&config.elastic_host, &config.elastic_auth, &config.index)?;
    let oldest = client.oldest_source_timestamp().await?.ok_or_else(|| {
        IndexError::index(
            "oldest source timestamp",
            "the index holds no dated sources yet",
        )
    })?;

    let cutoff = (oldest - chrono::Duration::days(UPDATE_SWEEP_GRACE_DAYS)).date_naive();
    info!(%cutoff, "Re-extracting rows updated since cutoff");
    let query = db::render_updated_since_query(cutoff);

    Ok(pipeline::run_single(Arc::new(config.clone()), query, cancel.clone()).await)
}
