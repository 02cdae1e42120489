//! Post-run validation: catalog cardinality vs index cardinality
//!
//! A mismatch is reported but never fails the run; partial batches are
//! repaired by the next update pass.

use tracing::{info, warn};
use unichem_common::Result;

use crate::config::Config;
use crate::db;
use crate::elastic::ElasticClient;

/// Compare the distinct UCI count in the catalog with the index document
/// count; returns whether they match
pub async fn validate_load(config: &Config) -> Result<bool> {
    info!("Counting UCIs in the catalog database");
    let pool = db::connect(&config.oracle_conn).await?;
    let db_count = db::count_distinct_uci(&pool).await?;
    pool.close().await;

    info!("Counting documents in the index");
    let client = ElasticClient::new(&config.elastic_host, &config.elastic_auth, &config.index)?;
    let index_count = client.count().await?;

    let matched = db_count == index_count;
    if matched {
        info!(db_count, index_count, "UCI totals match");
    } else {
        warn!(db_count, index_count, "UCI totals diverge");
    }
    Ok(matched)
}
