//! Source-metadata refresh
//!
//! Rebuilds the per-source records in the document store on every run: the
//! source table (joined with its current release) from the catalog, plus the
//! per-source compound cardinality from an index aggregation, upserted into
//! MongoDB keyed by source id.

use mongodb::bson::{doc, DateTime as BsonDateTime};
use mongodb::options::UpdateOptions;
use tracing::{debug, info};
use unichem_common::{IndexError, Result};

use crate::config::Config;
use crate::db::{self, SourceRow};
use crate::elastic::ElasticClient;
use crate::model::{SourceRecord, UciCount};

/// Document store database holding the source cache.
const SOURCE_DATABASE: &str = "ci_cache";

/// Collection of per-source records.
const SOURCE_COLLECTION: &str = "source";

/// Recompute and upsert every source record; returns how many were written
pub async fn refresh_sources(config: &Config) -> Result<usize> {
    let client = ElasticClient::new(&config.elastic_host, &config.elastic_auth, &config.index)?;
    let counts = client.uci_count_by_source().await?;
    info!(sources = counts.len(), "Fetched UCI counts by source");

    let pool = db::connect(&config.oracle_conn).await?;
    let rows = db::fetch_sources(&pool).await?;
    pool.close().await;

    let mongo = mongodb::Client::with_uri_str(&config.mongo_db)
        .await
        .map_err(|e| IndexError::document_store("connect", e.to_string()))?;
    let collection = mongo
        .database(SOURCE_DATABASE)
        .collection::<mongodb::bson::Document>(SOURCE_COLLECTION);

    let options = UpdateOptions::builder().upsert(true).build();
    for row in &rows {
        let record = source_record(row, counts.get(&row.src_id));
        debug!(
            source = record.source_id,
            name = %record.name,
            uci_count = record.uci_count,
            "Upserting source record"
        );
        let document = mongodb::bson::to_document(&record)
            .map_err(|e| IndexError::document_store("encode source", e.to_string()))?;
        collection
            .update_one(
                doc! {"_id": record.source_id},
                doc! {"$set": document},
                options.clone(),
            )
            .await
            .map_err(|e| IndexError::document_store("upsert source", e.to_string()))?;
    }

    info!(sources = rows.len(), "Source records refreshed");
    Ok(rows.len())
}

/// Combine one source row with its index-side cardinality
fn source_record(row: &SourceRow, count: Option<&UciCount>) -> SourceRecord {
    SourceRecord {
        source_id: row.src_id,
        name: row.name.clone(),
        description: row.description.clone(),
        src_release_number: row.src_release_number.unwrap_or_default(),
        src_release_date: row.src_release_date.map(BsonDateTime::from_chrono),
        created: row.created.map(BsonDateTime::from_chrono),
        last_updated: row.last_updated.map(BsonDateTime::from_chrono),
        name_long: row.name_long.clone(),
        src_details: row.src_details.clone(),
        src_url: row.src_url.clone().unwrap_or_default(),
        base_id_url: row.base_id_url.clone().unwrap_or_default(),
        private: row.private,
        name_label: row.name_label.clone(),
        update_comments: row.update_comments.clone().unwrap_or_default(),
        uci_count: count.map(|c| c.total_uci).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn record_combines_row_and_count() {
        let row = SourceRow {
            src_id: 7,
            name: "chembl".to_string(),
            name_long: "ChEMBL".to_string(),
            src_release_number: Some(34),
            created: Some(Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap()),
            ..SourceRow::default()
        };
        let count = UciCount {
            total_uci: 123_456,
            source: 7,
        };

        let record = source_record(&row, Some(&count));
        assert_eq!(record.source_id, 7);
        assert_eq!(record.src_release_number, 34);
        assert_eq!(record.uci_count, 123_456);
        assert!(record.created.is_some());
        assert!(record.last_updated.is_none());
    }

    #[test]
    fn missing_count_defaults_to_zero() {
        let row = SourceRow {
            src_id: 9,
            ..SourceRow::default()
        };
        let record = source_record(&row, None);
        assert_eq!(record.uci_count, 0);
    }

    #[test]
    fn record_serializes_with_cache_field_names() {
        let record = source_record(
            &SourceRow {
                src_id: 3,
                name: "pdb".to_string(),
                ..SourceRow::default()
            },
            None,
        );
        let document = mongodb::bson::to_document(&record).unwrap();
        assert_eq!(document.get_i32("sourceID").unwrap(), 3);
        assert_eq!(document.get_str("name").unwrap(), "pdb");
        assert_eq!(document.get_i64("UCICount").unwrap(), 0);
        assert!(!document.contains_key("srcReleaseDate"));
    }
}
