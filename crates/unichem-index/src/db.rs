//! Relational row source for the compound catalog
//!
//! Workers stream extraction rows straight off a database cursor; the row
//! shape is fixed by the configured query template, which must project the
//! columns below in this exact order (the decoder is positional so the
//! template can spell identifiers however the schema likes):
//!
//! ```text
//! UCI, STANDARDINCHI, STANDARDINCHIKEY, PARENT_SMILES, SRC_COMPOUND_ID,
//! ASSIGNMENT, CREATED, LASTUPDATED, SRC_ID, NAME_LONG, NAME_LABEL,
//! DESCRIPTION, BASE_ID_URL, NAME, BASE_ID_URL_AVAILABLE, AUX_FOR_URL,
//! PRIVATE
//! ```
//!
//! ordered by UCI ascending.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use unichem_common::{IndexError, Result};

/// Cross-reference assignment value marking a kept source
pub const KEPT_ASSIGNMENT: i32 = 1;

/// Counts distinct UCIs reachable through the xref/source join, mirroring
/// what a full extraction visits.
const COUNT_DISTINCT_UCI_QUERY: &str = "\
SELECT count(distinct(ucpa.UCI))
FROM UC_XREF xref,
     UC_SOURCE so,
     UC_STRUCTURE ucpa
WHERE xref.UCI = ucpa.UCI
  AND xref.src_id = so.src_id";

/// Source table joined with its current release, ordered by source id.
const SOURCES_QUERY: &str = "\
SELECT so.SRC_ID,
       so.NAME,
       so.DESCRIPTION,
       ur.SRC_RELEASE_NUMBER,
       ur.SRC_RELEASE_DATE,
       so.CREATED,
       so.LAST_UPDATED,
       so.NAME_LONG,
       so.SRC_DETAILS,
       so.SRC_URL,
       so.BASE_ID_URL,
       so.PRIVATE,
       so.NAME_LABEL,
       so.UPDATE_COMMENTS
FROM UC_SOURCE so,
     UC_RELEASE ur
WHERE so.CURRENT_RELEASE_U = ur.RELEASE_U
  AND so.SRC_ID = ur.SRC_ID
ORDER BY so.SRC_ID";

/// Re-extraction query for the source-change sweep: every row whose
/// cross-reference was touched on or after the cutoff date, same projection
/// as the configured extraction template. The `%s` slot receives the date.
const UPDATED_SINCE_QUERY: &str = "\
SELECT ucpa.UCI,
       ucpa.STANDARDINCHI,
       ucpa.STANDARDINCHIKEY,
       ucpa.PARENT_SMILES,
       xref.SRC_COMPOUND_ID,
       xref.ASSIGNMENT,
       xref.CREATED,
       xref.LASTUPDATED,
       so.src_id,
       so.NAME_LONG,
       so.NAME_LABEL,
       so.DESCRIPTION,
       so.BASE_ID_URL,
       so.NAME,
       so.BASE_ID_URL_AVAILABLE,
       so.AUX_FOR_URL,
       so.PRIVATE
FROM UC_XREF xref,
     UC_SOURCE so,
     UC_STRUCTURE ucpa
WHERE xref.UCI in (
    SELECT UCI
    FROM UC_XREF
    WHERE LASTUPDATED IS NOT NULL
      AND LASTUPDATED >= DATE '%s'
)
  AND xref.UCI = ucpa.UCI
  AND xref.src_id = so.src_id
ORDER BY ucpa.UCI";

/// One extraction row: structure fields plus one cross-reference and its
/// source description
#[derive(Debug, Clone, Default)]
pub struct CompoundRow {
    pub uci: i64,
    pub standard_inchi: String,
    pub standard_inchi_key: String,
    pub smiles: String,
    pub src_compound_id: String,
    pub assignment: i32,
    pub created: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    pub src_id: i32,
    pub name_long: String,
    pub name_label: String,
    pub description: String,
    pub base_id_url: String,
    pub name: String,
    pub base_id_url_available: bool,
    pub aux_for_url: bool,
    pub private: bool,
}

/// One row of the source table joined with its current release
#[derive(Debug, Clone, Default)]
pub struct SourceRow {
    pub src_id: i32,
    pub name: String,
    pub description: String,
    pub src_release_number: Option<i32>,
    pub src_release_date: Option<DateTime<Utc>>,
    pub created: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    pub name_long: String,
    pub src_details: String,
    pub src_url: Option<String>,
    pub base_id_url: Option<String>,
    pub private: bool,
    pub name_label: String,
    pub update_comments: Option<String>,
}

/// Open a small connection pool against the catalog database
///
/// Clients are per worker by design, so each pool stays tiny.
pub async fn connect(conn: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(2)
        .connect(conn)
        .await
        .map_err(|e| IndexError::database("connect", e.to_string()))
}

/// Decode one extraction row by position
pub fn decode_compound_row(row: &PgRow) -> Result<CompoundRow> {
    let decode = |e: sqlx::Error| IndexError::database("decode row", e.to_string());

    Ok(CompoundRow {
        uci: row.try_get::<i64, _>(0).map_err(decode)?,
        standard_inchi: opt_text(row, 1)?,
        standard_inchi_key: opt_text(row, 2)?,
        smiles: opt_text(row, 3)?,
        src_compound_id: opt_text(row, 4)?,
        assignment: row.try_get::<Option<i32>, _>(5).map_err(decode)?.unwrap_or_default(),
        created: row.try_get(6).map_err(decode)?,
        last_updated: row.try_get(7).map_err(decode)?,
        src_id: row.try_get::<i32, _>(8).map_err(decode)?,
        name_long: opt_text(row, 9)?,
        name_label: opt_text(row, 10)?,
        description: opt_text(row, 11)?,
        base_id_url: opt_text(row, 12)?,
        name: opt_text(row, 13)?,
        base_id_url_available: opt_bool(row, 14)?,
        aux_for_url: opt_bool(row, 15)?,
        private: opt_bool(row, 16)?,
    })
}

fn opt_text(row: &PgRow, index: usize) -> Result<String> {
    row.try_get::<Option<String>, _>(index)
        .map(Option::unwrap_or_default)
        .map_err(|e| IndexError::database("decode row", e.to_string()))
}

fn opt_bool(row: &PgRow, index: usize) -> Result<bool> {
    row.try_get::<Option<bool>, _>(index)
        .map(Option::unwrap_or_default)
        .map_err(|e| IndexError::database("decode row", e.to_string()))
}

/// Count distinct UCIs in the catalog, for validation against the index
pub async fn count_distinct_uci(pool: &PgPool) -> Result<i64> {
    let row = sqlx::query(COUNT_DISTINCT_UCI_QUERY)
        .fetch_one(pool)
        .await
        .map_err(|e| IndexError::database("count distinct UCI", e.to_string()))?;
    row.try_get::<i64, _>(0)
        .map_err(|e| IndexError::database("count distinct UCI", e.to_string()))
}

/// Fetch the source table for the metadata refresh
pub async fn fetch_sources(pool: &PgPool) -> Result<Vec<SourceRow>> {
    let decode = |e: sqlx::Error| IndexError::database("fetch sources", e.to_string());

    let rows = sqlx::query(SOURCES_QUERY)
        .fetch_all(pool)
        .await
        .map_err(decode)?;

    rows.iter()
        .map(|row| {
            Ok(SourceRow {
                src_id: row.try_get::<i32, _>(0).map_err(decode)?,
                name: opt_text(row, 1)?,
                description: opt_text(row, 2)?,
                src_release_number: row.try_get(3).map_err(decode)?,
                src_release_date: row.try_get(4).map_err(decode)?,
                created: row.try_get(5).map_err(decode)?,
                last_updated: row.try_get(6).map_err(decode)?,
                name_long: opt_text(row, 7)?,
                src_details: opt_text(row, 8)?,
                src_url: row.try_get(9).map_err(decode)?,
                base_id_url: row.try_get(10).map_err(decode)?,
                private: opt_bool(row, 11)?,
                name_label: opt_text(row, 12)?,
                update_comments: row.try_get(13).map_err(decode)?,
            })
        })
        .collect()
}

/// Render the source-change sweep query for a cutoff date
pub fn render_updated_since_query(cutoff: NaiveDate) -> String {
    UPDATED_SINCE_QUERY.replacen("%s", &cutoff.format("%Y-%m-%d").to_string(), 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_query_embeds_cutoff_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let query = render_updated_since_query(date);
        assert!(query.contains("LASTUPDATED >= DATE '2024-03-15'"));
        assert!(!query.contains("%s"));
    }
}
