//! Domain types indexed or stored by the pipeline
//!
//! Field names on the wire (JSON for the search index, BSON for the source
//! metadata store) are part of the deployed document format and must not
//! change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::inchi::Inchi;

/// A compound document as upserted into the search index
///
/// Built by one worker from consecutive rows sharing a UCI, then frozen and
/// handed to the batcher. The document id is the UCI rendered as a string,
/// which is what makes replays of a range idempotent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Compound {
    pub uci: i64,
    pub inchi: Inchi,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Inchi>,
    pub standard_inchi_key: String,
    pub smiles: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<CompoundSource>,
    pub created_at: DateTime<Utc>,
    pub is_sourceless: bool,
}

/// One cross-reference of a compound into an external source database
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompoundSource {
    pub id: i32,
    pub name: String,
    pub long_name: String,
    pub compound_id: String,
    pub description: String,
    pub base_url: String,
    pub short_name: String,
    pub name_label: String,
    pub base_id_url_available: bool,
    pub aux_src: String,
    pub aux_for_url: bool,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    pub is_private: bool,
}

/// Source metadata record for the document store
///
/// One per source database, recomputed from scratch on every run. BSON keys
/// follow the cache schema consumed downstream; dates are kept as BSON
/// datetimes so the store can range-query them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceRecord {
    #[serde(rename = "sourceID")]
    pub source_id: i32,
    pub name: String,
    pub description: String,
    #[serde(rename = "srcReleaseNumber")]
    pub src_release_number: i32,
    #[serde(rename = "srcReleaseDate", skip_serializing_if = "Option::is_none")]
    pub src_release_date: Option<mongodb::bson::DateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<mongodb::bson::DateTime>,
    #[serde(rename = "lastUpdated", skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<mongodb::bson::DateTime>,
    #[serde(rename = "nameLong")]
    pub name_long: String,
    #[serde(rename = "srcDetails")]
    pub src_details: String,
    #[serde(rename = "srcUrl")]
    pub src_url: String,
    #[serde(rename = "baseIdUrl")]
    pub base_id_url: String,
    pub private: bool,
    #[serde(rename = "nameLabel")]
    pub name_label: String,
    #[serde(rename = "updateComments")]
    pub update_comments: String,
    #[serde(rename = "UCICount")]
    pub uci_count: i64,
}

/// Per-source compound cardinality from the index aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UciCount {
    #[serde(rename = "totalUCI")]
    pub total_uci: i64,
    pub source: i32,
}
