//! Configuration management
//!
//! The indexer is driven by a YAML file (`config.yaml` by default) whose keys
//! are shared with the deployment tooling, hence the PascalCase spelling on
//! the wire. CLI flags may override the Elasticsearch host and the database
//! connection string after loading.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use unichem_common::{IndexError, Result};

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// UCIs re-done below the last indexed watermark by the update mode, so a
/// partially indexed boundary batch is repaired.
pub const UPDATE_GUARD_UCIS: i64 = 10;

/// How far above the last indexed UCI the update mode reaches.
pub const UPDATE_HORIZON_UCIS: i64 = 10_000_000;

/// Days subtracted from the oldest index-side source timestamp when
/// sweeping for changed source rows.
pub const UPDATE_SWEEP_GRACE_DAYS: i64 = 15;

/// Indexer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct Config {
    /// Directory for the rotated log file
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,

    /// Connection string for the compound catalog database
    pub oracle_conn: String,

    /// Elasticsearch endpoint
    pub elastic_host: String,

    /// Basic-auth credentials for the index endpoint
    #[serde(default)]
    pub elastic_auth: ElasticAuth,

    /// Logical index name
    pub index: String,

    /// Logical document type name
    #[serde(rename = "Type")]
    pub type_name: String,

    /// Raw JSON mapping applied on first-time index creation
    #[serde(rename = "ESIndexSettings")]
    pub es_index_settings: String,

    /// Maximum operations per bulk request
    pub bulk_limit: usize,

    /// Maximum concurrent bulk dispatches per worker
    pub max_bulk_calls: usize,

    /// Extraction query template with two `%d` slots for the UCI range
    pub query: String,

    /// Overall UCI range to extract
    pub query_max: QueryRange,

    /// UCI width of one worker shard
    pub interval: i64,

    /// Maximum workers running at once
    pub max_concurrent: usize,

    /// Maximum attempts per shard before the run is canceled
    pub max_attempts: u32,

    /// Connection string for the source-metadata document store
    #[serde(rename = "MongoDB")]
    pub mongo_db: String,
}

/// Basic-auth credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ElasticAuth {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Closed UCI interval driving the shard plan
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryRange {
    pub start: i64,
    pub finish: i64,
}

fn default_log_path() -> PathBuf {
    PathBuf::from("./logs")
}

impl Config {
    /// Load and validate configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            IndexError::config(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        let config: Config = serde_yaml::from_str(&data)
            .map_err(|e| IndexError::config(format!("invalid config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration, fatal at startup before any worker runs
    pub fn validate(&self) -> Result<()> {
        if self.oracle_conn.is_empty() {
            return Err(IndexError::config("OracleConn must not be empty"));
        }
        if self.elastic_host.is_empty() {
            return Err(IndexError::config("ElasticHost must not be empty"));
        }
        if self.index.is_empty() {
            return Err(IndexError::config("Index must not be empty"));
        }
        if self.es_index_settings.is_empty() {
            return Err(IndexError::config(
                "ESIndexSettings must hold the index mapping JSON",
            ));
        }
        if self.bulk_limit == 0 {
            return Err(IndexError::config("BulkLimit must be greater than 0"));
        }
        if self.max_bulk_calls == 0 {
            return Err(IndexError::config("MaxBulkCalls must be greater than 0"));
        }
        if self.query.is_empty() {
            return Err(IndexError::config("Query must not be empty"));
        }
        if self.interval <= 0 {
            return Err(IndexError::config("Interval must be greater than 0"));
        }
        if self.max_concurrent == 0 {
            return Err(IndexError::config("MaxConcurrent must be greater than 0"));
        }
        if self.max_attempts == 0 {
            return Err(IndexError::config("MaxAttempts must be greater than 0"));
        }
        Ok(())
    }
}

/// Render the extraction query template for one UCI range
///
/// The template carries two `%d` slots; the first receives the range start,
/// the second the (exclusive) range end.
pub fn render_range_query(template: &str, start: i64, end: i64) -> String {
    let rendered = template.replacen("%d", &start.to_string(), 1);
    rendered.replacen("%d", &end.to_string(), 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml() -> String {
        r#"
LogPath: /var/log/unichem
OracleConn: postgres://unichem@db/unichem
ElasticHost: http://localhost:9200
ElasticAuth:
  Username: elastic
  Password: secret
Index: unichem
Type: compound
ESIndexSettings: '{"mappings":{}}'
BulkLimit: 1000
MaxBulkCalls: 4
Query: "SELECT * FROM UC_STRUCTURE WHERE UCI >= %d AND UCI < %d ORDER BY UCI"
QueryMax:
  Start: 0
  Finish: 100000
Interval: 10000
MaxConcurrent: 6
MaxAttempts: 3
MongoDB: mongodb://localhost:27017
"#
        .to_string()
    }

    #[test]
    fn parses_sample_config() {
        let config: Config = serde_yaml::from_str(&sample_yaml()).unwrap();
        assert_eq!(config.log_path, PathBuf::from("/var/log/unichem"));
        assert_eq!(config.elastic_auth.username, "elastic");
        assert_eq!(config.type_name, "compound");
        assert_eq!(config.query_max.start, 0);
        assert_eq!(config.query_max.finish, 100000);
        assert_eq!(config.max_attempts, 3);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_zero_bulk_limit() {
        let yaml = sample_yaml().replace("BulkLimit: 1000", "BulkLimit: 0");
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_host() {
        let yaml = sample_yaml().replace("ElasticHost: http://localhost:9200", "ElasticHost: \"\"");
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn renders_both_range_slots() {
        let query = render_range_query("UCI >= %d AND UCI < %d", 100, 200);
        assert_eq!(query, "UCI >= 100 AND UCI < 200");
    }

    #[test]
    fn render_leaves_extra_slots_alone() {
        assert_eq!(render_range_query("%d %d %d", 1, 2), "1 2 %d");
    }
}
