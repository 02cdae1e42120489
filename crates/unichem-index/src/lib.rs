//! UniChem-to-index bulk indexer
//!
//! Streams the UniChem compound catalog out of the relational database in
//! UCI ranges, decomposes each compound's InChI into typed layers and
//! per-component records, and upserts the resulting documents into an
//! Elasticsearch index in bounded bulk batches. A secondary update mode
//! rescues newly appended UCIs and recently changed source rows, and a
//! validation step cross-checks catalog and index cardinality.
//!
//! Module map:
//!
//! - [`config`]: YAML configuration and query templating
//! - [`db`]: relational row source
//! - [`inchi`]: InChI parsing and mixture splitting
//! - [`elastic`]: index REST client and the bulk batcher
//! - [`pipeline`]: aggregator, workers, and the supervisor
//! - [`update`], [`validate`], [`sources`]: the update/validate/refresh path

pub mod config;
pub mod db;
pub mod elastic;
pub mod inchi;
pub mod model;
pub mod pipeline;
pub mod sources;
pub mod update;
pub mod validate;
