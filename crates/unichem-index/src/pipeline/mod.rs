//! The extraction pipeline
//!
//! A [`supervisor::Supervisor`] plans UCI shards and runs one
//! [`extractor::ExtractorRunner`] worker per shard under a concurrency bound.
//! Inside a worker, the [`aggregator::RowAggregator`] folds consecutive rows
//! into compound documents, the InChI parser decomposes each document, and
//! the bulk batcher ships them to the index. Workers report back with a
//! typed [`ShardReport`]; the supervisor alone decides retries and
//! termination.

pub mod aggregator;
pub mod extractor;
pub mod supervisor;

pub use aggregator::RowAggregator;
pub use extractor::ExtractorRunner;
pub use supervisor::{plan_shards, RunSummary, Supervisor};

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;

/// Run a full sharded extraction over the configured UCI range
pub async fn run_extraction(config: Arc<Config>, cancel: CancellationToken) -> RunSummary {
    let shards = plan_shards(config.query_max, config.interval);
    let runner = Arc::new(ExtractorRunner::new(Arc::clone(&config)));
    Supervisor::new(config.max_concurrent, config.max_attempts, cancel)
        .run(shards, runner)
        .await
}

/// Run one fixed query through a single worker, for recovery sweeps
pub async fn run_single(config: Arc<Config>, query: String, cancel: CancellationToken) -> RunSummary {
    let shard = Shard {
        id: 0,
        start: 0,
        end: 0,
    };
    let runner = Arc::new(ExtractorRunner::with_query(Arc::clone(&config), query));
    Supervisor::new(1, config.max_attempts, cancel)
        .run(vec![shard], runner)
        .await
}

/// One half-open UCI interval `[start, end)` owned by a single worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shard {
    pub id: usize,
    pub start: i64,
    pub end: i64,
}

/// How one worker attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    Success,
    /// Query or row decode failure; the range can be retried
    DbError,
    /// A bulk request failed outright or reported failed items; the range
    /// can be retried because upserts are idempotent by UCI
    BatchError,
    /// The InChI grammar was violated; corrupt upstream data or a parser
    /// bug, never retried
    ParseFatal,
    Canceled,
}

impl WorkerOutcome {
    /// Whether the supervisor may retry the shard after this outcome
    pub fn is_recoverable(self) -> bool {
        matches!(self, WorkerOutcome::DbError | WorkerOutcome::BatchError)
    }
}

/// Worker result message sent back to the supervisor
#[derive(Debug, Clone, Copy)]
pub struct ShardReport {
    pub outcome: WorkerOutcome,
    /// Highest UCI confirmed indexed by any batch response of this attempt
    pub last_succeeded_uci: i64,
}

/// Executes one shard attempt; the production implementation drives a real
/// extraction, tests substitute scripted outcomes
#[async_trait]
pub trait ShardRunner: Send + Sync + 'static {
    async fn run_shard(
        &self,
        shard: Shard,
        attempt: u32,
        cancel: CancellationToken,
    ) -> ShardReport;
}
