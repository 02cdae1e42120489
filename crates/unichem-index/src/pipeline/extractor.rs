//! One extraction worker: a UCI shard from cursor to index
//!
//! The worker owns its database pool, its index client and its batcher; no
//! client state is shared across workers. It pumps rows through the
//! aggregator and the InChI parser into the batcher, then stays alive until
//! every dispatched batch has answered, and finally reports a typed outcome
//! to the supervisor.

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::postgres::PgPool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use unichem_common::IndexError;

use super::{RowAggregator, Shard, ShardReport, ShardRunner, WorkerOutcome};
use crate::config::{render_range_query, Config};
use crate::db;
use crate::elastic::{BatchEvent, BulkBatcher, ElasticClient};
use crate::inchi::{parse_inchi, split_components, InchiParseError};
use crate::model::Compound;

/// How one row pump ended, before batch responses are folded in
enum PumpEnd {
    Finished,
    Canceled,
    Db,
    Parse,
}

/// Production shard runner: extracts one UCI range per invocation
pub struct ExtractorRunner {
    config: Arc<Config>,
    /// Fixed query for single-shard recovery runs; the sharded path renders
    /// the configured template per shard instead
    query_override: Option<String>,
}

impl ExtractorRunner {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            query_override: None,
        }
    }

    /// Runner that executes one fixed query instead of the range template
    pub fn with_query(config: Arc<Config>, query: String) -> Self {
        Self {
            config,
            query_override: Some(query),
        }
    }

    fn query_for(&self, shard: Shard) -> String {
        match &self.query_override {
            Some(query) => query.clone(),
            None => render_range_query(&self.config.query, shard.start, shard.end),
        }
    }

    /// Decompose the raw InChI of a finished compound into typed layers and
    /// per-component records
    fn prepare_document(compound: &mut Compound) -> Result<(), InchiParseError> {
        if compound.inchi.inchi.is_empty() {
            warn!(uci = compound.uci, "Compound without InChI, skipping split");
            return Ok(());
        }
        let parsed = parse_inchi(&compound.inchi.inchi)?;
        compound.components = split_components(&parsed)?;
        compound.inchi = parsed;
        Ok(())
    }

    async fn index_compound(
        &self,
        batcher: &mut BulkBatcher<ElasticClient>,
        mut compound: Compound,
    ) -> Result<(), PumpEnd> {
        if let Err(e) = Self::prepare_document(&mut compound) {
            error!(uci = compound.uci, error = %e, "InChI decomposition failed");
            return Err(PumpEnd::Parse);
        }
        debug!(
            uci = compound.uci,
            sources = compound.sources.len(),
            components = compound.components.len(),
            "Adding compound to bulk"
        );
        match batcher.add(&compound).await {
            Ok(()) => Ok(()),
            Err(IndexError::Canceled) => Err(PumpEnd::Canceled),
            Err(e) => {
                error!(uci = compound.uci, error = %e, "Failed to buffer compound");
                Err(PumpEnd::Parse)
            }
        }
    }

    /// Pump the cursor through aggregation and batching until it is
    /// exhausted, canceled, or fails
    async fn pump(
        &self,
        shard: Shard,
        pool: &PgPool,
        query: &str,
        batcher: &mut BulkBatcher<ElasticClient>,
        cancel: &CancellationToken,
    ) -> PumpEnd {
        let mut aggregator = RowAggregator::new();
        let mut rows = sqlx::query(query).fetch(pool);

        loop {
            if cancel.is_cancelled() {
                warn!(worker = shard.id, "Interrupting extraction, run canceled");
                return PumpEnd::Canceled;
            }
            let row = match rows.try_next().await {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(e) => {
                    error!(worker = shard.id, error = %e, "Row fetch failed");
                    return PumpEnd::Db;
                }
            };
            let row = match db::decode_compound_row(&row) {
                Ok(row) => row,
                Err(e) => {
                    error!(worker = shard.id, error = %e, "Row decode failed");
                    return PumpEnd::Db;
                }
            };
            if let Some(compound) = aggregator.push(row) {
                if let Err(end) = self.index_compound(batcher, compound).await {
                    return end;
                }
            }
        }

        if let Some(compound) = aggregator.finish() {
            if let Err(end) = self.index_compound(batcher, compound).await {
                return end;
            }
        }

        info!(worker = shard.id, started = shard.start, "Sending last bulk");
        match batcher.flush().await {
            Ok(()) => PumpEnd::Finished,
            Err(IndexError::Canceled) => PumpEnd::Canceled,
            Err(e) => {
                error!(worker = shard.id, error = %e, "Final bulk failed");
                PumpEnd::Db
            }
        }
    }
}

#[async_trait]
impl ShardRunner for ExtractorRunner {
    async fn run_shard(
        &self,
        shard: Shard,
        attempt: u32,
        cancel: CancellationToken,
    ) -> ShardReport {
        info!(
            worker = shard.id,
            attempt,
            start = shard.start,
            end = shard.end,
            "STARTED extraction worker"
        );

        let pool = match db::connect(&self.config.oracle_conn).await {
            Ok(pool) => pool,
            Err(e) => {
                error!(worker = shard.id, error = %e, "Database connection failed");
                return ShardReport {
                    outcome: WorkerOutcome::DbError,
                    last_succeeded_uci: 0,
                };
            }
        };
        info!(worker = shard.id, "Connected to the catalog database");

        let client = match self.init_index_client(shard).await {
            Ok(client) => client,
            Err(e) => {
                error!(worker = shard.id, error = %e, "Index client setup failed");
                pool.close().await;
                return ShardReport {
                    outcome: WorkerOutcome::BatchError,
                    last_succeeded_uci: 0,
                };
            }
        };

        let (mut batcher, mut events) = BulkBatcher::new(
            Arc::new(client),
            self.config.bulk_limit,
            self.config.max_bulk_calls,
            cancel.clone(),
        );

        let query = self.query_for(shard);
        let end = self.pump(shard, &pool, &query, &mut batcher, &cancel).await;
        pool.close().await;

        // Every dispatched batch owes exactly one event; drain them all so
        // in-flight requests are observed even on failure paths.
        let mut last_succeeded_uci = 0i64;
        let mut batch_failed = false;
        for _ in 0..batcher.dispatched() {
            match events.recv().await {
                Some(BatchEvent::Response(summary)) => {
                    if let Some(uci) = summary.last_succeeded_uci {
                        last_succeeded_uci = last_succeeded_uci.max(uci);
                    }
                    if summary.failed > 0 {
                        batch_failed = true;
                        error!(
                            worker = shard.id,
                            started = shard.start,
                            succeeded = summary.succeeded,
                            failed = summary.failed,
                            took = summary.took,
                            "WORKER_ERROR: bulk reported failed items"
                        );
                        for item in &summary.failed_items {
                            debug!(id = %item.id, reason = %item.reason, "Failed upsert");
                        }
                    } else {
                        info!(
                            worker = shard.id,
                            started = shard.start,
                            last_succeeded = summary.last_succeeded_uci,
                            took = summary.took,
                            "WORKER_RESPONSE"
                        );
                    }
                }
                Some(BatchEvent::Error(e)) => {
                    batch_failed = true;
                    error!(worker = shard.id, started = shard.start, error = %e, "Bulk request failed");
                }
                None => break,
            }
        }

        let outcome = match end {
            PumpEnd::Canceled => WorkerOutcome::Canceled,
            PumpEnd::Parse => WorkerOutcome::ParseFatal,
            PumpEnd::Db => WorkerOutcome::DbError,
            PumpEnd::Finished if batch_failed => WorkerOutcome::BatchError,
            PumpEnd::Finished => WorkerOutcome::Success,
        };

        ShardReport {
            outcome,
            last_succeeded_uci,
        }
    }
}

impl ExtractorRunner {
    async fn init_index_client(&self, shard: Shard) -> unichem_common::Result<ElasticClient> {
        let client = ElasticClient::new(
            &self.config.elastic_host,
            &self.config.elastic_auth,
            &self.config.index,
        )?;
        client.ping().await?;
        if client.ensure_index(&self.config.es_index_settings).await? {
            info!(worker = shard.id, index = %self.config.index, "Created index on first contact");
        }
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_splits_multi_component_inchi() {
        let mut compound = Compound {
            uci: 1,
            inchi: crate::inchi::Inchi {
                inchi: "InChI=1S/C2H4.H2O/c1-2;/h1-2H2;1H2".to_string(),
                ..Default::default()
            },
            ..Compound::default()
        };
        ExtractorRunner::prepare_document(&mut compound).unwrap();
        assert_eq!(compound.inchi.formula, "C2H4.H2O");
        assert_eq!(compound.components.len(), 2);
        assert_eq!(compound.components[0].formula, "C2H4");
    }

    #[test]
    fn prepare_keeps_empty_inchi_untouched() {
        let mut compound = Compound {
            uci: 2,
            ..Compound::default()
        };
        ExtractorRunner::prepare_document(&mut compound).unwrap();
        assert!(compound.inchi.formula.is_empty());
        assert!(compound.components.is_empty());
    }

    #[test]
    fn prepare_surfaces_grammar_violations() {
        let mut compound = Compound {
            uci: 3,
            inchi: crate::inchi::Inchi {
                inchi: "not-an-inchi".to_string(),
                ..Default::default()
            },
            ..Compound::default()
        };
        assert!(ExtractorRunner::prepare_document(&mut compound).is_err());
    }
}
