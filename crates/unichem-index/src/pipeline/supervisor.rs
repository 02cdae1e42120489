//! Shard planning, admission control, and retry policy
//!
//! The supervisor turns the configured UCI range into contiguous shards,
//! runs one worker per shard under the `MaxConcurrent` admission gate, and
//! is the single authority over retries: recoverable outcomes re-spawn the
//! shard until its attempt budget is spent, fatal outcomes trip the shared
//! cancellation scope.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{Shard, ShardReport, ShardRunner, WorkerOutcome};
use crate::config::QueryRange;

/// Delay before releasing workers after the first, amortizing cold-start
/// cost (driver handshake, index existence check).
const HEAD_START: Duration = Duration::from_millis(300);

/// Plan contiguous worker shards over the configured UCI range
///
/// `((finish - start) / interval) + 1` shards, so the finish boundary is
/// always covered; shard ids are the enumeration index.
pub fn plan_shards(range: QueryRange, interval: i64) -> Vec<Shard> {
    let iterations = ((range.finish - range.start) / interval) + 1;
    (0..iterations.max(0))
        .map(|i| Shard {
            id: i as usize,
            start: range.start + i * interval,
            end: range.start + (i + 1) * interval,
        })
        .collect()
}

/// Final state of one shard after the run
#[derive(Debug, Clone, Copy)]
pub struct ShardStatus {
    pub shard: Shard,
    pub attempts: u32,
    pub outcome: WorkerOutcome,
    pub last_succeeded_uci: i64,
}

/// Aggregate result of one supervised run
#[derive(Debug)]
pub struct RunSummary {
    /// Whether the cancellation scope tripped (signal, fatal outcome, or a
    /// spent retry budget); drives the process exit code
    pub canceled: bool,
    pub shards: Vec<ShardStatus>,
    pub elapsed: Duration,
}

/// Coordinates workers over one set of shards
pub struct Supervisor {
    max_concurrent: usize,
    max_attempts: u32,
    cancel: CancellationToken,
}

impl Supervisor {
    pub fn new(max_concurrent: usize, max_attempts: u32, cancel: CancellationToken) -> Self {
        Self {
            max_concurrent,
            max_attempts,
            cancel,
        }
    }

    /// Run every shard to completion, applying the retry policy
    pub async fn run<R: ShardRunner>(&self, shards: Vec<Shard>, runner: Arc<R>) -> RunSummary {
        let started = Instant::now();
        info!(
            shards = shards.len(),
            max_concurrent = self.max_concurrent,
            max_attempts = self.max_attempts,
            "Dispatching extraction workers"
        );

        let gate = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks: JoinSet<(Shard, u32, ShardReport)> = JoinSet::new();
        let mut attempts: HashMap<usize, u32> = HashMap::new();
        let mut statuses: HashMap<usize, ShardStatus> = HashMap::new();

        for (position, shard) in shards.iter().copied().enumerate() {
            attempts.insert(shard.id, 1);
            self.spawn_shard(&mut tasks, Arc::clone(&gate), Arc::clone(&runner), shard, 1);
            if position == 0 {
                tokio::time::sleep(HEAD_START).await;
            }
        }

        while let Some(joined) = tasks.join_next().await {
            let (shard, attempt, report) = match joined {
                Ok(result) => result,
                Err(e) => {
                    error!(error = %e, "Worker task aborted; canceling run");
                    self.cancel.cancel();
                    continue;
                }
            };

            statuses.insert(
                shard.id,
                ShardStatus {
                    shard,
                    attempts: attempt,
                    outcome: report.outcome,
                    last_succeeded_uci: report.last_succeeded_uci,
                },
            );

            match report.outcome {
                WorkerOutcome::Success => {
                    info!(
                        worker = shard.id,
                        start = shard.start,
                        end = shard.end,
                        "DONE extraction worker"
                    );
                }
                WorkerOutcome::Canceled => {
                    warn!(worker = shard.id, "Worker observed cancellation");
                }
                WorkerOutcome::ParseFatal => {
                    error!(
                        worker = shard.id,
                        "InChI grammar violation; canceling the whole run"
                    );
                    self.cancel.cancel();
                }
                WorkerOutcome::DbError | WorkerOutcome::BatchError => {
                    self.handle_recoverable(&mut tasks, &gate, &runner, &mut attempts, shard);
                }
            }
        }

        let canceled = self.cancel.is_cancelled();
        let mut shards: Vec<ShardStatus> = statuses.into_values().collect();
        shards.sort_by_key(|status| status.shard.id);
        for status in &shards {
            warn!(
                worker = status.shard.id,
                started = status.shard.start,
                last_succeeded_uci = status.last_succeeded_uci,
                attempts = status.attempts,
                "Worker final state"
            );
        }
        let elapsed = started.elapsed();
        info!(elapsed = ?elapsed, canceled, "Extraction finished");

        RunSummary {
            canceled,
            shards,
            elapsed,
        }
    }

    fn handle_recoverable<R: ShardRunner>(
        &self,
        tasks: &mut JoinSet<(Shard, u32, ShardReport)>,
        gate: &Arc<Semaphore>,
        runner: &Arc<R>,
        attempts: &mut HashMap<usize, u32>,
        shard: Shard,
    ) {
        warn!(
            worker = shard.id,
            start = shard.start,
            end = shard.end,
            "FAILED extraction worker"
        );

        let spent = attempts.get(&shard.id).copied().unwrap_or(1);
        if spent >= self.max_attempts {
            error!(
                worker = shard.id,
                attempts = spent,
                "Retry budget exhausted; canceling the whole run"
            );
            self.cancel.cancel();
            return;
        }
        if self.cancel.is_cancelled() {
            warn!(worker = shard.id, "Run already canceled, not retrying");
            return;
        }

        let next = spent + 1;
        attempts.insert(shard.id, next);
        warn!(worker = shard.id, attempt = next, "Retrying shard");
        self.spawn_shard(tasks, Arc::clone(gate), Arc::clone(runner), shard, next);
    }

    fn spawn_shard<R: ShardRunner>(
        &self,
        tasks: &mut JoinSet<(Shard, u32, ShardReport)>,
        gate: Arc<Semaphore>,
        runner: Arc<R>,
        shard: Shard,
        attempt: u32,
    ) {
        let cancel = self.cancel.clone();
        tasks.spawn(async move {
            // Admission gate: a worker starts only once a slot frees up.
            let _permit = tokio::select! {
                permit = gate.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (
                            shard,
                            attempt,
                            ShardReport {
                                outcome: WorkerOutcome::Canceled,
                                last_succeeded_uci: 0,
                            },
                        )
                    }
                },
                _ = cancel.cancelled() => {
                    return (
                        shard,
                        attempt,
                        ShardReport {
                            outcome: WorkerOutcome::Canceled,
                            last_succeeded_uci: 0,
                        },
                    )
                }
            };
            let report = runner.run_shard(shard, attempt, cancel).await;
            (shard, attempt, report)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn range(start: i64, finish: i64) -> QueryRange {
        QueryRange { start, finish }
    }

    #[test]
    fn plans_contiguous_shards_covering_the_finish_boundary() {
        let shards = plan_shards(range(0, 100_000), 10_000);
        assert_eq!(shards.len(), 11);
        assert_eq!(shards[0].start, 0);
        assert_eq!(shards[0].end, 10_000);
        assert_eq!(shards[10].start, 100_000);
        assert_eq!(shards[10].end, 110_000);
        for pair in shards.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
            assert_eq!(pair[0].id + 1, pair[1].id);
        }
    }

    #[test]
    fn plans_single_shard_for_tiny_ranges() {
        let shards = plan_shards(range(5, 9), 100);
        assert_eq!(shards.len(), 1);
        assert_eq!(shards[0].start, 5);
        assert_eq!(shards[0].end, 105);
    }

    /// Runner scripted per (shard id, attempt); everything else succeeds
    struct ScriptedRunner {
        script: HashMap<(usize, u32), WorkerOutcome>,
        invocations: Mutex<Vec<(usize, u32)>>,
        running: AtomicUsize,
        max_running: AtomicUsize,
    }

    impl ScriptedRunner {
        fn new(script: impl IntoIterator<Item = ((usize, u32), WorkerOutcome)>) -> Arc<Self> {
            Arc::new(Self {
                script: script.into_iter().collect(),
                invocations: Mutex::new(Vec::new()),
                running: AtomicUsize::new(0),
                max_running: AtomicUsize::new(0),
            })
        }

        fn invocations(&self) -> Vec<(usize, u32)> {
            self.invocations.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ShardRunner for ScriptedRunner {
        async fn run_shard(
            &self,
            shard: Shard,
            attempt: u32,
            cancel: CancellationToken,
        ) -> ShardReport {
            if cancel.is_cancelled() {
                return ShardReport {
                    outcome: WorkerOutcome::Canceled,
                    last_succeeded_uci: 0,
                };
            }
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            self.invocations.lock().unwrap().push((shard.id, attempt));
            let outcome = self
                .script
                .get(&(shard.id, attempt))
                .copied()
                .unwrap_or(WorkerOutcome::Success);
            ShardReport {
                outcome,
                last_succeeded_uci: shard.end - 1,
            }
        }
    }

    fn supervisor(max_concurrent: usize, max_attempts: u32) -> Supervisor {
        Supervisor::new(max_concurrent, max_attempts, CancellationToken::new())
    }

    #[tokio::test]
    async fn batch_error_is_retried_and_second_attempt_succeeds() {
        let runner = ScriptedRunner::new([((0, 1), WorkerOutcome::BatchError)]);
        let shards = plan_shards(range(0, 0), 100);
        let summary = supervisor(2, 3).run(shards, Arc::clone(&runner)).await;

        assert!(!summary.canceled);
        assert_eq!(summary.shards.len(), 1);
        assert_eq!(summary.shards[0].attempts, 2);
        assert_eq!(summary.shards[0].outcome, WorkerOutcome::Success);
        assert_eq!(runner.invocations(), vec![(0, 1), (0, 2)]);
    }

    #[tokio::test]
    async fn retry_budget_exhaustion_cancels_the_run() {
        let runner = ScriptedRunner::new([
            ((0, 1), WorkerOutcome::DbError),
            ((0, 2), WorkerOutcome::DbError),
        ]);
        let shards = plan_shards(range(0, 0), 100);
        let summary = supervisor(2, 2).run(shards, Arc::clone(&runner)).await;

        assert!(summary.canceled);
        // The shard never runs a third time.
        assert_eq!(runner.invocations(), vec![(0, 1), (0, 2)]);
    }

    #[tokio::test]
    async fn parse_fatal_cancels_without_retry() {
        let runner = ScriptedRunner::new([((0, 1), WorkerOutcome::ParseFatal)]);
        let shards = plan_shards(range(0, 0), 100);
        let summary = supervisor(2, 5).run(shards, Arc::clone(&runner)).await;

        assert!(summary.canceled);
        assert_eq!(runner.invocations(), vec![(0, 1)]);
    }

    #[tokio::test]
    async fn concurrency_stays_within_the_admission_gate() {
        let runner = ScriptedRunner::new([]);
        let shards = plan_shards(range(0, 500), 100);
        assert_eq!(shards.len(), 6);
        let summary = supervisor(2, 1).run(shards, Arc::clone(&runner)).await;

        assert!(!summary.canceled);
        assert_eq!(summary.shards.len(), 6);
        assert!(runner.max_running.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn summary_reports_last_succeeded_uci_per_shard() {
        let runner = ScriptedRunner::new([]);
        let shards = plan_shards(range(0, 100), 100);
        let summary = supervisor(2, 1).run(shards, runner).await;

        assert_eq!(summary.shards.len(), 2);
        assert_eq!(summary.shards[0].last_succeeded_uci, 99);
        assert_eq!(summary.shards[1].last_succeeded_uci, 199);
    }
}
