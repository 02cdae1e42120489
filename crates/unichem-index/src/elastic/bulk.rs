//! Bounded bulk batching of compound upserts
//!
//! One batcher is owned by exactly one worker. Operations accumulate until
//! the batch limit, then the batch is dispatched on its own task; at most
//! `max_in_flight` dispatches run at once, enforced with a counting
//! semaphore. Every dispatched batch produces exactly one [`BatchEvent`] on
//! the event channel, which the owning worker drains.
//!
//! The batcher never retries a batch; retry policy lives with the
//! supervisor.

use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use unichem_common::{IndexError, Result};

use super::{BulkOperation, BulkSink, BulkSummary};
use crate::model::Compound;

/// Outcome event of one dispatched batch
#[derive(Debug)]
pub enum BatchEvent {
    /// The index answered; the response may still report failed items
    Response(BulkSummary),
    /// The request itself failed (network, auth, non-2xx)
    Error(IndexError),
}

/// Accumulates upserts into bounded batches and dispatches them
pub struct BulkBatcher<S: BulkSink> {
    sink: Arc<S>,
    batch_limit: usize,
    buffer: Vec<BulkOperation>,
    in_flight: Arc<Semaphore>,
    events: mpsc::UnboundedSender<BatchEvent>,
    cancel: CancellationToken,
    dispatched: usize,
}

impl<S: BulkSink> BulkBatcher<S> {
    /// Create a batcher and the event receiver its owner drains
    pub fn new(
        sink: Arc<S>,
        batch_limit: usize,
        max_in_flight: usize,
        cancel: CancellationToken,
    ) -> (Self, mpsc::UnboundedReceiver<BatchEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sink,
                batch_limit,
                buffer: Vec::with_capacity(batch_limit),
                in_flight: Arc::new(Semaphore::new(max_in_flight)),
                events,
                cancel,
                dispatched: 0,
            },
            receiver,
        )
    }

    /// Number of batches dispatched so far; its owner must drain exactly
    /// this many events
    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    /// Buffer one compound upsert, dispatching when the batch fills
    ///
    /// Suspends while `max_in_flight` batches are outstanding; observes
    /// cancellation while waiting.
    pub async fn add(&mut self, compound: &Compound) -> Result<()> {
        self.buffer.push(BulkOperation::upsert(compound)?);
        if self.buffer.len() >= self.batch_limit {
            self.dispatch().await?;
        }
        Ok(())
    }

    /// Send any buffered remainder inline and emit its event
    ///
    /// No-op on an empty buffer.
    pub async fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            debug!("No buffered operations, skipping final bulk");
            return Ok(());
        }
        if self.cancel.is_cancelled() {
            return Err(IndexError::Canceled);
        }
        let operations = std::mem::take(&mut self.buffer);
        self.dispatched += 1;
        debug!(operations = operations.len(), "Sending final bulk");
        let event = match self.sink.send_bulk(&operations).await {
            Ok(summary) => BatchEvent::Response(summary),
            Err(e) => BatchEvent::Error(e),
        };
        // The receiver lives in the owning worker; a send can only fail
        // after the worker gave up draining.
        let _ = self.events.send(event);
        Ok(())
    }

    /// Dispatch the full buffer on its own task
    async fn dispatch(&mut self) -> Result<()> {
        if self.cancel.is_cancelled() {
            // Declined: no new batches once the run is canceled. In-flight
            // dispatches still complete and emit their events.
            return Err(IndexError::Canceled);
        }

        let permit = tokio::select! {
            permit = self.in_flight.clone().acquire_owned() => {
                permit.map_err(|_| IndexError::Canceled)?
            }
            _ = self.cancel.cancelled() => return Err(IndexError::Canceled),
        };

        let operations = std::mem::take(&mut self.buffer);
        self.buffer = Vec::with_capacity(self.batch_limit);
        self.dispatched += 1;

        let first = operations.first().map(|op| op.id.clone()).unwrap_or_default();
        debug!(operations = operations.len(), first_uci = %first, "Dispatching bulk");

        let sink = Arc::clone(&self.sink);
        let events = self.events.clone();
        tokio::spawn(async move {
            let event = match sink.send_bulk(&operations).await {
                Ok(summary) => BatchEvent::Response(summary),
                Err(e) => BatchEvent::Error(e),
            };
            let _ = events.send(event);
            drop(permit);
        });
        Ok(())
    }
}
