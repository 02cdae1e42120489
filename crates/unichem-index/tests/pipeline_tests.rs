//! Integration tests for the aggregation + batching half of the pipeline
//!
//! Drives the row aggregator and the bulk batcher together against an
//! in-memory sink, the way one worker does, and checks the accounting
//! invariants the supervisor relies on.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use unichem_common::Result;
use unichem_index::db::CompoundRow;
use unichem_index::elastic::{BatchEvent, BulkBatcher, BulkOperation, BulkSink, BulkSummary};
use unichem_index::inchi::{parse_inchi, split_components};
use unichem_index::pipeline::RowAggregator;

/// Records every batch it is handed and answers with full success
struct RecordingSink {
    batches: Mutex<Vec<Vec<String>>>,
    calls: AtomicUsize,
}

impl RecordingSink {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            batches: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl BulkSink for RecordingSink {
    async fn send_bulk(&self, operations: &[BulkOperation]) -> Result<BulkSummary> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let ids: Vec<String> = operations.iter().map(|op| op.id.clone()).collect();
        let last = ids.iter().filter_map(|id| id.parse::<i64>().ok()).max();
        self.batches.lock().unwrap().push(ids);
        Ok(BulkSummary {
            succeeded: operations.len(),
            last_succeeded_uci: last,
            ..BulkSummary::default()
        })
    }
}

fn row(uci: i64, src_id: i32, assignment: i32) -> CompoundRow {
    CompoundRow {
        uci,
        standard_inchi: "InChI=1S/C2H4.H2O/c1-2;/h1-2H2;1H2".to_string(),
        standard_inchi_key: format!("KEY-{uci}"),
        smiles: "C=C.O".to_string(),
        src_compound_id: format!("SRC-{uci}-{src_id}"),
        assignment,
        src_id,
        name: format!("source-{src_id}"),
        name_label: format!("label-{src_id}"),
        ..CompoundRow::default()
    }
}

#[tokio::test]
async fn one_upsert_per_distinct_uci() {
    let sink = RecordingSink::new();
    let (mut batcher, mut events) =
        BulkBatcher::new(Arc::clone(&sink), 3, 2, CancellationToken::new());

    // 5 distinct UCIs spread over 9 rows.
    let ucis = [1i64, 1, 2, 3, 3, 3, 4, 5, 5];
    let mut aggregator = RowAggregator::new();
    let mut emitted = Vec::new();

    for (i, uci) in ucis.iter().enumerate() {
        let assignment = if i % 2 == 0 { 1 } else { 2 };
        if let Some(compound) = aggregator.push(row(*uci, i as i32, assignment)) {
            emitted.push(compound.uci);
            batcher.add(&compound).await.unwrap();
        }
    }
    if let Some(compound) = aggregator.finish() {
        emitted.push(compound.uci);
        batcher.add(&compound).await.unwrap();
    }
    batcher.flush().await.unwrap();

    assert_eq!(emitted, vec![1, 2, 3, 4, 5]);

    // Quiescence: every dispatched batch answers exactly once, and the ids
    // seen by the sink are exactly the distinct UCIs, in order.
    let mut last_succeeded = 0;
    for _ in 0..batcher.dispatched() {
        match events.recv().await.unwrap() {
            BatchEvent::Response(summary) => {
                last_succeeded = last_succeeded.max(summary.last_succeeded_uci.unwrap_or(0));
            }
            BatchEvent::Error(e) => panic!("unexpected bulk error: {e}"),
        }
    }
    assert!(events.try_recv().is_err());
    assert_eq!(sink.calls.load(Ordering::SeqCst), batcher.dispatched());
    assert_eq!(last_succeeded, 5);

    let flat: Vec<String> = sink.batches.lock().unwrap().concat();
    assert_eq!(flat, vec!["1", "2", "3", "4", "5"]);
}

#[tokio::test]
async fn documents_carry_split_components_and_filtered_sources() {
    let sink = RecordingSink::new();
    let (mut batcher, mut events) =
        BulkBatcher::new(Arc::clone(&sink), 10, 2, CancellationToken::new());

    let mut aggregator = RowAggregator::new();
    aggregator.push(row(10, 1, 1));
    aggregator.push(row(10, 2, 2));
    let mut compound = aggregator.finish().unwrap();

    // The worker decomposes the InChI before handing the document over.
    let parsed = parse_inchi(&compound.inchi.inchi).unwrap();
    compound.components = split_components(&parsed).unwrap();
    compound.inchi = parsed;

    assert_eq!(compound.sources.len(), 1);
    assert_eq!(compound.sources[0].id, 1);
    assert!(!compound.is_sourceless);

    batcher.add(&compound).await.unwrap();
    batcher.flush().await.unwrap();

    match events.recv().await.unwrap() {
        BatchEvent::Response(summary) => assert_eq!(summary.succeeded, 1),
        BatchEvent::Error(e) => panic!("unexpected bulk error: {e}"),
    }

    let op = BulkOperation::upsert(&compound).unwrap();
    assert_eq!(op.id, "10");
    assert_eq!(op.doc["inchi"]["formula"], "C2H4.H2O");
    assert_eq!(op.doc["components"].as_array().unwrap().len(), 2);
    assert_eq!(op.doc["components"][0]["formula"], "C2H4");
    assert_eq!(op.doc["sources"].as_array().unwrap().len(), 1);
    assert_eq!(op.doc["sources"][0]["name_label"], "label-1");
    assert_eq!(op.doc["is_sourceless"], false);
}

#[tokio::test]
async fn sourceless_compound_survives_to_the_document() {
    let mut aggregator = RowAggregator::new();
    aggregator.push(row(42, 1, 0));
    aggregator.push(row(42, 2, 3));
    let compound = aggregator.finish().unwrap();

    assert!(compound.sources.is_empty());
    assert!(compound.is_sourceless);

    let op = BulkOperation::upsert(&compound).unwrap();
    assert_eq!(op.doc["is_sourceless"], true);
    // Empty collections are elided from the document entirely.
    assert!(op.doc.get("sources").is_none());
    assert!(op.doc.get("components").is_none());
}
