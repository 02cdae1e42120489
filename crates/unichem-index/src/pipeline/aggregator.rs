//! Folds the ordered row stream into compound documents
//!
//! The cursor yields one row per cross-reference, ordered by UCI, so all
//! rows of one compound arrive consecutively. The aggregator merges them
//! into a single [`Compound`], keeping only sources whose assignment marks
//! them as current.

use chrono::Utc;
use tracing::debug;

use crate::db::{CompoundRow, KEPT_ASSIGNMENT};
use crate::inchi::Inchi;
use crate::model::{Compound, CompoundSource};

/// Merges consecutive rows with equal UCI into one compound
///
/// Emission order follows input order, with at most one compound per UCI;
/// this relies on the upstream `ORDER BY UCI`.
#[derive(Debug, Default)]
pub struct RowAggregator {
    pending: Option<Compound>,
}

impl RowAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one row; returns the previous compound when the UCI changes
    pub fn push(&mut self, row: CompoundRow) -> Option<Compound> {
        let source = (row.assignment == KEPT_ASSIGNMENT).then(|| source_from_row(&row));

        match &mut self.pending {
            Some(pending) if pending.uci == row.uci => {
                debug!(uci = row.uci, "Row continues the pending compound");
                pending.sources.extend(source);
                None
            }
            _ => {
                let next = compound_from_row(&row, source);
                self.pending.replace(next).map(seal)
            }
        }
    }

    /// End of stream: emit the last pending compound
    ///
    /// A pending compound with a zero UCI is dropped; it can only come from
    /// a cursor that never produced a real key.
    pub fn finish(&mut self) -> Option<Compound> {
        self.pending.take().filter(|c| c.uci != 0).map(seal)
    }
}

fn seal(mut compound: Compound) -> Compound {
    compound.is_sourceless = compound.sources.is_empty();
    compound
}

fn compound_from_row(row: &CompoundRow, source: Option<CompoundSource>) -> Compound {
    Compound {
        uci: row.uci,
        inchi: Inchi {
            inchi: row.standard_inchi.clone(),
            ..Inchi::default()
        },
        components: Vec::new(),
        standard_inchi_key: row.standard_inchi_key.clone(),
        smiles: row.smiles.clone(),
        sources: source.into_iter().collect(),
        created_at: Utc::now(),
        is_sourceless: false,
    }
}

fn source_from_row(row: &CompoundRow) -> CompoundSource {
    CompoundSource {
        id: row.src_id,
        name: row.name.clone(),
        long_name: row.name_long.clone(),
        compound_id: row.src_compound_id.clone(),
        description: row.description.clone(),
        base_url: row.base_id_url.clone(),
        short_name: String::new(),
        name_label: row.name_label.clone(),
        base_id_url_available: row.base_id_url_available,
        aux_src: String::new(),
        aux_for_url: row.aux_for_url,
        created_at: row.created,
        last_updated: row.last_updated,
        is_private: row.private,
    }
}
