//! InChI layer model, parsing and component splitting
//!
//! An InChI is a `/`-delimited layered string: `InChI=` followed by a version
//! token, a molecular formula, and optional layers each introduced by a
//! single-letter prefix. [`parse_inchi`] decomposes the string into an
//! [`Inchi`]; [`split_components`] divides a mixture into one [`Inchi`] per
//! formula component.

pub mod parser;
pub mod split;

pub use parser::parse_inchi;
pub use split::split_components;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error produced while parsing or splitting an InChI string
///
/// Each variant carries the offending raw text for diagnostics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InchiParseError {
    /// The string does not follow the layer grammar (unknown or out-of-order
    /// layer prefix, missing `InChI=` marker)
    #[error("bad InChI format: {raw}")]
    BadPrefix { raw: String },

    /// A layer value violates its own shape (e.g. a multi-character
    /// stereo-type layer)
    #[error("bad layer format: {raw}")]
    BadLayer { raw: String },

    /// A per-component layer expanded to fewer items than the number of
    /// formula components
    #[error("layer does not cover all formula components: {raw}")]
    CountMismatch { raw: String },
}

/// An InChI decomposed into its typed layers
///
/// Layer fields hold the layer value without its `/x` prefix; an absent layer
/// is the empty string. `full_stereo` and `full_isotopic` are derived
/// concatenations, and `inchi` retains the raw input (or the canonical
/// re-serialization for split components).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inchi {
    pub version: String,
    pub formula: String,
    pub connections: String,
    pub h_atoms: String,
    pub charge: String,
    pub protons: String,
    pub stereo_dbond: String,
    #[serde(rename = "stereo_SP3")]
    pub stereo_sp3: String,
    #[serde(rename = "stereo_SP3_inverted")]
    pub stereo_sp3_inverted: String,
    pub stereo_type: String,
    pub isotopic_atoms: String,
    pub isotopic_exchangeable_h: String,
    pub full_stereo: String,
    pub full_isotopic: String,
    pub inchi: String,
}

impl Inchi {
    /// Reassemble the canonical InChI string from the parsed layers
    ///
    /// `InChI={version}/{formula}` followed by each non-empty layer prefixed
    /// with `/` and its letter, in grammar order. For any string accepted by
    /// [`parse_inchi`] this reproduces the input exactly.
    pub fn to_inchi_string(&self) -> String {
        let mut out = format!("InChI={}/{}", self.version, self.formula);
        for (letter, value) in [
            ('c', &self.connections),
            ('h', &self.h_atoms),
            ('q', &self.charge),
            ('p', &self.protons),
            ('b', &self.stereo_dbond),
            ('t', &self.stereo_sp3),
            ('m', &self.stereo_sp3_inverted),
            ('s', &self.stereo_type),
            ('i', &self.isotopic_atoms),
            ('h', &self.isotopic_exchangeable_h),
        ] {
            if !value.is_empty() {
                out.push('/');
                out.push(letter);
                out.push_str(value);
            }
        }
        out
    }

    /// Concatenation of the four stereo layers
    pub(crate) fn derive_full_stereo(&self) -> String {
        format!(
            "{}{}{}{}",
            self.stereo_dbond, self.stereo_sp3, self.stereo_sp3_inverted, self.stereo_type
        )
    }

    /// Concatenation of the two isotopic layers
    pub(crate) fn derive_full_isotopic(&self) -> String {
        format!("{}{}", self.isotopic_atoms, self.isotopic_exchangeable_h)
    }
}
