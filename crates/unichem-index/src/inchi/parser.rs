//! Hand-written InChI layer parser
//!
//! A small state machine over the fixed layer order
//! `c h q p b t m s i h`. The hydrogen letter appears twice: the second
//! occurrence is the isotopic-exchangeable-hydrogens layer and is only
//! matched once `/i` has been consumed.

use super::{Inchi, InchiParseError};

/// Index of each layer in grammar order. The slot for the second `h`
/// (`isotopic_exchangeable_h`) is guarded by [`LayerSlot::requires_isotopic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LayerSlot {
    Connections,
    HAtoms,
    Charge,
    Protons,
    StereoDbond,
    StereoSp3,
    StereoSp3Inverted,
    StereoType,
    IsotopicAtoms,
    IsotopicExchangeableH,
}

impl LayerSlot {
    const ORDER: [(char, LayerSlot); 10] = [
        ('c', LayerSlot::Connections),
        ('h', LayerSlot::HAtoms),
        ('q', LayerSlot::Charge),
        ('p', LayerSlot::Protons),
        ('b', LayerSlot::StereoDbond),
        ('t', LayerSlot::StereoSp3),
        ('m', LayerSlot::StereoSp3Inverted),
        ('s', LayerSlot::StereoType),
        ('i', LayerSlot::IsotopicAtoms),
        ('h', LayerSlot::IsotopicExchangeableH),
    ];

    fn requires_isotopic(self) -> bool {
        self == LayerSlot::IsotopicExchangeableH
    }
}

/// Parse an InChI string into its typed layers
///
/// The input must start with the literal `InChI=`, followed by a version
/// token up to the first `/`, a formula token up to the next `/` or end of
/// string, and optional layers in grammar order. Any other shape is a
/// [`InchiParseError::BadPrefix`]; a malformed stereo-type layer is a
/// [`InchiParseError::BadLayer`].
pub fn parse_inchi(raw: &str) -> Result<Inchi, InchiParseError> {
    let bad_prefix = || InchiParseError::BadPrefix {
        raw: raw.to_string(),
    };

    let rest = raw.strip_prefix("InChI=").ok_or_else(bad_prefix)?;

    let (version, rest) = rest.split_once('/').ok_or_else(bad_prefix)?;
    // Keep the separator attached so the layer loop below sees `/x...`
    let (formula, mut rest) = match rest.split_once('/') {
        Some((formula, _)) => (formula, &rest[formula.len()..]),
        None => (rest, ""),
    };
    debug_assert!(rest.is_empty() || rest.starts_with('/'));

    let mut inchi = Inchi {
        version: version.to_string(),
        formula: formula.to_string(),
        inchi: raw.to_string(),
        ..Inchi::default()
    };

    // Walk the fixed layer order; `cursor` only moves forward, so a repeated
    // or out-of-order prefix falls off the end of the table.
    let mut cursor = 0;
    let mut isotopic_seen = false;
    while !rest.is_empty() {
        let body = &rest[1..]; // skip '/'
        let prefix = body.chars().next().ok_or_else(bad_prefix)?;
        let body = &body[prefix.len_utf8()..];
        let (value, next) = match body.find('/') {
            Some(pos) => (&body[..pos], &body[pos..]),
            None => (body, ""),
        };

        let slot = loop {
            let Some(&(letter, slot)) = LayerSlot::ORDER.get(cursor) else {
                return Err(bad_prefix());
            };
            cursor += 1;
            if letter == prefix && (!slot.requires_isotopic() || isotopic_seen) {
                break slot;
            }
        };

        let value = value.to_string();
        match slot {
            LayerSlot::Connections => inchi.connections = value,
            LayerSlot::HAtoms => inchi.h_atoms = value,
            LayerSlot::Charge => inchi.charge = value,
            LayerSlot::Protons => inchi.protons = value,
            LayerSlot::StereoDbond => inchi.stereo_dbond = value,
            LayerSlot::StereoSp3 => inchi.stereo_sp3 = value,
            LayerSlot::StereoSp3Inverted => inchi.stereo_sp3_inverted = value,
            LayerSlot::StereoType => {
                // The stereo-type layer is a single decimal digit.
                if value.len() != 1 || !value.chars().all(|c| c.is_ascii_digit()) {
                    return Err(InchiParseError::BadLayer {
                        raw: raw.to_string(),
                    });
                }
                inchi.stereo_type = value;
            }
            LayerSlot::IsotopicAtoms => {
                isotopic_seen = true;
                inchi.isotopic_atoms = value;
            }
            LayerSlot::IsotopicExchangeableH => inchi.isotopic_exchangeable_h = value,
        }
        rest = next;
    }

    inchi.full_stereo = inchi.derive_full_stereo();
    inchi.full_isotopic = inchi.derive_full_isotopic();
    Ok(inchi)
}
