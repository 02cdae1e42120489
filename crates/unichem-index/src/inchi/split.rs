//! Mixture splitting: one [`Inchi`] per formula component
//!
//! A compound whose formula contains the `.` separator is a mixture. Formula
//! fragments carry an optional leading repeat count (`2Na` is two sodium
//! components); the per-component layers use `;` with an `N*X` run-length
//! prefix. The remaining layers are global and copied onto every component.

use super::{Inchi, InchiParseError};

/// Split a parsed InChI into its per-component InChIs
///
/// Returns an empty vector for single-component compounds; the top-level
/// [`Inchi`] already describes the whole structure in that case. Each
/// returned component is canonically reassembled with its derived
/// `full_stereo`/`full_isotopic` recomputed.
pub fn split_components(inchi: &Inchi) -> Result<Vec<Inchi>, InchiParseError> {
    let formulas = split_formula_layer(&inchi.formula);
    if formulas.len() <= 1 {
        return Ok(Vec::new());
    }
    let count = formulas.len();

    let connections = split_standard_layer(&inchi.connections, count)?;
    let h_atoms = split_standard_layer(&inchi.h_atoms, count)?;
    let charge = split_standard_layer(&inchi.charge, count)?;
    let stereo_dbond = split_standard_layer(&inchi.stereo_dbond, count)?;
    let stereo_sp3 = split_standard_layer(&inchi.stereo_sp3, count)?;
    let isotopic_atoms = split_standard_layer(&inchi.isotopic_atoms, count)?;
    let inverted = split_inverted_layer(&inchi.stereo_sp3_inverted, count)?;

    let mut components = Vec::with_capacity(count);
    for i in 0..count {
        let mut component = Inchi {
            version: inchi.version.clone(),
            formula: formulas[i].clone(),
            connections: connections[i].clone(),
            h_atoms: h_atoms[i].clone(),
            charge: charge[i].clone(),
            protons: inchi.protons.clone(),
            stereo_dbond: stereo_dbond[i].clone(),
            stereo_sp3: stereo_sp3[i].clone(),
            stereo_sp3_inverted: inverted[i].clone(),
            stereo_type: inchi.stereo_type.clone(),
            isotopic_atoms: isotopic_atoms[i].clone(),
            isotopic_exchangeable_h: inchi.isotopic_exchangeable_h.clone(),
            ..Inchi::default()
        };
        component.full_stereo = component.derive_full_stereo();
        component.full_isotopic = component.derive_full_isotopic();
        component.inchi = component.to_inchi_string();
        components.push(component);
    }

    Ok(components)
}

/// Split the formula on `.`, expanding leading repeat counts (`2Na` -> `Na`, `Na`)
fn split_formula_layer(layer: &str) -> Vec<String> {
    if layer.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::new();
    for fragment in layer.split('.') {
        let digits = fragment.chars().take_while(|c| c.is_ascii_digit()).count();
        let (count, body) = match fragment[..digits].parse::<usize>() {
            Ok(n) => (n, &fragment[digits..]),
            Err(_) => (1, fragment),
        };
        for _ in 0..count {
            out.push(body.to_string());
        }
    }
    out
}

/// Split a per-component layer on `;`, expanding `N*X` run-length prefixes
///
/// An empty layer yields `count` empty items. A non-empty layer that expands
/// to fewer than `count` items does not cover every component and is a
/// [`InchiParseError::CountMismatch`].
fn split_standard_layer(layer: &str, count: usize) -> Result<Vec<String>, InchiParseError> {
    if layer.is_empty() {
        return Ok(vec![String::new(); count]);
    }
    let mut out = Vec::new();
    for fragment in layer.split(';') {
        let repeat = fragment
            .split_once('*')
            .and_then(|(n, body)| n.parse::<usize>().ok().map(|n| (n, body)));
        match repeat {
            Some((n, body)) => {
                for _ in 0..n {
                    out.push(body.to_string());
                }
            }
            None => out.push(fragment.to_string()),
        }
    }
    if out.len() < count {
        return Err(InchiParseError::CountMismatch {
            raw: layer.to_string(),
        });
    }
    Ok(out)
}

/// Distribute the `m` layer's characters over the components
///
/// One character applies to the first component only; a string of at least
/// `count` characters is indexed per component; anything in between leaves
/// some component without its flag.
fn split_inverted_layer(layer: &str, count: usize) -> Result<Vec<String>, InchiParseError> {
    let chars: Vec<char> = layer.chars().collect();
    match chars.len() {
        0 => Ok(vec![String::new(); count]),
        1 => {
            let mut out = vec![String::new(); count];
            out[0] = layer.to_string();
            Ok(out)
        }
        n if n >= count => Ok(chars[..count].iter().map(|c| c.to_string()).collect()),
        _ => Err(InchiParseError::CountMismatch {
            raw: layer.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inchi::parse_inchi;

    #[test]
    fn single_component_yields_no_split() {
        let inchi = parse_inchi("InChI=1S/CH4/h1H4").unwrap();
        assert!(split_components(&inchi).unwrap().is_empty());
    }

    #[test]
    fn splits_two_component_mixture() {
        let inchi = parse_inchi("InChI=1S/C2H4.H2O/c1-2;/h1-2H2;1H2").unwrap();
        let components = split_components(&inchi).unwrap();
        assert_eq!(components.len(), 2);
        assert_eq!(components[0].formula, "C2H4");
        assert_eq!(components[1].formula, "H2O");
        assert_eq!(components[0].connections, "1-2");
        assert_eq!(components[1].connections, "");
        assert_eq!(components[0].h_atoms, "1-2H2");
        assert_eq!(components[1].h_atoms, "1H2");
        assert_eq!(components[0].inchi, "InChI=1S/C2H4/c1-2/h1-2H2");
        assert_eq!(components[1].inchi, "InChI=1S/H2O/h1H2");
    }

    #[test]
    fn expands_formula_repeat_counts() {
        assert_eq!(
            split_formula_layer("2Na.Cl2"),
            vec!["Na".to_string(), "Na".to_string(), "Cl2".to_string()]
        );
    }

    #[test]
    fn expands_run_length_layer_fragments() {
        assert_eq!(
            split_standard_layer("2*1H;1H2", 3).unwrap(),
            vec!["1H".to_string(), "1H".to_string(), "1H2".to_string()]
        );
    }

    #[test]
    fn short_layer_is_count_mismatch() {
        let inchi = parse_inchi("InChI=1S/C2H4.H2O/c1-2").unwrap();
        let err = split_components(&inchi).unwrap_err();
        assert!(matches!(err, InchiParseError::CountMismatch { .. }));
    }

    #[test]
    fn global_layers_copied_to_every_component() {
        let inchi = parse_inchi("InChI=1S/C2H6O.CH4O/c1-2-3;1-2/h3H,2H2,1H3;2H,1H3/p-1").unwrap();
        let components = split_components(&inchi).unwrap();
        assert_eq!(components.len(), 2);
        assert_eq!(components[0].protons, "-1");
        assert_eq!(components[1].protons, "-1");
    }

    #[test]
    fn single_inverted_flag_belongs_to_first_component() {
        assert_eq!(
            split_inverted_layer("1", 3).unwrap(),
            vec!["1".to_string(), String::new(), String::new()]
        );
    }

    #[test]
    fn inverted_flags_distributed_per_component() {
        assert_eq!(
            split_inverted_layer("01", 2).unwrap(),
            vec!["0".to_string(), "1".to_string()]
        );
    }

    #[test]
    fn inverted_shorter_than_components_is_count_mismatch() {
        let err = split_inverted_layer("01", 3).unwrap_err();
        assert!(matches!(err, InchiParseError::CountMismatch { .. }));
    }

    #[test]
    fn component_formulas_rejoin_to_parent_formula() {
        let inchi = parse_inchi("InChI=1S/2C2H4.H2O/c2*1-2;/h2*1-2H2;1H2").unwrap();
        let components = split_components(&inchi).unwrap();
        let joined: Vec<&str> = components.iter().map(|c| c.formula.as_str()).collect();
        assert_eq!(joined, vec!["C2H4", "C2H4", "H2O"]);
    }
}
