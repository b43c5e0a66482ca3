//! Static per-element reference data used by topology derivation, charge
//! accounting, and the Mott-Bethe electron conversion.

use phf::{Map, phf_map};

/// Reference properties of one element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementData {
    /// Atomic number Z.
    pub atomic_number: u32,
    /// Single-bond covalent radius in Angstroms.
    pub covalent_radius: f64,
    /// Valence electron count of the neutral atom.
    pub valence_electrons: u32,
}

static ELEMENTS: Map<&'static str, ElementData> = phf_map! {
    "H"  => ElementData { atomic_number: 1,  covalent_radius: 0.31, valence_electrons: 1 },
    "He" => ElementData { atomic_number: 2,  covalent_radius: 0.28, valence_electrons: 2 },
    "Li" => ElementData { atomic_number: 3,  covalent_radius: 1.28, valence_electrons: 1 },
    "Be" => ElementData { atomic_number: 4,  covalent_radius: 0.96, valence_electrons: 2 },
    "B"  => ElementData { atomic_number: 5,  covalent_radius: 0.84, valence_electrons: 3 },
    "C"  => ElementData { atomic_number: 6,  covalent_radius: 0.76, valence_electrons: 4 },
    "N"  => ElementData { atomic_number: 7,  covalent_radius: 0.71, valence_electrons: 5 },
    "O"  => ElementData { atomic_number: 8,  covalent_radius: 0.66, valence_electrons: 6 },
    "F"  => ElementData { atomic_number: 9,  covalent_radius: 0.57, valence_electrons: 7 },
    "Na" => ElementData { atomic_number: 11, covalent_radius: 1.66, valence_electrons: 1 },
    "Mg" => ElementData { atomic_number: 12, covalent_radius: 1.41, valence_electrons: 2 },
    "Al" => ElementData { atomic_number: 13, covalent_radius: 1.21, valence_electrons: 3 },
    "Si" => ElementData { atomic_number: 14, covalent_radius: 1.11, valence_electrons: 4 },
    "P"  => ElementData { atomic_number: 15, covalent_radius: 1.07, valence_electrons: 5 },
    "S"  => ElementData { atomic_number: 16, covalent_radius: 1.05, valence_electrons: 6 },
    "Cl" => ElementData { atomic_number: 17, covalent_radius: 1.02, valence_electrons: 7 },
    "K"  => ElementData { atomic_number: 19, covalent_radius: 2.03, valence_electrons: 1 },
    "Ca" => ElementData { atomic_number: 20, covalent_radius: 1.76, valence_electrons: 2 },
    "Ti" => ElementData { atomic_number: 22, covalent_radius: 1.60, valence_electrons: 4 },
    "V"  => ElementData { atomic_number: 23, covalent_radius: 1.53, valence_electrons: 5 },
    "Cr" => ElementData { atomic_number: 24, covalent_radius: 1.39, valence_electrons: 6 },
    "Mn" => ElementData { atomic_number: 25, covalent_radius: 1.39, valence_electrons: 7 },
    "Fe" => ElementData { atomic_number: 26, covalent_radius: 1.32, valence_electrons: 8 },
    "Co" => ElementData { atomic_number: 27, covalent_radius: 1.26, valence_electrons: 9 },
    "Ni" => ElementData { atomic_number: 28, covalent_radius: 1.24, valence_electrons: 10 },
    "Cu" => ElementData { atomic_number: 29, covalent_radius: 1.32, valence_electrons: 11 },
    "Zn" => ElementData { atomic_number: 30, covalent_radius: 1.22, valence_electrons: 12 },
    "Ga" => ElementData { atomic_number: 31, covalent_radius: 1.22, valence_electrons: 3 },
    "Ge" => ElementData { atomic_number: 32, covalent_radius: 1.20, valence_electrons: 4 },
    "As" => ElementData { atomic_number: 33, covalent_radius: 1.19, valence_electrons: 5 },
    "Se" => ElementData { atomic_number: 34, covalent_radius: 1.20, valence_electrons: 6 },
    "Br" => ElementData { atomic_number: 35, covalent_radius: 1.20, valence_electrons: 7 },
    "Rb" => ElementData { atomic_number: 37, covalent_radius: 2.20, valence_electrons: 1 },
    "Sr" => ElementData { atomic_number: 38, covalent_radius: 1.95, valence_electrons: 2 },
    "Y"  => ElementData { atomic_number: 39, covalent_radius: 1.90, valence_electrons: 3 },
    "Zr" => ElementData { atomic_number: 40, covalent_radius: 1.75, valence_electrons: 4 },
    "Nb" => ElementData { atomic_number: 41, covalent_radius: 1.64, valence_electrons: 5 },
    "Mo" => ElementData { atomic_number: 42, covalent_radius: 1.54, valence_electrons: 6 },
    "Ag" => ElementData { atomic_number: 47, covalent_radius: 1.45, valence_electrons: 11 },
    "Ba" => ElementData { atomic_number: 56, covalent_radius: 2.15, valence_electrons: 2 },
    "La" => ElementData { atomic_number: 57, covalent_radius: 2.07, valence_electrons: 3 },
    "Ce" => ElementData { atomic_number: 58, covalent_radius: 2.04, valence_electrons: 4 },
    "Au" => ElementData { atomic_number: 79, covalent_radius: 1.36, valence_electrons: 11 },
    "Pb" => ElementData { atomic_number: 82, covalent_radius: 1.46, valence_electrons: 4 },
    "Bi" => ElementData { atomic_number: 83, covalent_radius: 1.48, valence_electrons: 5 },
};

/// Looks up an element by its canonical symbol.
pub fn element_data(symbol: &str) -> Option<&'static ElementData> {
    ELEMENTS.get(symbol)
}

/// Extracts a canonical element symbol from a site label such as `"Fe1"`,
/// `"O_W2"`, or `"ca"`: the leading alphabetic run, first letter upper-cased,
/// matched greedily against the known elements.
pub fn symbol_from_label(label: &str) -> Option<&'static str> {
    let alphabetic: String = label.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    if alphabetic.is_empty() {
        return None;
    }

    let mut candidate = String::new();
    for (i, ch) in alphabetic.chars().take(2).enumerate() {
        if i == 0 {
            candidate.push(ch.to_ascii_uppercase());
        } else {
            candidate.push(ch.to_ascii_lowercase());
        }
    }

    // Two-letter symbols win over their one-letter prefix ("Fe" vs "F").
    if candidate.len() == 2 {
        if let Some((key, _)) = ELEMENTS.get_entry(candidate.as_str()) {
            return Some(*key);
        }
    }
    ELEMENTS.get_entry(&candidate[..1]).map(|(key, _)| *key)
}
