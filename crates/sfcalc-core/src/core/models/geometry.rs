use super::atom::Atom;
use super::cell::UnitCell;
use super::symmetry::SpaceGroup;
use std::collections::BTreeMap;

/// A complete, self-contained crystal-structure snapshot.
///
/// The atom sequence is ordered and the order is significant: it defines the
/// index space of every per-atom result (assignments, derivative records).
/// A `CrystalGeometry` is a derived copy of host state, owned by exactly one
/// calculator session at a time; the host remains the source of truth.
#[derive(Debug, Clone, PartialEq)]
pub struct CrystalGeometry {
    pub cell: UnitCell,
    pub space_group: SpaceGroup,
    pub atoms: Vec<Atom>,
}

impl CrystalGeometry {
    pub fn new(cell: UnitCell, space_group: SpaceGroup, atoms: Vec<Atom>) -> Self {
        Self {
            cell,
            space_group,
            atoms,
        }
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    /// Element symbols in atom order.
    pub fn element_sequence(&self) -> impl Iterator<Item = &str> {
        self.atoms.iter().map(|a| a.element.as_str())
    }

    /// Hill-style composition summary, e.g. `"C2 H6 O1"`, used in
    /// topology-mismatch diagnostics.
    pub fn composition_summary(&self) -> String {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for atom in &self.atoms {
            *counts.entry(atom.element.as_str()).or_insert(0) += 1;
        }
        counts
            .iter()
            .map(|(element, count)| format!("{element}{count}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Whether another geometry has the same atom count and element sequence.
    ///
    /// This is the cheap composition check behind `update_geometry`; it is
    /// deliberately insensitive to coordinates, ADPs, and occupancies.
    pub fn same_composition(&self, other: &CrystalGeometry) -> bool {
        self.atoms.len() == other.atoms.len()
            && self
                .element_sequence()
                .eq(other.element_sequence())
    }
}
