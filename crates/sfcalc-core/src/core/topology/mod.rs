//! Bonding-topology derivation and the topology fingerprint that keys the
//! pseudoatom-assignment cache.
//!
//! The fingerprint deliberately contains no coordinates: two geometries with
//! the same element sequence and the same bonding graph fingerprint
//! identically no matter how far their atoms have moved. This is what lets a
//! refinement loop update coordinates thousands of times while paying the
//! assignment cost exactly once.

use crate::core::models::geometry::CrystalGeometry;
use crate::core::utils::elements;
use tracing::debug;

/// Distance slack added to the sum of covalent radii when detecting bonds.
const BOND_TOLERANCE: f64 = 0.4;

/// Distances below this are treated as self-images, not bonds.
const MIN_BOND_DISTANCE: f64 = 0.4;

/// Covalent radius used for elements missing from the reference table.
const FALLBACK_COVALENT_RADIUS: f64 = 1.5;

/// Bonded-neighbor lists for every atom of a geometry, indexed in atom order.
#[derive(Debug, Clone, PartialEq)]
pub struct BondingGraph {
    adjacency: Vec<Vec<usize>>,
}

impl BondingGraph {
    /// Derives connectivity with a covalent-radius distance heuristic: two
    /// atoms are bonded when their minimum-image distance is at most the sum
    /// of their covalent radii plus a fixed tolerance.
    pub fn derive(geometry: &CrystalGeometry) -> Self {
        let n = geometry.atoms.len();
        let mut adjacency = vec![Vec::new(); n];

        let radii: Vec<f64> = geometry
            .atoms
            .iter()
            .map(|atom| match elements::element_data(&atom.element) {
                Some(data) => data.covalent_radius,
                None => {
                    debug!(
                        element = %atom.element,
                        "no covalent radius on record, using fallback"
                    );
                    FALLBACK_COVALENT_RADIUS
                }
            })
            .collect();

        for i in 0..n {
            for j in (i + 1)..n {
                let d = minimum_image_distance(geometry, i, j);
                if d > MIN_BOND_DISTANCE && d <= radii[i] + radii[j] + BOND_TOLERANCE {
                    adjacency[i].push(j);
                    adjacency[j].push(i);
                }
            }
        }
        for neighbors in &mut adjacency {
            neighbors.sort_unstable();
        }

        Self { adjacency }
    }

    pub fn neighbors(&self, atom_index: usize) -> &[usize] {
        &self.adjacency[atom_index]
    }

    pub fn atom_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn bond_count(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum::<usize>() / 2
    }
}

/// Shortest distance between two sites over the 27 neighboring cell images.
fn minimum_image_distance(geometry: &CrystalGeometry, i: usize, j: usize) -> f64 {
    let orth = geometry.cell.orthogonalization();
    let delta = geometry.atoms[j].site - geometry.atoms[i].site;

    let mut best = f64::INFINITY;
    for sx in -1..=1 {
        for sy in -1..=1 {
            for sz in -1..=1 {
                let shifted = nalgebra::Vector3::new(
                    delta.x + sx as f64,
                    delta.y + sy as f64,
                    delta.z + sz as f64,
                );
                let d = (orth * shifted).norm();
                if d < best {
                    best = d;
                }
            }
        }
    }
    best
}

/// Cache key for pseudoatom-type assignment: the element sequence, the
/// bonding graph, and the identity of the databank the assignment was made
/// against. Coordinates and displacement parameters are intentionally absent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopologyFingerprint {
    elements: Vec<String>,
    adjacency: Vec<Vec<usize>>,
    databank_identity: String,
}

impl TopologyFingerprint {
    pub fn compute(
        geometry: &CrystalGeometry,
        graph: &BondingGraph,
        databank_identity: &str,
    ) -> Self {
        Self {
            elements: geometry
                .atoms
                .iter()
                .map(|atom| atom.element.clone())
                .collect(),
            adjacency: graph.adjacency.clone(),
            databank_identity: databank_identity.to_string(),
        }
    }

    pub fn databank_identity(&self) -> &str {
        &self.databank_identity
    }
}
