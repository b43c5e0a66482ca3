//! Pseudoatom-type assignment and its process-wide cache.
//!
//! Assignment walks every atom's local chemical environment (element plus
//! bonded-neighbor elements) and matches it against the configured multipole
//! databank. The result depends only on the structure's topology and the
//! databank identity, never on coordinates or displacement parameters, so it
//! is cached under a [`TopologyFingerprint`] and reused for every subsequent
//! calculation on the same topology.

use super::config::TaamParameters;
use super::error::BridgeError;
use crate::core::databank::{DatabankError, MultipoleDatabank};
use crate::core::models::geometry::CrystalGeometry;
use crate::core::topology::{BondingGraph, TopologyFingerprint};
use crate::core::utils::elements;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};
use tracing::warn;

/// The pseudoatom type assigned to one atom.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignedType {
    pub atom_index: usize,
    pub label: String,
    pub element: String,
    /// Databank type name, or a synthesized spherical fallback name.
    pub type_name: String,
    /// False when no databank entry matched and the spherical fallback was
    /// substituted.
    pub matched: bool,
    pub kappa: f64,
    pub valence_population: f64,
    /// Valence population minus the neutral valence electron count.
    pub delta_population: f64,
    pub multipole_populations: Vec<f64>,
}

/// A complete assignment for one topology.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomTypeAssignment {
    pub fingerprint: TopologyFingerprint,
    pub types: Vec<AssignedType>,
    /// Net charge of the unit cell implied by the assigned populations,
    /// after charge scaling if it was enabled.
    pub net_charge: f64,
}

impl AtomTypeAssignment {
    pub fn unmatched_count(&self) -> usize {
        self.types.iter().filter(|t| !t.matched).count()
    }
}

static GLOBAL_CACHE: LazyLock<AssignmentCache> = LazyLock::new(AssignmentCache::new);

/// Process-wide cache of pseudoatom assignments, keyed by topology
/// fingerprint.
///
/// `get_or_assign` is serialized internally; the instrumentation counter
/// counts actual assignment runs, not cache hits, so callers can verify that
/// pure geometry updates never re-assign.
#[derive(Debug, Default)]
pub struct AssignmentCache {
    entries: Mutex<HashMap<TopologyFingerprint, Arc<AtomTypeAssignment>>>,
    performed: AtomicUsize,
}

impl AssignmentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared cache used by session construction.
    pub fn global() -> &'static AssignmentCache {
        &GLOBAL_CACHE
    }

    /// Number of assignment runs performed (cache hits excluded).
    pub fn assignments_performed(&self) -> usize {
        self.performed.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns the cached assignment for the geometry's topology, computing
    /// and caching it first if necessary.
    ///
    /// The databank path is validated before any atom-level work; a missing
    /// databank surfaces as [`DatabankError::NotFound`] immediately.
    pub fn get_or_assign(
        &self,
        geometry: &CrystalGeometry,
        params: &TaamParameters,
    ) -> Result<Arc<AtomTypeAssignment>, BridgeError> {
        if !params.databank_path.is_file() {
            return Err(DatabankError::NotFound {
                path: params.databank_path.to_string_lossy().to_string(),
            }
            .into());
        }

        let graph = BondingGraph::derive(geometry);
        let fingerprint = TopologyFingerprint::compute(
            geometry,
            &graph,
            &params.databank_path.to_string_lossy(),
        );

        if let Some(cached) = self.lock().get(&fingerprint) {
            return Ok(Arc::clone(cached));
        }

        let databank = MultipoleDatabank::load(&params.databank_path)?;
        let assignment = Arc::new(assign_types(geometry, &graph, &databank, params, fingerprint));
        self.performed.fetch_add(1, Ordering::SeqCst);

        write_diagnostics(params, &assignment);

        self.lock()
            .insert(assignment.fingerprint.clone(), Arc::clone(&assignment));
        Ok(assignment)
    }

    /// Drops the cached assignment for one topology. Returns whether an
    /// entry was present.
    pub fn invalidate(&self, fingerprint: &TopologyFingerprint) -> bool {
        self.lock().remove(fingerprint).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TopologyFingerprint, Arc<AtomTypeAssignment>>> {
        self.entries.lock().expect("assignment cache lock poisoned")
    }
}

fn assign_types(
    geometry: &CrystalGeometry,
    graph: &BondingGraph,
    databank: &MultipoleDatabank,
    params: &TaamParameters,
    fingerprint: TopologyFingerprint,
) -> AtomTypeAssignment {
    let mut types = Vec::with_capacity(geometry.atoms.len());

    for (index, atom) in geometry.atoms.iter().enumerate() {
        let neighbor_elements: Vec<&str> = graph
            .neighbors(index)
            .iter()
            .map(|&n| geometry.atoms[n].element.as_str())
            .collect();

        let neutral = elements::element_data(&atom.element)
            .map(|d| d.valence_electrons as f64)
            .unwrap_or(0.0);

        match databank.match_environment(&atom.element, &neighbor_elements) {
            Some((name, entry)) => {
                let neutral = if neutral > 0.0 {
                    neutral
                } else {
                    entry.valence_population
                };
                types.push(AssignedType {
                    atom_index: index,
                    label: atom.label.clone(),
                    element: atom.element.clone(),
                    type_name: name.to_string(),
                    matched: true,
                    kappa: entry.kappa,
                    valence_population: entry.valence_population,
                    delta_population: entry.valence_population - neutral,
                    multipole_populations: entry.multipole_populations.clone(),
                });
            }
            None => {
                warn!(
                    atom = %atom.label,
                    element = %atom.element,
                    environment = ?neighbor_elements,
                    "no databank entry for atom environment, using spherical fallback"
                );
                types.push(AssignedType {
                    atom_index: index,
                    label: atom.label.clone(),
                    element: atom.element.clone(),
                    type_name: format!("{}-spherical", atom.element),
                    matched: false,
                    kappa: 1.0,
                    valence_population: neutral,
                    delta_population: 0.0,
                    multipole_populations: Vec::new(),
                });
            }
        }
    }

    if params.scale_charges {
        scale_charges(&mut types, params.unit_cell_charge);
    }

    let net_charge = net_charge(&types);
    AtomTypeAssignment {
        fingerprint,
        types,
        net_charge,
    }
}

/// Net charge implied by the assigned valence populations.
fn net_charge(types: &[AssignedType]) -> f64 {
    types.iter().map(|t| -t.delta_population).sum()
}

/// Proportionally rescales valence populations so the net assigned charge
/// equals `target`.
fn scale_charges(types: &mut [AssignedType], target: f64) {
    let total_population: f64 = types.iter().map(|t| t.valence_population).sum();
    if total_population <= 0.0 {
        warn!("cannot scale charges: total valence population is not positive");
        return;
    }
    let total_neutral: f64 =
        types.iter().map(|t| t.valence_population - t.delta_population).sum();

    let factor = (total_neutral - target) / total_population;
    for t in types.iter_mut() {
        let neutral = t.valence_population - t.delta_population;
        t.valence_population *= factor;
        t.delta_population = t.valence_population - neutral;
    }
}

/// Best-effort diagnostic output; failures are logged and never abort the
/// assignment.
fn write_diagnostics(params: &TaamParameters, assignment: &AtomTypeAssignment) {
    if let Some(path) = &params.assignment_log {
        if let Err(e) = write_assignment_log(path, assignment) {
            warn!(path = %path.display(), error = %e, "failed to write assignment log");
        }
    }
    if let Some(path) = &params.parameters_log {
        if let Err(e) = write_parameters_log(path, assignment) {
            warn!(path = %path.display(), error = %e, "failed to write parameters log");
        }
    }
    if let Some(path) = &params.multipole_dump {
        if let Err(e) = write_multipole_dump(path, assignment) {
            warn!(path = %path.display(), error = %e, "failed to write multipole dump");
        }
    }
}

#[derive(Serialize)]
struct AssignmentLogRecord<'a> {
    atom_index: usize,
    label: &'a str,
    element: &'a str,
    type_name: &'a str,
    matched: bool,
}

fn write_assignment_log(path: &Path, assignment: &AtomTypeAssignment) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_path(path)?;
    for t in &assignment.types {
        writer.serialize(AssignmentLogRecord {
            atom_index: t.atom_index,
            label: &t.label,
            element: &t.element,
            type_name: &t.type_name,
            matched: t.matched,
        })?;
    }
    writer.flush()?;
    Ok(())
}

fn write_parameters_log(path: &Path, assignment: &AtomTypeAssignment) -> Result<(), std::io::Error> {
    use std::io::Write;
    let mut out = std::fs::File::create(path)?;
    writeln!(out, "# assigned pseudoatom parameters")?;
    writeln!(out, "# net charge: {:.6}", assignment.net_charge)?;
    for t in &assignment.types {
        writeln!(
            out,
            "{} {} kappa={:.4} p_val={:.4} dp={:+.4} multipoles={:?}",
            t.label, t.type_name, t.kappa, t.valence_population, t.delta_population,
            t.multipole_populations,
        )?;
    }
    Ok(())
}

#[derive(Serialize)]
struct MultipoleDump<'a> {
    net_charge: f64,
    types: &'a [AssignedType],
}

fn write_multipole_dump(path: &Path, assignment: &AtomTypeAssignment) -> Result<(), std::io::Error> {
    let dump = MultipoleDump {
        net_charge: assignment.net_charge,
        types: &assignment.types,
    };
    let rendered = toml::to_string_pretty(&dump)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::write(path, rendered)
}
