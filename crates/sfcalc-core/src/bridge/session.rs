//! The calculator session: one engine instance bound to one geometry and one
//! scattering model, kept correctly synchronized across host geometry updates.

use super::adapter;
use super::assignment::{AssignmentCache, AtomTypeAssignment};
use super::config::ScatteringModel;
use super::error::BridgeError;
use super::host::{HostStructure, RefinementFlags};
use super::router::{self, TargetParamDerivatives};
use crate::core::indices::{self, Hkl};
use crate::core::models::geometry::CrystalGeometry;
use crate::core::scattering::ScatteringTable;
use crate::engine::{
    DirectSummationEngine, FCalcDerivatives, FormFactor, ParameterConvention,
    StructureFactorEngine, ValenceDeviation,
};
use num_complex::Complex64;
use std::sync::Arc;

/// Synchronization status of a session with respect to its engine.
///
/// `Bound` is the freshly constructed state; a geometry update moves the
/// session to `Stale`; the first computation after either pushes the current
/// geometry into the engine and lands in `Ready`. The resynchronization is
/// idempotent and never touches the cached assignment or the per-atom
/// form-factor binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Bound,
    Stale,
    Ready,
}

/// A long-lived structure-factor calculator bound to one scattering model.
///
/// The model (and, for TAAM, the pseudoatom assignment) is fixed for the
/// session's lifetime; geometry and the active reflection index set may be
/// replaced in place. Sessions are not internally synchronized: callers must
/// serialize access, which the [registry](super::registry::SessionRegistry)
/// arranges by handing out `Arc<Mutex<_>>`.
pub struct CalculatorSession {
    geometry: CrystalGeometry,
    table: ScatteringTable,
    model: ScatteringModel,
    assignment: Option<Arc<AtomTypeAssignment>>,
    engine: Box<dyn StructureFactorEngine + Send>,
    indices: Vec<Hkl>,
    flags: Vec<RefinementFlags>,
    state: SyncState,
}

impl CalculatorSession {
    /// Builds a session against the process-wide assignment cache.
    pub fn new(host: &impl HostStructure, model: ScatteringModel) -> Result<Self, BridgeError> {
        Self::with_cache(host, model, AssignmentCache::global())
    }

    /// Builds a session using a caller-supplied assignment cache.
    pub fn with_cache(
        host: &impl HostStructure,
        model: ScatteringModel,
        cache: &AssignmentCache,
    ) -> Result<Self, BridgeError> {
        let table = adapter::resolve_scattering_table(host)?;
        let geometry = adapter::snapshot_geometry(host)?;
        let flags = host.atoms().iter().map(|a| a.flags).collect();

        let assignment = match &model {
            ScatteringModel::Iam => None,
            ScatteringModel::Taam(params) => Some(cache.get_or_assign(&geometry, params)?),
        };

        // A TAAM electron-scattering request overrides an X-ray table choice.
        let electron = table.is_electron()
            || model
                .taam_parameters()
                .is_some_and(|p| p.electron_scattering);
        let effective_table = if electron {
            ScatteringTable::ElectronIt
        } else {
            table
        };

        let form_factors = bind_form_factors(&geometry, effective_table, assignment.as_deref())?;
        let engine = DirectSummationEngine::new(&geometry, form_factors)?;

        Ok(Self {
            geometry,
            table: effective_table,
            model,
            assignment,
            engine: Box::new(engine),
            indices: Vec::new(),
            flags,
            state: SyncState::Bound,
        })
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn model(&self) -> &ScatteringModel {
        &self.model
    }

    pub fn scattering_table(&self) -> ScatteringTable {
        self.table
    }

    pub fn geometry(&self) -> &CrystalGeometry {
        &self.geometry
    }

    pub fn atom_count(&self) -> usize {
        self.geometry.atom_count()
    }

    /// The cached pseudoatom assignment, present for TAAM sessions.
    pub fn assignment(&self) -> Option<&AtomTypeAssignment> {
        self.assignment.as_deref()
    }

    pub fn indices(&self) -> &[Hkl] {
        &self.indices
    }

    /// Replaces the active index set with an explicit list (order preserved,
    /// duplicates permitted). Does not change the synchronization state.
    pub fn set_indices<I, T>(&mut self, indices: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<Hkl>,
    {
        self.indices = indices::explicit(indices);
    }

    /// Replaces the active index set with every reflection inside a
    /// resolution limit. Does not change the synchronization state.
    pub fn set_d_min(&mut self, d_min: f64) {
        self.indices = indices::within_resolution_limit(&self.geometry.cell, d_min);
    }

    /// Structure factors for the active index set, one complex value per
    /// index, in index order.
    pub fn f_calc(&mut self) -> Result<Vec<Complex64>, BridgeError> {
        self.resync()?;
        Ok(self.engine.calculate_structure_factors(&self.indices))
    }

    /// Shorthand for `set_d_min` followed by `f_calc`.
    pub fn f_calc_to_resolution(&mut self, d_min: f64) -> Result<Vec<Complex64>, BridgeError> {
        self.set_d_min(d_min);
        self.f_calc()
    }

    /// Per-reflection derivative records for the active index set.
    pub fn d_f_calc_d_params(&mut self) -> Result<Vec<FCalcDerivatives>, BridgeError> {
        self.resync()?;
        Ok(self
            .indices
            .iter()
            .map(|&hkl| self.engine.calculate_structure_factors_and_derivatives(hkl))
            .collect())
    }

    /// Derivative record for one reflection, active index set unchanged.
    pub fn d_f_calc_hkl_d_params(
        &mut self,
        hkl: impl Into<Hkl>,
    ) -> Result<FCalcDerivatives, BridgeError> {
        self.resync()?;
        Ok(self
            .engine
            .calculate_structure_factors_and_derivatives(hkl.into()))
    }

    /// Target-function gradients per atom, routed through each atom's
    /// refinement flags.
    ///
    /// `weights` carries one complex dTarget/dF value per active index; a
    /// length mismatch fails before any computation is performed.
    pub fn d_target_d_params(
        &mut self,
        weights: &[Complex64],
    ) -> Result<Vec<TargetParamDerivatives>, BridgeError> {
        let flags = self.flags.clone();
        self.target_derivatives(weights, &flags)
    }

    /// Like [`Self::d_target_d_params`] but with one uniform flag set
    /// applied to every atom, overriding the host's per-atom flags.
    pub fn selected_d_target_d_params(
        &mut self,
        weights: &[Complex64],
        site: bool,
        adp: bool,
        occupancy: bool,
    ) -> Result<Vec<TargetParamDerivatives>, BridgeError> {
        let uniform = vec![
            RefinementFlags {
                site,
                adp,
                occupancy,
            };
            self.geometry.atom_count()
        ];
        self.target_derivatives(weights, &uniform)
    }

    /// Target gradients from host-native observation arrays: weight order is
    /// derived from the active index set before dispatching.
    pub fn d_target_d_params_matched(
        &mut self,
        observations: &[(Hkl, Complex64)],
    ) -> Result<Vec<TargetParamDerivatives>, BridgeError> {
        let weights = router::weights_matching_indices(&self.indices, observations)?;
        self.d_target_d_params(&weights)
    }

    /// Replaces atomic positions, displacement parameters, occupancies, and
    /// anomalous terms from a fresh host snapshot, preserving the cached
    /// assignment.
    ///
    /// Fails with a topology mismatch if the atom count or element
    /// composition changed; such a change requires a new session.
    pub fn update_geometry(&mut self, host: &impl HostStructure) -> Result<(), BridgeError> {
        let new_geometry = adapter::snapshot_geometry(host)?;
        if !self.geometry.same_composition(&new_geometry) {
            return Err(BridgeError::TopologyMismatch {
                expected: self.geometry.atom_count(),
                actual: new_geometry.atom_count(),
                detail: format!(
                    "composition changed from [{}] to [{}]",
                    self.geometry.composition_summary(),
                    new_geometry.composition_summary()
                ),
            });
        }
        self.flags = host.atoms().iter().map(|a| a.flags).collect();
        self.geometry = new_geometry;
        self.state = SyncState::Stale;
        Ok(())
    }

    /// Replaces the per-atom anomalous dispersion terms (f' + i f'').
    pub fn set_anomalous(&mut self, anomalous: &[Complex64]) -> Result<(), BridgeError> {
        if anomalous.len() != self.geometry.atom_count() {
            return Err(BridgeError::ShapeMismatch {
                expected: self.geometry.atom_count(),
                actual: anomalous.len(),
            });
        }
        for (atom, value) in self.geometry.atoms.iter_mut().zip(anomalous) {
            atom.anomalous = *value;
        }
        self.state = SyncState::Stale;
        Ok(())
    }

    fn target_derivatives(
        &mut self,
        weights: &[Complex64],
        flags: &[RefinementFlags],
    ) -> Result<Vec<TargetParamDerivatives>, BridgeError> {
        if weights.len() != self.indices.len() {
            return Err(BridgeError::ShapeMismatch {
                expected: self.indices.len(),
                actual: weights.len(),
            });
        }
        self.resync()?;

        // Derivatives are contracted in the engine-native convention; the
        // prior convention is restored afterwards whatever it was.
        let previous = self.engine.convention();
        self.engine.set_convention(ParameterConvention::default());
        let raw = self
            .engine
            .calculate_target_derivatives(&self.indices, weights);
        self.engine.set_convention(previous);

        Ok(router::route_target_derivatives(&raw, flags))
    }

    /// Pushes the current geometry into the engine if anything changed since
    /// the last computation. Idempotent, and cheap relative to assignment.
    fn resync(&mut self) -> Result<(), BridgeError> {
        if self.state != SyncState::Ready {
            self.engine.update_atoms(&self.geometry)?;
            self.state = SyncState::Ready;
        }
        Ok(())
    }
}

fn bind_form_factors(
    geometry: &CrystalGeometry,
    table: ScatteringTable,
    assignment: Option<&AtomTypeAssignment>,
) -> Result<Vec<FormFactor>, BridgeError> {
    geometry
        .atoms
        .iter()
        .enumerate()
        .map(|(index, atom)| {
            let spherical = FormFactor::spherical(table, &atom.element).ok_or_else(|| {
                BridgeError::UnknownElement {
                    symbol: atom.element.clone(),
                    table: table.to_string(),
                }
            })?;
            Ok(match assignment {
                Some(assignment) => {
                    let assigned = &assignment.types[index];
                    spherical.with_deviation(ValenceDeviation {
                        delta_population: assigned.delta_population,
                        kappa: assigned.kappa,
                        multipole_populations: assigned.multipole_populations.clone(),
                    })
                }
                None => spherical,
            })
        })
        .collect()
}
