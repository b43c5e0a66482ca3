use crate::core::indices::Hkl;
use crate::core::models::geometry::CrystalGeometry;
use num_complex::Complex64;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("engine is bound to {expected} atoms but was given {actual}")]
    AtomCountMismatch { expected: usize, actual: usize },
}

/// Coordinate system structure-factor derivatives are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SiteParameterization {
    /// Fractional coordinates of the unit cell.
    #[default]
    Fractional,
    /// Cartesian Angstrom coordinates.
    Cartesian,
}

/// Displacement-parameter convention derivatives are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdpParameterization {
    /// Reciprocal-basis U* tensor components.
    #[default]
    UStar,
    /// Cartesian U tensor components.
    UCart,
}

/// The parameter convention an engine currently reports derivatives in.
///
/// Callers that change the convention for one call are expected to restore
/// the previous value afterwards; the session does exactly that around its
/// target-derivative dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParameterConvention {
    pub sites: SiteParameterization,
    pub adps: AdpParameterization,
}

/// Everything an engine knows about one reflection: the structure factor and
/// its derivatives with respect to every atomic parameter.
///
/// Per-atom entries follow the bound geometry's atom order. ADP derivative
/// rows have the arity of the owning atom (1 or 6). Derivatives here are
/// always engine-native (fractional sites, U* ADPs); the convention switch
/// only affects the adjoint path.
#[derive(Debug, Clone, PartialEq)]
pub struct FCalcDerivatives {
    pub hkl: Hkl,
    pub structure_factor: Complex64,
    /// d F / d site, three components per atom.
    pub site_derivatives: Vec<[Complex64; 3]>,
    /// d F / d U, one or six components per atom.
    pub adp_derivatives: Vec<Vec<Complex64>>,
    /// d F / d occupancy per atom.
    pub occupancy_derivatives: Vec<Complex64>,
    /// d F / d f' per atom.
    pub fp_derivatives: Vec<Complex64>,
    /// d F / d f'' per atom.
    pub fdp_derivatives: Vec<Complex64>,
}

/// Target-function gradient contributions for one atom, produced by the
/// adjoint (target-weighted) derivative mode.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomicParamDerivatives {
    pub site: [f64; 3],
    /// One or six components, matching the atom's ADP arity.
    pub adps: Vec<f64>,
    pub occupancy: f64,
}

/// Contract of a scattering-calculation engine bound to one atom list.
///
/// `update_atoms` is the cheap resynchronization path: it refreshes sites,
/// occupancies, displacement parameters, and anomalous terms but never the
/// per-atom form-factor binding, which is fixed when the engine is built.
pub trait StructureFactorEngine {
    /// Pushes new positions/ADPs/occupancies/anomalous terms for the bound
    /// atoms. Fails if the atom count differs from the bound geometry.
    fn update_atoms(&mut self, geometry: &CrystalGeometry) -> Result<(), EngineError>;

    /// Replaces the per-atom anomalous dispersion terms (f' + i f'').
    fn set_anomalous(&mut self, anomalous: &[Complex64]) -> Result<(), EngineError>;

    /// Structure factors for the given indices, one complex value per index,
    /// in index order.
    fn calculate_structure_factors(&self, indices: &[Hkl]) -> Vec<Complex64>;

    /// Full per-atom derivative record for a single reflection.
    fn calculate_structure_factors_and_derivatives(&self, hkl: Hkl) -> FCalcDerivatives;

    /// Adjoint mode: contracts per-reflection derivatives with one complex
    /// weight per index (dTarget/dF) into per-atom gradients, honoring the
    /// current parameter convention.
    ///
    /// Callers must pass exactly one weight per index.
    fn calculate_target_derivatives(
        &self,
        indices: &[Hkl],
        weights: &[Complex64],
    ) -> Vec<AtomicParamDerivatives>;

    fn convention(&self) -> ParameterConvention;

    fn set_convention(&mut self, convention: ParameterConvention);
}
