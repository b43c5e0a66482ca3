//! The scattering-calculation collaborator.
//!
//! [`StructureFactorEngine`] is the seam the bridge layer talks through; any
//! engine that can compute structure factors and their parameter derivatives
//! for a bound atom list can sit behind it. [`DirectSummationEngine`] is the
//! shipped implementation: a direct summation over atoms and symmetry
//! operations with analytic derivatives.

pub mod direct;
pub mod form_factor;
pub mod traits;

pub use direct::DirectSummationEngine;
pub use form_factor::{FormFactor, ValenceDeviation};
pub use traits::{
    AdpParameterization, AtomicParamDerivatives, EngineError, FCalcDerivatives,
    ParameterConvention, SiteParameterization, StructureFactorEngine,
};
