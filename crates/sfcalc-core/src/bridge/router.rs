//! The derivative router: maps raw engine gradients into the per-atom
//! refinement-flag layout the host expects, and derives weight vectors from
//! host-native observation arrays.

use super::error::BridgeError;
use super::host::RefinementFlags;
use crate::core::indices::Hkl;
use crate::engine::AtomicParamDerivatives;
use num_complex::Complex64;
use std::collections::HashMap;

/// Displacement-parameter gradient with the arity of the owning atom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AdpDerivatives {
    Isotropic(f64),
    Anisotropic([f64; 6]),
}

impl AdpDerivatives {
    pub fn arity(&self) -> usize {
        match self {
            AdpDerivatives::Isotropic(_) => 1,
            AdpDerivatives::Anisotropic(_) => 6,
        }
    }
}

/// Target-function gradients for one atom, with each field present only when
/// the atom's refinement flags requested it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TargetParamDerivatives {
    pub site: Option<[f64; 3]>,
    pub adp: Option<AdpDerivatives>,
    pub occupancy: Option<f64>,
}

impl TargetParamDerivatives {
    /// Number of scalar entries this record contributes to a packed
    /// gradient vector.
    pub fn packed_len(&self) -> usize {
        self.site.map_or(0, |_| 3)
            + self.adp.map_or(0, |adp| adp.arity())
            + self.occupancy.map_or(0, |_| 1)
    }
}

/// Applies per-atom refinement flags to raw engine gradients.
pub fn route_target_derivatives(
    raw: &[AtomicParamDerivatives],
    flags: &[RefinementFlags],
) -> Vec<TargetParamDerivatives> {
    raw.iter()
        .zip(flags)
        .map(|(gradients, flags)| TargetParamDerivatives {
            site: flags.site.then_some(gradients.site),
            adp: flags.adp.then(|| match gradients.adps.as_slice() {
                [single] => AdpDerivatives::Isotropic(*single),
                six => {
                    let mut packed = [0.0; 6];
                    packed.copy_from_slice(six);
                    AdpDerivatives::Anisotropic(packed)
                }
            }),
            occupancy: flags.occupancy.then_some(gradients.occupancy),
        })
        .collect()
}

/// Flattens routed gradients into one vector, atom by atom, each atom
/// contributing its present fields in site/ADP/occupancy order.
pub fn pack(derivatives: &[TargetParamDerivatives]) -> Vec<f64> {
    let capacity = derivatives.iter().map(TargetParamDerivatives::packed_len).sum();
    let mut out = Vec::with_capacity(capacity);
    for d in derivatives {
        if let Some(site) = d.site {
            out.extend_from_slice(&site);
        }
        match d.adp {
            Some(AdpDerivatives::Isotropic(u)) => out.push(u),
            Some(AdpDerivatives::Anisotropic(u)) => out.extend_from_slice(&u),
            None => {}
        }
        if let Some(occupancy) = d.occupancy {
            out.push(occupancy);
        }
    }
    out
}

/// Orders observation-matched weights by the active index set.
///
/// The host supplies `(hkl, dTarget/dF)` pairs in its own order; the result
/// carries exactly one weight per active index, in active-index order.
pub fn weights_matching_indices(
    active: &[Hkl],
    observations: &[(Hkl, Complex64)],
) -> Result<Vec<Complex64>, BridgeError> {
    if observations.len() != active.len() {
        return Err(BridgeError::ShapeMismatch {
            expected: active.len(),
            actual: observations.len(),
        });
    }
    let by_index: HashMap<Hkl, Complex64> = observations.iter().copied().collect();
    active
        .iter()
        .map(|hkl| {
            by_index.get(hkl).copied().ok_or_else(|| {
                BridgeError::configuration(format!(
                    "observed data does not cover active reflection {hkl}"
                ))
            })
        })
        .collect()
}
