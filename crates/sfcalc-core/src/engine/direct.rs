use super::form_factor::FormFactor;
use super::traits::{
    AdpParameterization, AtomicParamDerivatives, EngineError, FCalcDerivatives,
    ParameterConvention, SiteParameterization, StructureFactorEngine,
};
use crate::core::indices::Hkl;
use crate::core::models::atom::AdpParameters;
use crate::core::models::cell::{UnitCell, pack_symmetric, unpack_symmetric};
use crate::core::models::geometry::CrystalGeometry;
use crate::core::models::symmetry::SymmetryOperation;
use nalgebra::{Matrix3, Point3, Vector3};
use num_complex::Complex64;
use std::f64::consts::PI;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

struct EngineAtom {
    site: Point3<f64>,
    occupancy: f64,
    adp: AdpParameters,
    anomalous: Complex64,
    form_factor: FormFactor,
}

/// Direct-summation structure-factor engine.
///
/// `F(h) = sum_atoms sum_ops occ * f(h) * T(h) * exp(2 pi i h . (R x + t))`
/// with analytic derivatives against sites, displacement parameters,
/// occupancies, and anomalous terms. The reflection loop is data-parallel
/// under the `parallel` feature; every output lands at a fixed index slot, so
/// thread scheduling never affects results.
pub struct DirectSummationEngine {
    cell: UnitCell,
    operations: Vec<SymmetryOperation>,
    atoms: Vec<EngineAtom>,
    convention: ParameterConvention,
}

impl DirectSummationEngine {
    /// Binds the engine to a geometry and one form factor per atom.
    pub fn new(
        geometry: &CrystalGeometry,
        form_factors: Vec<FormFactor>,
    ) -> Result<Self, EngineError> {
        if form_factors.len() != geometry.atoms.len() {
            return Err(EngineError::AtomCountMismatch {
                expected: geometry.atoms.len(),
                actual: form_factors.len(),
            });
        }
        let atoms = geometry
            .atoms
            .iter()
            .zip(form_factors)
            .map(|(atom, form_factor)| EngineAtom {
                site: atom.site,
                occupancy: atom.occupancy,
                adp: atom.adp,
                anomalous: atom.anomalous,
                form_factor,
            })
            .collect();
        Ok(Self {
            cell: geometry.cell.clone(),
            operations: geometry.space_group.operations.clone(),
            atoms,
            convention: ParameterConvention::default(),
        })
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    fn structure_factor(&self, hkl: Hkl) -> Complex64 {
        let stol_sq = self.cell.stol_sq(hkl);
        let h = hkl.as_vector();

        let mut total = Complex64::new(0.0, 0.0);
        for atom in &self.atoms {
            let f = Complex64::new(atom.form_factor.evaluate(stol_sq), 0.0) + atom.anomalous;
            for op in &self.operations {
                let h_rot = op.transform_index(h);
                let phase = 2.0 * PI * (h_rot.dot(&atom.site.coords) + h.dot(&op.translation));
                let dw = debye_waller(&atom.adp, stol_sq, &h_rot);
                // Same multiplication order as derivative_record, so both
                // paths agree bit for bit.
                let unit = Complex64::from_polar(1.0, phase) * dw;
                total += f * unit * atom.occupancy;
            }
        }
        total
    }

    fn derivative_record(&self, hkl: Hkl) -> FCalcDerivatives {
        let stol_sq = self.cell.stol_sq(hkl);
        let h = hkl.as_vector();
        let n = self.atoms.len();

        let zero = Complex64::new(0.0, 0.0);
        let mut record = FCalcDerivatives {
            hkl,
            structure_factor: zero,
            site_derivatives: vec![[zero; 3]; n],
            adp_derivatives: self
                .atoms
                .iter()
                .map(|a| vec![zero; a.adp.arity()])
                .collect(),
            occupancy_derivatives: vec![zero; n],
            fp_derivatives: vec![zero; n],
            fdp_derivatives: vec![zero; n],
        };

        for (j, atom) in self.atoms.iter().enumerate() {
            let f = Complex64::new(atom.form_factor.evaluate(stol_sq), 0.0) + atom.anomalous;
            for op in &self.operations {
                let h_rot = op.transform_index(h);
                let phase = 2.0 * PI * (h_rot.dot(&atom.site.coords) + h.dot(&op.translation));
                let dw = debye_waller(&atom.adp, stol_sq, &h_rot);

                // One symmetry copy of this atom, without and with occupancy
                // and form factor folded in.
                let unit = Complex64::from_polar(1.0, phase) * dw;
                let term = f * unit * atom.occupancy;

                record.structure_factor += term;
                for m in 0..3 {
                    record.site_derivatives[j][m] +=
                        term * Complex64::new(0.0, 2.0 * PI * h_rot[m]);
                }
                match atom.adp {
                    AdpParameters::Isotropic(_) => {
                        record.adp_derivatives[j][0] += term * (-8.0 * PI * PI * stol_sq);
                    }
                    AdpParameters::Anisotropic(_) => {
                        let c = -2.0 * PI * PI;
                        record.adp_derivatives[j][0] += term * (c * h_rot.x * h_rot.x);
                        record.adp_derivatives[j][1] += term * (c * h_rot.y * h_rot.y);
                        record.adp_derivatives[j][2] += term * (c * h_rot.z * h_rot.z);
                        record.adp_derivatives[j][3] += term * (2.0 * c * h_rot.x * h_rot.y);
                        record.adp_derivatives[j][4] += term * (2.0 * c * h_rot.x * h_rot.z);
                        record.adp_derivatives[j][5] += term * (2.0 * c * h_rot.y * h_rot.z);
                    }
                }
                record.occupancy_derivatives[j] += f * unit;
                record.fp_derivatives[j] += unit * atom.occupancy;
                record.fdp_derivatives[j] += Complex64::new(0.0, 1.0) * unit * atom.occupancy;
            }
        }
        record
    }

    /// Rotates accumulated fractional-site and U* gradients into the
    /// currently selected parameter convention.
    fn apply_convention(&self, gradients: &mut [AtomicParamDerivatives]) {
        let frac = self.cell.fractionalization();

        if self.convention.sites == SiteParameterization::Cartesian {
            for g in gradients.iter_mut() {
                let v = frac.transpose() * Vector3::new(g.site[0], g.site[1], g.site[2]);
                g.site = [v.x, v.y, v.z];
            }
        }
        if self.convention.adps == AdpParameterization::UCart {
            for g in gradients.iter_mut() {
                if g.adps.len() != 6 {
                    continue;
                }
                let packed = [
                    g.adps[0], g.adps[1], g.adps[2], g.adps[3], g.adps[4], g.adps[5],
                ];
                let full = gradient_matrix(packed);
                let cart = frac.transpose() * full * *frac;
                let repacked = pack_gradient(cart);
                g.adps.copy_from_slice(&repacked);
            }
        }
    }
}

/// Debye-Waller attenuation for one symmetry copy of an atom.
fn debye_waller(adp: &AdpParameters, stol_sq: f64, h_rot: &Vector3<f64>) -> f64 {
    match adp {
        AdpParameters::Isotropic(u) => (-8.0 * PI * PI * u * stol_sq).exp(),
        AdpParameters::Anisotropic(u_star) => {
            let u = unpack_symmetric(*u_star);
            (-2.0 * PI * PI * h_rot.dot(&(u * h_rot))).exp()
        }
    }
}

/// Expands a packed gradient (off-diagonal entries carry the symmetric-pair
/// multiplicity) into an element-wise derivative matrix.
fn gradient_matrix(packed: [f64; 6]) -> Matrix3<f64> {
    unpack_symmetric([
        packed[0],
        packed[1],
        packed[2],
        packed[3] / 2.0,
        packed[4] / 2.0,
        packed[5] / 2.0,
    ])
}

/// Inverse of [`gradient_matrix`]: repacks with off-diagonal multiplicity.
fn pack_gradient(m: Matrix3<f64>) -> [f64; 6] {
    let p = pack_symmetric(m);
    [p[0], p[1], p[2], 2.0 * p[3], 2.0 * p[4], 2.0 * p[5]]
}

impl StructureFactorEngine for DirectSummationEngine {
    fn update_atoms(&mut self, geometry: &CrystalGeometry) -> Result<(), EngineError> {
        if geometry.atoms.len() != self.atoms.len() {
            return Err(EngineError::AtomCountMismatch {
                expected: self.atoms.len(),
                actual: geometry.atoms.len(),
            });
        }
        self.cell = geometry.cell.clone();
        self.operations = geometry.space_group.operations.clone();
        for (bound, atom) in self.atoms.iter_mut().zip(&geometry.atoms) {
            bound.site = atom.site;
            bound.occupancy = atom.occupancy;
            bound.adp = atom.adp;
            bound.anomalous = atom.anomalous;
        }
        Ok(())
    }

    fn set_anomalous(&mut self, anomalous: &[Complex64]) -> Result<(), EngineError> {
        if anomalous.len() != self.atoms.len() {
            return Err(EngineError::AtomCountMismatch {
                expected: self.atoms.len(),
                actual: anomalous.len(),
            });
        }
        for (bound, value) in self.atoms.iter_mut().zip(anomalous) {
            bound.anomalous = *value;
        }
        Ok(())
    }

    fn calculate_structure_factors(&self, indices: &[Hkl]) -> Vec<Complex64> {
        #[cfg(feature = "parallel")]
        {
            indices
                .par_iter()
                .map(|&hkl| self.structure_factor(hkl))
                .collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            indices
                .iter()
                .map(|&hkl| self.structure_factor(hkl))
                .collect()
        }
    }

    fn calculate_structure_factors_and_derivatives(&self, hkl: Hkl) -> FCalcDerivatives {
        self.derivative_record(hkl)
    }

    fn calculate_target_derivatives(
        &self,
        indices: &[Hkl],
        weights: &[Complex64],
    ) -> Vec<AtomicParamDerivatives> {
        debug_assert_eq!(indices.len(), weights.len());

        #[cfg(feature = "parallel")]
        let records: Vec<FCalcDerivatives> = indices
            .par_iter()
            .map(|&hkl| self.derivative_record(hkl))
            .collect();
        #[cfg(not(feature = "parallel"))]
        let records: Vec<FCalcDerivatives> = indices
            .iter()
            .map(|&hkl| self.derivative_record(hkl))
            .collect();

        let mut gradients: Vec<AtomicParamDerivatives> = self
            .atoms
            .iter()
            .map(|a| AtomicParamDerivatives {
                site: [0.0; 3],
                adps: vec![0.0; a.adp.arity()],
                occupancy: 0.0,
            })
            .collect();

        // dT/dp = sum_h Re(conj(w_h) * dF_h/dp) for every real parameter p.
        for (record, w) in records.iter().zip(weights) {
            let w_conj = w.conj();
            for (j, g) in gradients.iter_mut().enumerate() {
                for m in 0..3 {
                    g.site[m] += (w_conj * record.site_derivatives[j][m]).re;
                }
                for (slot, d) in g.adps.iter_mut().zip(&record.adp_derivatives[j]) {
                    *slot += (w_conj * d).re;
                }
                g.occupancy += (w_conj * record.occupancy_derivatives[j]).re;
            }
        }

        self.apply_convention(&mut gradients);
        gradients
    }

    fn convention(&self) -> ParameterConvention {
        self.convention
    }

    fn set_convention(&mut self, convention: ParameterConvention) {
        self.convention = convention;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::atom::Atom;
    use crate::core::models::symmetry::SpaceGroup;
    use crate::core::scattering::ScatteringTable;
    use approx::assert_relative_eq;

    fn simple_geometry() -> CrystalGeometry {
        let cell = UnitCell::new(10.0, 12.0, 14.0, 90.0, 90.0, 90.0).unwrap();
        let mut c = Atom::new("C1", "C", Point3::new(0.10, 0.20, 0.30));
        c.adp = AdpParameters::Isotropic(0.02);
        let mut o = Atom::new("O1", "O", Point3::new(0.40, 0.35, 0.15));
        o.adp = AdpParameters::Anisotropic([1.0e-4, 2.0e-4, 1.5e-4, 0.2e-4, 0.0, -0.1e-4]);
        o.occupancy = 0.8;
        CrystalGeometry::new(cell, SpaceGroup::p1(), vec![c, o])
    }

    fn engine_for(geometry: &CrystalGeometry) -> DirectSummationEngine {
        let form_factors = geometry
            .atoms
            .iter()
            .map(|a| FormFactor::spherical(ScatteringTable::It1992, &a.element).unwrap())
            .collect();
        DirectSummationEngine::new(geometry, form_factors).unwrap()
    }

    #[test]
    fn binding_rejects_mismatched_form_factor_count() {
        let geometry = simple_geometry();
        let result = DirectSummationEngine::new(&geometry, vec![]);
        assert!(matches!(
            result,
            Err(EngineError::AtomCountMismatch {
                expected: 2,
                actual: 0
            })
        ));
    }

    #[test]
    fn structure_factors_are_deterministic() {
        let geometry = simple_geometry();
        let engine = engine_for(&geometry);
        let indices = [Hkl::new(1, 0, 0), Hkl::new(0, 2, 1), Hkl::new(-1, 1, 3)];
        assert_eq!(
            engine.calculate_structure_factors(&indices),
            engine.calculate_structure_factors(&indices)
        );
    }

    #[test]
    fn f000_equals_total_electron_count_without_adps() {
        let cell = UnitCell::new(10.0, 10.0, 10.0, 90.0, 90.0, 90.0).unwrap();
        let atoms = vec![
            Atom::new("C1", "C", Point3::new(0.1, 0.1, 0.1)),
            Atom::new("O1", "O", Point3::new(0.6, 0.4, 0.2)),
        ];
        let geometry = CrystalGeometry::new(cell, SpaceGroup::p1(), atoms);
        let engine = engine_for(&geometry);

        // d(0,0,0) is infinite, stol_sq = 0: F should be close to Z_C + Z_O.
        let f = engine.structure_factor(Hkl::new(0, 0, 0));
        assert_relative_eq!(f.re, 14.0, epsilon = 0.2);
        assert_relative_eq!(f.im, 0.0, epsilon = 1e-10);
    }

    #[test]
    fn symmetry_related_copies_contribute() {
        // One atom under a 2-fold axis equals two explicit half-copies.
        let cell = UnitCell::new(9.0, 9.0, 9.0, 90.0, 90.0, 90.0).unwrap();
        let site = Point3::new(0.13, 0.27, 0.41);
        let group = SpaceGroup::from_triplets(&["x,y,z", "-x,y,-z"]).unwrap();
        let one = CrystalGeometry::new(
            cell.clone(),
            group,
            vec![Atom::new("S1", "S", site)],
        );

        let mirrored = Point3::new(-site.x, site.y, -site.z);
        let two = CrystalGeometry::new(
            cell,
            SpaceGroup::p1(),
            vec![
                Atom::new("S1", "S", site),
                Atom::new("S2", "S", mirrored),
            ],
        );

        let e1 = engine_for(&one);
        let e2 = engine_for(&two);
        let hkl = Hkl::new(2, 1, -1);
        let f1 = e1.structure_factor(hkl);
        let f2 = e2.structure_factor(hkl);
        assert_relative_eq!(f1.re, f2.re, epsilon = 1e-9);
        assert_relative_eq!(f1.im, f2.im, epsilon = 1e-9);
    }

    #[test]
    fn site_derivatives_match_finite_differences() {
        let geometry = simple_geometry();
        let engine = engine_for(&geometry);
        let hkl = Hkl::new(2, -1, 3);
        let record = engine.calculate_structure_factors_and_derivatives(hkl);

        let delta = 1e-6;
        let mut engine2 = engine_for(&geometry);
        for atom_index in 0..2 {
            for axis in 0..3 {
                let mut plus = geometry.clone();
                plus.atoms[atom_index].site[axis] += delta;
                engine2.update_atoms(&plus).unwrap();
                let f_plus = engine2.structure_factor(hkl);

                let mut minus = geometry.clone();
                minus.atoms[atom_index].site[axis] -= delta;
                engine2.update_atoms(&minus).unwrap();
                let f_minus = engine2.structure_factor(hkl);

                let numeric = (f_plus - f_minus) / (2.0 * delta);
                let analytic = record.site_derivatives[atom_index][axis];
                assert_relative_eq!(numeric.re, analytic.re, epsilon = 1e-4);
                assert_relative_eq!(numeric.im, analytic.im, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn occupancy_and_adp_derivatives_match_finite_differences() {
        let geometry = simple_geometry();
        let engine = engine_for(&geometry);
        let hkl = Hkl::new(1, 2, -2);
        let record = engine.calculate_structure_factors_and_derivatives(hkl);

        let delta = 1e-7;

        // Occupancy of atom 1.
        let mut shifted = geometry.clone();
        shifted.atoms[1].occupancy += delta;
        let mut engine2 = engine_for(&geometry);
        engine2.update_atoms(&shifted).unwrap();
        let numeric = (engine2.structure_factor(hkl) - record.structure_factor) / delta;
        assert_relative_eq!(
            numeric.re,
            record.occupancy_derivatives[1].re,
            epsilon = 1e-4
        );

        // Isotropic U of atom 0.
        let mut shifted = geometry.clone();
        if let AdpParameters::Isotropic(u) = shifted.atoms[0].adp {
            shifted.atoms[0].adp = AdpParameters::Isotropic(u + delta);
        }
        let mut engine2 = engine_for(&geometry);
        engine2.update_atoms(&shifted).unwrap();
        let numeric = (engine2.structure_factor(hkl) - record.structure_factor) / delta;
        assert_relative_eq!(numeric.re, record.adp_derivatives[0][0].re, epsilon = 1e-3);

        // Off-diagonal U12 of atom 1: packed slot 3 carries both symmetric
        // tensor entries.
        let mut shifted = geometry.clone();
        if let AdpParameters::Anisotropic(mut u) = shifted.atoms[1].adp {
            u[3] += delta;
            shifted.atoms[1].adp = AdpParameters::Anisotropic(u);
        }
        let mut engine2 = engine_for(&geometry);
        engine2.update_atoms(&shifted).unwrap();
        let numeric = (engine2.structure_factor(hkl) - record.structure_factor) / delta;
        assert_relative_eq!(
            numeric.re,
            record.adp_derivatives[1][3].re,
            epsilon = 1e-3,
            max_relative = 1e-4
        );
    }

    #[test]
    fn anomalous_derivatives_have_unit_slope() {
        let geometry = simple_geometry();
        let mut engine = engine_for(&geometry);
        let hkl = Hkl::new(1, 1, 1);
        let before = engine.calculate_structure_factors_and_derivatives(hkl);

        let fp = 0.3;
        engine
            .set_anomalous(&[Complex64::new(fp, 0.0), Complex64::new(0.0, 0.0)])
            .unwrap();
        let after = engine.structure_factor(hkl);

        let predicted = before.structure_factor + before.fp_derivatives[0] * fp;
        assert_relative_eq!(after.re, predicted.re, epsilon = 1e-9);
        assert_relative_eq!(after.im, predicted.im, epsilon = 1e-9);
    }

    #[test]
    fn adjoint_mode_matches_manual_chain_rule() {
        let geometry = simple_geometry();
        let engine = engine_for(&geometry);
        let indices = [Hkl::new(1, 0, 0), Hkl::new(0, 1, 2), Hkl::new(2, 2, -1)];
        let weights = [
            Complex64::new(0.5, -0.1),
            Complex64::new(-1.2, 0.4),
            Complex64::new(0.3, 0.9),
        ];

        let adjoint = engine.calculate_target_derivatives(&indices, &weights);

        let mut manual = 0.0;
        for (hkl, w) in indices.iter().zip(&weights) {
            let record = engine.calculate_structure_factors_and_derivatives(*hkl);
            manual += (w.conj() * record.site_derivatives[0][1]).re;
        }
        assert_relative_eq!(adjoint[0].site[1], manual, epsilon = 1e-10);
    }

    #[test]
    fn cartesian_convention_rescales_site_gradients() {
        let geometry = simple_geometry();
        let mut engine = engine_for(&geometry);
        let indices = [Hkl::new(1, 2, 3)];
        let weights = [Complex64::new(1.0, 0.0)];

        let frac = engine.calculate_target_derivatives(&indices, &weights);
        engine.set_convention(ParameterConvention {
            sites: SiteParameterization::Cartesian,
            adps: AdpParameterization::UStar,
        });
        let cart = engine.calculate_target_derivatives(&indices, &weights);

        // Orthorhombic cell: dT/dx_cart = dT/dx_frac / a.
        assert_relative_eq!(cart[0].site[0], frac[0].site[0] / 10.0, epsilon = 1e-12);
        assert_relative_eq!(cart[0].site[1], frac[0].site[1] / 12.0, epsilon = 1e-12);
        assert_relative_eq!(cart[0].site[2], frac[0].site[2] / 14.0, epsilon = 1e-12);
    }

    #[test]
    fn update_atoms_rejects_count_change() {
        let geometry = simple_geometry();
        let mut engine = engine_for(&geometry);

        let mut smaller = geometry.clone();
        smaller.atoms.pop();
        assert!(matches!(
            engine.update_atoms(&smaller),
            Err(EngineError::AtomCountMismatch {
                expected: 2,
                actual: 1
            })
        ));
    }
}
