use crate::core::scattering::tables::GaussianParameters;
use crate::core::scattering::{ScatteringTable, mott_bethe};

/// Aspherical correction carried by a TAAM pseudoatom: the deviation of the
/// valence shell from the neutral spherical atom.
///
/// The radial profile is `exp(-kappa * s^2) * (dp + sum_l P_l * s^(2(l+1)))`
/// with `s^2 = (sin(theta)/lambda)^2` -- a rotationally averaged stand-in for
/// the full multipole expansion. It vanishes identically when the databank
/// populations are spherical.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValenceDeviation {
    /// Valence population minus the neutral valence electron count.
    pub delta_population: f64,
    /// Valence contraction-expansion parameter.
    pub kappa: f64,
    /// Higher-order multipole populations, lowest order first.
    pub multipole_populations: Vec<f64>,
}

impl ValenceDeviation {
    pub fn is_spherical(&self) -> bool {
        self.delta_population == 0.0 && self.multipole_populations.iter().all(|p| *p == 0.0)
    }

    fn evaluate(&self, stol_sq: f64) -> f64 {
        let mut radial = self.delta_population;
        let mut power = 1.0;
        for population in &self.multipole_populations {
            power *= stol_sq;
            radial += population * power;
        }
        radial * (-self.kappa * stol_sq).exp()
    }
}

/// The complete form-factor binding of one atom in the engine.
///
/// Built once per session from the selected scattering table (IAM) plus the
/// pseudoatom assignment (TAAM); geometry resynchronization never touches it.
#[derive(Debug, Clone, PartialEq)]
pub struct FormFactor {
    gaussians: &'static GaussianParameters,
    electron: bool,
    deviation: Option<ValenceDeviation>,
}

impl FormFactor {
    /// Spherical (IAM) form factor for an element of the given table.
    /// Returns `None` when the table has no entry for the element.
    pub fn spherical(table: ScatteringTable, element: &str) -> Option<Self> {
        let gaussians = table.gaussian_parameters(element)?;
        Some(Self {
            gaussians,
            electron: table.is_electron(),
            deviation: None,
        })
    }

    /// Attaches a pseudoatom valence deviation to a spherical core.
    pub fn with_deviation(mut self, deviation: ValenceDeviation) -> Self {
        self.deviation = Some(deviation);
        self
    }

    pub fn is_aspherical(&self) -> bool {
        self.deviation
            .as_ref()
            .is_some_and(|d| !d.is_spherical())
    }

    /// Evaluates the form factor at `stol_sq = (sin(theta)/lambda)^2`.
    ///
    /// For electron tables the spherical core goes through the Mott-Bethe
    /// conversion; the valence deviation is added directly in both cases,
    /// which keeps charged pseudoatoms finite at forward scattering.
    pub fn evaluate(&self, stol_sq: f64) -> f64 {
        let core = if self.electron {
            mott_bethe(self.gaussians, stol_sq)
        } else {
            self.gaussians.evaluate(stol_sq)
        };
        match &self.deviation {
            Some(deviation) => core + deviation.evaluate(stol_sq),
            None => core,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn spherical_factor_matches_table() {
        let ff = FormFactor::spherical(ScatteringTable::It1992, "N").unwrap();
        let expected = ScatteringTable::It1992.form_factor("N", 0.15).unwrap();
        assert_relative_eq!(ff.evaluate(0.15), expected, epsilon = 1e-12);
    }

    #[test]
    fn unknown_element_has_no_binding() {
        assert!(FormFactor::spherical(ScatteringTable::It1992, "Xx").is_none());
    }

    #[test]
    fn spherical_deviation_changes_nothing() {
        let plain = FormFactor::spherical(ScatteringTable::It1992, "C").unwrap();
        let decorated = plain.clone().with_deviation(ValenceDeviation {
            delta_population: 0.0,
            kappa: 1.2,
            multipole_populations: vec![0.0, 0.0],
        });
        assert!(!decorated.is_aspherical());
        assert_relative_eq!(
            plain.evaluate(0.2),
            decorated.evaluate(0.2),
            epsilon = 1e-12
        );
    }

    #[test]
    fn aspherical_deviation_shifts_the_factor() {
        let plain = FormFactor::spherical(ScatteringTable::It1992, "C").unwrap();
        let aspherical = plain.clone().with_deviation(ValenceDeviation {
            delta_population: 0.15,
            kappa: 1.0,
            multipole_populations: vec![0.03],
        });
        assert!(aspherical.is_aspherical());
        assert!((aspherical.evaluate(0.1) - plain.evaluate(0.1)).abs() > 1e-3);
    }

    #[test]
    fn deviation_decays_at_high_resolution() {
        let deviation = ValenceDeviation {
            delta_population: 0.5,
            kappa: 2.0,
            multipole_populations: vec![0.1],
        };
        assert!(deviation.evaluate(5.0).abs() < deviation.evaluate(0.1).abs());
    }

    #[test]
    fn electron_core_uses_mott_bethe() {
        let ff = FormFactor::spherical(ScatteringTable::ElectronIt, "O").unwrap();
        let expected = ScatteringTable::ElectronIt.form_factor("O", 0.25).unwrap();
        assert_relative_eq!(ff.evaluate(0.25), expected, epsilon = 1e-12);
    }
}
