//! Scattering-table selection: named spherical form-factor tables and the
//! Mott-Bethe conversion from X-ray to electron scattering factors.

pub mod tables;

use std::fmt;
use std::str::FromStr;
use tables::GaussianParameters;
use thiserror::Error;

/// `1 / (8 pi^2 a_0)` in Angstroms; the prefactor of the Mott-Bethe formula.
pub const MOTT_BETHE_CONSTANT: f64 = 0.023934;

/// Below this `(sin(theta)/lambda)^2` the Mott-Bethe quotient is replaced by
/// its analytic forward limit.
const FORWARD_LIMIT_STOL_SQ: f64 = 1.0e-6;

#[derive(Debug, Error, PartialEq)]
#[error("unknown scattering table '{name}'")]
pub struct UnknownTableError {
    pub name: String,
}

/// A selectable scattering-factor table.
///
/// The embedded reference data is the IT92 four-Gaussian set; the electron
/// table is obtained from it through the Mott-Bethe relation rather than
/// stored separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScatteringTable {
    /// X-ray form factors, International Tables (1992) four-Gaussian fits.
    It1992,
    /// Electron form factors via Mott-Bethe conversion of [`Self::It1992`].
    ElectronIt,
}

impl ScatteringTable {
    pub fn is_electron(&self) -> bool {
        matches!(self, ScatteringTable::ElectronIt)
    }

    /// Gaussian coefficients of the underlying X-ray fit for an element.
    pub fn gaussian_parameters(&self, element: &str) -> Option<&'static GaussianParameters> {
        tables::IT_1992.get(element)
    }

    /// Spherical form factor of a neutral element at `stol_sq`, converted to
    /// electron scattering when this table is an electron table.
    pub fn form_factor(&self, element: &str, stol_sq: f64) -> Option<f64> {
        let params = self.gaussian_parameters(element)?;
        match self {
            ScatteringTable::It1992 => Some(params.evaluate(stol_sq)),
            ScatteringTable::ElectronIt => Some(mott_bethe(params, stol_sq)),
        }
    }
}

/// Mott-Bethe conversion of an X-ray form factor to an electron one:
/// `f_e(s) = C (f_x(0) - f_x(s)) / s^2`, with the analytic limit used near
/// `s = 0`.
///
/// The fit's own forward value stands in for Z; a four-Gaussian fit misses Z
/// by a small residual, and dividing that residual by `s^2` would blow up the
/// quotient at low resolution.
pub fn mott_bethe(params: &GaussianParameters, stol_sq: f64) -> f64 {
    if stol_sq < FORWARD_LIMIT_STOL_SQ {
        MOTT_BETHE_CONSTANT * params.forward_slope()
    } else {
        MOTT_BETHE_CONSTANT * (params.evaluate(0.0) - params.evaluate(stol_sq)) / stol_sq
    }
}

impl FromStr for ScatteringTable {
    type Err = UnknownTableError;

    /// Resolves a table name or one of its aliases, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "it92" | "it1992" | "it-1992" | "xray" | "x-ray" => Ok(ScatteringTable::It1992),
            "electron" | "electron-it" | "electron-it92" => Ok(ScatteringTable::ElectronIt),
            _ => Err(UnknownTableError {
                name: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for ScatteringTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScatteringTable::It1992 => write!(f, "IT92"),
            ScatteringTable::ElectronIt => write!(f, "electron-IT"),
        }
    }
}
