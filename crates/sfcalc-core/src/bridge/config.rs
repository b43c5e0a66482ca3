use std::path::PathBuf;

/// Parameters of a TAAM calculation: which databank to transfer multipole
/// parameters from, how to treat the unit-cell charge, and where to write
/// optional diagnostic output.
#[derive(Debug, Clone, PartialEq)]
pub struct TaamParameters {
    /// Path of the multipole databank file.
    pub databank_path: PathBuf,
    /// Convert the spherical cores to electron scattering factors
    /// (Mott-Bethe) regardless of the host's table selection.
    pub electron_scattering: bool,
    /// Target net charge of the unit cell when charge scaling is enabled.
    pub unit_cell_charge: f64,
    /// Proportionally rescale valence populations so the net assigned charge
    /// matches `unit_cell_charge`.
    pub scale_charges: bool,
    /// Optional per-atom assignment log (CSV).
    pub assignment_log: Option<PathBuf>,
    /// Optional log of the assigned multipole parameters.
    pub parameters_log: Option<PathBuf>,
    /// Optional dump of the full multipole parameter structure.
    pub multipole_dump: Option<PathBuf>,
}

impl TaamParameters {
    pub fn new(databank_path: impl Into<PathBuf>) -> Self {
        Self {
            databank_path: databank_path.into(),
            electron_scattering: false,
            unit_cell_charge: 0.0,
            scale_charges: false,
            assignment_log: None,
            parameters_log: None,
            multipole_dump: None,
        }
    }
}

/// The scattering model a calculator session is bound to.
///
/// The choice is fixed at session construction; switching models means
/// constructing a new session.
#[derive(Debug, Clone, PartialEq)]
pub enum ScatteringModel {
    /// Independent Atom Model: spherical, element-only scattering.
    Iam,
    /// Transferable Aspherical Atom Model with the given parameters.
    Taam(TaamParameters),
}

impl ScatteringModel {
    pub fn is_taam(&self) -> bool {
        matches!(self, ScatteringModel::Taam(_))
    }

    pub fn taam_parameters(&self) -> Option<&TaamParameters> {
        match self {
            ScatteringModel::Taam(params) => Some(params),
            ScatteringModel::Iam => None,
        }
    }
}
