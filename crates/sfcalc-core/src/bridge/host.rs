use crate::core::models::symmetry::SymmetryOperation;
use crate::core::scattering::ScatteringTable;
use nalgebra::Point3;
use num_complex::Complex64;

/// Coordinate convention a host declares for its atom sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SiteConvention {
    #[default]
    Fractional,
    Cartesian,
}

/// Convention a host declares for its anisotropic displacement tensors.
/// Isotropic values are a plain U_iso in squared Angstroms either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostAdpConvention {
    /// Reciprocal-basis U* components.
    #[default]
    UStar,
    /// Dimensionless crystallographic (CIF) U components.
    UCif,
    /// Cartesian U components in squared Angstroms.
    UCart,
}

/// Which refinement gradients the host wants for one atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RefinementFlags {
    pub site: bool,
    pub adp: bool,
    pub occupancy: bool,
}

impl RefinementFlags {
    pub fn all() -> Self {
        Self {
            site: true,
            adp: true,
            occupancy: true,
        }
    }

    pub fn none() -> Self {
        Self::default()
    }
}

/// Displacement parameters as the host stores them; the declared
/// [`HostAdpConvention`] applies to the anisotropic variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostDisplacement {
    Isotropic(f64),
    Anisotropic([f64; 6]),
}

/// One atom as read from the host, before adaptation.
#[derive(Debug, Clone, PartialEq)]
pub struct HostAtom {
    pub label: String,
    pub element: String,
    /// Site in the host's declared [`SiteConvention`].
    pub site: Point3<f64>,
    pub occupancy: f64,
    pub displacement: HostDisplacement,
    pub charge: f64,
    /// Anomalous dispersion, f' + i f''.
    pub anomalous: Complex64,
    pub flags: RefinementFlags,
}

impl HostAtom {
    pub fn new(label: &str, element: &str, site: Point3<f64>) -> Self {
        Self {
            label: label.to_string(),
            element: element.to_string(),
            site,
            occupancy: 1.0,
            displacement: HostDisplacement::Isotropic(0.0),
            charge: 0.0,
            anomalous: Complex64::new(0.0, 0.0),
            flags: RefinementFlags::all(),
        }
    }
}

/// Read-only view of a host modeling environment's structure state.
///
/// The adapter treats every method as a snapshot taken at call time and never
/// mutates the host. A host that has not chosen a scattering table returns
/// `None` from [`Self::scattering_table`], which the adapter reports as a
/// configuration error.
pub trait HostStructure {
    /// Cell parameters `[a, b, c, alpha, beta, gamma]` in Angstroms/degrees.
    fn unit_cell(&self) -> [f64; 6];

    /// Space-group operations; an empty list means P1.
    fn symmetry_operations(&self) -> Vec<SymmetryOperation>;

    /// All atoms, in the order that defines the per-atom index space.
    fn atoms(&self) -> Vec<HostAtom>;

    fn site_convention(&self) -> SiteConvention;

    fn adp_convention(&self) -> HostAdpConvention;

    /// The scattering table the host has selected, if any.
    fn scattering_table(&self) -> Option<ScatteringTable>;
}

/// A minimal in-memory [`HostStructure`], used by tests and by callers that
/// have no host environment of their own.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleStructure {
    pub cell: [f64; 6],
    pub operations: Vec<SymmetryOperation>,
    pub atoms: Vec<HostAtom>,
    pub site_convention: SiteConvention,
    pub adp_convention: HostAdpConvention,
    pub table: Option<ScatteringTable>,
}

impl SimpleStructure {
    pub fn new(cell: [f64; 6], atoms: Vec<HostAtom>) -> Self {
        Self {
            cell,
            operations: Vec::new(),
            atoms,
            site_convention: SiteConvention::Fractional,
            adp_convention: HostAdpConvention::UStar,
            table: Some(ScatteringTable::It1992),
        }
    }
}

impl HostStructure for SimpleStructure {
    fn unit_cell(&self) -> [f64; 6] {
        self.cell
    }

    fn symmetry_operations(&self) -> Vec<SymmetryOperation> {
        self.operations.clone()
    }

    fn atoms(&self) -> Vec<HostAtom> {
        self.atoms.clone()
    }

    fn site_convention(&self) -> SiteConvention {
        self.site_convention
    }

    fn adp_convention(&self) -> HostAdpConvention {
        self.adp_convention
    }

    fn scattering_table(&self) -> Option<ScatteringTable> {
        self.table
    }
}
