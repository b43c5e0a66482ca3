use nalgebra::Point3;
use num_complex::Complex64;

/// Atomic displacement parameters in the reciprocal-basis (U*) convention.
///
/// The arity of the displacement description is fixed for the lifetime of an
/// atom: an atom is either isotropic (one value) or anisotropic (six values),
/// never both, and switching requires constructing a new [`Atom`]. Per-atom
/// derivative records mirror this arity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AdpParameters {
    /// Equivalent isotropic displacement, U_iso in squared Angstroms.
    Isotropic(f64),
    /// Anisotropic displacement tensor U*, packed as
    /// `[U11, U22, U33, U12, U13, U23]`.
    Anisotropic([f64; 6]),
}

impl AdpParameters {
    /// Number of independent displacement parameters (1 or 6).
    pub fn arity(&self) -> usize {
        match self {
            AdpParameters::Isotropic(_) => 1,
            AdpParameters::Anisotropic(_) => 6,
        }
    }

    /// All stored values as a slice-backed vector, in packing order.
    pub fn values(&self) -> Vec<f64> {
        match self {
            AdpParameters::Isotropic(u) => vec![*u],
            AdpParameters::Anisotropic(u) => u.to_vec(),
        }
    }
}

/// One scatterer of a [`CrystalGeometry`](super::geometry::CrystalGeometry).
///
/// Sites are fractional coordinates of the unit cell; the geometry adapter is
/// responsible for converting whatever convention the host declares before an
/// `Atom` is constructed. The anomalous term bundles f' and f'' as the real
/// and imaginary part of one complex correction.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    /// Site label as the host names it (e.g. "C1", "O_W2").
    pub label: String,
    /// Canonical element symbol (e.g. "C", "Fe").
    pub element: String,
    /// Fractional coordinates.
    pub site: Point3<f64>,
    /// Site occupancy factor.
    pub occupancy: f64,
    /// Displacement parameters; arity is fixed for this atom's lifetime.
    pub adp: AdpParameters,
    /// Net atomic charge in elementary charge units.
    pub charge: f64,
    /// Anomalous dispersion correction, f' + i f''.
    pub anomalous: Complex64,
}

impl Atom {
    /// Creates an atom with unit occupancy, zero isotropic displacement,
    /// zero charge, and no anomalous correction.
    pub fn new(label: &str, element: &str, site: Point3<f64>) -> Self {
        Self {
            label: label.to_string(),
            element: element.to_string(),
            site,
            occupancy: 1.0,
            adp: AdpParameters::Isotropic(0.0),
            charge: 0.0,
            anomalous: Complex64::new(0.0, 0.0),
        }
    }
}
