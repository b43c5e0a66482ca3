use crate::core::indices::Hkl;
use nalgebra::{Matrix3, Point3};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CellParameterError {
    #[error("cell length {name} must be positive, got {value}")]
    NonPositiveLength { name: &'static str, value: f64 },
    #[error("cell angle {name} must lie strictly between 0 and 180 degrees, got {value}")]
    AngleOutOfRange { name: &'static str, value: f64 },
    #[error("cell angles ({alpha}, {beta}, {gamma}) do not describe a valid parallelepiped")]
    DegenerateCell { alpha: f64, beta: f64, gamma: f64 },
}

/// Unit-cell parameters plus the derived transformation matrices.
///
/// The orthogonalization matrix maps fractional to Cartesian coordinates
/// (a along x, b in the xy plane); the reciprocal metric tensor G* gives
/// `1/d^2 = h^T G* h` for a reflection index h.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitCell {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    orthogonalization: Matrix3<f64>,
    fractionalization: Matrix3<f64>,
    reciprocal_metric: Matrix3<f64>,
    volume: f64,
}

impl UnitCell {
    /// Builds a cell from lengths in Angstroms and angles in degrees.
    pub fn new(
        a: f64,
        b: f64,
        c: f64,
        alpha: f64,
        beta: f64,
        gamma: f64,
    ) -> Result<Self, CellParameterError> {
        for (name, value) in [("a", a), ("b", b), ("c", c)] {
            if !(value > 0.0) {
                return Err(CellParameterError::NonPositiveLength { name, value });
            }
        }
        for (name, value) in [("alpha", alpha), ("beta", beta), ("gamma", gamma)] {
            if !(value > 0.0 && value < 180.0) {
                return Err(CellParameterError::AngleOutOfRange { name, value });
            }
        }

        let (cos_a, cos_b, cos_g) = (
            alpha.to_radians().cos(),
            beta.to_radians().cos(),
            gamma.to_radians().cos(),
        );
        let sin_g = gamma.to_radians().sin();

        let v_sq =
            1.0 - cos_a * cos_a - cos_b * cos_b - cos_g * cos_g + 2.0 * cos_a * cos_b * cos_g;
        if v_sq <= 0.0 {
            return Err(CellParameterError::DegenerateCell { alpha, beta, gamma });
        }
        let v = v_sq.sqrt();

        let orthogonalization = Matrix3::new(
            a,
            b * cos_g,
            c * cos_b,
            0.0,
            b * sin_g,
            c * (cos_a - cos_b * cos_g) / sin_g,
            0.0,
            0.0,
            c * v / sin_g,
        );
        // Invertible whenever v_sq > 0, which was checked above.
        let fractionalization = orthogonalization
            .try_inverse()
            .ok_or(CellParameterError::DegenerateCell { alpha, beta, gamma })?;
        let reciprocal_metric = fractionalization * fractionalization.transpose();

        Ok(Self {
            a,
            b,
            c,
            alpha,
            beta,
            gamma,
            orthogonalization,
            fractionalization,
            reciprocal_metric,
            volume: a * b * c * v,
        })
    }

    pub fn parameters(&self) -> [f64; 6] {
        [self.a, self.b, self.c, self.alpha, self.beta, self.gamma]
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn orthogonalization(&self) -> &Matrix3<f64> {
        &self.orthogonalization
    }

    pub fn fractionalization(&self) -> &Matrix3<f64> {
        &self.fractionalization
    }

    pub fn orthogonalize(&self, frac: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.orthogonalization * frac.coords)
    }

    pub fn fractionalize(&self, cart: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.fractionalization * cart.coords)
    }

    /// Interplanar spacing d(hkl) in Angstroms.
    pub fn d_spacing(&self, hkl: Hkl) -> f64 {
        let h = hkl.as_vector();
        let inv_d_sq = (h.transpose() * self.reciprocal_metric * h)[(0, 0)];
        1.0 / inv_d_sq.sqrt()
    }

    /// `(sin(theta)/lambda)^2 = 1/(4 d^2)` for a reflection index.
    pub fn stol_sq(&self, hkl: Hkl) -> f64 {
        let h = hkl.as_vector();
        0.25 * (h.transpose() * self.reciprocal_metric * h)[(0, 0)]
    }

    /// Largest index along each reciprocal axis that can still satisfy a
    /// resolution limit of `d_min`.
    pub fn max_indices(&self, d_min: f64) -> [i32; 3] {
        let mut out = [0; 3];
        for (i, slot) in out.iter_mut().enumerate() {
            let axis = self.reciprocal_metric[(i, i)].sqrt();
            *slot = (1.0 / (d_min * axis)).floor() as i32;
        }
        out
    }

    /// Converts a Cartesian displacement tensor to the U* convention used by
    /// [`AdpParameters`](super::atom::AdpParameters), both packed as
    /// `[U11, U22, U33, U12, U13, U23]`.
    pub fn u_star_from_u_cart(&self, u_cart: [f64; 6]) -> [f64; 6] {
        let f = &self.fractionalization;
        let u = unpack_symmetric(u_cart);
        pack_symmetric(f * u * f.transpose())
    }

    /// Converts a crystallographic (CIF, dimensionless) displacement tensor
    /// to the U* convention by scaling with the reciprocal axis lengths.
    pub fn u_star_from_u_cif(&self, u_cif: [f64; 6]) -> [f64; 6] {
        let ra = [
            self.reciprocal_metric[(0, 0)].sqrt(),
            self.reciprocal_metric[(1, 1)].sqrt(),
            self.reciprocal_metric[(2, 2)].sqrt(),
        ];
        [
            u_cif[0] * ra[0] * ra[0],
            u_cif[1] * ra[1] * ra[1],
            u_cif[2] * ra[2] * ra[2],
            u_cif[3] * ra[0] * ra[1],
            u_cif[4] * ra[0] * ra[2],
            u_cif[5] * ra[1] * ra[2],
        ]
    }
}

/// Expands `[U11, U22, U33, U12, U13, U23]` into a full symmetric matrix.
pub fn unpack_symmetric(u: [f64; 6]) -> Matrix3<f64> {
    Matrix3::new(u[0], u[3], u[4], u[3], u[1], u[5], u[4], u[5], u[2])
}

/// Packs a symmetric matrix back into `[U11, U22, U33, U12, U13, U23]`.
pub fn pack_symmetric(m: Matrix3<f64>) -> [f64; 6] {
    [
        m[(0, 0)],
        m[(1, 1)],
        m[(2, 2)],
        m[(0, 1)],
        m[(0, 2)],
        m[(1, 2)],
    ]
}
