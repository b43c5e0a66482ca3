//! Reflection indices and resolution of index sets.
//!
//! A computed structure-factor array corresponds position-by-position to the
//! index set it was requested for, so everything here guarantees stable,
//! deterministic ordering: resolution-limit enumeration walks the reciprocal
//! lattice lexicographically, and explicit lists pass through untouched.

use crate::core::models::cell::UnitCell;
use nalgebra::Vector3;
use std::fmt;

/// A reflection index (h, k, l).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hkl {
    pub h: i32,
    pub k: i32,
    pub l: i32,
}

impl Hkl {
    pub fn new(h: i32, k: i32, l: i32) -> Self {
        Self { h, k, l }
    }

    pub fn as_vector(&self) -> Vector3<f64> {
        Vector3::new(self.h as f64, self.k as f64, self.l as f64)
    }

    pub fn is_origin(&self) -> bool {
        self.h == 0 && self.k == 0 && self.l == 0
    }
}

impl From<(i32, i32, i32)> for Hkl {
    fn from((h, k, l): (i32, i32, i32)) -> Self {
        Self::new(h, k, l)
    }
}

impl From<[i32; 3]> for Hkl {
    fn from([h, k, l]: [i32; 3]) -> Self {
        Self::new(h, k, l)
    }
}

impl fmt::Display for Hkl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.h, self.k, self.l)
    }
}

/// Enumerates every reflection with `d(hkl) >= d_min`, excluding (0,0,0),
/// in ascending lexicographic (h, k, l) order.
///
/// The order is a pure function of the cell and the limit, so repeated calls
/// with identical inputs produce identical sequences; callers may rely on
/// positional correspondence with previously returned arrays.
pub fn within_resolution_limit(cell: &UnitCell, d_min: f64) -> Vec<Hkl> {
    let [h_max, k_max, l_max] = cell.max_indices(d_min);
    let mut out = Vec::new();
    for h in -h_max..=h_max {
        for k in -k_max..=k_max {
            for l in -l_max..=l_max {
                let hkl = Hkl::new(h, k, l);
                if hkl.is_origin() {
                    continue;
                }
                if cell.d_spacing(hkl) >= d_min {
                    out.push(hkl);
                }
            }
        }
    }
    out
}

/// Passes an explicit index list through unchanged: order preserved,
/// duplicates permitted.
pub fn explicit<I, T>(indices: I) -> Vec<Hkl>
where
    I: IntoIterator<Item = T>,
    T: Into<Hkl>,
{
    indices.into_iter().map(Into::into).collect()
}
