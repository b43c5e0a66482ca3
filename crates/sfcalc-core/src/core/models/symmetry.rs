use nalgebra::{Matrix3, Point3, Vector3};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ParseSymmetryError {
    #[error("expected three comma-separated components, got {count}")]
    WrongComponentCount { count: usize },
    #[error("unexpected character '{found}' in symmetry component '{component}'")]
    UnexpectedCharacter { component: String, found: char },
    #[error("malformed numeric term in symmetry component '{component}'")]
    MalformedNumber { component: String },
}

/// One space-group operation: a rotation matrix and a translation vector,
/// both acting on fractional coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct SymmetryOperation {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
}

impl SymmetryOperation {
    pub fn identity() -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Applies the operation to a fractional site.
    pub fn apply(&self, site: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation * site.coords + self.translation)
    }

    /// Transforms a reflection index: returns `R^T h` as a real vector.
    pub fn transform_index(&self, hkl: Vector3<f64>) -> Vector3<f64> {
        self.rotation.transpose() * hkl
    }
}

impl FromStr for SymmetryOperation {
    type Err = ParseSymmetryError;

    /// Parses a Jones-faithful triplet such as `"x,y,z"` or
    /// `"-x, y+1/2, -z+1/2"`. Coefficients may be fractions (`1/2`) or
    /// decimals (`0.5`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let components: Vec<&str> = s.split(',').collect();
        if components.len() != 3 {
            return Err(ParseSymmetryError::WrongComponentCount {
                count: components.len(),
            });
        }

        let mut rotation = Matrix3::zeros();
        let mut translation = Vector3::zeros();

        for (row, component) in components.iter().enumerate() {
            parse_component(component, row, &mut rotation, &mut translation)?;
        }

        Ok(Self {
            rotation,
            translation,
        })
    }
}

impl fmt::Display for SymmetryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::with_capacity(3);
        for row in 0..3 {
            let mut part = String::new();
            for (col, axis) in ["x", "y", "z"].iter().enumerate() {
                let coef = self.rotation[(row, col)];
                if coef == 0.0 {
                    continue;
                }
                if coef > 0.0 && !part.is_empty() {
                    part.push('+');
                }
                if coef == -1.0 {
                    part.push('-');
                } else if coef != 1.0 {
                    part.push_str(&format!("{coef}*"));
                }
                part.push_str(axis);
            }
            let t = self.translation[row];
            if t != 0.0 {
                if t > 0.0 && !part.is_empty() {
                    part.push('+');
                }
                part.push_str(&format!("{t}"));
            }
            if part.is_empty() {
                part.push('0');
            }
            parts.push(part);
        }
        write!(f, "{}", parts.join(","))
    }
}

fn parse_component(
    component: &str,
    row: usize,
    rotation: &mut Matrix3<f64>,
    translation: &mut Vector3<f64>,
) -> Result<(), ParseSymmetryError> {
    let mut sign = 1.0;
    let mut number = String::new();
    let mut have_term = false;

    let flush_number = |number: &mut String,
                        sign: f64,
                        translation: &mut Vector3<f64>|
     -> Result<(), ParseSymmetryError> {
        if number.is_empty() {
            return Ok(());
        }
        let value = parse_number(number).ok_or_else(|| ParseSymmetryError::MalformedNumber {
            component: component.to_string(),
        })?;
        translation[row] += sign * value;
        number.clear();
        Ok(())
    };

    for ch in component.chars() {
        match ch {
            ' ' | '\t' => continue,
            '+' | '-' => {
                flush_number(&mut number, sign, translation)?;
                sign = if ch == '-' { -1.0 } else { 1.0 };
                have_term = false;
            }
            '0'..='9' | '/' | '.' => number.push(ch),
            'x' | 'X' | 'y' | 'Y' | 'z' | 'Z' => {
                let col = match ch.to_ascii_lowercase() {
                    'x' => 0,
                    'y' => 1,
                    _ => 2,
                };
                let coefficient = if number.is_empty() {
                    1.0
                } else {
                    let value =
                        parse_number(&number).ok_or_else(|| ParseSymmetryError::MalformedNumber {
                            component: component.to_string(),
                        })?;
                    number.clear();
                    value
                };
                rotation[(row, col)] += sign * coefficient;
                sign = 1.0;
                have_term = true;
            }
            other => {
                return Err(ParseSymmetryError::UnexpectedCharacter {
                    component: component.to_string(),
                    found: other,
                });
            }
        }
    }
    flush_number(&mut number, sign, translation)?;

    if !have_term && rotation.row(row).iter().all(|v| *v == 0.0) && translation[row] == 0.0 {
        return Err(ParseSymmetryError::MalformedNumber {
            component: component.to_string(),
        });
    }
    Ok(())
}

fn parse_number(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den == 0.0 {
            return None;
        }
        Some(num / den)
    } else {
        s.parse().ok()
    }
}

/// The symmetry operations of a space group, identity included.
#[derive(Debug, Clone, PartialEq)]
pub struct SpaceGroup {
    pub operations: Vec<SymmetryOperation>,
}

impl SpaceGroup {
    /// The trivial group P1.
    pub fn p1() -> Self {
        Self {
            operations: vec![SymmetryOperation::identity()],
        }
    }

    pub fn from_operations(operations: Vec<SymmetryOperation>) -> Self {
        if operations.is_empty() {
            return Self::p1();
        }
        Self { operations }
    }

    /// Parses a list of Jones-faithful triplets.
    pub fn from_triplets(triplets: &[&str]) -> Result<Self, ParseSymmetryError> {
        let operations = triplets
            .iter()
            .map(|t| t.parse())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_operations(operations))
    }

    pub fn order(&self) -> usize {
        self.operations.len()
    }
}

impl Default for SpaceGroup {
    fn default() -> Self {
        Self::p1()
    }
}
