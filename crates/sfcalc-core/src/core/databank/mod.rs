//! The multipole databank: the text resource that TAAM assignment matches
//! local chemical environments against.
//!
//! A databank is a TOML file mapping pseudoatom-type names to an element, an
//! optional bonded-neighbor environment, and the transferable multipole
//! parameters of that type. The numeric content is reference data; nothing in
//! this crate re-derives it.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File extension recognized by [`list_available_databanks`].
pub const DATABANK_EXTENSION: &str = "bank";

#[derive(Debug, Error)]
pub enum DatabankError {
    #[error("databank not found at '{path}'")]
    NotFound { path: String },
    #[error("failed to read databank '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse databank '{path}': {source}")]
    Parse {
        path: String,
        source: Box<toml::de::Error>,
    },
}

/// One transferable pseudoatom type.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PseudoatomType {
    /// Element this type applies to.
    pub element: String,
    /// Bonded-neighbor element environment; empty means the type is the
    /// generic fallback for its element.
    #[serde(default)]
    pub neighbors: Vec<String>,
    /// Valence contraction-expansion parameter.
    pub kappa: f64,
    /// Valence-shell population of the pseudoatom.
    pub valence_population: f64,
    /// Higher-order multipole populations, lowest order first.
    #[serde(default)]
    pub multipole_populations: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct BankFile {
    #[serde(default)]
    #[allow(dead_code)]
    name: Option<String>,
    types: BTreeMap<String, PseudoatomType>,
}

/// A loaded multipole databank, keyed by type name.
#[derive(Debug, Clone, PartialEq)]
pub struct MultipoleDatabank {
    identity: String,
    types: BTreeMap<String, PseudoatomType>,
}

impl MultipoleDatabank {
    /// Loads a databank from a TOML file.
    ///
    /// A missing path is reported as [`DatabankError::NotFound`] before any
    /// read is attempted, so a misconfigured path surfaces immediately.
    pub fn load(path: &Path) -> Result<Self, DatabankError> {
        if !path.is_file() {
            return Err(DatabankError::NotFound {
                path: path.to_string_lossy().to_string(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| DatabankError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        let file: BankFile = toml::from_str(&content).map_err(|e| DatabankError::Parse {
            path: path.to_string_lossy().to_string(),
            source: Box::new(e),
        })?;
        Ok(Self {
            identity: path.to_string_lossy().to_string(),
            types: file.types,
        })
    }

    /// Stable identity of this databank (its path), used in cache keys.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn get(&self, type_name: &str) -> Option<&PseudoatomType> {
        self.types.get(type_name)
    }

    /// Finds the pseudoatom type for an atom's local chemical environment.
    ///
    /// Exact environment matches (same element, same multiset of bonded
    /// neighbor elements) win over the element-generic entry with no declared
    /// neighbors. Ties are broken by type name, so matching is deterministic.
    pub fn match_environment(
        &self,
        element: &str,
        neighbor_elements: &[&str],
    ) -> Option<(&str, &PseudoatomType)> {
        let mut wanted: Vec<&str> = neighbor_elements.to_vec();
        wanted.sort_unstable();

        let mut generic: Option<(&str, &PseudoatomType)> = None;
        for (name, entry) in &self.types {
            if entry.element != element {
                continue;
            }
            if entry.neighbors.is_empty() {
                generic.get_or_insert((name.as_str(), entry));
                continue;
            }
            let mut declared: Vec<&str> = entry.neighbors.iter().map(String::as_str).collect();
            declared.sort_unstable();
            if declared == wanted {
                return Some((name.as_str(), entry));
            }
        }
        generic
    }
}

/// Enumerates the databank files available under a directory, sorted by path.
pub fn list_available_databanks(dir: &Path) -> Result<Vec<PathBuf>, DatabankError> {
    if !dir.is_dir() {
        return Err(DatabankError::NotFound {
            path: dir.to_string_lossy().to_string(),
        });
    }
    let entries = std::fs::read_dir(dir).map_err(|e| DatabankError::Io {
        path: dir.to_string_lossy().to_string(),
        source: e,
    })?;

    let mut banks = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| DatabankError::Io {
            path: dir.to_string_lossy().to_string(),
            source: e,
        })?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some(DATABANK_EXTENSION) {
            banks.push(path);
        }
    }
    banks.sort();
    Ok(banks)
}
