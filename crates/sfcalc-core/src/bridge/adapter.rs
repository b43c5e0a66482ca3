//! The geometry adapter: turns a read-only host snapshot into the canonical
//! [`CrystalGeometry`] the engine consumes.
//!
//! Canonical means fractional sites and U*-convention displacement tensors;
//! whatever the host declares is converted here, once, so nothing downstream
//! has to care.

use super::error::BridgeError;
use super::host::{HostAdpConvention, HostDisplacement, HostStructure, SiteConvention};
use crate::core::models::atom::{AdpParameters, Atom};
use crate::core::models::cell::UnitCell;
use crate::core::models::geometry::CrystalGeometry;
use crate::core::models::symmetry::SpaceGroup;
use crate::core::scattering::ScatteringTable;
use crate::core::utils::elements;

/// Resolves the scattering table the host has declared.
pub fn resolve_scattering_table(host: &impl HostStructure) -> Result<ScatteringTable, BridgeError> {
    host.scattering_table().ok_or_else(|| {
        BridgeError::configuration(
            "the host structure has not declared a scattering table; select one before \
             constructing a calculator session",
        )
    })
}

/// Snapshots the host's cell, symmetry, and atoms into a [`CrystalGeometry`].
pub fn snapshot_geometry(host: &impl HostStructure) -> Result<CrystalGeometry, BridgeError> {
    let [a, b, c, alpha, beta, gamma] = host.unit_cell();
    let cell = UnitCell::new(a, b, c, alpha, beta, gamma)
        .map_err(|e| BridgeError::configuration(format!("invalid unit cell: {e}")))?;

    let space_group = SpaceGroup::from_operations(host.symmetry_operations());

    let site_convention = host.site_convention();
    let adp_convention = host.adp_convention();

    let mut atoms = Vec::new();
    for (index, host_atom) in host.atoms().into_iter().enumerate() {
        // Hosts that leave the element blank still usually encode it in the
        // site label ("Fe1", "O_W2").
        let element = if host_atom.element.is_empty() {
            elements::symbol_from_label(&host_atom.label)
                .ok_or_else(|| {
                    BridgeError::configuration(format!(
                        "atom {index} ('{}') has no element label and none could be \
                         derived from its site label",
                        host_atom.label
                    ))
                })?
                .to_string()
        } else {
            host_atom.element.clone()
        };
        if !host_atom.site.coords.iter().all(|v| v.is_finite()) {
            return Err(BridgeError::configuration(format!(
                "atom {index} ('{}') has a non-finite site",
                host_atom.label
            )));
        }

        let site = match site_convention {
            SiteConvention::Fractional => host_atom.site,
            SiteConvention::Cartesian => cell.fractionalize(&host_atom.site),
        };

        let adp = convert_displacement(&cell, adp_convention, host_atom.displacement).map_err(
            |reason| {
                BridgeError::configuration(format!(
                    "atom {index} ('{}'): {reason}",
                    host_atom.label
                ))
            },
        )?;

        let mut atom = Atom::new(&host_atom.label, &element, site);
        atom.occupancy = host_atom.occupancy;
        atom.adp = adp;
        atom.charge = host_atom.charge;
        atom.anomalous = host_atom.anomalous;
        atoms.push(atom);
    }

    Ok(CrystalGeometry::new(cell, space_group, atoms))
}

fn convert_displacement(
    cell: &UnitCell,
    convention: HostAdpConvention,
    displacement: HostDisplacement,
) -> Result<AdpParameters, String> {
    match displacement {
        HostDisplacement::Isotropic(u) => {
            if !u.is_finite() {
                return Err("non-finite isotropic displacement".to_string());
            }
            Ok(AdpParameters::Isotropic(u))
        }
        HostDisplacement::Anisotropic(u) => {
            if u.iter().any(|v| !v.is_finite()) {
                return Err("non-finite anisotropic displacement".to_string());
            }
            if u[0] < 0.0 || u[1] < 0.0 || u[2] < 0.0 {
                return Err(format!(
                    "anisotropic displacement has negative diagonal elements \
                     ({}, {}, {})",
                    u[0], u[1], u[2]
                ));
            }
            let u_star = match convention {
                HostAdpConvention::UStar => u,
                HostAdpConvention::UCif => cell.u_star_from_u_cif(u),
                HostAdpConvention::UCart => cell.u_star_from_u_cart(u),
            };
            Ok(AdpParameters::Anisotropic(u_star))
        }
    }
}
