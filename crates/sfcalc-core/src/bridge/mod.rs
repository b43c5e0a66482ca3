//! The stateful public layer: everything between a mutable host structure
//! and the scattering engine.
//!
//! - [`adapter`] snapshots host state into a canonical [`CrystalGeometry`](crate::core::models::geometry::CrystalGeometry).
//! - [`assignment`] performs and caches pseudoatom-type assignment (TAAM).
//! - [`session`] owns one engine instance and manages staleness across
//!   geometry updates.
//! - [`registry`] amortizes session construction across repeated requests
//!   for the same structure identity.
//! - [`router`] maps engine gradients into host refinement-parameter space.

pub mod adapter;
pub mod assignment;
pub mod config;
pub mod error;
pub mod host;
pub mod registry;
pub mod router;
pub mod session;

pub use assignment::{AssignmentCache, AtomTypeAssignment};
pub use config::{ScatteringModel, TaamParameters};
pub use error::BridgeError;
pub use host::{
    HostAdpConvention, HostAtom, HostDisplacement, HostStructure, RefinementFlags,
    SimpleStructure, SiteConvention,
};
pub use registry::SessionRegistry;
pub use router::{AdpDerivatives, TargetParamDerivatives};
pub use session::{CalculatorSession, SyncState};
