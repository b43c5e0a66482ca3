//! # sfcalc Core Library
//!
//! A library for computing X-ray and electron structure factors from a
//! host-owned crystal-structure description, under the Independent Atom Model
//! (IAM) and the Transferable Aspherical Atom Model (TAAM).
//!
//! The scattering mathematics itself is a well-understood direct summation;
//! the value of this crate is the bridging and caching layer around it:
//! snapshotting mutable host geometry into a canonical representation,
//! performing and caching the expensive pseudoatom-type assignment that TAAM
//! requires, keeping a long-lived calculator correctly synchronized across
//! repeated geometry updates (as in iterative refinement), and routing
//! structure-factor derivatives back into host parameter space.
//!
//! ## Architectural Philosophy
//!
//! The library is split into three strict layers:
//!
//! - **[`core`]: The Foundation.** Stateless data models (`CrystalGeometry`,
//!   `UnitCell`, `SpaceGroup`), reflection-index resolution, bonding-topology
//!   derivation, scattering-factor tables, and the multipole databank.
//!
//! - **[`engine`]: The Calculation Collaborator.** The `StructureFactorEngine`
//!   trait describes what any scattering engine must provide; the shipped
//!   `DirectSummationEngine` implements it by direct summation over atoms and
//!   symmetry operations, with analytic parameter derivatives.
//!
//! - **[`bridge`]: The Public API.** The stateful layer: the geometry adapter,
//!   the assignment cache, the `CalculatorSession` state machine, the
//!   process-wide session registry, and the derivative router.

pub mod bridge;
pub mod core;
pub mod engine;
