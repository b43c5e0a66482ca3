pub mod atom;
pub mod cell;
pub mod geometry;
pub mod symmetry;
