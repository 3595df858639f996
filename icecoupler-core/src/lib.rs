//! Core of the GCM / ice-sheet coupler.
//!
//! A general-circulation model (GCM) exchanges fields with one or more ice
//! sheet models. The GCM works in *elevation space* (each atmosphere cell split
//! into height classes) while every ice model works on its own native grid.
//! This crate provides the pieces needed to move values across that boundary:
//!
//! - [`contract`]: named, unit-tagged lists of exchanged fields
//! - [`transformer`]: linear recipes converting one contract into another
//! - [`regrid`]: area-weighted sparse matrices between the grids
//! - [`recipes`]: the standard GCM contracts and transforms
//! - [`coupler`]: the per-timestep exchange protocol
//! - [`model`]: the trait implemented by ice models
pub mod config;
pub mod constants;
pub mod contract;
pub mod coupler;
pub mod errors;
pub mod grid;
pub mod model;
#[cfg(feature = "python")]
pub mod python;
pub mod recipes;
pub mod regrid;
pub mod sparse;
pub mod transformer;
pub mod units;
