//! dutstub: typed stubs, documentation and testbench skeletons for a
//! simulated design under test.
//!
//! The engine lives in the workspace crates; this crate is the integration
//! layer behind the `dutstub` binary.

// Engine - re-exported from the workspace crates
pub use dutstub_core::{analysis, config, docs, error, export, output, types, util};
pub use dutstub_python as python;

// Simulator collaborator
pub mod backend;
pub mod simulators;

// Front door
pub mod cli;
