//! autodis-core
//!
//! Core library for the instruction census map step.
//!
//! This crate loads an executable container (ELF, COFF, or raw bytes),
//! resolves the target it was built for, scans its code section for function
//! symbols, decodes each function into instruction blocks, and emits one
//! `<mnemonic>\t1` record per decoded instruction for an external reduce stage.
//!
//! All substantive logic lives here so it is testable and reusable from
//! frontends other than the CLI.

pub mod config;
pub mod loader;
pub mod model;
pub mod services;
pub mod target;

pub use loader::{ContainerFormat, ContainerHandle, InputSource};
pub use services::census::{run_census, CensusOptions, CensusSession, TELEMETRY_RECORD};

/// Returns the library version as encoded at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
