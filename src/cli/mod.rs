//! Command-line interface for navbench.
//!
//! Provides commands for running benchmark sessions, reporting aggregated
//! metrics, and comparing result sets across tool versions.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli};
