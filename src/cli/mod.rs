//! Command-line front end
//!
//! Subcommand handlers used by the `coldvault` binary.

pub mod commands;

pub use commands::*;
