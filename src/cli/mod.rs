//! Command-line interface for textsplit
//!
//! Each operation subcommand builds an [`crate::Engine`] from the merged
//! configuration, runs one job and prints the result.

pub mod commands;
pub mod output;

pub use commands::Cli;
pub use output::Output;
