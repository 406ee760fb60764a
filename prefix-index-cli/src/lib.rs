//! Batch driver for building, analyzing and matching hash-prefix indexes.
//!
//! Each subcommand is one step of a collision study: normalize a URL list into
//! patterns and a JSON index, analyze bucket sizes across bit lengths, and intersect
//! an index with an external prefix list in either direction.

pub mod cli;
pub mod commands;
pub mod error;

pub use cli::{Cli, Command};
pub use commands::Context;
pub use error::Error;
