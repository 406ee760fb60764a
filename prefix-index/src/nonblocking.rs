//! Async wrappers that run the blocking loaders on tokio's blocking pool.
//!
//! Each call is one `spawn_blocking` for the whole operation rather than per-read
//! async file I/O.

use std::path::PathBuf;

use tokio::task::spawn_blocking;

use crate::codec::BitLength;
use crate::error::Result;
use crate::hash::Sha256Hasher;
use crate::index::PrefixIndex;
use crate::{json, lines};

pub async fn read_lines(path: PathBuf, limit: Option<usize>) -> Result<Vec<String>> {
    spawn_blocking(move || lines::read_lines(&path, limit)).await?
}

pub async fn read_index(path: PathBuf) -> Result<PrefixIndex> {
    spawn_blocking(move || json::read_index(&path)).await?
}

/// Builds a SHA-256 index off the async executor.
pub async fn build_index(patterns: Vec<String>, bits: BitLength) -> Result<PrefixIndex> {
    spawn_blocking(move || PrefixIndex::build(patterns, &Sha256Hasher, bits)).await?
}
