//! JSON persistence of prefix to pattern-list maps, and browser-history exports.
//!
//! Map files hold a single object whose values are string arrays, written with
//! four-space indentation and keys in sorted order.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use tracing::info;

use crate::codec::{BitLength, PrefixEncoding};
use crate::error::{Error, Result};
use crate::index::PrefixIndex;

/// Parses an object of string arrays.
pub fn read_string_map(path: &Path) -> Result<BTreeMap<String, Vec<String>>> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let map: BTreeMap<String, Vec<String>> = serde_json::from_reader(BufReader::new(file))
        .map_err(|source| Error::Json { path: path.to_path_buf(), source })?;
    info!(path = %path.display(), keys = map.len(), "loaded JSON map");
    Ok(map)
}

/// Serializes a map with four-space indentation.
pub fn write_string_map<K, V>(map: &BTreeMap<K, V>, path: &Path) -> Result<()>
where
    K: Serialize + Ord,
    V: Serialize,
{
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut writer = BufWriter::new(file);

    let mut ser = serde_json::Serializer::with_formatter(&mut writer, PrettyFormatter::with_indent(b"    "));
    map.serialize(&mut ser).map_err(|source| Error::Json { path: path.to_path_buf(), source })?;
    writer.flush().map_err(|e| Error::io(path, e))?;

    info!(path = %path.display(), keys = map.len(), "wrote JSON map");
    Ok(())
}

/// Loads a bit-string keyed index, inferring its bit length from the keys.
pub fn read_index(path: &Path) -> Result<PrefixIndex> {
    PrefixIndex::from_bit_string_map(read_string_map(path)?)
}

/// Loads an index whose keys are in `encoding`, normalized to `bits`.
pub fn read_index_as(path: &Path, encoding: PrefixEncoding, bits: BitLength) -> Result<PrefixIndex> {
    PrefixIndex::from_map(read_string_map(path)?, encoding, bits)
}

pub fn write_index(index: &PrefixIndex, path: &Path) -> Result<()> {
    write_string_map(&index.to_sorted_map(), path)
}

/// One visited page of a browser-history export. Fields other than `url` are optional.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HistoryItem {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub page_transition: String,
    #[serde(default)]
    pub time_usec: i64,
}

/// Either a bare array of items or a Takeout-style object wrapping one.
#[derive(Deserialize)]
#[serde(untagged)]
enum HistoryFile {
    Items(Vec<HistoryItem>),
    Takeout {
        #[serde(rename = "Browser History")]
        items: Vec<HistoryItem>,
    },
}

/// Reads the visited URLs of a browser-history export, in file order.
pub fn read_history(path: &Path) -> Result<Vec<HistoryItem>> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let history: HistoryFile = serde_json::from_reader(BufReader::new(file))
        .map_err(|source| Error::Json { path: path.to_path_buf(), source })?;
    let items = match history {
        HistoryFile::Items(items) | HistoryFile::Takeout { items } => items,
    };
    info!(path = %path.display(), items = items.len(), "loaded browser history");
    Ok(items)
}

/// Non-empty history URLs, truncated to `limit` like [`crate::lines::read_lines`].
pub fn read_history_urls(path: &Path, limit: Option<usize>) -> Result<Vec<String>> {
    Ok(read_history(path)?
        .into_iter()
        .map(|item| item.url)
        .filter(|url| !url.trim().is_empty())
        .take(limit.unwrap_or(usize::MAX))
        .collect())
}
