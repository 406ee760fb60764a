//! Hash prefixes from a SQLite prefix store.
//!
//! The store keeps raw prefix bytes in `hash_prefix(value BLOB, platform_type TEXT)`,
//! the layout of a local Safe Browsing v4 database.

use std::path::Path;

use rusqlite::{Connection, OpenFlags, params};
use tracing::info;

use crate::error::{Error, Result};

/// Platform tag matching every platform.
pub const ANY_PLATFORM: &str = "ANY_PLATFORM";

const PREFIX_QUERY: &str = "SELECT lower(hex(value)) FROM hash_prefix WHERE platform_type = ?1";

/// Lowercase hex prefixes stored for `platform`.
pub fn read_store_prefixes(path: &Path, platform: &str) -> Result<Vec<String>> {
    let store_err = |source: rusqlite::Error| Error::Store { path: path.to_path_buf(), source };

    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY).map_err(store_err)?;
    let mut stmt = conn.prepare(PREFIX_QUERY).map_err(store_err)?;
    let prefixes = stmt
        .query_map(params![platform], |row| row.get::<_, String>(0))
        .map_err(store_err)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(store_err)?;

    info!(path = %path.display(), platform, count = prefixes.len(), "read prefix store");
    Ok(prefixes)
}
