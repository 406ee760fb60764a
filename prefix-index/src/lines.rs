//! Line-oriented input and output.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::info;

use crate::error::{Error, Result};

/// Reads up to `limit` non-empty lines, in file order.
///
/// Blank lines are skipped and do not count toward the limit. Trailing `\r` is
/// dropped so CRLF files read the same as LF files.
pub fn read_lines(path: &Path, limit: Option<usize>) -> Result<Vec<String>> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let reader = BufReader::new(file);

    let limit = limit.unwrap_or(usize::MAX);
    let mut lines = Vec::new();
    for line in reader.lines() {
        if lines.len() >= limit {
            break;
        }
        let line = line.map_err(|e| Error::io(path, e))?;
        let line = line.strip_suffix('\r').unwrap_or(&line);
        if line.is_empty() {
            continue;
        }
        lines.push(line.to_string());
    }

    info!(path = %path.display(), count = lines.len(), "loaded lines");
    Ok(lines)
}

/// Writes one entry per line, creating or truncating the file, and flushes.
pub fn write_lines<I, S>(lines: I, path: &Path) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut writer = BufWriter::new(file);

    let mut count = 0usize;
    for line in lines {
        writeln!(writer, "{}", line.as_ref()).map_err(|e| Error::io(path, e))?;
        count += 1;
    }
    writer.flush().map_err(|e| Error::io(path, e))?;

    info!(path = %path.display(), count, "wrote lines");
    Ok(())
}
