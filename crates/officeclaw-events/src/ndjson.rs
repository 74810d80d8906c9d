//! Newline-delimited JSON files.
//!
//! Both durable logs store one JSON record per line and are only ever
//! appended to. Reading is decode-or-skip: a line that does not decode is
//! counted and dropped, and the rest of the file is still recovered. A
//! missing file reads as empty.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

/// Records recovered from a file together with the number of lines that
/// could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineReport<T> {
    /// Decoded records in file order.
    pub records: Vec<T>,
    /// Non-blank lines that were dropped.
    pub skipped: usize,
}

impl<T> Default for LineReport<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            skipped: 0,
        }
    }
}

/// Stream every non-blank line of `path` through `decode`.
///
/// Lines for which `decode` returns `None`, or that are not valid UTF-8,
/// count as skipped. Other read errors are returned.
pub fn read_lines<T, F>(path: &Path, mut decode: F) -> io::Result<LineReport<T>>
where
    F: FnMut(&str) -> Option<T>,
{
    let file = match File::open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            return Ok(LineReport::default());
        }
        Err(error) => return Err(error),
    };

    let mut report = LineReport::default();
    for line in BufReader::new(file).lines() {
        let line = match line {
            Ok(line) => line,
            Err(error) if error.kind() == io::ErrorKind::InvalidData => {
                report.skipped = report.skipped.saturating_add(1);
                continue;
            }
            Err(error) => return Err(error),
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match decode(trimmed) {
            Some(record) => report.records.push(record),
            None => report.skipped = report.skipped.saturating_add(1),
        }
    }
    Ok(report)
}

/// Append one already-encoded record as a line, creating parent
/// directories on first use.
pub fn append_line(path: &Path, encoded: &str) -> io::Result<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        fs::create_dir_all(dir)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut line = String::with_capacity(encoded.len().saturating_add(1));
    line.push_str(encoded);
    line.push('\n');
    file.write_all(line.as_bytes())
}
