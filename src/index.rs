//! Reader for the whitespace-delimited index files shipped with each release.
//!
//! Lines starting with the comment prefix are headers and are skipped, as are
//! blank lines. Every other line is split on whitespace.

use std::fs::File;
use std::io::{BufRead, BufReader};

use camino::Utf8Path;

use crate::error::PdbbindError;

pub const COMMENT_PREFIX: &str = "#";

/// Extract the requested zero-based columns, one sequence per column, in file order.
pub fn read_columns(
    path: &Utf8Path,
    columns: &[usize],
    comment_prefix: &str,
) -> Result<Vec<Vec<String>>, PdbbindError> {
    let file = File::open(path.as_std_path())
        .map_err(|err| PdbbindError::Filesystem(format!("open index {path}: {err}")))?;
    let reader = BufReader::new(file);

    let mut results = vec![Vec::new(); columns.len()];
    for (number, line) in reader.lines().enumerate() {
        let line =
            line.map_err(|err| PdbbindError::Filesystem(format!("read index {path}: {err}")))?;
        if line.starts_with(comment_prefix) {
            continue;
        }
        let fields = line.split_whitespace().collect::<Vec<_>>();
        if fields.is_empty() {
            continue;
        }
        for (slot, &column) in columns.iter().enumerate() {
            let value = fields
                .get(column)
                .ok_or_else(|| PdbbindError::IndexRowTooShort {
                    path: path.to_owned(),
                    line: number + 1,
                    column,
                })?;
            results[slot].push(value.to_string());
        }
    }
    Ok(results)
}

/// Same as [`read_columns`], packaged as one tuple per row.
pub fn read_tuples(
    path: &Utf8Path,
    columns: &[usize],
    comment_prefix: &str,
) -> Result<Vec<Vec<String>>, PdbbindError> {
    let by_column = read_columns(path, columns, comment_prefix)?;
    let rows = by_column.first().map(Vec::len).unwrap_or(0);
    let mut tuples = vec![Vec::with_capacity(columns.len()); rows];
    for column in by_column {
        for (row, value) in column.into_iter().enumerate() {
            tuples[row].push(value);
        }
    }
    Ok(tuples)
}
