//! Comma-delimited table loader.
//!
//! One record per line. Fields are split on every `,`: there is no quoting
//! or escaping. A trailing `\r` is stripped from each line, a final empty
//! field after a trailing comma is dropped, and empty interior fields are
//! kept. Lines are never skipped, so row numbers match line numbers.
//!
//! Fields are raw bytes; no text encoding is assumed.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::TableError;

const SEPARATOR: u8 = b',';
const NEWLINE: u8 = b'\n';

/// Rows of byte-string fields, immutable once loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    rows: Vec<Vec<Vec<u8>>>,
}

impl Table {
    pub fn from_rows(rows: Vec<Vec<Vec<u8>>>) -> Self {
        Self { rows }
    }

    pub fn from_path(path: &Path) -> Result<Self, TableError> {
        let io_err = |source| TableError::Io {
            path: path.display().to_string(),
            source,
        };
        let file = File::open(path).map_err(io_err)?;
        Self::from_reader(BufReader::new(file)).map_err(|e| match e {
            TableError::Io { source, .. } => io_err(source),
            other => other,
        })
    }

    pub fn from_reader<R: BufRead>(mut reader: R) -> Result<Self, TableError> {
        let mut rows = Vec::new();
        let mut line = Vec::new();
        loop {
            line.clear();
            let read = reader
                .read_until(NEWLINE, &mut line)
                .map_err(|source| TableError::Io {
                    path: "<reader>".to_string(),
                    source,
                })?;
            if read == 0 {
                break;
            }
            let record = line.strip_suffix(&[NEWLINE]).unwrap_or(&line);
            rows.push(split_record(record));
        }
        Ok(Self { rows })
    }

    /// Parse in-memory text.
    pub fn parse(text: impl AsRef<[u8]>) -> Self {
        let bytes = text.as_ref();
        if bytes.is_empty() {
            return Self::default();
        }
        let body = bytes.strip_suffix(&[NEWLINE]).unwrap_or(bytes);
        Self {
            rows: body.split(|&b| b == NEWLINE).map(split_record).collect(),
        }
    }

    pub fn rows(&self) -> &[Vec<Vec<u8>>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn field(&self, row: usize, column: usize) -> Option<&[u8]> {
        self.rows.get(row)?.get(column).map(Vec::as_slice)
    }
}

fn split_record(line: &[u8]) -> Vec<Vec<u8>> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.is_empty() {
        return Vec::new();
    }
    let mut fields: Vec<Vec<u8>> = line.split(|&b| b == SEPARATOR).map(<[u8]>::to_vec).collect();
    if fields.last().is_some_and(|f| f.is_empty()) {
        fields.pop();
    }
    fields
}
