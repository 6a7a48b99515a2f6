//! CSV loading for the reference tables.
//!
//! Rows are returned as ordered column-name -> cell mappings with every
//! cell kept as the raw string stored in the file.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use thiserror::Error;

/// One CSV row: header name -> raw cell text.
pub type Row = IndexMap<String, String>;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("Failed to open table {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Table '{table}' is missing required column '{column}'")]
    MissingColumn { table: String, column: String },

    #[error("Table '{table}' line {line}: invalid {column} '{value}': {reason}")]
    InvalidCell {
        table: String,
        line: usize,
        column: String,
        value: String,
        reason: String,
    },
}

/// Header and rows of one CSV table.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
    /// Source line each row starts on (1-based, header is line 1)
    pub lines: Vec<usize>,
}

impl RawTable {
    /// Ensure every named column is present in the header.
    pub fn require_columns(&self, table: &str, columns: &[&str]) -> Result<(), TableError> {
        for column in columns {
            if !self.headers.iter().any(|h| h == column) {
                return Err(TableError::MissingColumn {
                    table: table.to_string(),
                    column: column.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Rows paired with the line they start on.
    pub fn numbered_rows(&self) -> impl Iterator<Item = (usize, &Row)> + '_ {
        self.rows.iter().enumerate().map(|(i, row)| {
            let line = self.lines.get(i).copied().unwrap_or(i + 2);
            (line, row)
        })
    }
}

/// Load all rows of a CSV file whose first line is a header.
pub fn load_table<P: AsRef<Path>>(path: P) -> Result<RawTable, TableError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| TableError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let table = read_rows(file)?;
    tracing::debug!("Loaded {} rows from {}", table.rows.len(), path.display());
    Ok(table)
}

/// Read header + rows from any CSV source.
///
/// Short rows are padded with empty cells; a UTF-8 BOM before the first
/// header is ignored. Each row keeps the line it starts on.
pub fn read_rows<R: Read>(mut source: R) -> Result<RawTable, TableError> {
    let mut contents = Vec::new();
    source
        .read_to_end(&mut contents)
        .map_err(csv::Error::from)?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(contents.as_slice());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            if i == 0 {
                h.trim_start_matches('\u{feff}').to_string()
            } else {
                h.to_string()
            }
        })
        .collect();

    let mut rows = Vec::new();
    let mut lines = Vec::new();
    for record in reader.records() {
        let record = record?;
        let start = record.position().map(|p| p.byte() as usize).unwrap_or(0);
        let line = line_at(&contents, start);
        let row: Row = headers
            .iter()
            .enumerate()
            .map(|(i, header)| (header.clone(), record.get(i).unwrap_or("").to_string()))
            .collect();
        rows.push(row);
        lines.push(line);
    }

    Ok(RawTable {
        headers,
        rows,
        lines,
    })
}

/// Line number of the record whose read began at byte `offset`.
///
/// The reader skips blank lines before a record, and a quoted cell may
/// span several lines, so the line is counted from the first byte of the
/// record itself.
fn line_at(contents: &[u8], offset: usize) -> usize {
    let offset = offset.min(contents.len());
    let skipped = contents[offset..]
        .iter()
        .take_while(|&&b| b == b'\r' || b == b'\n')
        .count();
    1 + contents[..offset + skipped]
        .iter()
        .filter(|&&b| b == b'\n')
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_rows_keeps_raw_strings() {
        let csv = "name,min_age,everlab_lower\nglucose, 18 ,3.0\nsodium,,\n";
        let rows = read_rows(csv.as_bytes()).unwrap().rows;

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "glucose");
        assert_eq!(rows[0]["min_age"], " 18 ");
        assert_eq!(rows[1]["min_age"], "");
        assert_eq!(rows[1]["everlab_lower"], "");
    }

    #[test]
    fn test_read_rows_quoted_and_short() {
        let csv = "\u{feff}name,codes,units\n\"Glucose, fasting\",\"GLU;GLUF\"\n";
        let rows = read_rows(csv.as_bytes()).unwrap().rows;

        assert_eq!(rows[0]["name"], "Glucose, fasting");
        assert_eq!(rows[0]["codes"], "GLU;GLUF");
        assert_eq!(rows[0]["units"], "");
        assert_eq!(rows[0].keys().next().map(String::as_str), Some("name"));
    }

    #[test]
    fn test_row_lines_follow_source() {
        let csv = "name,note\n\nglucose,ok\nsodium,\"two\nlines\"\npotassium,\n";
        let table = read_rows(csv.as_bytes()).unwrap();
        let lines: Vec<usize> = table.numbered_rows().map(|(line, _)| line).collect();

        assert_eq!(lines, vec![3, 4, 6]);

        let crlf = read_rows("name\r\n\r\nglucose\r\nsodium".as_bytes()).unwrap();
        let lines: Vec<usize> = crlf.numbered_rows().map(|(line, _)| line).collect();
        assert_eq!(lines, vec![3, 4]);
        assert_eq!(table.rows[1]["note"], "two\nlines");
    }

    #[test]
    fn test_require_columns() {
        // Header-only table still reports its columns
        let table = read_rows("name,gender\n".as_bytes()).unwrap();

        assert!(table.rows.is_empty());
        assert!(table.require_columns("metrics", &["name", "gender"]).is_ok());
        let err = table.require_columns("metrics", &["name", "min_age"]).unwrap_err();
        assert!(matches!(err, TableError::MissingColumn { ref column, .. } if column == "min_age"));
    }

    #[test]
    fn test_load_table_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name,diagnostic_metrics").unwrap();
        writeln!(file, "Diabetes,glucose").unwrap();

        let rows = load_table(file.path()).unwrap().rows;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["diagnostic_metrics"], "glucose");
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_table("/nonexistent/oru-risk/metrics.csv").unwrap_err();
        assert!(matches!(err, TableError::Io { .. }));
    }
}
