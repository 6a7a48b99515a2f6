//! Writers for flagged results on the command line.

use std::io::Write;

use serde::Serialize;
use thiserror::Error;

use crate::engine::{BatchOutcome, FlaggedResult};

#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How results are written to the output stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// A single-line JSON array, as returned by the upload endpoint
    #[default]
    Json,
    /// An indented JSON array
    Pretty,
    /// One JSON object per line
    Ndjson,
}

/// NDJSON (Newline Delimited JSON) writer
pub struct NdjsonWriter<W: Write> {
    writer: W,
}

impl<W: Write> NdjsonWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write<T: Serialize>(&mut self, item: &T) -> Result<(), SerializationError> {
        serde_json::to_writer(&mut self.writer, item)?;
        writeln!(self.writer)?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<(), SerializationError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Write the flagged results of a batch in the given format.
pub fn write_results<W: Write>(
    mut writer: W,
    results: &[FlaggedResult],
    format: OutputFormat,
) -> Result<(), SerializationError> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer(&mut writer, results)?;
            writeln!(writer)?;
        }
        OutputFormat::Pretty => {
            serde_json::to_writer_pretty(&mut writer, results)?;
            writeln!(writer)?;
        }
        OutputFormat::Ndjson => {
            let mut ndjson = NdjsonWriter::new(writer);
            for result in results {
                ndjson.write(result)?;
            }
            return ndjson.finish();
        }
    }
    writer.flush()?;
    Ok(())
}

/// Write the batch report, with its flagged results, as one JSON document.
pub fn write_outcome<W: Write>(
    mut writer: W,
    outcome: &BatchOutcome,
    pretty: bool,
) -> Result<(), SerializationError> {
    if pretty {
        serde_json::to_writer_pretty(&mut writer, outcome)?;
    } else {
        serde_json::to_writer(&mut writer, outcome)?;
    }
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}
