use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use ior_core::{ErrorRecord, TrialResult};
use ior_experiment::ErrorSink;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("cannot open {}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot write {}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Appends one JSON object per aborted trial, flushed as it happens so a
/// crashed session keeps its error log.
#[derive(Debug)]
pub struct JsonlErrorLog {
    path: PathBuf,
    file: File,
}

impl JsonlErrorLog {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RecordError> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| RecordError::Open {
                path: path.clone(),
                source,
            })?;
        info!(path = %path.display(), "error log opened");
        Ok(Self { path, file })
    }

    fn append(&mut self, record: &ErrorRecord) -> Result<(), RecordError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.file
            .write_all(&line)
            .and_then(|()| self.file.flush())
            .map_err(|source| RecordError::Write {
                path: self.path.clone(),
                source,
            })
    }
}

impl ErrorSink for JsonlErrorLog {
    fn persist(&mut self, record: &ErrorRecord) -> anyhow::Result<()> {
        self.append(record)?;
        debug!(reason = record.reason.as_str(), "error record appended");
        Ok(())
    }
}

#[derive(Serialize)]
struct ResultsFile<'a> {
    participant_id: &'a str,
    trials: &'a [TrialResult],
}

/// Writes the session's completed trials as pretty JSON, replacing the file.
pub fn write_results(
    path: &Path,
    participant_id: &str,
    trials: &[TrialResult],
) -> Result<(), RecordError> {
    let write_err = |source: std::io::Error| RecordError::Write {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(|source| RecordError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer_pretty(
        &mut out,
        &ResultsFile {
            participant_id,
            trials,
        },
    )?;
    out.write_all(b"\n").map_err(write_err)?;
    out.flush().map_err(write_err)?;
    info!(path = %path.display(), trials = trials.len(), "results written");
    Ok(())
}
