//! Durable, append-only result set storage.
//!
//! A result set is one JSON Lines file per benchmark session, identified by
//! a UTC timestamp plus model label. Each append writes a single
//! self-describing record line and syncs it to disk before returning, so a
//! caller can crash immediately after `append` without losing the record.
//! There is no update or delete: every attempt, including failures, stays
//! auditable. Reads are streaming, record by record, so very large
//! sessions never need to fit in memory.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::RecorderError;

use super::RunRecord;

/// Append-only writer for one result set.
///
/// Safe to share across concurrently running attempts: each append is a
/// single atomic line write behind a lock, so no partial record is ever
/// visible and interleaved appenders cannot corrupt the file.
pub struct ResultSetWriter {
    path: PathBuf,
    file: Mutex<File>,
}

impl ResultSetWriter {
    /// Creates a new result set in `dir`, named by the current UTC time and
    /// the model label.
    pub async fn create(dir: impl AsRef<Path>, model: &str) -> Result<Self, RecorderError> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;

        let label: String = model
            .chars()
            .map(|c| if c == '/' || c == ':' { '-' } else { c })
            .collect();
        let name = format!("{}-{}.jsonl", Utc::now().format("%Y%m%d-%H%M%S"), label);

        Self::open(dir.join(name)).await
    }

    /// Opens a result set file for appending, creating it if absent.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, RecorderError> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Appends one record, durably.
    ///
    /// The record is serialized to a single line, written, flushed, and
    /// synced before this returns.
    pub async fn append(&self, record: &RunRecord) -> Result<(), RecorderError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        file.sync_all().await?;

        Ok(())
    }

    /// Path of the underlying result set file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Streaming reader over a closed result set.
pub struct ResultSetReader {
    lines: std::io::Lines<std::io::BufReader<std::fs::File>>,
}

impl ResultSetReader {
    /// Opens a result set file for streaming reads.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RecorderError> {
        let file = std::fs::File::open(path)?;
        Ok(Self {
            lines: std::io::BufReader::new(file).lines(),
        })
    }

    /// Reads an entire result set into memory.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<RunRecord>, RecorderError> {
        Self::open(path)?.collect()
    }
}

impl Iterator for ResultSetReader {
    type Item = Result<RunRecord, RecorderError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.lines.next()? {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => {
                    return Some(serde_json::from_str(&line).map_err(RecorderError::Json))
                }
                Err(e) => return Some(Err(RecorderError::Io(e))),
            }
        }
    }
}
