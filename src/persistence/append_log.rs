//! Append-only durable log
//!
//! Every accepted publication is written as its exact wire frame, one per
//! line, and forced to stable storage before `append` returns. The file is
//! opened once when the broker starts and is never rotated or compacted.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::utils::PersistenceError;

/// Synchronous sink for accepted publications.
pub trait DurableLog: Send + fmt::Debug {
    /// Write `frame` followed by a newline and flush it to stable storage.
    fn append(&mut self, frame: &[u8]) -> Result<(), PersistenceError>;
}

pub struct AppendLog {
    path: PathBuf,
    file: File,
    appended: u64,
}

impl AppendLog {
    /// Open (creating if needed) `dir/file_name` for appending.
    pub fn open(dir: impl AsRef<Path>, file_name: &str) -> Result<Self, PersistenceError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|source| PersistenceError::Open {
            path: dir.to_path_buf(),
            source,
        })?;

        let path = dir.join(file_name);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| PersistenceError::Open {
                path: path.clone(),
                source,
            })?;

        info!("Durable log opened at {}", path.display());
        Ok(Self {
            path,
            file,
            appended: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Frames appended since this handle was opened.
    pub fn appended(&self) -> u64 {
        self.appended
    }
}

impl DurableLog for AppendLog {
    fn append(&mut self, frame: &[u8]) -> Result<(), PersistenceError> {
        // one write per frame so a line is never split between calls
        let mut line = Vec::with_capacity(frame.len() + 1);
        line.extend_from_slice(frame);
        line.push(b'\n');

        self.file
            .write_all(&line)
            .map_err(PersistenceError::Append)?;
        self.file.sync_data().map_err(PersistenceError::Append)?;
        self.appended += 1;
        Ok(())
    }
}

impl fmt::Debug for AppendLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppendLog")
            .field("path", &self.path)
            .field("appended", &self.appended)
            .finish()
    }
}
