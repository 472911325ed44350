//! File-backed fallback sink
//!
//! Appends one line per record to a file chosen by the record's tag:
//!
//! | tag                | file                  |
//! |--------------------|-----------------------|
//! | `Overflow`         | `webhook_overflow.log` |
//! | `DeliveryFailure`  | `webhook_fallback.log` |
//! | `NoConsumerLoop`   | `webhook_no_loop.log`  |
//!
//! Line format: `YYYY-MM-DD HH:MM:SS | TAG [CLASS] | content`. Newlines,
//! carriage returns and tabs inside the content are escaped so a record
//! never spans more than one line.

use crate::core::{DurableSink, FallbackTag, Result, SeverityClass, ShipperError};
use chrono::Utc;
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct FileSink {
    dir: PathBuf,
    // Serializes writers inside the process; the fs2 lock covers other processes.
    write_lock: Mutex<()>,
}

impl FileSink {
    /// Create a sink writing under `dir`, creating the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            ShipperError::io_operation(
                "creating fallback directory",
                dir.display().to_string(),
                e,
            )
        })?;

        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File receiving records with the given tag
    pub fn path_for(&self, tag: FallbackTag) -> PathBuf {
        let file_name = match tag {
            FallbackTag::Overflow => "webhook_overflow.log",
            FallbackTag::DeliveryFailure => "webhook_fallback.log",
            FallbackTag::NoConsumerLoop => "webhook_no_loop.log",
        };
        self.dir.join(file_name)
    }

    fn format_line(tag: FallbackTag, class: SeverityClass, content: &str) -> String {
        format!(
            "{} | {} [{}] | {}\n",
            Utc::now().format("%Y-%m-%d %H:%M:%S"),
            tag,
            class,
            escape_line(content)
        )
    }
}

/// Keep a record on a single line
fn escape_line(content: &str) -> String {
    content
        .replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

impl DurableSink for FileSink {
    fn persist(&self, tag: FallbackTag, class: SeverityClass, content: &str) -> Result<()> {
        let path = self.path_for(tag);
        let line = Self::format_line(tag, class, content);

        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                ShipperError::io_operation("opening fallback file", path.display().to_string(), e)
            })?;

        file.lock_exclusive().map_err(|e| {
            ShipperError::io_operation("locking fallback file", path.display().to_string(), e)
        })?;
        let written = file.write_all(line.as_bytes()).and_then(|_| file.flush());
        let _ = FileExt::unlock(&file);

        written.map_err(|e| {
            ShipperError::io_operation("appending fallback record", path.display().to_string(), e)
        })
    }

    fn flush(&self) -> Result<()> {
        // Every persist opens, writes and flushes on its own.
        Ok(())
    }

    fn name(&self) -> &str {
        "fallback_file"
    }
}
