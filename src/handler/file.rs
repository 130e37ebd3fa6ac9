//! Append-only file sink with an exclusive lock marker.
//!
//! # Responsibilities
//! - Claim `<path>.lck` with create-new semantics so two handlers never share
//!   a log file
//! - Append one line per record
//! - Remove the lock marker on close (or drop), leaving no zombie lock
//!
//! Rotation and size limits are not handled here.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::error::HandlerError;
use crate::handler::{format_line, Handler};
use crate::level::Level;
use crate::record::LogRecord;

pub struct FileHandler {
    level: ArcSwap<Level>,
    path: PathBuf,
    lock_path: PathBuf,
    /// `None` once closed.
    state: Mutex<Option<OpenFile>>,
}

struct OpenFile {
    writer: BufWriter<File>,
    _lock: File,
}

impl FileHandler {
    /// Claim the lock marker and open `path` for appending.
    ///
    /// Fails with an `AlreadyExists` I/O error if another handler holds the
    /// lock for the same file.
    pub fn open(path: impl AsRef<Path>, level: Level) -> Result<Self, HandlerError> {
        let path = path.as_ref().to_path_buf();
        let lock_path = lock_path_for(&path);

        let lock = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .map_err(|e| {
                if e.kind() == ErrorKind::AlreadyExists {
                    tracing::warn!(path = %path.display(), "Log file is locked by another handler");
                }
                HandlerError::Io(e)
            })?;

        let file = match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => file,
            Err(e) => {
                drop(lock);
                let _ = fs::remove_file(&lock_path);
                return Err(HandlerError::Io(e));
            }
        };

        tracing::debug!(path = %path.display(), "File handler opened");
        Ok(Self {
            level: ArcSwap::from_pointee(level),
            path,
            lock_path,
            state: Mutex::new(Some(OpenFile {
                writer: BufWriter::new(file),
                _lock: lock,
            })),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    fn release(&self) -> Result<(), HandlerError> {
        let Some(mut open) = self.state.lock().take() else {
            return Ok(());
        };
        let flushed = open.writer.flush();
        drop(open);
        match fs::remove_file(&self.lock_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(HandlerError::Io(e)),
        }
        flushed.map_err(HandlerError::Io)
    }
}

/// `app.log` -> `app.log.lck`
pub fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lck");
    PathBuf::from(name)
}

impl Handler for FileHandler {
    fn level(&self) -> Level {
        self.level.load().as_ref().clone()
    }

    fn set_level(&self, level: Level) {
        self.level.store(level.into());
    }

    fn publish(&self, record: &LogRecord) -> Result<(), HandlerError> {
        let mut state = self.state.lock();
        let open = state
            .as_mut()
            .ok_or_else(|| HandlerError::Closed(self.path.display().to_string()))?;
        writeln!(open.writer, "{}", format_line(record))?;
        Ok(())
    }

    fn flush(&self) -> Result<(), HandlerError> {
        if let Some(open) = self.state.lock().as_mut() {
            open.writer.flush()?;
        }
        Ok(())
    }

    fn close(&self) -> Result<(), HandlerError> {
        self.release()
    }
}

impl Drop for FileHandler {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release log file lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_marker_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");

        let handler = FileHandler::open(&path, Level::ALL).unwrap();
        assert!(handler.lock_path().exists());

        handler.publish(&LogRecord::new(Level::INFO, "first line").with_logger("a")).unwrap();
        handler.close().unwrap();
        assert!(!handler.lock_path().exists());

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[INFO] a: first line"));
    }

    #[test]
    fn test_second_handler_on_same_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");

        let first = FileHandler::open(&path, Level::ALL).unwrap();
        let err = FileHandler::open(&path, Level::ALL).err().unwrap();
        assert!(matches!(err, HandlerError::Io(ref e) if e.kind() == ErrorKind::AlreadyExists));

        first.close().unwrap();
        let again = FileHandler::open(&path, Level::ALL).unwrap();
        again.close().unwrap();
    }

    #[test]
    fn test_drop_releases_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dropped.log");
        {
            let _handler = FileHandler::open(&path, Level::ALL).unwrap();
            assert!(lock_path_for(&path).exists());
        }
        assert!(!lock_path_for(&path).exists());
    }

    #[test]
    fn test_publish_after_close() {
        let dir = tempfile::tempdir().unwrap();
        let handler = FileHandler::open(dir.path().join("c.log"), Level::ALL).unwrap();
        handler.close().unwrap();
        assert!(matches!(
            handler.publish(&LogRecord::new(Level::INFO, "late")),
            Err(HandlerError::Closed(_))
        ));
    }
}
