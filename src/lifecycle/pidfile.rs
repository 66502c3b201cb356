//! Pid file handling

use log::{debug, warn};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::common::{ProxyError, Result};

/// Pid file owned by this process
///
/// Created exclusively, so an existing file means another instance is
/// running. The file is removed when this value is dropped.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Create `path` and write the process id followed by a newline
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::AlreadyRunning`] if the file exists, and
    /// [`ProxyError::PidFile`] if it cannot be created or written.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(ProxyError::AlreadyRunning(path));
            }
            Err(e) => {
                return Err(ProxyError::PidFile(format!("failed to create {}: {}", path.display(), e)));
            }
        };

        if let Err(e) = writeln!(file, "{}", std::process::id()) {
            let _ = fs::remove_file(&path);
            return Err(ProxyError::PidFile(format!("failed to write {}: {}", path.display(), e)));
        }

        debug!("Wrote pid file {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed pid file {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove pid file {}: {}", self.path.display(), e),
        }
    }
}
