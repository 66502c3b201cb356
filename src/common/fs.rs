//! File system helpers

use std::fs;
use std::path::Path;

use super::error::{ProxyError, Result};

/// Check that a path names an existing regular file
///
/// # Parameters
///
/// * `path` - File path
/// * `what` - Human readable role of the file, used in the error message
pub fn check_file_exists(path: &Path, what: &str) -> Result<()> {
    if !path.exists() {
        return Err(ProxyError::Config(format!(
            "{} does not exist: {}",
            what,
            path.display()
        )));
    }

    if !path.is_file() {
        return Err(ProxyError::Config(format!(
            "{} is not a file: {}",
            what,
            path.display()
        )));
    }

    Ok(())
}

/// Read a whole file after checking it exists
pub fn read_file(path: &Path, what: &str) -> Result<Vec<u8>> {
    check_file_exists(path, what)?;

    fs::read(path).map_err(ProxyError::Io)
}
