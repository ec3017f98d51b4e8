//! The default cache location, plus the one directory-creation rule the crate uses:
//! "already exists" is fine, every other failure propagates.

use std::io;
use std::path::{Path, PathBuf};

use crate::error::DatasetError;
use crate::Result;

const APP_DIR: &str = "fishclef";

/// Returns the default roidb cache directory, `<user cache>/fishclef`, creating it if it
/// does not exist.
pub fn default_cache_dir() -> Result<PathBuf> {
    let mut path = dirs::cache_dir().ok_or_else(|| DatasetError::missing("<user cache directory>"))?;
    path.push(APP_DIR);
    create_dir(&path)?;
    Ok(path)
}

/// Creates `path` and its parents. An existing directory is not an error.
pub fn create_dir(path: &Path) -> Result<()> {
    match std::fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(e) => Err(DatasetError::Io { path: path.to_path_buf(), source: e }),
    }
}
