use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use tempfile::Builder;
use thiserror::Error;

/// Prefix of in-flight temp files; never reported by `list`.
const TEMP_PREFIX: &str = ".keeper-";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("artifact not found: {0}")]
    NotFound(String),
    #[error("invalid artifact path: {0}")]
    InvalidPath(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Byte storage addressed by logical paths such as `archives/3/17.pdf`.
pub trait ArtifactStore: Send + Sync {
    /// Replace the content at `path`. Readers observe the old or the new
    /// bytes, never a partial write.
    fn write(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError>;

    fn read(&self, path: &str) -> Result<Vec<u8>, StoreError>;

    /// Removing a missing path is not an error.
    fn delete(&self, path: &str) -> Result<(), StoreError>;

    /// Every stored logical path.
    fn list(&self) -> Result<Vec<String>, StoreError>;
}

/// Filesystem store: temp file in the target directory, fsync, rename.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        let logical = Path::new(path);
        let valid = !path.is_empty()
            && logical
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !valid {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(logical))
    }
}

impl ArtifactStore for FsArtifactStore {
    fn write(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let target = self.resolve(path)?;
        let dir = target
            .parent()
            .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;
        fs::create_dir_all(dir)?;

        let mut tmp = Builder::new().prefix(TEMP_PREFIX).tempfile_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;
        tmp.persist(&target).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let target = self.resolve(path)?;
        fs::read(&target).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(path.to_string()),
            _ => StoreError::Io(e),
        })
    }

    fn delete(&self, path: &str) -> Result<(), StoreError> {
        let target = self.resolve(path)?;
        match fs::remove_file(&target) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut paths = Vec::new();
        if self.root.exists() {
            collect_files(&self.root, &self.root, &mut paths)?;
        }
        paths.sort();
        Ok(paths)
    }
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<(), StoreError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_files(root, &path, out)?;
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
            continue;
        }
        if let Ok(relative) = path.strip_prefix(root) {
            let logical = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push(logical);
        }
    }
    Ok(())
}
