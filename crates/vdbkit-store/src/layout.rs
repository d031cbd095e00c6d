use crate::{fsync_dir, StoreError};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

const KEY_LEN: usize = 16;

/// Directory layout of the vdbkit state root.
///
/// Holds one working directory per open archive, lock files and problem
/// markers. Subdirectories are created on [`initialize`](Self::initialize).
#[derive(Debug, Clone)]
pub struct StateLayout {
    root: PathBuf,
}

impl StateLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn archives_dir(&self) -> PathBuf {
        self.root.join("archives")
    }

    #[inline]
    pub fn locks_dir(&self) -> PathBuf {
        self.root.join("locks")
    }

    #[inline]
    pub fn problems_dir(&self) -> PathBuf {
        self.root.join("problems")
    }

    pub fn lock_file(&self, archive: &Path) -> Result<PathBuf, StoreError> {
        Ok(self.locks_dir().join(format!("{}.lock", archive_key(archive)?)))
    }

    pub fn working_dir(&self, archive: &Path) -> Result<WorkingDir, StoreError> {
        Ok(WorkingDir::new(self.archives_dir().join(archive_key(archive)?)))
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(self.archives_dir())?;
        fs::create_dir_all(self.locks_dir())?;
        fs::create_dir_all(self.problems_dir())?;
        Ok(())
    }
}

/// Stable short key for an archive path.
///
/// The path is made absolute first so relative and absolute spellings of the
/// same file share a key. The file itself need not exist.
pub fn archive_key(archive: &Path) -> Result<String, StoreError> {
    let absolute = match fs::canonicalize(archive) {
        Ok(p) => p,
        Err(_) => std::path::absolute(archive)?,
    };
    let hash = blake3::hash(absolute.to_string_lossy().as_bytes());
    Ok(hash.to_hex().as_str()[..KEY_LEN].to_owned())
}

/// Private directory of one archive instance.
///
/// Every non-manifest member of the container lives under `payload/` at its
/// archive-relative path.
#[derive(Debug, Clone)]
pub struct WorkingDir {
    root: PathBuf,
}

impl WorkingDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn payload_dir(&self) -> PathBuf {
        self.root.join("payload")
    }

    /// Location of the payload for a normalized entry name.
    pub fn payload_path(&self, name: &str) -> PathBuf {
        let mut path = self.payload_dir();
        path.extend(name.split('/'));
        path
    }

    pub fn has_payload(&self, name: &str) -> bool {
        self.payload_path(name).is_file()
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(self.payload_dir())?;
        Ok(())
    }

    /// Drop every extracted payload, leaving an empty payload directory.
    pub fn reset_payloads(&self) -> Result<(), StoreError> {
        let dir = self.payload_dir();
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
        Ok(())
    }

    pub fn write_payload(&self, name: &str, data: &[u8]) -> Result<PathBuf, StoreError> {
        self.write_payload_from(name, &mut &data[..])
    }

    /// Stream a payload into place atomically.
    pub fn write_payload_from(
        &self,
        name: &str,
        reader: &mut dyn Read,
    ) -> Result<PathBuf, StoreError> {
        let dest = self.payload_path(name);
        let parent = dest
            .parent()
            .map_or_else(|| self.payload_dir(), Path::to_path_buf);
        fs::create_dir_all(&parent)?;

        let mut tmp = NamedTempFile::new_in(&parent)?;
        io::copy(reader, &mut tmp)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&dest).map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(&parent)?;
        Ok(dest)
    }

    pub fn remove_payload(&self, name: &str) -> Result<(), StoreError> {
        let path = self.payload_path(name);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Delete the whole working directory.
    pub fn remove(&self) -> Result<(), StoreError> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
            debug!("removed working directory {}", self.root.display());
        }
        Ok(())
    }
}
