use crate::layout::{archive_key, StateLayout};
use crate::{fsync_dir, StoreError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::warn;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A problem reported against an archive file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemMarker {
    pub severity: Severity,
    pub message: String,
    pub created_at: String,
}

impl ProblemMarker {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct MarkerFile {
    archive: String,
    markers: Vec<ProblemMarker>,
}

/// Problem markers keyed by archive path, one JSON file per archive.
pub struct ProblemStore {
    layout: StateLayout,
}

impl ProblemStore {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }

    fn marker_path(&self, archive: &Path) -> Result<PathBuf, StoreError> {
        Ok(self
            .layout
            .problems_dir()
            .join(format!("{}.json", archive_key(archive)?)))
    }

    /// Replace the markers recorded for `archive`. An empty list clears them.
    pub fn record(&self, archive: &Path, markers: &[ProblemMarker]) -> Result<(), StoreError> {
        if markers.is_empty() {
            return self.clear(archive);
        }
        let dir = self.layout.problems_dir();
        fs::create_dir_all(&dir)?;

        let file = MarkerFile {
            archive: archive.display().to_string(),
            markers: markers.to_vec(),
        };
        let content = serde_json::to_string_pretty(&file)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.marker_path(archive)?)
            .map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(&dir)?;
        Ok(())
    }

    /// Markers recorded for `archive`. A corrupted marker file reads as empty.
    pub fn list(&self, archive: &Path) -> Result<Vec<ProblemMarker>, StoreError> {
        let path = self.marker_path(archive)?;
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)?;
        match serde_json::from_str::<MarkerFile>(&content) {
            Ok(file) => Ok(file.markers),
            Err(e) => {
                warn!("ignoring corrupted marker file {}: {e}", path.display());
                Ok(Vec::new())
            }
        }
    }

    pub fn clear(&self, archive: &Path) -> Result<(), StoreError> {
        let path = self.marker_path(archive)?;
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}
