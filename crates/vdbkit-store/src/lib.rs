//! On-disk side of a VDB archive for vdbkit.
//!
//! This crate provides the storage layer: `StateLayout` and `WorkingDir` for the
//! private per-archive directory that holds extracted payloads, `read_container`
//! and `write_container` for the zip container (the latter always writes a
//! temporary file and renames it over the live archive), blake3 checksums,
//! `ArchiveLock` for cross-process exclusion, and `ProblemStore` for problem
//! markers attached to archive files.

pub mod checksum;
pub mod container;
pub mod layout;
pub mod lock;
pub mod markers;

pub use checksum::{checksum, checksum_file};
pub use container::{
    peek_manifest, read_container, write_container, Compression, ContainerContents, Payload,
};
pub use layout::{archive_key, StateLayout, WorkingDir};
pub use lock::ArchiveLock;
pub use markers::{ProblemMarker, ProblemStore, Severity};

use std::path::Path;
use thiserror::Error;
use vdbkit_schema::ManifestError;

/// Fsync a directory so that a preceding `rename()` is durable.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip container error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("container entry '{0}' has an unsafe name")]
    UnsafeEntryName(String),
    #[error("lock acquisition failed: {0}")]
    LockFailed(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("operation cancelled")]
    Cancelled,
}
