//! In-memory model of a VDB archive for vdbkit.
//!
//! This crate ties the manifest codec and the container store together into the
//! `Archive`: the central type that owns file, model, import-vdb, data-role and
//! translator-override entries, tracks which imported archives each model still
//! requires, routes every mutation through a single modified-and-notify point,
//! and synchronizes entries against an external `Workspace` between `start` and
//! `stop` calls on a `ModelBuilder`. Collections are copy-on-write snapshots so
//! readers on other threads never observe a half-applied change.

pub mod archive;
pub mod builder;
mod codec;
pub mod config;
mod context;
pub mod data_role;
pub mod entry;
pub mod import_vdb;
pub mod mock;
pub mod model;
pub mod notifier;
pub mod progress;
pub mod query;
pub mod snapshot;
pub mod tracker;
pub mod translator;
pub mod validation;
pub mod workspace;

pub use archive::{Archive, ArchiveOptions, ImportChanges, SyncReport};
pub use builder::{BuildSession, LoggingBuilder, ModelBuilder};
pub use config::Config;
pub use data_role::{DataRole, Permission};
pub use entry::{ArchiveEntry, EntryKind, FileEntry, FileEntryKind, SyncState};
pub use import_vdb::ImportVdbEntry;
pub use model::{ModelEntry, ModelSettings};
pub use notifier::{ArchiveEvent, ChangeListener, ChangeNotifier, EventKind, EventValue};
pub use progress::{
    install_signal_handler, shutdown_requested, CancelToken, NullProgress, Progress,
};
pub use query::{FILE_EXTENSION, PREVIEW_PREFIX};
pub use snapshot::{Keyed, SnapshotSet};
pub use tracker::ImportTracker;
pub use translator::TranslatorOverride;
pub use validation::{ValidationReport, ValidationWarning};
pub use workspace::{DirectoryWorkspace, ModelDescriptor, SourceBinding, Workspace};

use thiserror::Error;
use vdbkit_schema::ManifestError;
use vdbkit_store::StoreError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("manifest error: {0}")]
    Format(#[from] ManifestError),
    #[error("store error: {0}")]
    Store(StoreError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("workspace error: {0}")]
    Workspace(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("operation cancelled")]
    Cancelled,
}

/// Name used for archive-level failures in signatures.
pub type ArchiveError = CoreError;

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Cancelled => CoreError::Cancelled,
            StoreError::Manifest(e) => CoreError::Format(e),
            other => CoreError::Store(other),
        }
    }
}
