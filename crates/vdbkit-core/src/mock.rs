//! In-memory collaborators for driving an archive deterministically.

use crate::builder::ModelBuilder;
use crate::workspace::{ModelDescriptor, Workspace};
use crate::CoreError;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use vdbkit_schema::EntryPath;

/// Workspace held entirely in memory. Paths are normalized like entry names.
#[derive(Debug, Default)]
pub struct MockWorkspace {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    models: Mutex<BTreeMap<String, ModelDescriptor>>,
    fail_reads: AtomicBool,
}

fn key(path: &str) -> String {
    EntryPath::parse(path).map_or_else(|_| path.to_owned(), EntryPath::into_inner)
}

impl MockWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_file(&self, path: &str, content: &[u8]) {
        self.files.lock().insert(key(path), content.to_vec());
    }

    pub fn remove_file(&self, path: &str) {
        self.files.lock().remove(&key(path));
    }

    /// Register model metadata for `path`.
    pub fn set_model(&self, path: &str, descriptor: ModelDescriptor) {
        self.models.lock().insert(key(path), descriptor);
    }

    /// Make every read fail, as if the source were unreachable.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }
}

impl Workspace for MockWorkspace {
    fn read(&self, path: &EntryPath) -> io::Result<Vec<u8>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(io::Error::other("workspace unreachable"));
        }
        self.files
            .lock()
            .get(path.as_str())
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{path} not found")))
    }

    fn describe_model(&self, path: &EntryPath) -> Result<Option<ModelDescriptor>, CoreError> {
        Ok(self.models.lock().get(path.as_str()).cloned())
    }

    fn find_by_file_name(&self, file_name: &str) -> Vec<EntryPath> {
        self.files
            .lock()
            .keys()
            .filter(|k| k.rsplit('/').next() == Some(file_name))
            .filter_map(|k| EntryPath::parse(k).ok())
            .collect()
    }
}

/// Builder that counts its `start`/`stop` calls.
#[derive(Debug, Default)]
pub struct MockBuilder {
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl MockBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl ModelBuilder for MockBuilder {
    fn start(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}
