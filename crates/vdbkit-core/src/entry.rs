//! Archive entries and their synchronization state.

use crate::context::{ArchiveContext, ContextSlot};
use crate::data_role::DataRole;
use crate::import_vdb::ImportVdbEntry;
use crate::model::ModelEntry;
use crate::notifier::{ArchiveEvent, EventKind, EventValue};
use crate::snapshot::Keyed;
use crate::translator::TranslatorOverride;
use crate::workspace::Workspace;
use arc_swap::ArcSwapOption;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use vdbkit_schema::{EntryPath, UDF_FOLDER, USER_FILES_FOLDER};
use vdbkit_store::{checksum, checksum_file, WorkingDir};

/// Whether an entry's archived snapshot matches its external source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncState {
    Synchronized,
    NotSynchronized,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Synchronized => write!(f, "synchronized"),
            SyncState::NotSynchronized => write!(f, "not-synchronized"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Model,
    ImportVdb,
    DataRole,
    Translator,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::File => write!(f, "file"),
            EntryKind::Model => write!(f, "model"),
            EntryKind::ImportVdb => write!(f, "import-vdb"),
            EntryKind::DataRole => write!(f, "data-role"),
            EntryKind::Translator => write!(f, "translator"),
        }
    }
}

/// State common to file and model entries: a payload in the working
/// directory and the checksum it was last synchronized at.
#[derive(Debug)]
pub(crate) struct EntryCore {
    name: EntryPath,
    synchronized: AtomicBool,
    checksum: ArcSwapOption<String>,
    description: ArcSwapOption<String>,
    pub(crate) slot: ContextSlot,
}

impl EntryCore {
    pub(crate) fn new(name: EntryPath) -> Self {
        Self {
            name,
            synchronized: AtomicBool::new(false),
            checksum: ArcSwapOption::empty(),
            description: ArcSwapOption::empty(),
            slot: ContextSlot::default(),
        }
    }

    pub(crate) fn name(&self) -> &EntryPath {
        &self.name
    }

    pub(crate) fn sync_state(&self) -> SyncState {
        if self.synchronized.load(Ordering::SeqCst) {
            SyncState::Synchronized
        } else {
            SyncState::NotSynchronized
        }
    }

    pub(crate) fn checksum(&self) -> Option<String> {
        self.checksum.load_full().map(|c| String::clone(&c))
    }

    pub(crate) fn description(&self) -> Option<String> {
        self.description.load_full().map(|d| String::clone(&d))
    }

    pub(crate) fn set_description(&self, description: Option<&str>) {
        let new = description.filter(|d| !d.is_empty()).map(str::to_owned);
        let old = self.description();
        if old == new {
            return;
        }
        self.description.store(new.clone().map(Arc::new));
        self.slot
            .changed(&ArchiveEvent::new(EventKind::EntryDescription, old, new));
    }

    fn set_checksum(&self, sum: String) {
        let old = self.checksum();
        if old.as_deref() == Some(sum.as_str()) {
            return;
        }
        self.checksum.store(Some(Arc::new(sum.clone())));
        self.slot
            .changed(&ArchiveEvent::new(EventKind::EntryChecksum, old, Some(sum)));
    }

    pub(crate) fn set_sync_state(&self, state: SyncState) {
        let synchronized = state == SyncState::Synchronized;
        let was = self.synchronized.swap(synchronized, Ordering::SeqCst);
        if was == synchronized {
            return;
        }
        let old = if was {
            SyncState::Synchronized
        } else {
            SyncState::NotSynchronized
        };
        self.slot.changed(&ArchiveEvent::new(
            EventKind::EntrySynchronization,
            EventValue::State(old),
            EventValue::State(state),
        ));
    }

    /// Set persisted fields while loading, before the entry is attached.
    pub(crate) fn restore(&self, checksum: Option<String>, description: Option<String>) {
        self.checksum.store(checksum.map(Arc::new));
        self.description
            .store(description.filter(|d| !d.is_empty()).map(Arc::new));
    }

    /// Decide the initial state of a loaded entry without touching its payload.
    ///
    /// Without a workspace the archived payload is the only source, so the
    /// entry counts as synchronized when that payload is present.
    pub(crate) fn reconcile(&self, workspace: Option<&dyn Workspace>, work: &WorkingDir) {
        let payload = work.payload_path(&self.name);
        let archived = match self.checksum() {
            Some(sum) => Some(sum),
            None => checksum_file(&payload).ok(),
        };
        if self.checksum.load().is_none() {
            self.checksum.store(archived.clone().map(Arc::new));
        }
        let synchronized = match (workspace, archived) {
            (None, _) => payload.is_file(),
            (Some(ws), Some(sum)) => ws
                .read(&self.name)
                .map(|bytes| checksum(&bytes) == sum)
                .unwrap_or(false),
            (Some(_), None) => false,
        };
        self.synchronized.store(synchronized, Ordering::SeqCst);
    }

    /// Refresh the payload from the workspace.
    ///
    /// Failures never propagate: an unreadable or unwritable source leaves the
    /// entry `NotSynchronized`.
    pub(crate) fn synchronize_payload(&self, workspace: &dyn Workspace, work: &WorkingDir) -> SyncState {
        let bytes = match workspace.read(&self.name) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("cannot synchronize {}: {e}", self.name);
                self.set_sync_state(SyncState::NotSynchronized);
                return SyncState::NotSynchronized;
            }
        };

        let sum = checksum(&bytes);
        let unchanged = self.checksum().as_deref() == Some(sum.as_str()) && work.has_payload(&self.name);
        if unchanged {
            debug!("{} unchanged", self.name);
        } else {
            if let Err(e) = work.write_payload(&self.name, &bytes) {
                warn!("cannot store payload for {}: {e}", self.name);
                self.set_sync_state(SyncState::NotSynchronized);
                return SyncState::NotSynchronized;
            }
            debug!("{} refreshed", self.name);
            self.set_checksum(sum);
        }
        self.set_sync_state(SyncState::Synchronized);
        SyncState::Synchronized
    }
}

/// Role of a plain file entry, derived from the folder it lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileEntryKind {
    Plain,
    UdfJar,
    UserFile,
}

impl FileEntryKind {
    pub fn for_path(path: &EntryPath) -> Self {
        if path.is_under(UDF_FOLDER) {
            FileEntryKind::UdfJar
        } else if path.is_under(USER_FILES_FOLDER) {
            FileEntryKind::UserFile
        } else {
            FileEntryKind::Plain
        }
    }
}

/// A file carried in the archive that is not a model.
#[derive(Debug)]
pub struct FileEntry {
    pub(crate) core: EntryCore,
    kind: FileEntryKind,
}

impl FileEntry {
    pub(crate) fn new(name: EntryPath) -> Self {
        let kind = FileEntryKind::for_path(&name);
        Self {
            core: EntryCore::new(name),
            kind,
        }
    }

    pub fn name(&self) -> &EntryPath {
        self.core.name()
    }

    pub fn kind(&self) -> FileEntryKind {
        self.kind
    }

    pub fn is_udf_jar(&self) -> bool {
        self.kind == FileEntryKind::UdfJar
    }

    pub fn sync_state(&self) -> SyncState {
        self.core.sync_state()
    }

    pub fn checksum(&self) -> Option<String> {
        self.core.checksum()
    }

    pub fn description(&self) -> Option<String> {
        self.core.description()
    }

    pub fn set_description(&self, description: Option<&str>) {
        self.core.set_description(description);
    }

    pub(crate) fn attach(&self, context: &Arc<ArchiveContext>) {
        self.core.slot.attach(context);
    }

    pub(crate) fn detach(&self) {
        self.core.slot.detach();
    }

    pub(crate) fn synchronize(&self, workspace: &dyn Workspace, work: &WorkingDir) -> SyncState {
        self.core.synchronize_payload(workspace, work)
    }
}

impl Keyed for FileEntry {
    fn key(&self) -> &str {
        self.core.name()
    }
}

/// Any entry an archive can hold.
#[derive(Debug, Clone)]
pub enum ArchiveEntry {
    File(Arc<FileEntry>),
    Model(Arc<ModelEntry>),
    ImportVdb(Arc<ImportVdbEntry>),
    DataRole(Arc<DataRole>),
    Translator(Arc<TranslatorOverride>),
}

impl ArchiveEntry {
    pub fn name(&self) -> &str {
        match self {
            ArchiveEntry::File(e) => e.name().as_str(),
            ArchiveEntry::Model(e) => e.name().as_str(),
            ArchiveEntry::ImportVdb(e) => e.name().as_str(),
            ArchiveEntry::DataRole(e) => e.name().as_str(),
            ArchiveEntry::Translator(e) => e.name().as_str(),
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            ArchiveEntry::File(_) => EntryKind::File,
            ArchiveEntry::Model(_) => EntryKind::Model,
            ArchiveEntry::ImportVdb(_) => EntryKind::ImportVdb,
            ArchiveEntry::DataRole(_) => EntryKind::DataRole,
            ArchiveEntry::Translator(_) => EntryKind::Translator,
        }
    }
}

impl From<Arc<FileEntry>> for ArchiveEntry {
    fn from(e: Arc<FileEntry>) -> Self {
        ArchiveEntry::File(e)
    }
}

impl From<Arc<ModelEntry>> for ArchiveEntry {
    fn from(e: Arc<ModelEntry>) -> Self {
        ArchiveEntry::Model(e)
    }
}

impl From<Arc<ImportVdbEntry>> for ArchiveEntry {
    fn from(e: Arc<ImportVdbEntry>) -> Self {
        ArchiveEntry::ImportVdb(e)
    }
}

impl From<Arc<DataRole>> for ArchiveEntry {
    fn from(e: Arc<DataRole>) -> Self {
        ArchiveEntry::DataRole(e)
    }
}

impl From<Arc<TranslatorOverride>> for ArchiveEntry {
    fn from(e: Arc<TranslatorOverride>) -> Self {
        ArchiveEntry::Translator(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockWorkspace;
    use crate::notifier::{ChangeListener, ChangeNotifier};
    use parking_lot::Mutex;

    fn path(p: &str) -> EntryPath {
        EntryPath::parse(p).unwrap()
    }

    fn attached(entry: &FileEntry) -> (Arc<ArchiveContext>, Arc<Mutex<Vec<EventKind>>>) {
        let notifier = ChangeNotifier::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let listener: Arc<dyn ChangeListener> =
            Arc::new(move |e: &ArchiveEvent| sink.lock().push(e.kind));
        notifier.add(listener);
        let ctx = Arc::new(ArchiveContext::new(notifier, false));
        entry.attach(&ctx);
        (ctx, log)
    }

    #[test]
    fn kind_follows_folder() {
        assert_eq!(FileEntry::new(path("lib/a.jar")).kind(), FileEntryKind::UdfJar);
        assert_eq!(
            FileEntry::new(path("otherFiles/a.txt")).kind(),
            FileEntryKind::UserFile
        );
        assert_eq!(FileEntry::new(path("docs/a.txt")).kind(), FileEntryKind::Plain);
    }

    #[test]
    fn new_entry_is_not_synchronized() {
        let entry = FileEntry::new(path("a.txt"));
        assert_eq!(entry.sync_state(), SyncState::NotSynchronized);
        assert!(entry.checksum().is_none());
    }

    #[test]
    fn synchronize_copies_payload_and_records_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let work = WorkingDir::new(dir.path());
        let ws = MockWorkspace::new();
        ws.put_file("a.txt", b"hello");

        let entry = FileEntry::new(path("a.txt"));
        let (ctx, log) = attached(&entry);
        assert_eq!(entry.synchronize(&ws, &work), SyncState::Synchronized);
        assert_eq!(entry.checksum(), Some(checksum(b"hello")));
        assert_eq!(std::fs::read(work.payload_path("a.txt")).unwrap(), b"hello");
        assert!(ctx.is_modified());
        assert_eq!(
            *log.lock(),
            vec![EventKind::EntryChecksum, EventKind::EntrySynchronization]
        );

        log.lock().clear();
        assert_eq!(entry.synchronize(&ws, &work), SyncState::Synchronized);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn missing_source_leaves_not_synchronized() {
        let dir = tempfile::tempdir().unwrap();
        let work = WorkingDir::new(dir.path());
        let ws = MockWorkspace::new();
        ws.put_file("a.txt", b"v1");
        let entry = FileEntry::new(path("a.txt"));
        entry.synchronize(&ws, &work);

        ws.remove_file("a.txt");
        assert_eq!(entry.synchronize(&ws, &work), SyncState::NotSynchronized);
        assert_eq!(entry.sync_state(), SyncState::NotSynchronized);
    }

    #[test]
    fn reconcile_compares_against_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let work = WorkingDir::new(dir.path());
        work.write_payload("a.txt", b"v1").unwrap();
        let ws = MockWorkspace::new();
        ws.put_file("a.txt", b"v1");

        let entry = FileEntry::new(path("a.txt"));
        entry.core.reconcile(Some(&ws), &work);
        assert_eq!(entry.sync_state(), SyncState::Synchronized);
        assert_eq!(entry.checksum(), Some(checksum(b"v1")));

        ws.put_file("a.txt", b"v2");
        let other = FileEntry::new(path("a.txt"));
        other.core.reconcile(Some(&ws), &work);
        assert_eq!(other.sync_state(), SyncState::NotSynchronized);

        let offline = FileEntry::new(path("a.txt"));
        offline.core.reconcile(None, &work);
        assert_eq!(offline.sync_state(), SyncState::Synchronized);
    }

    #[test]
    fn description_empty_means_none_and_equal_is_noop() {
        let entry = FileEntry::new(path("a.txt"));
        let (_ctx, log) = attached(&entry);
        entry.set_description(Some("doc"));
        entry.set_description(Some("doc"));
        entry.set_description(Some(""));
        assert!(entry.description().is_none());
        assert_eq!(log.lock().len(), 2);
    }
}
