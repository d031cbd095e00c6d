//! The in-memory archive and its persistence protocol.

use crate::builder::{BuildSession, LoggingBuilder, ModelBuilder};
use crate::codec;
use crate::context::ArchiveContext;
use crate::data_role::DataRole;
use crate::entry::{ArchiveEntry, EntryKind, FileEntry, FileEntryKind, SyncState};
use crate::import_vdb::ImportVdbEntry;
use crate::model::ModelEntry;
use crate::notifier::{self, ArchiveEvent, ChangeListener, ChangeNotifier, EventKind, EventValue};
use crate::progress::{NullProgress, Progress};
use crate::snapshot::SnapshotSet;
use crate::tracker::ImportTracker;
use crate::translator::TranslatorOverride;
use crate::workspace::Workspace;
use crate::CoreError;
use arc_swap::ArcSwapOption;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use vdbkit_schema::{decode_manifest, encode_manifest, property, EntryPath, ImportName, UDF_FOLDER};
use vdbkit_store::{
    read_container, write_container, Compression, Payload, ProblemStore, StateLayout, WorkingDir,
};

/// How an [`Archive`] is opened.
#[derive(Clone)]
pub struct ArchiveOptions {
    /// Root of the private per-archive working directories.
    pub state_dir: PathBuf,
    /// Preview flag for a fresh archive. Loaded archives take it from their
    /// manifest.
    pub preview: bool,
    pub compression: Compression,
    /// Source of entry content. Without one, synchronization leaves every
    /// entry as it is.
    pub workspace: Option<Arc<dyn Workspace>>,
    pub builder: Arc<dyn ModelBuilder>,
    /// Event bus of the archive. Pass a clone to keep a handle on it.
    pub notifier: ChangeNotifier,
}

impl fmt::Debug for ArchiveOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveOptions")
            .field("state_dir", &self.state_dir)
            .field("preview", &self.preview)
            .field("compression", &self.compression)
            .field("workspace", &self.workspace.is_some())
            .finish_non_exhaustive()
    }
}

impl ArchiveOptions {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            preview: false,
            compression: Compression::default(),
            workspace: None,
            builder: Arc::new(LoggingBuilder),
            notifier: ChangeNotifier::new(),
        }
    }

    pub fn with_preview(mut self, preview: bool) -> Self {
        self.preview = preview;
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_workspace(mut self, workspace: Arc<dyn Workspace>) -> Self {
        self.workspace = Some(workspace);
        self
    }

    pub fn with_builder(mut self, builder: Arc<dyn ModelBuilder>) -> Self {
        self.builder = builder;
        self
    }

    pub fn with_notifier(mut self, notifier: ChangeNotifier) -> Self {
        self.notifier = notifier;
        self
    }
}

/// Outcome of [`Archive::synchronize`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Entries that reached `Synchronized` during this pass.
    pub refreshed: usize,
    /// Entries still `NotSynchronized` afterwards.
    pub pending: Vec<String>,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Import entries created and dropped by [`Archive::register_import_vdbs`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportChanges {
    pub added: Vec<ImportName>,
    pub removed: Vec<ImportName>,
}

impl ImportChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// A VDB archive held in memory.
///
/// Read-only queries are safe from any thread at any time. Structural
/// mutation, [`synchronize`](Self::synchronize) and [`save`](Self::save) must
/// be serialized by the caller: one mutator per archive.
pub struct Archive {
    pub(crate) path: PathBuf,
    pub(crate) name: String,
    pub(crate) version: u32,
    pub(crate) properties: BTreeMap<String, String>,
    pub(crate) description: ArcSwapOption<String>,
    pub(crate) query_timeout_ms: AtomicU64,
    pub(crate) context: Arc<ArchiveContext>,
    pub(crate) files: SnapshotSet<FileEntry>,
    pub(crate) models: SnapshotSet<ModelEntry>,
    pub(crate) import_vdbs: SnapshotSet<ImportVdbEntry>,
    pub(crate) data_roles: SnapshotSet<DataRole>,
    pub(crate) translators: SnapshotSet<TranslatorOverride>,
    pub(crate) tracker: ImportTracker,
    pub(crate) work: WorkingDir,
    layout: StateLayout,
    pub(crate) workspace: Option<Arc<dyn Workspace>>,
    builder: Arc<dyn ModelBuilder>,
    compression: Compression,
}

impl fmt::Debug for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archive")
            .field("path", &self.path)
            .field("version", &self.version)
            .field("modified", &self.is_modified())
            .field("files", &self.files)
            .field("models", &self.models)
            .field("import_vdbs", &self.import_vdbs)
            .field("translators", &self.translators)
            .finish_non_exhaustive()
    }
}

pub(crate) fn entry_path(raw: &str) -> Result<EntryPath, CoreError> {
    EntryPath::parse(raw).map_err(|e| CoreError::InvalidArgument(e.to_string()))
}

fn import_name(raw: &str) -> Result<ImportName, CoreError> {
    ImportName::parse(raw).map_err(|e| CoreError::InvalidArgument(e.to_string()))
}

impl Archive {
    /// Open the archive at `path`. A missing or zero-length file yields a
    /// fresh archive at version 1.
    pub fn open(path: impl AsRef<Path>, options: ArchiveOptions) -> Result<Self, CoreError> {
        Self::open_with_progress(path, options, &NullProgress)
    }

    pub fn open_with_progress(
        path: impl AsRef<Path>,
        options: ArchiveOptions,
        progress: &dyn Progress,
    ) -> Result<Self, CoreError> {
        let path = path.as_ref().to_path_buf();
        let layout = StateLayout::new(&options.state_dir);
        layout.initialize()?;
        let work = layout.working_dir(&path)?;
        work.initialize()?;

        let empty = match fs::metadata(&path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => return Err(e.into()),
        };
        if empty {
            work.reset_payloads()?;
            debug!("{} is empty, starting a new archive", path.display());
            let preview = options.preview;
            return Ok(Self::assemble(path, options, layout, work, preview, 1));
        }

        let contents = match read_container(&path, &work, || progress.is_cancelled()) {
            Ok(contents) => contents,
            Err(e) => return Err(Self::discard_payloads(&work, e.into())),
        };
        let doc = match decode_manifest(&contents.manifest) {
            Ok(doc) => doc,
            Err(e) => return Err(Self::discard_payloads(&work, e.into())),
        };
        let preview = doc
            .property(property::PREVIEW)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));
        let version = doc.version;
        let mut archive = Self::assemble(path, options, layout, work, preview, version);
        if let Err(e) = codec::populate(&mut archive, doc, &contents.comment) {
            return Err(Self::discard_payloads(&archive.work, e));
        }
        info!(
            "loaded {} (version {}, {} models, {} files)",
            archive.path.display(),
            archive.version,
            archive.models.len(),
            archive.files.len()
        );
        Ok(archive)
    }

    /// Drop whatever a failed load extracted and hand back its error.
    fn discard_payloads(work: &WorkingDir, err: CoreError) -> CoreError {
        if let Err(e) = work.reset_payloads() {
            warn!("cannot discard extracted payloads: {e}");
        }
        err
    }

    fn assemble(
        path: PathBuf,
        options: ArchiveOptions,
        layout: StateLayout,
        work: WorkingDir,
        preview: bool,
        version: u32,
    ) -> Self {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            name,
            version,
            properties: BTreeMap::new(),
            description: ArcSwapOption::empty(),
            query_timeout_ms: AtomicU64::new(0),
            context: Arc::new(ArchiveContext::new(options.notifier, preview)),
            files: SnapshotSet::new(),
            models: SnapshotSet::new(),
            import_vdbs: SnapshotSet::new(),
            data_roles: SnapshotSet::new(),
            translators: SnapshotSet::sorted(),
            tracker: ImportTracker::new(),
            work,
            layout,
            workspace: options.workspace,
            builder: options.builder,
            compression: options.compression,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Archive name: the file name without its extension.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn is_preview(&self) -> bool {
        self.context.is_preview()
    }

    pub fn is_modified(&self) -> bool {
        self.context.is_modified()
    }

    pub fn description(&self) -> Option<String> {
        self.description.load_full().map(|d| String::clone(&d))
    }

    pub fn set_description(&self, description: Option<&str>) {
        let new = description.filter(|d| !d.is_empty()).map(str::to_owned);
        let old = self.description();
        if old == new {
            return;
        }
        self.description.store(new.clone().map(Arc::new));
        self.context
            .changed(&ArchiveEvent::new(EventKind::Description, old, new));
    }

    /// Query timeout in seconds. Zero means no timeout.
    pub fn query_timeout(&self) -> u64 {
        self.query_timeout_millis() / 1000
    }

    pub fn query_timeout_millis(&self) -> u64 {
        self.query_timeout_ms.load(Ordering::SeqCst)
    }

    pub fn set_query_timeout(&self, seconds: u64) {
        let millis = seconds.saturating_mul(1000);
        let old = self.query_timeout_ms.swap(millis, Ordering::SeqCst);
        if old == millis {
            return;
        }
        self.context.changed(&ArchiveEvent::new(
            EventKind::QueryTimeout,
            EventValue::Number(old / 1000),
            EventValue::Number(seconds),
        ));
    }

    /// Manifest properties other than the preview flag and query timeout,
    /// carried through unchanged.
    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn working_dir(&self) -> &WorkingDir {
        &self.work
    }

    pub fn state_layout(&self) -> &StateLayout {
        &self.layout
    }

    pub fn import_tracker(&self) -> &ImportTracker {
        &self.tracker
    }

    pub fn add_listener(&self, listener: Arc<dyn ChangeListener>) -> bool {
        self.context.notifier().add(listener)
    }

    pub fn remove_listener(&self, listener: &Arc<dyn ChangeListener>) -> bool {
        self.context.notifier().remove(listener)
    }

    // Entry queries

    pub fn file_entries(&self) -> Arc<Vec<Arc<FileEntry>>> {
        self.files.snapshot()
    }

    pub fn model_entries(&self) -> Arc<Vec<Arc<ModelEntry>>> {
        self.models.snapshot()
    }

    pub fn import_vdb_entries(&self) -> Arc<Vec<Arc<ImportVdbEntry>>> {
        self.import_vdbs.snapshot()
    }

    pub fn data_policies(&self) -> Arc<Vec<Arc<DataRole>>> {
        self.data_roles.snapshot()
    }

    /// Translator overrides, sorted by name.
    pub fn translators(&self) -> Arc<Vec<Arc<TranslatorOverride>>> {
        self.translators.snapshot()
    }

    pub fn file_entry(&self, name: &str) -> Option<Arc<FileEntry>> {
        self.files.get(&EntryPath::parse(name).ok()?)
    }

    pub fn model_entry(&self, name: &str) -> Option<Arc<ModelEntry>> {
        self.models.get(&EntryPath::parse(name).ok()?)
    }

    /// Look up an import by name. Exact matches win; otherwise names compare
    /// ignoring ASCII case.
    pub fn import_vdb(&self, name: &str) -> Option<Arc<ImportVdbEntry>> {
        let name = name.trim();
        self.import_vdbs.get(name).or_else(|| {
            self.import_vdbs
                .snapshot()
                .iter()
                .find(|i| i.name().eq_ignore_ascii_case(name))
                .cloned()
        })
    }

    pub fn translator(&self, name: &str) -> Option<Arc<TranslatorOverride>> {
        self.translators.get(name.trim())
    }

    pub fn data_policy(&self, name: &str) -> Option<Arc<DataRole>> {
        self.data_roles.get(name.trim())
    }

    /// File or model entry at `name`.
    pub fn entry(&self, name: &str) -> Option<ArchiveEntry> {
        let path = EntryPath::parse(name).ok()?;
        self.models
            .get(&path)
            .map(ArchiveEntry::from)
            .or_else(|| self.files.get(&path).map(ArchiveEntry::from))
    }

    /// Every entry of every kind.
    pub fn entries(&self) -> Vec<ArchiveEntry> {
        let mut all: Vec<ArchiveEntry> = Vec::new();
        all.extend(self.files.snapshot().iter().cloned().map(ArchiveEntry::from));
        all.extend(self.models.snapshot().iter().cloned().map(ArchiveEntry::from));
        all.extend(self.import_vdbs.snapshot().iter().cloned().map(ArchiveEntry::from));
        all.extend(self.data_roles.snapshot().iter().cloned().map(ArchiveEntry::from));
        all.extend(self.translators.snapshot().iter().cloned().map(ArchiveEntry::from));
        all
    }

    fn files_of_kind(&self, kind: FileEntryKind) -> Vec<Arc<FileEntry>> {
        self.files
            .snapshot()
            .iter()
            .filter(|e| e.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn udf_jar_entries(&self) -> Vec<Arc<FileEntry>> {
        self.files_of_kind(FileEntryKind::UdfJar)
    }

    pub fn udf_jar_names(&self) -> Vec<String> {
        self.udf_jar_entries()
            .iter()
            .map(|e| e.name().to_string())
            .collect()
    }

    pub fn user_file_entries(&self) -> Vec<Arc<FileEntry>> {
        self.files_of_kind(FileEntryKind::UserFile)
    }

    /// Working-directory paths of every model payload.
    pub fn model_files(&self) -> Vec<PathBuf> {
        self.models
            .snapshot()
            .iter()
            .map(|m| self.work.payload_path(m.name()))
            .collect()
    }

    /// True iff no file or model entry is `NotSynchronized`.
    pub fn is_synchronized(&self) -> bool {
        self.models
            .snapshot()
            .iter()
            .all(|m| m.sync_state() == SyncState::Synchronized)
            && self
                .files
                .snapshot()
                .iter()
                .all(|f| f.sync_state() == SyncState::Synchronized)
    }

    // Structural mutation

    /// Add a file entry, or return the existing one unchanged.
    pub fn add_entry(&self, name: &str) -> Result<Arc<FileEntry>, CoreError> {
        let path = entry_path(name)?;
        if self.models.contains(&path) {
            return Err(CoreError::InvalidArgument(format!(
                "{path} is already a model entry"
            )));
        }
        match self.files.insert(Arc::new(FileEntry::new(path))) {
            Err(existing) => Ok(existing),
            Ok(entry) => {
                entry.attach(&self.context);
                debug!("added file entry {}", entry.name());
                self.context
                    .changed(&ArchiveEvent::entry_added(EntryKind::File, entry.name()));
                Ok(entry)
            }
        }
    }

    /// Add a model entry, or return the existing one unchanged. A new model
    /// is synchronized right away.
    pub fn add_model_entry(&self, name: &str) -> Result<Arc<ModelEntry>, CoreError> {
        let path = entry_path(name)?;
        if self.files.contains(&path) {
            return Err(CoreError::InvalidArgument(format!(
                "{path} is already a file entry"
            )));
        }
        match self.models.insert(Arc::new(ModelEntry::new(path))) {
            Err(existing) => Ok(existing),
            Ok(model) => {
                model.attach(&self.context);
                debug!("added model entry {}", model.name());
                self.context
                    .changed(&ArchiveEvent::entry_added(EntryKind::Model, model.name()));
                self.synchronize_model(&model);
                Ok(model)
            }
        }
    }

    /// Remove an entry of any kind. Returns `false` if it was not present.
    ///
    /// Removing a model also drops UDF jars and import entries no remaining
    /// model requires.
    pub fn remove_entry(&self, entry: impl Into<ArchiveEntry>) -> bool {
        match entry.into() {
            ArchiveEntry::File(file) => {
                let Some(removed) = self.files.remove(file.name()) else {
                    return false;
                };
                removed.detach();
                self.discard_payload(removed.name());
                self.context
                    .changed(&ArchiveEvent::entry_removed(EntryKind::File, removed.name()));
                true
            }
            ArchiveEntry::Model(model) => {
                let Some(removed) = self.models.remove(model.name()) else {
                    return false;
                };
                removed.detach();
                self.discard_payload(removed.name());
                self.context
                    .changed(&ArchiveEvent::entry_removed(EntryKind::Model, removed.name()));
                self.reconcile_udf_jars(BTreeSet::new());
                for name in self.tracker.release(removed.name()) {
                    self.remove_import_vdb(&name);
                }
                true
            }
            ArchiveEntry::ImportVdb(import) => self.remove_import_vdb(import.name()),
            ArchiveEntry::DataRole(role) => self.remove_data_policy(role.name()),
            ArchiveEntry::Translator(translator) => self.remove_translator(translator.name()),
        }
    }

    fn discard_payload(&self, name: &str) {
        if let Err(e) = self.work.remove_payload(name) {
            warn!("cannot remove payload for {name}: {e}");
        }
    }

    pub fn add_translator(&self, translator: TranslatorOverride) -> bool {
        match self.translators.insert(Arc::new(translator)) {
            Err(_) => false,
            Ok(added) => {
                added.attach(&self.context);
                self.context.changed(&ArchiveEvent::new(
                    EventKind::TranslatorAdded,
                    EventValue::None,
                    EventValue::Text(added.name().to_string()),
                ));
                true
            }
        }
    }

    pub fn remove_translator(&self, name: &str) -> bool {
        let Some(removed) = self.translators.remove(name.trim()) else {
            return false;
        };
        removed.detach();
        self.context.changed(&ArchiveEvent::new(
            EventKind::TranslatorRemoved,
            EventValue::Text(removed.name().to_string()),
            EventValue::None,
        ));
        true
    }

    pub fn add_data_policy(&self, role: DataRole) -> bool {
        match self.data_roles.insert(Arc::new(role)) {
            Err(_) => false,
            Ok(added) => {
                self.context.changed(&ArchiveEvent::new(
                    EventKind::DataPolicyAdded,
                    EventValue::None,
                    EventValue::Text(added.name().to_string()),
                ));
                true
            }
        }
    }

    pub fn remove_data_policy(&self, name: &str) -> bool {
        let Some(removed) = self.data_roles.remove(name.trim()) else {
            return false;
        };
        self.context.changed(&ArchiveEvent::new(
            EventKind::DataPolicyRemoved,
            EventValue::Text(removed.name().to_string()),
            EventValue::None,
        ));
        true
    }

    pub fn add_import_vdb(&self, import: ImportVdbEntry) -> bool {
        match self.import_vdbs.insert(Arc::new(import)) {
            Err(_) => false,
            Ok(added) => {
                added.attach(&self.context);
                self.context.changed(&ArchiveEvent::new(
                    EventKind::ImportVdbAdded,
                    EventValue::None,
                    EventValue::Text(added.name().to_string()),
                ));
                true
            }
        }
    }

    pub fn remove_import_vdb(&self, name: &str) -> bool {
        let Some(removed) = self.import_vdbs.remove(name.trim()) else {
            return false;
        };
        removed.detach();
        debug!("removed import {}", removed.name());
        self.context.changed(&ArchiveEvent::new(
            EventKind::ImportVdbRemoved,
            EventValue::Text(removed.name().to_string()),
            EventValue::None,
        ));
        true
    }

    /// Remove every import entry. Returns `false` if there were none.
    pub fn remove_all_import_vdbs(&self) -> bool {
        let mut any = false;
        for import in self.import_vdbs.snapshot().iter() {
            any |= self.remove_import_vdb(import.name());
        }
        any
    }

    /// Declare that `model` requires exactly `names` as imported archives.
    ///
    /// Import entries no model requires any more are removed, and missing
    /// ones are created.
    pub fn register_import_vdbs(
        &self,
        names: &[&str],
        model: &str,
        progress: &dyn Progress,
    ) -> Result<ImportChanges, CoreError> {
        let model = entry_path(model)?;
        let names = names
            .iter()
            .map(|n| import_name(n))
            .collect::<Result<BTreeSet<_>, _>>()?;
        if progress.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        progress.report(&model);
        Ok(self.apply_imports(&model, names))
    }

    fn apply_imports(&self, model: &EntryPath, names: BTreeSet<ImportName>) -> ImportChanges {
        let mut changes = ImportChanges::default();
        for stale in self.tracker.register(model, &names) {
            if self.remove_import_vdb(&stale) {
                changes.removed.push(stale);
            }
        }
        for name in &names {
            if self.import_vdbs.contains(name) {
                continue;
            }
            if self.add_import_vdb(ImportVdbEntry::new(name.clone())) {
                changes.added.push(name.clone());
            }
        }
        if let Some(entry) = self.models.get(model) {
            entry.set_import_vdbs(names);
        }
        changes
    }

    /// Make the archive's UDF jars exactly `jars` plus every jar a model
    /// requires. Returns whether anything changed.
    pub fn synchronize_udf_jars(&self, jars: &[&str]) -> Result<bool, CoreError> {
        let mut wanted = BTreeSet::new();
        for jar in jars {
            let path = entry_path(jar)?;
            if !path.is_under(UDF_FOLDER) {
                return Err(CoreError::InvalidArgument(format!(
                    "UDF jar {path} must live under {UDF_FOLDER}"
                )));
            }
            wanted.insert(path);
        }
        Ok(self.reconcile_udf_jars(wanted))
    }

    fn reconcile_udf_jars(&self, mut wanted: BTreeSet<EntryPath>) -> bool {
        for model in self.models.snapshot().iter() {
            wanted.extend(model.udf_jars());
        }
        let before = self.udf_jar_names();
        let mut changed = false;

        for jar in self.udf_jar_entries() {
            if wanted.contains(jar.name()) {
                continue;
            }
            if let Some(removed) = self.files.remove(jar.name()) {
                removed.detach();
                self.discard_payload(removed.name());
                debug!("dropped UDF jar {}", removed.name());
                changed = true;
            }
        }

        for name in wanted {
            if self.files.contains(&name) {
                continue;
            }
            if self.models.contains(&name) {
                warn!("UDF jar {name} collides with a model entry, skipping");
                continue;
            }
            if let Ok(jar) = self.files.insert(Arc::new(FileEntry::new(name))) {
                jar.attach(&self.context);
                if let Some(ws) = self.workspace.as_deref() {
                    jar.synchronize(ws, &self.work);
                }
                debug!("added UDF jar {}", jar.name());
                changed = true;
            }
        }

        if changed {
            self.context.changed(&ArchiveEvent::new(
                EventKind::UdfJarsModified,
                EventValue::Names(before),
                EventValue::Names(self.udf_jar_names()),
            ));
        }
        changed
    }

    // Synchronization and persistence

    fn synchronize_model(&self, model: &Arc<ModelEntry>) -> SyncState {
        let Some(ws) = self.workspace.as_deref() else {
            return model.sync_state();
        };
        let (state, descriptor) = model.synchronize(ws, &self.work);
        if let Some(descriptor) = descriptor {
            self.apply_imports(model.name(), descriptor.import_vdbs.into_iter().collect());
            self.reconcile_udf_jars(BTreeSet::new());
        }
        state
    }

    /// Bring every `NotSynchronized` model, then every such file, up to date
    /// with the workspace, between `start` and `stop` on the model builder.
    ///
    /// A source that cannot be read leaves its entry pending; it never fails
    /// the pass. Cancellation is checked before each entry.
    pub fn synchronize(&self, progress: &dyn Progress) -> Result<SyncReport, CoreError> {
        info!("synchronizing {}", self.path.display());
        let _session = BuildSession::begin(self.builder.as_ref());
        let mut report = SyncReport::default();

        for model in self.models.snapshot().iter() {
            if model.sync_state() == SyncState::Synchronized {
                continue;
            }
            if progress.is_cancelled() {
                return Err(CoreError::Cancelled);
            }
            progress.report(model.name());
            match self.synchronize_model(model) {
                SyncState::Synchronized => report.refreshed += 1,
                SyncState::NotSynchronized => report.pending.push(model.name().to_string()),
            }
        }

        for file in self.files.snapshot().iter() {
            if file.sync_state() == SyncState::Synchronized {
                continue;
            }
            if progress.is_cancelled() {
                return Err(CoreError::Cancelled);
            }
            progress.report(file.name());
            let state = match self.workspace.as_deref() {
                Some(ws) => file.synchronize(ws, &self.work),
                None => file.sync_state(),
            };
            match state {
                SyncState::Synchronized => report.refreshed += 1,
                SyncState::NotSynchronized => report.pending.push(file.name().to_string()),
            }
        }

        info!(
            "synchronized {}: {} refreshed, {} pending",
            self.path.display(),
            report.refreshed,
            report.pending.len()
        );
        Ok(report)
    }

    /// Write the archive to its path.
    ///
    /// The container is written to a temporary file that replaces the live
    /// archive only once complete. On failure or cancellation the live file
    /// is untouched and the archive stays modified. An unmodified archive
    /// whose file already has content is left as is.
    pub fn save(&self, progress: &dyn Progress) -> Result<(), CoreError> {
        if progress.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        if !self.is_modified() && fs::metadata(&self.path).is_ok_and(|m| m.len() > 0) {
            debug!("{} unchanged, nothing to save", self.path.display());
            return Ok(());
        }
        let doc = codec::to_document(self);
        let xml = encode_manifest(&doc)?;

        let mut payloads = Vec::new();
        let names = self
            .files
            .snapshot()
            .iter()
            .map(|f| f.name().clone())
            .chain(self.models.snapshot().iter().map(|m| m.name().clone()))
            .collect::<Vec<_>>();
        for name in names {
            if self.work.has_payload(&name) {
                payloads.push(Payload {
                    source: self.work.payload_path(&name),
                    name: name.into_inner(),
                });
            } else {
                debug!("{name} has no payload, writing manifest entry only");
            }
        }

        let comment = self.description().unwrap_or_default();
        write_container(
            &self.path,
            &xml,
            &comment,
            &payloads,
            self.compression,
            || progress.is_cancelled(),
        )?;

        if let Err(e) = ProblemStore::new(self.layout.clone()).clear(&self.path) {
            warn!("cannot clear problem markers for {}: {e}", self.path.display());
        }
        self.context.clear_modified();
        self.context.notify(&ArchiveEvent::new(
            EventKind::Saved,
            EventValue::None,
            EventValue::None,
        ));
        info!("saved {} ({} payloads)", self.path.display(), payloads.len());
        Ok(())
    }

    /// Drop every entry and listener and delete the working directory.
    /// Listeners registered at the time of the call receive `closed`.
    pub fn close(&self) {
        for file in self.files.clear() {
            file.detach();
        }
        for model in self.models.clear() {
            model.detach();
        }
        for import in self.import_vdbs.clear() {
            import.detach();
        }
        for translator in self.translators.clear() {
            translator.detach();
        }
        self.data_roles.clear();
        self.tracker.clear();
        self.description.store(None);

        if let Err(e) = self.work.remove() {
            warn!("cannot remove working directory for {}: {e}", self.path.display());
        }
        self.context.clear_modified();

        let listeners = self.context.notifier().take();
        if !self.is_preview() {
            notifier::deliver(
                &listeners,
                &ArchiveEvent::new(EventKind::Closed, EventValue::None, EventValue::None),
            );
        }
        debug!("closed {}", self.path.display());
    }
}
