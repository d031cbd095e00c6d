use crate::context::ArchiveContext;
use crate::entry::{EntryCore, SyncState};
use crate::notifier::{ArchiveEvent, EventKind, EventValue};
use crate::snapshot::Keyed;
use crate::workspace::{ModelDescriptor, Workspace};
use arc_swap::ArcSwap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;
use vdbkit_schema::{EntryPath, ImportName, ModelType};
use vdbkit_store::WorkingDir;

/// Attributes of a model entry, replaced as a whole on every change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSettings {
    pub model_type: ModelType,
    pub visible: bool,
    pub source_name: Option<String>,
    pub translator: Option<String>,
    pub jndi_name: Option<String>,
    pub model_class: Option<String>,
    pub model_imports: BTreeSet<EntryPath>,
    pub import_vdbs: BTreeSet<ImportName>,
    pub udf_jars: BTreeSet<EntryPath>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_type: ModelType::default(),
            visible: true,
            source_name: None,
            translator: None,
            jndi_name: None,
            model_class: None,
            model_imports: BTreeSet::new(),
            import_vdbs: BTreeSet::new(),
            udf_jars: BTreeSet::new(),
        }
    }
}

type TextField = fn(&mut ModelSettings) -> &mut Option<String>;

/// A metadata model carried in the archive.
#[derive(Debug)]
pub struct ModelEntry {
    pub(crate) core: EntryCore,
    settings: ArcSwap<ModelSettings>,
}

impl ModelEntry {
    pub(crate) fn new(name: EntryPath) -> Self {
        Self::with_settings(name, ModelSettings::default())
    }

    pub(crate) fn with_settings(name: EntryPath, settings: ModelSettings) -> Self {
        Self {
            core: EntryCore::new(name),
            settings: ArcSwap::from_pointee(settings),
        }
    }

    pub fn name(&self) -> &EntryPath {
        self.core.name()
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

    /// Consistent view of every model attribute.
    pub fn settings(&self) -> Arc<ModelSettings> {
        self.settings.load_full()
    }

    pub fn model_type(&self) -> ModelType {
        self.settings.load().model_type
    }

    pub fn is_source(&self) -> bool {
        self.model_type().is_source()
    }

    pub fn is_visible(&self) -> bool {
        self.settings.load().visible
    }

    pub fn import_vdb_names(&self) -> BTreeSet<ImportName> {
        self.settings.load().import_vdbs.clone()
    }

    pub fn udf_jars(&self) -> BTreeSet<EntryPath> {
        self.settings.load().udf_jars.clone()
    }

    pub fn set_visible(&self, visible: bool) {
        let old = self.settings.load().visible;
        if old == visible {
            return;
        }
        self.update(|s| s.visible = visible);
        self.core.slot.changed(&ArchiveEvent::new(
            EventKind::ModelVisible,
            EventValue::Flag(old),
            EventValue::Flag(visible),
        ));
    }

    pub fn set_source_name(&self, name: Option<&str>) {
        self.set_text(EventKind::ModelSourceName, |s| &mut s.source_name, name);
    }

    pub fn set_translator(&self, translator: Option<&str>) {
        self.set_text(EventKind::ModelTranslator, |s| &mut s.translator, translator);
    }

    pub fn set_jndi_name(&self, jndi_name: Option<&str>) {
        self.set_text(EventKind::ModelJndiName, |s| &mut s.jndi_name, jndi_name);
    }

    pub fn set_model_type(&self, model_type: ModelType) {
        if self.model_type() != model_type {
            self.update(|s| s.model_type = model_type);
            self.core.slot.mark_modified();
        }
    }

    pub fn set_model_class(&self, model_class: Option<&str>) {
        let new = model_class.filter(|c| !c.is_empty()).map(str::to_owned);
        if self.settings.load().model_class != new {
            self.update(|s| s.model_class = new.clone());
            self.core.slot.mark_modified();
        }
    }

    pub(crate) fn set_import_vdbs(&self, names: BTreeSet<ImportName>) {
        if self.settings.load().import_vdbs != names {
            self.update(|s| s.import_vdbs = names.clone());
            self.core.slot.mark_modified();
        }
    }

    fn set_declarations(&self, imports: BTreeSet<EntryPath>, udf_jars: BTreeSet<EntryPath>) {
        let current = self.settings.load();
        if current.model_imports == imports && current.udf_jars == udf_jars {
            return;
        }
        self.update(|s| {
            s.model_imports = imports.clone();
            s.udf_jars = udf_jars.clone();
        });
        self.core.slot.mark_modified();
    }

    fn set_text(&self, kind: EventKind, field: TextField, value: Option<&str>) {
        let new = value.filter(|v| !v.is_empty()).map(str::to_owned);
        let mut current = ModelSettings::clone(&self.settings.load());
        let old = field(&mut current).clone();
        if old == new {
            return;
        }
        self.update(|s| *field(s) = new.clone());
        self.core
            .slot
            .changed(&ArchiveEvent::new(kind, old, new));
    }

    fn update(&self, change: impl Fn(&mut ModelSettings)) {
        self.settings.rcu(|current| {
            let mut next = ModelSettings::clone(current);
            change(&mut next);
            next
        });
    }

    pub(crate) fn attach(&self, context: &Arc<ArchiveContext>) {
        self.core.slot.attach(context);
    }

    pub(crate) fn detach(&self) {
        self.core.slot.detach();
    }

    /// Refresh the payload, then pick up the model's metadata from the
    /// workspace. Import-vdb declarations are left for the archive to
    /// register, since it owns the import tracker.
    pub(crate) fn synchronize(
        &self,
        workspace: &dyn Workspace,
        work: &WorkingDir,
    ) -> (SyncState, Option<ModelDescriptor>) {
        let state = self.core.synchronize_payload(workspace, work);
        if state == SyncState::NotSynchronized {
            return (state, None);
        }
        match workspace.describe_model(self.name()) {
            Ok(Some(descriptor)) => {
                self.apply_descriptor(&descriptor);
                (state, Some(descriptor))
            }
            Ok(None) => (state, None),
            Err(e) => {
                warn!("cannot describe model {}: {e}", self.name());
                self.core.set_sync_state(SyncState::NotSynchronized);
                (SyncState::NotSynchronized, None)
            }
        }
    }

    fn apply_descriptor(&self, descriptor: &ModelDescriptor) {
        self.set_model_type(descriptor.model_type);
        self.set_model_class(descriptor.model_class.as_deref());
        self.set_source_name(descriptor.source.name.as_deref());
        self.set_translator(descriptor.source.translator.as_deref());
        self.set_jndi_name(descriptor.source.jndi_name.as_deref());
        self.set_declarations(
            descriptor.model_imports.iter().cloned().collect(),
            descriptor.udf_jars.iter().cloned().collect(),
        );
    }
}

impl Keyed for ModelEntry {
    fn key(&self) -> &str {
        self.core.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockWorkspace;
    use crate::notifier::{ChangeListener, ChangeNotifier};
    use crate::workspace::SourceBinding;
    use parking_lot::Mutex;

    fn model(name: &str) -> ModelEntry {
        ModelEntry::new(EntryPath::parse(name).unwrap())
    }

    fn attach_log(entry: &ModelEntry) -> (Arc<ArchiveContext>, Arc<Mutex<Vec<ArchiveEvent>>>) {
        let notifier = ChangeNotifier::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let listener: Arc<dyn ChangeListener> =
            Arc::new(move |e: &ArchiveEvent| sink.lock().push(e.clone()));
        notifier.add(listener);
        let ctx = Arc::new(ArchiveContext::new(notifier, false));
        entry.attach(&ctx);
        (ctx, log)
    }

    #[test]
    fn defaults() {
        let m = model("a.xmi");
        assert!(m.is_visible());
        assert_eq!(m.model_type(), ModelType::Physical);
        assert_eq!(m.sync_state(), SyncState::NotSynchronized);
    }

    #[test]
    fn visibility_emits_once() {
        let m = model("a.xmi");
        let (ctx, log) = attach_log(&m);
        m.set_visible(false);
        m.set_visible(false);
        assert!(!m.is_visible());
        assert!(ctx.is_modified());
        let log = log.lock();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].kind, EventKind::ModelVisible);
        assert_eq!(log[0].old, EventValue::Flag(true));
    }

    #[test]
    fn binding_setters_emit_their_events() {
        let m = model("a.xmi");
        let (_ctx, log) = attach_log(&m);
        m.set_source_name(Some("orders"));
        m.set_translator(Some("oracle"));
        m.set_jndi_name(Some("java:/orders"));
        m.set_jndi_name(Some("java:/orders"));
        m.set_translator(None);
        let kinds: Vec<_> = log.lock().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::ModelSourceName,
                EventKind::ModelTranslator,
                EventKind::ModelJndiName,
                EventKind::ModelTranslator,
            ]
        );
        assert!(m.settings().translator.is_none());
        assert_eq!(m.settings().source_name.as_deref(), Some("orders"));
    }

    #[test]
    fn type_and_class_mark_modified_silently() {
        let m = model("a.xmi");
        let (ctx, log) = attach_log(&m);
        m.set_model_type(ModelType::Virtual);
        m.set_model_class(Some("Relational"));
        assert!(ctx.is_modified());
        assert!(log.lock().is_empty());
        assert!(!m.is_source());
    }

    #[test]
    fn synchronize_applies_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let work = WorkingDir::new(dir.path());
        let ws = MockWorkspace::new();
        ws.put_file("proj/a.xmi", b"<model/>");
        let mut desc = ModelDescriptor::new(ModelType::Virtual);
        desc.model_class = Some("Relational".to_owned());
        desc.udf_jars.push(EntryPath::parse("lib/f.jar").unwrap());
        desc.import_vdbs.push(ImportName::parse("Inv").unwrap());
        desc.source = SourceBinding {
            name: Some("src".to_owned()),
            ..SourceBinding::default()
        };
        ws.set_model("proj/a.xmi", desc);

        let m = model("proj/a.xmi");
        let (state, found) = m.synchronize(&ws, &work);
        assert_eq!(state, SyncState::Synchronized);
        assert_eq!(found.unwrap().import_vdbs.len(), 1);
        let s = m.settings();
        assert_eq!(s.model_type, ModelType::Virtual);
        assert_eq!(s.model_class.as_deref(), Some("Relational"));
        assert!(s.udf_jars.contains("lib/f.jar"));
        assert!(s.import_vdbs.is_empty());
        assert_eq!(s.source_name.as_deref(), Some("src"));
    }

    #[test]
    fn unreadable_model_stays_unsynchronized() {
        let dir = tempfile::tempdir().unwrap();
        let work = WorkingDir::new(dir.path());
        let ws = MockWorkspace::new();
        let m = model("missing.xmi");
        let (state, found) = m.synchronize(&ws, &work);
        assert_eq!(state, SyncState::NotSynchronized);
        assert!(found.is_none());
    }
}
