use crate::context::{ArchiveContext, ContextSlot};
use crate::notifier::{ArchiveEvent, EventKind, EventValue};
use crate::snapshot::Keyed;
use crate::CoreError;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use vdbkit_schema::ImportName;

/// Reference to another archive whose models this archive imports.
#[derive(Debug)]
pub struct ImportVdbEntry {
    name: ImportName,
    version: AtomicU32,
    import_data_policies: AtomicBool,
    slot: ContextSlot,
}

impl ImportVdbEntry {
    pub fn new(name: ImportName) -> Self {
        Self {
            name,
            version: AtomicU32::new(1),
            import_data_policies: AtomicBool::new(true),
            slot: ContextSlot::default(),
        }
    }

    pub fn with_version(self, version: u32) -> Self {
        self.version.store(version.max(1), Ordering::SeqCst);
        self
    }

    pub fn with_import_data_policies(self, import: bool) -> Self {
        self.import_data_policies.store(import, Ordering::SeqCst);
        self
    }

    pub fn name(&self) -> &ImportName {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn imports_data_policies(&self) -> bool {
        self.import_data_policies.load(Ordering::SeqCst)
    }

    pub fn set_version(&self, version: u32) -> Result<(), CoreError> {
        if version == 0 {
            return Err(CoreError::InvalidArgument(format!(
                "import {} version must be at least 1",
                self.name
            )));
        }
        let old = self.version.swap(version, Ordering::SeqCst);
        if old != version {
            self.slot.changed(&ArchiveEvent::new(
                EventKind::ImportVdbVersion,
                EventValue::Number(u64::from(old)),
                EventValue::Number(u64::from(version)),
            ));
        }
        Ok(())
    }

    pub fn set_import_data_policies(&self, import: bool) {
        let old = self.import_data_policies.swap(import, Ordering::SeqCst);
        if old != import {
            self.slot.changed(&ArchiveEvent::new(
                EventKind::ImportVdbDataPolicies,
                EventValue::Flag(old),
                EventValue::Flag(import),
            ));
        }
    }

    pub(crate) fn attach(&self, context: &Arc<ArchiveContext>) {
        self.slot.attach(context);
    }

    pub(crate) fn detach(&self) {
        self.slot.detach();
    }
}

impl Keyed for ImportVdbEntry {
    fn key(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::{ChangeListener, ChangeNotifier};
    use parking_lot::Mutex;

    fn entry(name: &str) -> ImportVdbEntry {
        ImportVdbEntry::new(ImportName::parse(name).unwrap())
    }

    #[test]
    fn defaults() {
        let e = entry("Inventory");
        assert_eq!(e.version(), 1);
        assert!(e.imports_data_policies());
        assert_eq!(e.name(), "Inventory");
    }

    #[test]
    fn builders_apply() {
        let e = entry("Inventory")
            .with_version(3)
            .with_import_data_policies(false);
        assert_eq!(e.version(), 3);
        assert!(!e.imports_data_policies());
    }

    #[test]
    fn zero_version_rejected_without_change() {
        let e = entry("Inventory");
        assert!(matches!(e.set_version(0), Err(CoreError::InvalidArgument(_))));
        assert_eq!(e.version(), 1);
    }

    #[test]
    fn setters_emit_only_on_change() {
        let notifier = ChangeNotifier::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let listener: Arc<dyn ChangeListener> =
            Arc::new(move |e: &ArchiveEvent| sink.lock().push(e.clone()));
        notifier.add(listener);
        let ctx = Arc::new(ArchiveContext::new(notifier, false));

        let e = entry("Inventory");
        e.attach(&ctx);
        e.set_version(1).unwrap();
        e.set_version(2).unwrap();
        e.set_import_data_policies(true);
        e.set_import_data_policies(false);

        let log = log.lock();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].kind, EventKind::ImportVdbVersion);
        assert_eq!(log[0].new, EventValue::Number(2));
        assert_eq!(log[1].kind, EventKind::ImportVdbDataPolicies);
        assert!(ctx.is_modified());
    }
}
