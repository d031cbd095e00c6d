use crate::notifier::{ArchiveEvent, ChangeNotifier};
use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// State shared between an archive and the entries it owns.
///
/// Every mutation, whether made on the archive or on one of its entries,
/// goes through [`changed`](Self::changed).
#[derive(Debug)]
pub(crate) struct ArchiveContext {
    modified: AtomicBool,
    notifier: ChangeNotifier,
    preview: bool,
}

impl ArchiveContext {
    pub(crate) fn new(notifier: ChangeNotifier, preview: bool) -> Self {
        Self {
            modified: AtomicBool::new(false),
            notifier,
            preview,
        }
    }

    pub(crate) fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    pub(crate) fn is_preview(&self) -> bool {
        self.preview
    }

    pub(crate) fn is_modified(&self) -> bool {
        self.modified.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_modified(&self) {
        self.modified.store(true, Ordering::SeqCst);
    }

    pub(crate) fn clear_modified(&self) {
        self.modified.store(false, Ordering::SeqCst);
    }

    /// Deliver `event` unless this is a preview archive.
    pub(crate) fn notify(&self, event: &ArchiveEvent) {
        if !self.preview {
            self.notifier.publish(event);
        }
    }

    pub(crate) fn changed(&self, event: &ArchiveEvent) {
        self.mark_modified();
        self.notify(event);
    }
}

/// An entry's link back to the archive that owns it. Detached entries
/// mutate silently.
#[derive(Debug, Default)]
pub(crate) struct ContextSlot(ArcSwapOption<ArchiveContext>);

impl ContextSlot {
    pub(crate) fn attach(&self, context: &Arc<ArchiveContext>) {
        self.0.store(Some(Arc::clone(context)));
    }

    pub(crate) fn detach(&self) {
        self.0.store(None);
    }

    #[cfg(test)]
    pub(crate) fn is_attached(&self) -> bool {
        self.0.load().is_some()
    }

    pub(crate) fn changed(&self, event: &ArchiveEvent) {
        if let Some(context) = self.0.load_full() {
            context.changed(event);
        }
    }

    pub(crate) fn mark_modified(&self) {
        if let Some(context) = self.0.load_full() {
            context.mark_modified();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::{ChangeListener, EventKind, EventValue};
    use std::sync::atomic::AtomicUsize;

    fn counting(notifier: &ChangeNotifier) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let listener: Arc<dyn ChangeListener> = Arc::new(move |_: &ArchiveEvent| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        notifier.add(listener);
        count
    }

    fn event() -> ArchiveEvent {
        ArchiveEvent::new(EventKind::Description, EventValue::None, EventValue::None)
    }

    #[test]
    fn changed_marks_and_notifies() {
        let notifier = ChangeNotifier::new();
        let count = counting(&notifier);
        let ctx = ArchiveContext::new(notifier, false);
        ctx.changed(&event());
        assert!(ctx.is_modified());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        ctx.clear_modified();
        assert!(!ctx.is_modified());
    }

    #[test]
    fn preview_suppresses_events_but_tracks_modified() {
        let notifier = ChangeNotifier::new();
        let count = counting(&notifier);
        let ctx = ArchiveContext::new(notifier, true);
        ctx.changed(&event());
        assert!(ctx.is_modified());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn detached_slot_is_silent() {
        let notifier = ChangeNotifier::new();
        let count = counting(&notifier);
        let ctx = Arc::new(ArchiveContext::new(notifier, false));
        let slot = ContextSlot::default();
        slot.changed(&event());
        assert_eq!(count.load(Ordering::SeqCst), 0);

        slot.attach(&ctx);
        assert!(slot.is_attached());
        slot.changed(&event());
        assert_eq!(count.load(Ordering::SeqCst), 1);

        slot.detach();
        slot.changed(&event());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
