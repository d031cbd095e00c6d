//! Per-archive change events and their ordered delivery.

use crate::entry::{EntryKind, SyncState};
use arc_swap::ArcSwap;
use std::fmt;
use std::sync::Arc;

/// Named property changes an archive reports to its listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Description,
    EntryAdded,
    EntryRemoved,
    EntryChecksum,
    EntrySynchronization,
    EntryDescription,
    ModelVisible,
    ModelSourceName,
    ModelTranslator,
    ModelJndiName,
    DataPolicyAdded,
    DataPolicyRemoved,
    ImportVdbVersion,
    ImportVdbDataPolicies,
    ImportVdbAdded,
    ImportVdbRemoved,
    UdfJarsModified,
    Closed,
    Saved,
    TranslatorAdded,
    TranslatorProperty,
    TranslatorRemoved,
    QueryTimeout,
}

impl EventKind {
    /// Stable wire name of the event.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Description => "description",
            EventKind::EntryAdded => "entryAdded",
            EventKind::EntryRemoved => "entryRemoved",
            EventKind::EntryChecksum => "entry.checksum",
            EventKind::EntrySynchronization => "entry.synchronization",
            EventKind::EntryDescription => "entry.description",
            EventKind::ModelVisible => "modelentry.visible",
            EventKind::ModelSourceName => "modelentry.sourceName",
            EventKind::ModelTranslator => "modelEntry.translator",
            EventKind::ModelJndiName => "modelEntry.jndiName",
            EventKind::DataPolicyAdded => "dataPolicyAdded",
            EventKind::DataPolicyRemoved => "dataPolicyRemoved",
            EventKind::ImportVdbVersion => "importVdbEntryVersion",
            EventKind::ImportVdbDataPolicies => "importVdbEntryDataPolicies",
            EventKind::ImportVdbAdded => "importVdbEntryAdded",
            EventKind::ImportVdbRemoved => "importVdbEntryRemoved",
            EventKind::UdfJarsModified => "udfJarsModified",
            EventKind::Closed => "closed",
            EventKind::Saved => "saved",
            EventKind::TranslatorAdded => "translatorOverrideAdded",
            EventKind::TranslatorProperty => "translatorOverrideProperty",
            EventKind::TranslatorRemoved => "translatorOverrideRemoved",
            EventKind::QueryTimeout => "queryTimeout",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Old or new value carried by an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventValue {
    None,
    Text(String),
    Number(u64),
    Flag(bool),
    Entry { kind: EntryKind, name: String },
    Names(Vec<String>),
    State(SyncState),
}

impl From<Option<String>> for EventValue {
    fn from(value: Option<String>) -> Self {
        value.map_or(EventValue::None, EventValue::Text)
    }
}

impl From<Option<&str>> for EventValue {
    fn from(value: Option<&str>) -> Self {
        value.map_or(EventValue::None, |s| EventValue::Text(s.to_owned()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEvent {
    pub kind: EventKind,
    pub old: EventValue,
    pub new: EventValue,
}

impl ArchiveEvent {
    pub fn new(kind: EventKind, old: impl Into<EventValue>, new: impl Into<EventValue>) -> Self {
        Self {
            kind,
            old: old.into(),
            new: new.into(),
        }
    }

    pub(crate) fn entry_added(kind: EntryKind, name: &str) -> Self {
        Self::new(
            EventKind::EntryAdded,
            EventValue::None,
            EventValue::Entry {
                kind,
                name: name.to_owned(),
            },
        )
    }

    pub(crate) fn entry_removed(kind: EntryKind, name: &str) -> Self {
        Self::new(
            EventKind::EntryRemoved,
            EventValue::Entry {
                kind,
                name: name.to_owned(),
            },
            EventValue::None,
        )
    }
}

/// Receiver of archive events. Any `Fn(&ArchiveEvent)` closure qualifies.
pub trait ChangeListener: Send + Sync {
    fn on_event(&self, event: &ArchiveEvent);
}

impl<F> ChangeListener for F
where
    F: Fn(&ArchiveEvent) + Send + Sync,
{
    fn on_event(&self, event: &ArchiveEvent) {
        self(event);
    }
}

type ListenerList = Vec<Arc<dyn ChangeListener>>;

/// Ordered listener registry for one archive.
///
/// The list is published copy-on-write, so delivery iterates the snapshot
/// taken when the event was raised even if listeners register or unregister
/// from inside a callback. Clones share the same registry.
#[derive(Clone)]
pub struct ChangeNotifier {
    listeners: Arc<ArcSwap<ListenerList>>,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self {
            listeners: Arc::new(ArcSwap::from_pointee(Vec::new())),
        }
    }
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("listeners", &self.len())
            .finish()
    }
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` at the end of the delivery order. Returns `false`
    /// if this exact listener is already registered.
    pub fn add(&self, listener: Arc<dyn ChangeListener>) -> bool {
        let mut added = false;
        self.listeners.rcu(|current| {
            if current.iter().any(|l| Arc::ptr_eq(l, &listener)) {
                added = false;
                return Arc::clone(current);
            }
            added = true;
            let mut next = ListenerList::clone(current);
            next.push(Arc::clone(&listener));
            Arc::new(next)
        });
        added
    }

    pub fn remove(&self, listener: &Arc<dyn ChangeListener>) -> bool {
        let mut removed = false;
        self.listeners.rcu(|current| {
            let next: ListenerList = current
                .iter()
                .filter(|l| !Arc::ptr_eq(l, listener))
                .cloned()
                .collect();
            removed = next.len() != current.len();
            Arc::new(next)
        });
        removed
    }

    /// Unregister everything, returning the listeners that were registered.
    pub fn take(&self) -> ListenerList {
        let previous = self.listeners.swap(Arc::new(Vec::new()));
        ListenerList::clone(&previous)
    }

    pub fn len(&self) -> usize {
        self.listeners.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn publish(&self, event: &ArchiveEvent) {
        let snapshot = self.listeners.load_full();
        deliver(&snapshot, event);
    }
}

pub(crate) fn deliver(listeners: &[Arc<dyn ChangeListener>], event: &ArchiveEvent) {
    for listener in listeners {
        listener.on_event(event);
    }
}
