use crate::context::{ArchiveContext, ContextSlot};
use crate::notifier::{ArchiveEvent, EventKind, EventValue};
use crate::snapshot::Keyed;
use arc_swap::ArcSwap;
use std::collections::BTreeMap;
use std::sync::Arc;
use vdbkit_schema::TranslatorName;

/// Archive-scoped override of a data-source translator's settings.
#[derive(Debug)]
pub struct TranslatorOverride {
    name: TranslatorName,
    translator_type: String,
    description: Option<String>,
    properties: ArcSwap<BTreeMap<String, String>>,
    slot: ContextSlot,
}

impl TranslatorOverride {
    pub fn new(name: TranslatorName, translator_type: impl Into<String>) -> Self {
        Self {
            name,
            translator_type: translator_type.into(),
            description: None,
            properties: ArcSwap::from_pointee(BTreeMap::new()),
            slot: ContextSlot::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into()).filter(|d| !d.is_empty());
        self
    }

    pub fn with_property(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut props = BTreeMap::clone(&self.properties.load());
        props.insert(key.into(), value.into());
        self.properties.store(Arc::new(props));
        self
    }

    pub fn name(&self) -> &TranslatorName {
        &self.name
    }

    pub fn translator_type(&self) -> &str {
        &self.translator_type
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn property(&self, key: &str) -> Option<String> {
        self.properties.load().get(key).cloned()
    }

    pub fn properties(&self) -> Arc<BTreeMap<String, String>> {
        self.properties.load_full()
    }

    /// Set `key` to `value`, or remove it when `value` is `None`.
    pub fn set_property(&self, key: &str, value: Option<&str>) {
        let mut old = None;
        self.properties.rcu(|current| {
            old = current.get(key).cloned();
            let mut next = BTreeMap::clone(current);
            match value {
                Some(v) => next.insert(key.to_owned(), v.to_owned()),
                None => next.remove(key),
            };
            next
        });
        if old.as_deref() == value {
            return;
        }
        let describe = |v: Option<&str>| match v {
            Some(v) => EventValue::Text(format!("{key}={v}")),
            None => EventValue::Text(key.to_owned()),
        };
        self.slot.changed(&ArchiveEvent::new(
            EventKind::TranslatorProperty,
            describe(old.as_deref()),
            describe(value),
        ));
    }

    pub(crate) fn attach(&self, context: &Arc<ArchiveContext>) {
        self.slot.attach(context);
    }

    pub(crate) fn detach(&self) {
        self.slot.detach();
    }
}

impl Keyed for TranslatorOverride {
    fn key(&self) -> &str {
        &self.name
    }
}
