//! Mapping between an [`Archive`] and its manifest document.

use crate::archive::Archive;
use crate::data_role::{DataRole, Permission};
use crate::entry::FileEntry;
use crate::import_vdb::ImportVdbEntry;
use crate::model::{ModelEntry, ModelSettings};
use crate::translator::TranslatorOverride;
use crate::CoreError;
use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};
use vdbkit_schema::{
    property, DataRoleElement, EntryElement, EntryPath, ImportName, ImportVdbElement,
    ManifestDocument, MappedRoleElement, ModelElement, ModelType, PermissionElement,
    PropertyElement, RoleName, SourceElement, TranslatorElement, TranslatorName,
};

fn checksum_property(sum: Option<String>) -> Vec<PropertyElement> {
    sum.map(|s| PropertyElement::new(property::CHECKSUM, s))
        .into_iter()
        .collect()
}

/// Build the manifest describing the archive's current state.
pub(crate) fn to_document(archive: &Archive) -> ManifestDocument {
    let mut properties = vec![PropertyElement::new(
        property::PREVIEW,
        archive.is_preview().to_string(),
    )];
    let timeout = archive.query_timeout_ms.load(Ordering::SeqCst);
    if timeout > 0 {
        properties.push(PropertyElement::new(property::QUERY_TIMEOUT, timeout.to_string()));
    }
    properties.extend(
        archive
            .properties
            .iter()
            .map(|(k, v)| PropertyElement::new(k.as_str(), v.as_str())),
    );

    ManifestDocument {
        name: archive.name.clone(),
        version: archive.version,
        description: archive.description(),
        properties,
        entries: archive
            .files
            .snapshot()
            .iter()
            .map(|f| EntryElement {
                path: f.name().to_string(),
                description: f.description(),
                properties: checksum_property(f.checksum()),
            })
            .collect(),
        models: archive
            .models
            .snapshot()
            .iter()
            .map(|m| model_element(m))
            .collect(),
        import_vdbs: archive
            .import_vdbs
            .snapshot()
            .iter()
            .map(|i| ImportVdbElement {
                name: i.name().to_string(),
                version: i.version(),
                import_data_policies: i.imports_data_policies(),
            })
            .collect(),
        translators: archive
            .translators
            .snapshot()
            .iter()
            .map(|t| TranslatorElement {
                name: t.name().to_string(),
                translator_type: t.translator_type().to_owned(),
                description: t.description().map(str::to_owned),
                properties: t
                    .properties()
                    .iter()
                    .map(|(k, v)| PropertyElement::new(k.as_str(), v.as_str()))
                    .collect(),
            })
            .collect(),
        data_roles: archive
            .data_roles
            .snapshot()
            .iter()
            .map(|r| role_element(r))
            .collect(),
    }
}

fn model_element(model: &ModelEntry) -> ModelElement {
    let settings = model.settings();
    let mut properties = checksum_property(model.checksum());
    if let Some(class) = &settings.model_class {
        properties.push(PropertyElement::new(property::MODEL_CLASS, class.as_str()));
    }
    for import in &settings.model_imports {
        properties.push(PropertyElement::new(property::IMPORTS, import.as_str()));
    }
    for name in &settings.import_vdbs {
        properties.push(PropertyElement::new(
            property::IMPORT_VDB_REFERENCE,
            name.as_str(),
        ));
    }
    for jar in &settings.udf_jars {
        properties.push(PropertyElement::new(property::UDF_JAR, jar.as_str()));
    }

    let source = SourceElement {
        name: settings.source_name.clone(),
        translator_name: settings.translator.clone(),
        jndi_name: settings.jndi_name.clone(),
    };
    ModelElement {
        name: model.name().to_string(),
        model_type: settings.model_type.as_str().to_owned(),
        visible: settings.visible,
        description: model.description(),
        properties,
        source: (!source.is_empty()).then_some(source),
    }
}

fn role_element(role: &DataRole) -> DataRoleElement {
    DataRoleElement {
        name: role.name.to_string(),
        any_authenticated: role.any_authenticated,
        allow_create_temp_tables: role.allow_create_temp_tables,
        description: role.description.clone(),
        permissions: role
            .permissions
            .iter()
            .map(|p| PermissionElement {
                resource_name: p.resource_name.clone(),
                allow_create: p.allow_create,
                allow_read: p.allow_read,
                allow_update: p.allow_update,
                allow_delete: p.allow_delete,
                allow_execute: p.allow_execute,
                allow_alter: p.allow_alter,
            })
            .collect(),
        mapped_role_names: role
            .mapped_role_names
            .iter()
            .map(MappedRoleElement::new)
            .collect(),
    }
}

/// Fill a freshly assembled archive from a decoded manifest.
///
/// Entries are inserted and attached directly, so loading raises no events
/// and leaves the archive unmodified. Any invalid name fails the whole load.
pub(crate) fn populate(
    archive: &mut Archive,
    doc: ManifestDocument,
    comment: &str,
) -> Result<(), CoreError> {
    let description = doc
        .description
        .filter(|d| !d.is_empty())
        .or_else(|| Some(comment.to_owned()).filter(|c| !c.is_empty()));
    archive.description.store(description.map(Arc::new));

    for prop in doc.properties {
        match prop.name.as_str() {
            property::PREVIEW => {}
            property::QUERY_TIMEOUT => {
                let millis = prop.value.trim().parse::<u64>().unwrap_or_else(|e| {
                    warn!("ignoring query-timeout '{}': {e}", prop.value);
                    0
                });
                archive.query_timeout_ms.store(millis, Ordering::SeqCst);
            }
            _ => {
                archive.properties.entry(prop.name).or_insert(prop.value);
            }
        }
    }

    let workspace = archive.workspace.clone();
    let workspace = workspace.as_deref();

    for element in doc.entries {
        let entry = FileEntry::new(EntryPath::parse(&element.path)?);
        entry.core.restore(
            PropertyElement::find(&element.properties, property::CHECKSUM).map(str::to_owned),
            element.description,
        );
        entry.core.reconcile(workspace, &archive.work);
        if let Ok(entry) = archive.files.insert(Arc::new(entry)) {
            entry.attach(&archive.context);
        }
    }

    let mut declared_imports = Vec::new();
    for element in doc.models {
        let path = EntryPath::parse(&element.name)?;
        let settings = model_settings(&element, &path)?;
        declared_imports.push((path.clone(), settings.model_imports.clone()));
        let tracked = settings.import_vdbs.clone();

        let model = ModelEntry::with_settings(path.clone(), settings);
        model.core.restore(
            PropertyElement::find(&element.properties, property::CHECKSUM).map(str::to_owned),
            element.description,
        );
        model.core.reconcile(workspace, &archive.work);
        if let Ok(model) = archive.models.insert(Arc::new(model)) {
            model.attach(&archive.context);
        }
        if !tracked.is_empty() {
            archive.tracker.register(&path, &tracked);
        }
    }

    // Model-to-model imports resolve only once every model exists.
    for (model, imports) in declared_imports {
        for import in imports {
            if !archive.models.contains(&import) {
                warn!("model {model} imports {import}, which is not in the archive");
            }
        }
    }

    for element in doc.import_vdbs {
        let import = ImportVdbEntry::new(ImportName::parse(&element.name)?)
            .with_version(element.version)
            .with_import_data_policies(element.import_data_policies);
        if let Ok(import) = archive.import_vdbs.insert(Arc::new(import)) {
            import.attach(&archive.context);
        }
    }

    for element in doc.translators {
        let mut translator = TranslatorOverride::new(
            TranslatorName::parse(&element.name)?,
            element.translator_type,
        );
        if let Some(description) = element.description {
            translator = translator.with_description(description);
        }
        for prop in element.properties {
            translator = translator.with_property(prop.name, prop.value);
        }
        if let Ok(translator) = archive.translators.insert(Arc::new(translator)) {
            translator.attach(&archive.context);
        }
    }

    for element in doc.data_roles {
        let role = DataRole {
            name: RoleName::parse(&element.name)?,
            description: element.description.filter(|d| !d.is_empty()),
            any_authenticated: element.any_authenticated,
            allow_create_temp_tables: element.allow_create_temp_tables,
            permissions: element
                .permissions
                .into_iter()
                .map(|p| Permission {
                    resource_name: p.resource_name,
                    allow_create: p.allow_create,
                    allow_read: p.allow_read,
                    allow_update: p.allow_update,
                    allow_delete: p.allow_delete,
                    allow_execute: p.allow_execute,
                    allow_alter: p.allow_alter,
                })
                .collect(),
            mapped_role_names: element
                .mapped_role_names
                .into_iter()
                .map(|m| m.name)
                .collect(),
        };
        if archive.data_roles.insert(Arc::new(role)).is_err() {
            debug!("duplicate data role in manifest, keeping the first");
        }
    }

    archive.context.clear_modified();
    debug!("populated {} from manifest", archive.path.display());
    Ok(())
}

fn model_settings(element: &ModelElement, path: &EntryPath) -> Result<ModelSettings, CoreError> {
    let props = &element.properties;
    let paths = |name: &'static str| -> Result<BTreeSet<EntryPath>, CoreError> {
        PropertyElement::find_all(props, name)
            .map(|raw| EntryPath::parse(raw).map_err(CoreError::from))
            .collect()
    };
    let source = element.source.clone().unwrap_or_default();
    Ok(ModelSettings {
        model_type: ModelType::infer(&element.model_type, path)?,
        visible: element.visible,
        source_name: source.name,
        translator: source.translator_name,
        jndi_name: source.jndi_name,
        model_class: PropertyElement::find(props, property::MODEL_CLASS).map(str::to_owned),
        model_imports: paths(property::IMPORTS)?,
        import_vdbs: PropertyElement::find_all(props, property::IMPORT_VDB_REFERENCE)
            .map(|raw| ImportName::parse(raw).map_err(CoreError::from))
            .collect::<Result<_, _>>()?,
        udf_jars: paths(property::UDF_JAR)?,
    })
}
