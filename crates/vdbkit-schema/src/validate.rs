use crate::manifest::{property, ManifestDocument, ManifestError, PropertyElement};
use crate::normalize::{normalize_entry_name, UDF_FOLDER};
use crate::types::ModelType;
use std::collections::BTreeSet;

/// Check a manifest against the fixed archive schema.
///
/// All violations are collected so a single error describes everything wrong
/// with the document.
pub fn validate_manifest(doc: &ManifestDocument) -> Result<(), ManifestError> {
    let mut v = Violations::default();

    if doc.name.trim().is_empty() {
        v.push("vdb name must not be empty".to_owned());
    }
    if doc.version < 1 {
        v.push(format!("vdb version must be >= 1, got {}", doc.version));
    }
    check_properties(&mut v, "vdb", &doc.properties);
    if let Some(value) = doc.property(property::PREVIEW) {
        if value != "true" && value != "false" {
            v.push(format!("property 'preview' must be true or false, got '{value}'"));
        }
    }
    if let Some(value) = doc.property(property::QUERY_TIMEOUT) {
        if value.parse::<u64>().is_err() {
            v.push(format!(
                "property 'query-timeout' must be a non-negative integer, got '{value}'"
            ));
        }
    }

    let mut paths = BTreeSet::new();
    for entry in &doc.entries {
        if let Some(path) = v.entry_path("entry", &entry.path) {
            if !paths.insert(path.clone()) {
                v.push(format!("duplicate entry '{path}'"));
            }
        }
        check_properties(&mut v, &format!("entry '{}'", entry.path), &entry.properties);
    }

    let mut model_paths = BTreeSet::new();
    for model in &doc.models {
        let context = format!("model '{}'", model.name);
        if let Some(path) = v.entry_path("model", &model.name) {
            if paths.contains(&path) {
                v.push(format!("{context} is also listed as a plain entry"));
            }
            if !model_paths.insert(path) {
                v.push(format!("duplicate model '{}'", model.name));
            }
        }
        if model.model_type.parse::<ModelType>().is_err() {
            v.push(format!("{context} has unknown type '{}'", model.model_type));
        }
        for jar in PropertyElement::find_all(&model.properties, property::UDF_JAR) {
            match normalize_entry_name(jar) {
                Ok(norm) if norm.starts_with(UDF_FOLDER) => {}
                Ok(_) => v.push(format!("{context} udf jar '{jar}' is not under {UDF_FOLDER}")),
                Err(e) => v.push(format!("{context}: {e}")),
            }
        }
        for import in PropertyElement::find_all(&model.properties, property::IMPORTS) {
            if let Err(e) = normalize_entry_name(import) {
                v.push(format!("{context} import: {e}"));
            }
        }
        for reference in PropertyElement::find_all(&model.properties, property::IMPORT_VDB_REFERENCE)
        {
            if reference.trim().is_empty() {
                v.push(format!("{context} has an empty import-vdb-reference"));
            }
        }
        if model.source.as_ref().is_some_and(crate::SourceElement::is_empty) {
            v.push(format!("{context} has an empty source element"));
        }
    }

    let mut imports = BTreeSet::new();
    for import in &doc.import_vdbs {
        let name = import.name.trim();
        if name.is_empty() {
            v.push("import-vdb name must not be empty".to_owned());
        } else if !imports.insert(name) {
            v.push(format!("duplicate import-vdb '{name}'"));
        }
        if import.version < 1 {
            v.push(format!("import-vdb '{name}' version must be >= 1"));
        }
    }

    let mut translators = BTreeSet::new();
    for translator in &doc.translators {
        let name = translator.name.trim();
        if name.is_empty() {
            v.push("translator name must not be empty".to_owned());
        } else if !translators.insert(name) {
            v.push(format!("duplicate translator '{name}'"));
        }
        if translator.translator_type.trim().is_empty() {
            v.push(format!("translator '{name}' type must not be empty"));
        }
        check_properties(&mut v, &format!("translator '{name}'"), &translator.properties);
    }

    let mut roles = BTreeSet::new();
    for role in &doc.data_roles {
        let name = role.name.trim();
        if name.is_empty() {
            v.push("data-role name must not be empty".to_owned());
        } else if !roles.insert(name) {
            v.push(format!("duplicate data-role '{name}'"));
        }
        for permission in &role.permissions {
            if permission.resource_name.trim().is_empty() {
                v.push(format!("data-role '{name}' has a permission without resource-name"));
            }
        }
    }

    v.finish()
}

/// Singular properties may appear only once per element; repeatable ones are
/// exempt.
fn check_properties(v: &mut Violations, context: &str, props: &[PropertyElement]) {
    let mut seen = BTreeSet::new();
    for prop in props {
        if prop.name.trim().is_empty() {
            v.push(format!("{context} has a property without a name"));
            continue;
        }
        let repeatable = matches!(
            prop.name.as_str(),
            property::IMPORTS | property::IMPORT_VDB_REFERENCE | property::UDF_JAR
        );
        if !repeatable && !seen.insert(prop.name.as_str()) {
            v.push(format!("{context} repeats property '{}'", prop.name));
        }
    }
}

#[derive(Default)]
struct Violations(Vec<String>);

impl Violations {
    fn push(&mut self, message: String) {
        self.0.push(message);
    }

    fn entry_path(&mut self, what: &str, raw: &str) -> Option<String> {
        match normalize_entry_name(raw) {
            Ok(path) => Some(path),
            Err(e) => {
                self.push(format!("{what}: {e}"));
                None
            }
        }
    }

    fn finish(self) -> Result<(), ManifestError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ManifestError::Schema(self.0))
        }
    }
}
