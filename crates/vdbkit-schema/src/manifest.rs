use crate::validate::validate_manifest;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed location of the manifest inside every archive.
pub const MANIFEST_PATH: &str = "META-INF/vdb.xml";

const ROOT_ELEMENT: &str = "vdb";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("failed to parse manifest XML: {0}")]
    Xml(String),
    #[error("failed to encode manifest: {0}")]
    Encode(String),
    #[error("unexpected manifest root element '{0}', expected 'vdb'")]
    UnexpectedRoot(String),
    #[error("archive has no {MANIFEST_PATH} manifest")]
    MissingManifest,
    #[error("manifest violates schema: {}", .0.join("; "))]
    Schema(Vec<String>),
    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },
    #[error("unknown model type '{0}'")]
    UnknownModelType(String),
}

/// Well-known property names used in the manifest.
pub mod property {
    pub const PREVIEW: &str = "preview";
    /// Query timeout in milliseconds.
    pub const QUERY_TIMEOUT: &str = "query-timeout";
    pub const CHECKSUM: &str = "checksum";
    pub const MODEL_CLASS: &str = "modelClass";
    /// Archive path of another model this model imports. Repeatable.
    pub const IMPORTS: &str = "imports";
    /// Name of an archive this model requires as an import. Repeatable.
    pub const IMPORT_VDB_REFERENCE: &str = "import-vdb-reference";
    /// Archive path of a UDF jar this model requires. Repeatable.
    pub const UDF_JAR: &str = "lib";
}

/// In-memory form of `META-INF/vdb.xml`.
///
/// Free text (descriptions, mapped role names) lives in attributes, which
/// keep surrounding whitespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestDocument {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@version")]
    pub version: u32,
    #[serde(rename = "@description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "property", default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<PropertyElement>,
    #[serde(rename = "entry", default, skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<EntryElement>,
    #[serde(rename = "model", default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<ModelElement>,
    #[serde(rename = "import-vdb", default, skip_serializing_if = "Vec::is_empty")]
    pub import_vdbs: Vec<ImportVdbElement>,
    #[serde(rename = "translator", default, skip_serializing_if = "Vec::is_empty")]
    pub translators: Vec<TranslatorElement>,
    #[serde(rename = "data-role", default, skip_serializing_if = "Vec::is_empty")]
    pub data_roles: Vec<DataRoleElement>,
}

impl ManifestDocument {
    pub fn property(&self, name: &str) -> Option<&str> {
        PropertyElement::find(&self.properties, name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropertyElement {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@value")]
    pub value: String,
}

impl PropertyElement {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// First value recorded under `name`.
    pub fn find<'a>(props: &'a [PropertyElement], name: &str) -> Option<&'a str> {
        props
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    /// Every value recorded under a repeatable property.
    pub fn find_all<'a>(
        props: &'a [PropertyElement],
        name: &'a str,
    ) -> impl Iterator<Item = &'a str> + 'a {
        props
            .iter()
            .filter(move |p| p.name == name)
            .map(|p| p.value.as_str())
    }
}

/// A plain file entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntryElement {
    #[serde(rename = "@path")]
    pub path: String,
    #[serde(rename = "@description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "property", default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<PropertyElement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelElement {
    /// Archive path of the model file.
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@type")]
    pub model_type: String,
    #[serde(rename = "@visible", default = "default_true")]
    pub visible: bool,
    #[serde(rename = "@description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "property", default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<PropertyElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceElement>,
}

/// Data-source binding of a source model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceElement {
    #[serde(rename = "@name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        rename = "@translator-name",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub translator_name: Option<String>,
    #[serde(
        rename = "@connection-jndi-name",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub jndi_name: Option<String>,
}

impl SourceElement {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.translator_name.is_none() && self.jndi_name.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportVdbElement {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@version")]
    pub version: u32,
    #[serde(rename = "@import-data-policies", default = "default_true")]
    pub import_data_policies: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TranslatorElement {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@type")]
    pub translator_type: String,
    #[serde(rename = "@description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "property", default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<PropertyElement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataRoleElement {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@any-authenticated", default)]
    pub any_authenticated: bool,
    #[serde(rename = "@allow-create-temporary-tables", default)]
    pub allow_create_temp_tables: bool,
    #[serde(rename = "@description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "permission", default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<PermissionElement>,
    #[serde(rename = "mapped-role-name", default, skip_serializing_if = "Vec::is_empty")]
    pub mapped_role_names: Vec<MappedRoleElement>,
}

/// Container role a data role is granted to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MappedRoleElement {
    #[serde(rename = "@name")]
    pub name: String,
}

impl MappedRoleElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PermissionElement {
    #[serde(rename = "@resource-name")]
    pub resource_name: String,
    #[serde(rename = "@allow-create", default)]
    pub allow_create: bool,
    #[serde(rename = "@allow-read", default)]
    pub allow_read: bool,
    #[serde(rename = "@allow-update", default)]
    pub allow_update: bool,
    #[serde(rename = "@allow-delete", default)]
    pub allow_delete: bool,
    #[serde(rename = "@allow-execute", default)]
    pub allow_execute: bool,
    #[serde(rename = "@allow-alter", default)]
    pub allow_alter: bool,
}

fn default_true() -> bool {
    true
}

/// Validate `doc` and render it as an indented XML document.
pub fn encode_manifest(doc: &ManifestDocument) -> Result<String, ManifestError> {
    validate_manifest(doc)?;

    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let mut ser = quick_xml::se::Serializer::with_root(&mut out, Some(ROOT_ELEMENT))
        .map_err(|e| ManifestError::Encode(e.to_string()))?;
    ser.indent(' ', 2);
    doc.serialize(ser)
        .map_err(|e| ManifestError::Encode(e.to_string()))?;
    out.push('\n');
    Ok(out)
}

/// Parse and validate manifest bytes. Nothing is returned unless the whole
/// document is well-formed and satisfies the schema.
pub fn decode_manifest(bytes: &[u8]) -> Result<ManifestDocument, ManifestError> {
    let text = std::str::from_utf8(bytes)?;
    check_root(text)?;
    let doc: ManifestDocument =
        quick_xml::de::from_str(text).map_err(|e| ManifestError::Xml(e.to_string()))?;
    validate_manifest(&doc)?;
    Ok(doc)
}

fn check_root(text: &str) -> Result<(), ManifestError> {
    let mut reader = Reader::from_str(text);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e) | Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if name == ROOT_ELEMENT {
                    return Ok(());
                }
                return Err(ManifestError::UnexpectedRoot(name));
            }
            Ok(Event::Eof) => {
                return Err(ManifestError::Xml("document has no root element".to_owned()))
            }
            Ok(_) => {}
            Err(e) => return Err(ManifestError::Xml(e.to_string())),
        }
    }
}
