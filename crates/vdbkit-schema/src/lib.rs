//! Manifest document, XML codec, schema validation and entry naming for vdbkit.
//!
//! This crate defines the schema layer of a VDB archive: the typed manifest
//! document stored at `META-INF/vdb.xml` (`ManifestDocument`), its XML encoding
//! and decoding (`encode_manifest`, `decode_manifest`), the fixed schema every
//! decoded or encoded document must satisfy (`validate_manifest`), and the
//! canonical normalization applied to entry and import names.

pub mod manifest;
pub mod normalize;
pub mod types;
pub mod validate;

pub use manifest::{
    decode_manifest, encode_manifest, property, DataRoleElement, EntryElement, ImportVdbElement,
    ManifestDocument, ManifestError, MappedRoleElement, ModelElement, PermissionElement, PropertyElement,
    SourceElement, TranslatorElement, MANIFEST_PATH,
};
pub use normalize::{normalize_entry_name, normalize_identifier, UDF_FOLDER, USER_FILES_FOLDER};
pub use types::{EntryPath, ImportName, ModelType, RoleName, TranslatorName};
pub use validate::validate_manifest;
