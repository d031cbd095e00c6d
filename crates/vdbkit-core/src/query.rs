//! Questions answered from an archive's manifest without opening it.

use crate::CoreError;
use std::fs;
use std::path::Path;
use tracing::debug;
use vdbkit_schema::{decode_manifest, property, ManifestDocument, PropertyElement};
use vdbkit_store::peek_manifest;

/// Name prefix of transient preview archives.
pub const PREVIEW_PREFIX: &str = "PREVIEW_";

/// Archive file extension, dot included.
pub const FILE_EXTENSION: &str = ".vdb";

fn has_vdb_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(&FILE_EXTENSION[1..]))
}

/// Decode the manifest of the archive at `path`.
pub fn read_manifest(path: &Path) -> Result<ManifestDocument, CoreError> {
    let bytes = peek_manifest(path)?;
    Ok(decode_manifest(&bytes)?)
}

fn manifest_or_none(path: &Path) -> Option<ManifestDocument> {
    match read_manifest(path) {
        Ok(doc) => Some(doc),
        Err(e) => {
            debug!("cannot read manifest of {}: {e}", path.display());
            None
        }
    }
}

/// Whether the archive at `path` is a preview archive.
///
/// An empty file is judged by its name alone; otherwise the manifest's
/// `preview` property decides.
pub fn is_preview_archive(path: &Path) -> bool {
    let Ok(meta) = fs::metadata(path) else {
        return false;
    };
    if meta.len() == 0 {
        let named = path
            .file_name()
            .is_some_and(|n| n.to_string_lossy().starts_with(PREVIEW_PREFIX));
        return has_vdb_extension(path) && named;
    }
    manifest_or_none(path)
        .and_then(|doc| doc.property(property::PREVIEW).map(|v| v == "true"))
        .unwrap_or(false)
}

/// Manifest version of the archive, or 0 when it cannot be read.
pub fn archive_version(path: &Path) -> u32 {
    manifest_or_none(path).map_or(0, |doc| doc.version)
}

/// Whether the archive holds a model of `model_class` (and of `model_type`,
/// when given). Both comparisons ignore case.
pub fn has_model_class(path: &Path, model_class: &str, model_type: Option<&str>) -> bool {
    if !has_vdb_extension(path) {
        return false;
    }
    let Some(doc) = manifest_or_none(path) else {
        return false;
    };
    doc.models.iter().any(|model| {
        let type_matches = model_type.map_or(true, |t| t.eq_ignore_ascii_case(&model.model_type));
        type_matches
            && PropertyElement::find_all(&model.properties, property::MODEL_CLASS)
                .any(|class| class.eq_ignore_ascii_case(model_class))
    })
}

/// Whether any model in the archive has the file name `file_name`,
/// ignoring case and folders.
pub fn model_in_archive(path: &Path, file_name: &str) -> bool {
    let Some(doc) = manifest_or_none(path) else {
        return false;
    };
    doc.models.iter().any(|model| {
        model
            .name
            .rsplit(['/', '\\'])
            .next()
            .is_some_and(|name| name.eq_ignore_ascii_case(file_name))
    })
}

/// Name prefix for a preview archive of a file in `parent_segments` of the
/// workspace identified by `workspace_id`. Spaces become underscores.
pub fn preview_prefix(workspace_id: &str, parent_segments: &[&str]) -> String {
    let mut prefix = format!("{PREVIEW_PREFIX}{workspace_id}_");
    for segment in parent_segments {
        prefix.push_str(segment);
        prefix.push('_');
    }
    prefix.replace(' ', "_")
}
