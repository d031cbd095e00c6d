use crate::manifest::{ManifestError, MANIFEST_PATH};

/// Archive folder holding user-defined-function jars required by models.
pub const UDF_FOLDER: &str = "lib/";

/// Archive folder holding auxiliary user files.
pub const USER_FILES_FOLDER: &str = "otherFiles/";

/// Canonical form of an archive-relative entry name.
///
/// Backslashes become forward slashes, leading separators and empty or `.`
/// segments are dropped, so `/proj\\a.xmi`, `proj//a.xmi` and `proj/a.xmi` all
/// compare equal. Every entry, UDF-jar and model-path comparison in vdbkit goes
/// through this function.
pub fn normalize_entry_name(raw: &str) -> Result<String, ManifestError> {
    let unified = raw.trim().replace('\\', "/");
    let mut segments = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => return Err(invalid(raw, "must not contain '..' segments")),
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return Err(invalid(raw, "must not be empty"));
    }

    let joined = segments.join("/");
    if joined == MANIFEST_PATH {
        return Err(invalid(raw, "is reserved for the manifest"));
    }
    Ok(joined)
}

/// Canonical form of a plain identifier (import, translator or role name).
pub fn normalize_identifier(raw: &str) -> Result<String, ManifestError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid(raw, "must not be empty"));
    }
    Ok(trimmed.to_owned())
}

fn invalid(raw: &str, reason: &'static str) -> ManifestError {
    ManifestError::InvalidName {
        name: raw.to_owned(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_leading_separator() {
        assert_eq!(normalize_entry_name("/proj/a.xmi").unwrap(), "proj/a.xmi");
    }

    #[test]
    fn unifies_backslashes_and_empty_segments() {
        assert_eq!(
            normalize_entry_name("proj\\models//./a.xmi").unwrap(),
            "proj/models/a.xmi"
        );
    }

    #[test]
    fn trims_surrounding_whitespace() {
        assert_eq!(normalize_entry_name("  lib/udf.jar ").unwrap(), "lib/udf.jar");
    }

    #[test]
    fn rejects_parent_segments() {
        assert!(normalize_entry_name("../escape.txt").is_err());
        assert!(normalize_entry_name("a/../../b").is_err());
    }

    #[test]
    fn rejects_empty_names() {
        assert!(normalize_entry_name("").is_err());
        assert!(normalize_entry_name("///").is_err());
        assert!(normalize_entry_name("  ").is_err());
    }

    #[test]
    fn rejects_manifest_path() {
        assert!(normalize_entry_name("/META-INF/vdb.xml").is_err());
        assert!(normalize_entry_name("META-INF/other.xml").is_ok());
    }

    #[test]
    fn identifier_is_trimmed() {
        assert_eq!(normalize_identifier(" vdbX ").unwrap(), "vdbX");
        assert!(normalize_identifier("   ").is_err());
    }

    #[test]
    fn folder_constants_are_prefixes() {
        let jar = normalize_entry_name("/lib/functions.jar").unwrap();
        assert!(jar.starts_with(UDF_FOLDER));
        let doc = normalize_entry_name("otherFiles/readme.txt").unwrap();
        assert!(doc.starts_with(USER_FILES_FOLDER));
    }
}
