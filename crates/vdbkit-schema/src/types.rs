//! Validated string identifiers and the model type enumeration.
//!
//! Every identifier goes through its normalizer on construction, so two values
//! that compare equal always name the same archive member.

use crate::manifest::ManifestError;
use crate::normalize::{normalize_entry_name, normalize_identifier};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

macro_rules! normalized_name {
    ($(#[$meta:meta])* $name:ident, $normalize:path) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Normalize `raw` and wrap it, rejecting names that cannot be canonicalized.
            pub fn parse(raw: &str) -> Result<Self, ManifestError> {
                $normalize(raw).map(Self)
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl FromStr for $name {
            type Err = ManifestError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ManifestError;
            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::parse(&s)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = ManifestError;
            fn try_from(s: &str) -> Result<Self, Self::Error> {
                Self::parse(s)
            }
        }

        impl From<$name> for String {
            fn from(name: $name) -> Self {
                name.0
            }
        }
    };
}

normalized_name!(
    /// Archive-relative path of an entry, in canonical slash-separated form.
    EntryPath,
    normalize_entry_name
);

normalized_name!(
    /// Name of another archive imported by this one.
    ImportName,
    normalize_identifier
);

normalized_name!(
    /// Name of a translator override.
    TranslatorName,
    normalize_identifier
);

normalized_name!(
    /// Name of a data role.
    RoleName,
    normalize_identifier
);

impl EntryPath {
    /// Last path segment.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Extension of the last segment, without the dot.
    pub fn extension(&self) -> Option<&str> {
        let file = self.file_name();
        file.rfind('.')
            .filter(|&idx| idx > 0)
            .map(|idx| &file[idx + 1..])
    }

    /// File name without its extension.
    pub fn stem(&self) -> &str {
        let file = self.file_name();
        match file.rfind('.') {
            Some(idx) if idx > 0 => &file[..idx],
            _ => file,
        }
    }

    /// Whether the path lives under `folder` (given with a trailing slash).
    pub fn is_under(&self, folder: &str) -> bool {
        self.0.starts_with(folder) && self.0.len() > folder.len()
    }
}

/// Kind of metadata model carried by a model entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModelType {
    #[default]
    Physical,
    Virtual,
    Function,
    Other,
    /// Legacy XML-schema model type. Older archives record `OTHER` for these.
    Type,
}

impl ModelType {
    pub const ALL: [ModelType; 5] = [
        ModelType::Physical,
        ModelType::Virtual,
        ModelType::Function,
        ModelType::Other,
        ModelType::Type,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelType::Physical => "PHYSICAL",
            ModelType::Virtual => "VIRTUAL",
            ModelType::Function => "FUNCTION",
            ModelType::Other => "OTHER",
            ModelType::Type => "TYPE",
        }
    }

    /// Source models bind to a translator and a data source.
    pub fn is_source(self) -> bool {
        self == ModelType::Physical
    }

    /// Resolve the declared type of a model, treating `OTHER` on an `.xsd` path as `TYPE`.
    pub fn infer(declared: &str, path: &EntryPath) -> Result<ModelType, ManifestError> {
        let parsed: ModelType = declared.parse()?;
        let is_schema = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xsd"));
        if parsed == ModelType::Other && is_schema {
            return Ok(ModelType::Type);
        }
        Ok(parsed)
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ModelType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ManifestError::UnknownModelType(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn entry_path_equality_ignores_leading_separator() {
        let a = EntryPath::parse("/proj/a.xmi").unwrap();
        let b = EntryPath::parse("proj/a.xmi").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, "proj/a.xmi");
    }

    #[test]
    fn entry_path_segments() {
        let p = EntryPath::parse("proj/models/Customers.xmi").unwrap();
        assert_eq!(p.file_name(), "Customers.xmi");
        assert_eq!(p.stem(), "Customers");
        assert_eq!(p.extension(), Some("xmi"));
        assert!(p.is_under("proj/"));
        assert!(!p.is_under("lib/"));
    }

    #[test]
    fn dotfile_has_no_extension() {
        let p = EntryPath::parse("otherFiles/.hidden").unwrap();
        assert_eq!(p.extension(), None);
        assert_eq!(p.stem(), ".hidden");
    }

    #[test]
    fn borrow_allows_str_lookup() {
        let mut set = BTreeSet::new();
        set.insert(ImportName::parse("vdbX").unwrap());
        assert!(set.contains("vdbX"));
        assert!(!set.contains("vdbx"));
    }

    #[test]
    fn import_name_serde_normalizes() {
        let name: ImportName = serde_json::from_str("\"  Sales \"").unwrap();
        assert_eq!(name.as_str(), "Sales");
        assert_eq!(serde_json::to_string(&name).unwrap(), "\"Sales\"");
        assert!(serde_json::from_str::<ImportName>("\"  \"").is_err());
    }

    #[test]
    fn model_type_parse_is_case_insensitive() {
        assert_eq!("virtual".parse::<ModelType>().unwrap(), ModelType::Virtual);
        assert_eq!("PHYSICAL".parse::<ModelType>().unwrap(), ModelType::Physical);
        assert!("RELATIONAL".parse::<ModelType>().is_err());
    }

    #[test]
    fn model_type_infers_xsd_as_type() {
        let xsd = EntryPath::parse("schemas/Books.XSD").unwrap();
        assert_eq!(ModelType::infer("OTHER", &xsd).unwrap(), ModelType::Type);
        let xmi = EntryPath::parse("models/Books.xmi").unwrap();
        assert_eq!(ModelType::infer("OTHER", &xmi).unwrap(), ModelType::Other);
        assert_eq!(ModelType::infer("VIRTUAL", &xsd).unwrap(), ModelType::Virtual);
    }

    #[test]
    fn only_physical_is_source() {
        assert!(ModelType::Physical.is_source());
        assert!(!ModelType::Virtual.is_source());
    }
}
