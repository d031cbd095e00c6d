//! The external source of entry content and model metadata.

use crate::CoreError;
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use vdbkit_schema::{EntryPath, ImportName, ModelType};

/// Data-source binding of a source model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceBinding {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub translator: Option<String>,
    #[serde(default)]
    pub jndi_name: Option<String>,
}

/// What the workspace knows about a model file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub model_type: ModelType,
    pub model_class: Option<String>,
    pub source: SourceBinding,
    /// Other models this model imports.
    pub model_imports: Vec<EntryPath>,
    /// Archives this model requires as imports.
    pub import_vdbs: Vec<ImportName>,
    /// UDF jars this model requires.
    pub udf_jars: Vec<EntryPath>,
}

impl ModelDescriptor {
    pub fn new(model_type: ModelType) -> Self {
        Self {
            model_type,
            model_class: None,
            source: SourceBinding::default(),
            model_imports: Vec::new(),
            import_vdbs: Vec::new(),
            udf_jars: Vec::new(),
        }
    }
}

/// Supplier of raw entry bytes and model metadata.
pub trait Workspace: Send + Sync {
    /// Current content of the source behind `path`.
    fn read(&self, path: &EntryPath) -> io::Result<Vec<u8>>;

    fn exists(&self, path: &EntryPath) -> bool {
        self.read(path).is_ok()
    }

    /// Model metadata for `path`, or `None` when the workspace has none.
    fn describe_model(&self, _path: &EntryPath) -> Result<Option<ModelDescriptor>, CoreError> {
        Ok(None)
    }

    /// Every workspace path whose last segment equals `file_name`.
    fn find_by_file_name(&self, file_name: &str) -> Vec<EntryPath>;
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModelSidecar {
    #[serde(rename = "type")]
    model_type: String,
    #[serde(default)]
    model_class: Option<String>,
    #[serde(default)]
    source: SourceBinding,
    #[serde(default)]
    imports: Vec<EntryPath>,
    #[serde(default)]
    import_vdbs: Vec<ImportName>,
    #[serde(default)]
    udf_jars: Vec<EntryPath>,
}

const SIDECAR_SUFFIX: &str = ".meta.toml";

/// Workspace backed by a directory tree.
///
/// Model metadata comes from an optional `<model>.meta.toml` sidecar next to
/// the model file:
///
/// ```toml
/// type = "PHYSICAL"
/// model_class = "Relational"
/// import_vdbs = ["Inventory"]
/// udf_jars = ["lib/functions.jar"]
///
/// [source]
/// name = "orders"
/// translator = "oracle"
/// jndi_name = "java:/orders"
/// ```
#[derive(Debug, Clone)]
pub struct DirectoryWorkspace {
    root: PathBuf,
}

impl DirectoryWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, path: &EntryPath) -> PathBuf {
        let mut full = self.root.clone();
        full.extend(path.split('/'));
        full
    }

    fn walk(&self, dir: &Path, file_name: &str, found: &mut Vec<EntryPath>) {
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') {
                continue;
            }
            if path.is_dir() {
                self.walk(&path, file_name, found);
            } else if name == file_name {
                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                if let Ok(entry_path) = EntryPath::parse(&relative.to_string_lossy()) {
                    found.push(entry_path);
                }
            }
        }
    }
}

impl Workspace for DirectoryWorkspace {
    fn read(&self, path: &EntryPath) -> io::Result<Vec<u8>> {
        fs::read(self.resolve(path))
    }

    fn exists(&self, path: &EntryPath) -> bool {
        self.resolve(path).is_file()
    }

    fn describe_model(&self, path: &EntryPath) -> Result<Option<ModelDescriptor>, CoreError> {
        let mut sidecar = self.resolve(path).into_os_string();
        sidecar.push(SIDECAR_SUFFIX);
        let sidecar = PathBuf::from(sidecar);
        if !sidecar.is_file() {
            return Ok(None);
        }

        let content = fs::read_to_string(&sidecar)?;
        let meta: ModelSidecar = toml::from_str(&content).map_err(|e| {
            CoreError::Workspace(format!("invalid model metadata {}: {e}", sidecar.display()))
        })?;
        debug!("read model metadata for {path} from {}", sidecar.display());

        Ok(Some(ModelDescriptor {
            model_type: ModelType::infer(&meta.model_type, path)?,
            model_class: meta.model_class,
            source: meta.source,
            model_imports: meta.imports,
            import_vdbs: meta.import_vdbs,
            udf_jars: meta.udf_jars,
        }))
    }

    fn find_by_file_name(&self, file_name: &str) -> Vec<EntryPath> {
        let mut found = Vec::new();
        self.walk(&self.root, file_name, &mut found);
        found.sort();
        found
    }
}
