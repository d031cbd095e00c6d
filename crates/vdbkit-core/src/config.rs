use crate::archive::ArchiveOptions;
use crate::workspace::DirectoryWorkspace;
use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vdbkit_store::Compression;

/// User configuration, read from `~/.config/vdbkit/config.toml`.
///
/// ```toml
/// state_dir = "~/.local/share/vdbkit/state"
/// workspace_root = "~/projects/sales"
/// compression = "stored"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
    #[serde(default)]
    pub compression: Compression,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            workspace_root: default_workspace_root(),
            compression: Compression::default(),
        }
    }
}

impl Config {
    /// Load `path`, or the default location when `path` is `None`.
    ///
    /// A missing default file yields the defaults; a missing explicit file
    /// is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, CoreError> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match default_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };
        if !explicit && !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|e| {
            CoreError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&content)
            .map_err(|e| CoreError::Config(format!("invalid config {}: {e}", path.display())))
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        let mut config: Config = toml::from_str(content)?;
        config.state_dir = expand_tilde(&config.state_dir);
        config.workspace_root = expand_tilde(&config.workspace_root);
        Ok(config)
    }

    /// Archive options with a directory workspace rooted at `workspace_root`.
    pub fn archive_options(&self) -> ArchiveOptions {
        ArchiveOptions::new(&self.state_dir)
            .with_compression(self.compression)
            .with_workspace(Arc::new(DirectoryWorkspace::new(&self.workspace_root)))
    }
}

/// `~/.config/vdbkit/config.toml`, when `HOME` is set.
pub fn default_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(PathBuf::from(home).join(".config/vdbkit/config.toml"))
}

fn default_state_dir() -> PathBuf {
    expand_tilde(Path::new("~/.local/share/vdbkit/state"))
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from(".")
}

pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
