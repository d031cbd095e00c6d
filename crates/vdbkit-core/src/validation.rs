//! Checks of an archive's models against the workspace they came from.

use crate::archive::{Archive, ArchiveOptions};
use crate::progress::NullProgress;
use crate::query::read_manifest;
use crate::workspace::Workspace;
use crate::CoreError;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use vdbkit_schema::EntryPath;
use vdbkit_store::{ProblemMarker, ProblemStore};

/// A recoverable problem found while validating an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationWarning {
    /// No single workspace file carries the model's file name.
    MissingModel { model: String },
    /// The model exists in the workspace, but not at the path the archive
    /// records.
    WrongPath { model: EntryPath, found: EntryPath },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationWarning::MissingModel { model } => {
                write!(f, "model {model} was not found in the workspace")
            }
            ValidationWarning::WrongPath { model, found } => {
                write!(f, "model {model} exists in the workspace at {found}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub archive: PathBuf,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn markers(&self) -> Vec<ProblemMarker> {
        self.warnings
            .iter()
            .map(|w| ProblemMarker::warning(w.to_string()))
            .collect()
    }

    /// Replace the archive's stored problem markers with this report.
    pub fn record(&self, store: &ProblemStore) -> Result<(), CoreError> {
        store.record(&self.archive, &self.markers())?;
        Ok(())
    }
}

/// Compare every model in the manifest at `path` with `workspace`.
///
/// Problems are collected as warnings; only an unreadable archive is an
/// error.
pub fn validate_models_in_workspace(
    path: &Path,
    workspace: &dyn Workspace,
) -> Result<ValidationReport, CoreError> {
    if !path.is_file() {
        return Err(CoreError::InvalidArgument(format!(
            "archive {} does not exist",
            path.display()
        )));
    }
    let doc = read_manifest(path)?;
    let mut warnings = Vec::new();
    for model in &doc.models {
        let model = EntryPath::parse(&model.name)?;
        let found = workspace.find_by_file_name(model.file_name());
        match found.as_slice() {
            [only] => {
                if !workspace.exists(&model) {
                    warnings.push(ValidationWarning::WrongPath {
                        model,
                        found: only.clone(),
                    });
                }
            }
            _ => warnings.push(ValidationWarning::MissingModel {
                model: model.to_string(),
            }),
        }
    }
    for warning in &warnings {
        warn!("{}: {warning}", path.display());
    }
    Ok(ValidationReport {
        archive: path.to_path_buf(),
        warnings,
    })
}

/// Models whose recorded path no longer matches the workspace, paired with
/// where the workspace has them now.
pub fn models_with_wrong_paths(
    path: &Path,
    workspace: &dyn Workspace,
) -> Result<Vec<(EntryPath, EntryPath)>, CoreError> {
    let report = validate_models_in_workspace(path, workspace)?;
    Ok(report
        .warnings
        .into_iter()
        .filter_map(|w| match w {
            ValidationWarning::WrongPath { model, found } => Some((model, found)),
            ValidationWarning::MissingModel { .. } => None,
        })
        .collect())
}

/// Re-point every mismatched model at its current workspace path and save.
///
/// Each model is removed and added again, so it is synchronized from its new
/// location. Returns the models that moved.
pub fn update_model_paths(
    path: &Path,
    options: ArchiveOptions,
) -> Result<Vec<(EntryPath, EntryPath)>, CoreError> {
    let Some(workspace) = options.workspace.clone() else {
        return Err(CoreError::InvalidArgument(
            "updating model paths needs a workspace".to_owned(),
        ));
    };
    let moved = models_with_wrong_paths(path, workspace.as_ref())?;
    if moved.is_empty() {
        return Ok(moved);
    }

    let archive = Archive::open(path, options)?;
    for (old, new) in &moved {
        if let Some(model) = archive.model_entry(old) {
            archive.remove_entry(model);
        }
        archive.add_model_entry(new)?;
        info!("moved model {old} to {new}");
    }
    archive.save(&NullProgress)?;
    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockWorkspace;
    use std::sync::Arc;
    use vdbkit_store::StateLayout;

    fn archive_with(dir: &tempfile::TempDir, ws: &Arc<MockWorkspace>, models: &[&str]) -> PathBuf {
        let path = dir.path().join("v.vdb");
        let options = ArchiveOptions::new(dir.path().join("state")).with_workspace(ws.clone());
        let archive = Archive::open(&path, options).unwrap();
        for m in models {
            archive.add_model_entry(m).unwrap();
        }
        archive.save(&NullProgress).unwrap();
        path
    }

    #[test]
    fn missing_archive_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let ws = MockWorkspace::new();
        assert!(validate_models_in_workspace(&dir.path().join("none.vdb"), &ws).is_err());
    }

    #[test]
    fn clean_when_models_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(MockWorkspace::new());
        ws.put_file("p/a.xmi", b"a");
        let path = archive_with(&dir, &ws, &["p/a.xmi"]);
        let report = validate_models_in_workspace(&path, ws.as_ref()).unwrap();
        assert!(report.is_clean());
    }

    #[test]
    fn missing_and_moved_models_reported() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(MockWorkspace::new());
        ws.put_file("p/a.xmi", b"a");
        ws.put_file("p/b.xmi", b"b");
        let path = archive_with(&dir, &ws, &["p/a.xmi", "p/b.xmi"]);

        ws.remove_file("p/a.xmi");
        ws.remove_file("p/b.xmi");
        ws.put_file("q/b.xmi", b"b");

        let report = validate_models_in_workspace(&path, ws.as_ref()).unwrap();
        assert_eq!(report.warnings.len(), 2);
        assert!(matches!(&report.warnings[0], ValidationWarning::MissingModel { model } if model == "p/a.xmi"));
        let wrong = models_with_wrong_paths(&path, ws.as_ref()).unwrap();
        assert_eq!(wrong.len(), 1);
        assert_eq!(wrong[0].0, "p/b.xmi");
        assert_eq!(wrong[0].1, "q/b.xmi");
    }

    #[test]
    fn report_records_markers() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StateLayout::new(dir.path().join("state"));
        layout.initialize().unwrap();
        let store = ProblemStore::new(layout);
        let report = ValidationReport {
            archive: dir.path().join("v.vdb"),
            warnings: vec![ValidationWarning::MissingModel {
                model: "a.xmi".to_owned(),
            }],
        };
        report.record(&store).unwrap();
        let markers = store.list(&report.archive).unwrap();
        assert_eq!(markers.len(), 1);
        assert!(markers[0].message.contains("a.xmi"));
    }

    #[test]
    fn update_repoints_moved_models() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(MockWorkspace::new());
        ws.put_file("p/b.xmi", b"b");
        let path = archive_with(&dir, &ws, &["p/b.xmi"]);
        ws.remove_file("p/b.xmi");
        ws.put_file("q/b.xmi", b"b2");

        let options = ArchiveOptions::new(dir.path().join("state")).with_workspace(ws.clone());
        let moved = update_model_paths(&path, options).unwrap();
        assert_eq!(moved.len(), 1);

        let report = validate_models_in_workspace(&path, ws.as_ref()).unwrap();
        assert!(report.is_clean());
    }

    #[test]
    fn update_requires_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let options = ArchiveOptions::new(dir.path().join("state"));
        assert!(matches!(
            update_model_paths(&dir.path().join("v.vdb"), options),
            Err(CoreError::InvalidArgument(_))
        ));
    }
}
