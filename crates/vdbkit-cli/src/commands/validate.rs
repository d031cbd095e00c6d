use super::{json_pretty, Context, EXIT_SUCCESS, EXIT_VALIDATION_WARNINGS};
use std::path::Path;
use vdbkit_core::validation::{update_model_paths, validate_models_in_workspace};
use vdbkit_store::{ArchiveLock, ProblemStore};

pub fn run(ctx: &Context, vdb: &Path, fix: bool) -> Result<u8, String> {
    let Some(workspace) = ctx.options.workspace.clone() else {
        return Err("validation needs a workspace".to_owned());
    };
    ctx.layout
        .initialize()
        .map_err(|e| format!("store error: {e}"))?;

    let mut moved = Vec::new();
    if fix {
        let lock_path = ctx
            .layout
            .lock_file(vdb)
            .map_err(|e| format!("archive lock: {e}"))?;
        let _lock = ArchiveLock::acquire(&lock_path).map_err(|e| format!("archive lock: {e}"))?;
        moved = update_model_paths(vdb, ctx.options.clone()).map_err(|e| e.to_string())?;
    }

    let report = validate_models_in_workspace(vdb, workspace.as_ref()).map_err(|e| e.to_string())?;
    report
        .record(&ProblemStore::new(ctx.layout.clone()))
        .map_err(|e| e.to_string())?;

    if ctx.json {
        let payload = serde_json::json!({
            "archive": vdb.display().to_string(),
            "clean": report.is_clean(),
            "warnings": report.warnings.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "moved": moved
                .iter()
                .map(|(from, to)| serde_json::json!({"from": from.as_str(), "to": to.as_str()}))
                .collect::<Vec<_>>(),
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        for (from, to) in &moved {
            println!("moved {from} -> {to}");
        }
        if report.is_clean() {
            println!("{}: all models found in the workspace", vdb.display());
        }
        for warning in &report.warnings {
            println!("warning: {warning}");
        }
    }

    if report.is_clean() {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_VALIDATION_WARNINGS)
    }
}
