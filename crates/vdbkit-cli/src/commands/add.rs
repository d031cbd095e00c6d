use super::{colorize_state, report_saved, Context, EXIT_SUCCESS};
use std::path::Path;
use vdbkit_core::SyncState;

/// Add a file or model entry. A new file is synchronized straight away; a
/// new model is synchronized by the archive itself.
pub fn run(ctx: &Context, vdb: &Path, path: &str, model: bool) -> Result<u8, String> {
    let (state, saved) = ctx.edit(vdb, |archive, progress| {
        if model {
            let entry = archive.add_model_entry(path).map_err(|e| e.to_string())?;
            Ok(entry.sync_state())
        } else {
            let entry = archive.add_entry(path).map_err(|e| e.to_string())?;
            if entry.sync_state() == SyncState::NotSynchronized {
                archive.synchronize(progress).map_err(|e| e.to_string())?;
            }
            Ok(entry.sync_state())
        }
    })?;

    let kind = if model { "model" } else { "file" };
    if !ctx.json {
        println!("{kind} {path}: {}", colorize_state(state));
    }
    report_saved(vdb, saved, ctx.json, &format!("added {kind} {path}"))?;
    Ok(EXIT_SUCCESS)
}
