use super::{json_pretty, Context, EXIT_SUCCESS};
use std::path::Path;

pub fn run(ctx: &Context, vdb: &Path, model: &str, names: &[String]) -> Result<u8, String> {
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let (changes, saved) = ctx.edit(vdb, |archive, progress| {
        if archive.model_entry(model).is_none() {
            return Err(format!("no model '{model}' in {}", vdb.display()));
        }
        archive
            .register_import_vdbs(&names, model, progress)
            .map_err(|e| e.to_string())
    })?;

    if ctx.json {
        let payload = serde_json::json!({
            "archive": vdb.display().to_string(),
            "model": model,
            "added": changes.added.iter().map(|n| n.as_str()).collect::<Vec<_>>(),
            "removed": changes.removed.iter().map(|n| n.as_str()).collect::<Vec<_>>(),
            "saved": saved,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        for name in &changes.added {
            println!("+ import {name}");
        }
        for name in &changes.removed {
            println!("- import {name}");
        }
        if changes.is_empty() {
            println!("imports of {model} unchanged");
        }
    }
    Ok(EXIT_SUCCESS)
}
