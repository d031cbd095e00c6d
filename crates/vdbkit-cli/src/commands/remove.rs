use super::{report_saved, Context, EXIT_FAILURE, EXIT_SUCCESS};
use std::path::Path;

pub fn run(ctx: &Context, vdb: &Path, name: &str) -> Result<u8, String> {
    let (removed, saved) = ctx.edit(vdb, |archive, _| {
        if let Some(entry) = archive.entry(name) {
            return Ok(archive.remove_entry(entry));
        }
        Ok(archive.remove_import_vdb(name)
            || archive.remove_translator(name)
            || archive.remove_data_policy(name))
    })?;

    if !removed {
        eprintln!("error: nothing named '{name}' in {}", vdb.display());
        return Ok(EXIT_FAILURE);
    }
    report_saved(vdb, saved, ctx.json, &format!("removed {name}"))?;
    Ok(EXIT_SUCCESS)
}
