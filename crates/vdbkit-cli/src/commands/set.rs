use super::{report_saved, Context, EXIT_SUCCESS};
use std::path::Path;

pub fn description(ctx: &Context, vdb: &Path, text: &str) -> Result<u8, String> {
    let ((), saved) = ctx.edit(vdb, |archive, _| {
        archive.set_description(Some(text));
        Ok(())
    })?;
    let change = if text.is_empty() {
        "cleared description".to_owned()
    } else {
        "set description".to_owned()
    };
    report_saved(vdb, saved, ctx.json, &change)?;
    Ok(EXIT_SUCCESS)
}

pub fn timeout(ctx: &Context, vdb: &Path, seconds: u64) -> Result<u8, String> {
    let ((), saved) = ctx.edit(vdb, |archive, _| {
        archive.set_query_timeout(seconds);
        Ok(())
    })?;
    report_saved(vdb, saved, ctx.json, &format!("query timeout {seconds}s"))?;
    Ok(EXIT_SUCCESS)
}
