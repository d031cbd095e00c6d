use super::{json_pretty, Context, EXIT_SUCCESS};
use std::path::Path;

pub fn run(ctx: &Context, vdb: &Path) -> Result<u8, String> {
    let (report, saved) = ctx.edit(vdb, |archive, progress| {
        archive.synchronize(progress).map_err(|e| e.to_string())
    })?;

    if ctx.json {
        let payload = serde_json::json!({
            "archive": vdb.display().to_string(),
            "refreshed": report.refreshed,
            "pending": report.pending,
            "saved": saved,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!(
            "sync: {} refreshed, {} pending{}",
            report.refreshed,
            report.pending.len(),
            if saved { ", saved" } else { "" }
        );
        for name in &report.pending {
            println!("pending: {name}");
        }
    }
    Ok(EXIT_SUCCESS)
}
