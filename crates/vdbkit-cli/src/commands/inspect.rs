use super::{colorize_state, json_pretty, Context, EXIT_SUCCESS};
use std::path::Path;
use vdbkit_core::{Archive, FileEntryKind};

fn file_kind(kind: FileEntryKind) -> &'static str {
    match kind {
        FileEntryKind::Plain => "file",
        FileEntryKind::UdfJar => "udf-jar",
        FileEntryKind::UserFile => "user-file",
    }
}

fn to_json(archive: &Archive) -> serde_json::Value {
    let models: Vec<_> = archive
        .model_entries()
        .iter()
        .map(|m| {
            let settings = m.settings();
            serde_json::json!({
                "name": m.name().as_str(),
                "type": settings.model_type.as_str(),
                "visible": settings.visible,
                "source_name": settings.source_name,
                "translator": settings.translator,
                "jndi_name": settings.jndi_name,
                "import_vdbs": settings.import_vdbs.iter().map(|n| n.as_str()).collect::<Vec<_>>(),
                "checksum": m.checksum(),
                "state": m.sync_state().to_string(),
            })
        })
        .collect();
    let files: Vec<_> = archive
        .file_entries()
        .iter()
        .map(|f| {
            serde_json::json!({
                "name": f.name().as_str(),
                "kind": file_kind(f.kind()),
                "checksum": f.checksum(),
                "state": f.sync_state().to_string(),
            })
        })
        .collect();
    let imports: Vec<_> = archive
        .import_vdb_entries()
        .iter()
        .map(|i| {
            serde_json::json!({
                "name": i.name().as_str(),
                "version": i.version(),
                "import_data_policies": i.imports_data_policies(),
            })
        })
        .collect();
    let translators: Vec<_> = archive
        .translators()
        .iter()
        .map(|t| {
            serde_json::json!({
                "name": t.name().as_str(),
                "type": t.translator_type(),
                "properties": t.properties().as_ref(),
            })
        })
        .collect();
    let roles: Vec<_> = archive
        .data_policies()
        .iter()
        .map(|r| r.name().as_str().to_owned())
        .collect();

    serde_json::json!({
        "path": archive.path().display().to_string(),
        "name": archive.name(),
        "version": archive.version(),
        "description": archive.description(),
        "preview": archive.is_preview(),
        "query_timeout": archive.query_timeout(),
        "synchronized": archive.is_synchronized(),
        "models": models,
        "files": files,
        "import_vdbs": imports,
        "translators": translators,
        "data_roles": roles,
    })
}

pub fn run(ctx: &Context, vdb: &Path) -> Result<u8, String> {
    if !vdb.is_file() {
        return Err(format!("archive {} does not exist", vdb.display()));
    }
    let archive = ctx.open(vdb)?;
    if ctx.json {
        println!("{}", json_pretty(&to_json(&archive))?);
    } else {
        println!("name:          {}", archive.name());
        println!("version:       {}", archive.version());
        println!(
            "description:   {}",
            archive.description().as_deref().unwrap_or("(none)")
        );
        println!("preview:       {}", archive.is_preview());
        match archive.query_timeout() {
            0 => println!("query timeout: (none)"),
            secs => println!("query timeout: {secs}s"),
        }
        for model in archive.model_entries().iter() {
            println!(
                "model   {:<40} {:<8} {}",
                model.name(),
                model.model_type().as_str(),
                colorize_state(model.sync_state())
            );
        }
        for file in archive.file_entries().iter() {
            println!(
                "{:<7} {:<40} {}",
                file_kind(file.kind()),
                file.name(),
                colorize_state(file.sync_state())
            );
        }
        for import in archive.import_vdb_entries().iter() {
            println!("import  {} (version {})", import.name(), import.version());
        }
        for translator in archive.translators().iter() {
            println!(
                "translator {} ({})",
                translator.name(),
                translator.translator_type()
            );
        }
        for role in archive.data_policies().iter() {
            println!("role    {}", role.name());
        }
    }
    archive.close();
    Ok(EXIT_SUCCESS)
}
