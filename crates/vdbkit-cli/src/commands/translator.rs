use super::{report_saved, Context, EXIT_SUCCESS};
use std::path::Path;
use vdbkit_core::TranslatorOverride;
use vdbkit_schema::TranslatorName;

/// Split `key=value`; a bare `key` means unset.
fn parse_property(raw: &str) -> Result<(&str, Option<&str>), String> {
    let (key, value) = match raw.split_once('=') {
        Some((k, v)) => (k.trim(), Some(v)),
        None => (raw.trim(), None),
    };
    if key.is_empty() {
        return Err(format!("invalid property '{raw}': empty key"));
    }
    Ok((key, value))
}

pub fn run(
    ctx: &Context,
    vdb: &Path,
    name: &str,
    translator_type: &str,
    properties: &[String],
) -> Result<u8, String> {
    let name = TranslatorName::parse(name).map_err(|e| format!("invalid translator name: {e}"))?;
    let properties = properties
        .iter()
        .map(|p| parse_property(p))
        .collect::<Result<Vec<_>, _>>()?;

    let (created, saved) = ctx.edit(vdb, |archive, _| {
        let created = if archive.translator(&name).is_none() {
            archive.add_translator(TranslatorOverride::new(name.clone(), translator_type))
        } else {
            false
        };
        let Some(translator) = archive.translator(&name) else {
            return Err(format!("translator {name} could not be added"));
        };
        if translator.translator_type() != translator_type {
            return Err(format!(
                "translator {name} already exists with type {}",
                translator.translator_type()
            ));
        }
        for (key, value) in &properties {
            translator.set_property(key, *value);
        }
        Ok(created)
    })?;

    let change = if created {
        format!("added translator {name}")
    } else {
        format!("updated translator {name}")
    };
    report_saved(vdb, saved, ctx.json, &change)?;
    Ok(EXIT_SUCCESS)
}
