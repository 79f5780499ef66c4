use anyhow::Result;
use serde::Serialize;

use grader_core::services::languages::default_language_registry;

#[derive(Debug, Serialize)]
pub struct LanguageInfo {
    pub name: String,
    pub extension: String,
    pub driver: String,
    pub call_check: bool,
}

/// Languages this binary can grade.
pub fn language_infos() -> Vec<LanguageInfo> {
    let registry = default_language_registry();
    registry
        .names()
        .into_iter()
        .filter_map(|name| {
            let backend = registry.get(&name)?;
            Some(LanguageInfo {
                extension: backend.source_extension().to_string(),
                driver: backend.driver().to_string(),
                call_check: backend.supports_check(),
                name,
            })
        })
        .collect()
}

pub fn list_languages_command(json: bool) -> Result<()> {
    let entries = language_infos();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("Languages:");
    for entry in entries {
        let check = if entry.call_check { ", call check" } else { "" };
        println!("- {}: .{} via {}{}", entry.name, entry.extension, entry.driver, check);
    }
    Ok(())
}
