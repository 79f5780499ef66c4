use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use grader_core::merge::{MergeOutput, SourceMap};
use grader_core::model::{load_exercise, load_solution};
use grader_core::services::languages::default_language_registry;

/// File written next to the merged sources, mapping each target to its fragment spans.
pub const SOURCE_MAP_FILE: &str = "sourcemap.json";

/// Merge a submission without building it.
///
/// With `out`, writes the merged files and `sourcemap.json` there.
pub fn merge_command(exercise: &Path, solution: &Path, out: Option<&Path>, json: bool) -> Result<MergeOutput> {
    let mut exercise = load_exercise(exercise)?;
    let solution = load_solution(solution)?;
    let (language, config) = exercise.language_config()?;
    let registry = default_language_registry();
    let backend = registry.get(language).ok_or_else(|| {
        anyhow!("Unknown language '{}'; known languages: {}", language, registry.names().join(", "))
    })?;
    let config = config.clone();
    let merged = backend.merger().merge(&mut exercise, &solution, &config)?;

    if let Some(dir) = out {
        let written = write_merge(&merged, dir)?;
        if !json {
            println!("Wrote {} file(s) to {}", written.len(), dir.display());
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&merged)?);
        return Ok(merged);
    }

    for file in &merged.files {
        println!("{} ({} lines)", file.file_name, file.source_map.total_lines());
        for span in &file.source_map.fragments {
            let hidden = if span.visible { "" } else { " [hidden]" };
            println!("  {:>4}-{:<4} {}{}", span.start, span.stop, span.identifier, hidden);
        }
    }
    Ok(merged)
}

fn write_merge(merged: &MergeOutput, dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let mut written = merged
        .write_to(dir)
        .map_err(|(path, e)| anyhow!(e).context(format!("Failed to write {}", path.display())))?;

    let maps: BTreeMap<&str, &SourceMap> =
        merged.files.iter().map(|f| (f.target.as_str(), &f.source_map)).collect();
    let map_path = dir.join(SOURCE_MAP_FILE);
    fs::write(&map_path, serde_json::to_string_pretty(&maps)?)
        .with_context(|| format!("Failed to write {}", map_path.display()))?;
    written.push(map_path);
    Ok(written)
}
