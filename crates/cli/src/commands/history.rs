use std::path::Path;

use anyhow::{anyhow, Context, Result};

use grader_core::db::HistoryDb;

/// List recorded grading runs, or print one stored report with `run`.
pub fn history_command(db_path: &Path, exercise: Option<&str>, run: Option<&str>, json: bool) -> Result<()> {
    if !db_path.exists() {
        return Err(anyhow!("History database does not exist: {}", db_path.display()));
    }
    let db = HistoryDb::open(db_path)
        .with_context(|| format!("Failed to open history database at {}", db_path.display()))?;

    if let Some(run_id) = run {
        let report = db
            .get_report(run_id)
            .context("Failed to read stored report")?
            .ok_or_else(|| anyhow!("No run '{}' in {}", run_id, db_path.display()))?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let runs = db.list_runs(exercise).context("Failed to list grading runs")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("Runs: (none)");
        return Ok(());
    }
    println!("Runs:");
    for r in runs {
        let phase = r.last_phase.map(|p| p.label()).unwrap_or("-");
        println!(
            "- {} [{}] exercise={} lang={} last_phase={} duration={}ms started={}",
            r.run_id,
            r.status.as_str(),
            r.exercise_id,
            r.language,
            phase,
            r.duration_ms,
            r.started_at
        );
    }
    Ok(())
}
