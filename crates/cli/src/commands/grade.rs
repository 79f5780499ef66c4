use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{info, warn};

use grader_core::config::{load_grader_config, GraderConfig};
use grader_core::db::{GradingRunRecord, HistoryDb};
use grader_core::model::{load_exercise, load_solution};
use grader_core::pipeline::{grade, RunContext};
use grader_core::report::BuildReport;
use grader_core::services::languages::default_language_registry;

/// Inputs of `fragment-grader grade`. Flags override the config file.
#[derive(Debug, Clone, Default)]
pub struct GradeArgs {
    pub exercise: PathBuf,
    pub solution: PathBuf,
    pub config: Option<PathBuf>,
    pub workdir: Option<PathBuf>,
    pub keep_artifacts: bool,
    pub history: Option<PathBuf>,
    pub json: bool,
}

impl GradeArgs {
    fn effective_config(&self) -> Result<GraderConfig> {
        let mut config = match &self.config {
            Some(path) => load_grader_config(path)?,
            None => GraderConfig::default(),
        };
        if self.keep_artifacts {
            config.retain_artifacts = true;
        }
        if let Some(dir) = &self.workdir {
            config.work_root = Some(dir.clone());
        }
        if let Some(db) = &self.history {
            config.history_db = Some(db.clone());
        }
        Ok(config)
    }
}

/// Grade one submission and print the report. Returns whether the run succeeded.
pub fn grade_command(args: &GradeArgs) -> Result<bool> {
    let config = args.effective_config()?;
    let exercise = load_exercise(&args.exercise)?;
    let solution = load_solution(&args.solution)?;
    let language = exercise.active_language()?.to_string();

    let registry = default_language_registry();
    let ctx = match &config.work_root {
        Some(dir) => RunContext::open(dir, config.retention())
            .with_context(|| format!("Failed to prepare working directory {}", dir.display()))?,
        None => RunContext::scratch(config.retention()).context("Failed to create scratch directory")?,
    };
    let workdir = ctx.dir().to_path_buf();

    let report = grade(&registry, &ctx, &config.to_pipeline_options(), &exercise, &solution)
        .with_context(|| format!("Could not grade {}", args.solution.display()))?;
    if let Err(e) = ctx.close() {
        warn!(dir = %workdir.display(), error = %e, "failed to clean up working directory");
    } else if config.retain_artifacts {
        info!(dir = %workdir.display(), "artifacts kept");
    }

    if let Some(db_path) = &config.history_db {
        let db = HistoryDb::open(db_path)
            .with_context(|| format!("Failed to open history database at {}", db_path.display()))?;
        let record = GradingRunRecord::from_report(&report, &exercise, &language, &solution);
        db.insert_run(&record, &report).context("Failed to record grading run")?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, &exercise.id, &language);
        if config.retain_artifacts {
            println!("Artifacts: {}", workdir.display());
        }
    }

    Ok(report.outcome.succeeded())
}

/// Human-readable rendering of a report.
pub fn print_report(report: &BuildReport, exercise_id: &str, language: &str) {
    println!("Run {} (exercise {}, {}): {}", report.id, exercise_id, language, report.outcome.status.as_str());
    if let Some(phase) = report.outcome.last_phase {
        let code = report.outcome.exit_code.map(|c| c.to_string()).unwrap_or_else(|| "-".into());
        println!("Last phase: {} (exit code {})", phase.label(), code);
    }
    println!("Duration: {:.3}s", report.computation.duration_seconds);
    for entry in &report.elements {
        println!("== {}", entry.identifier);
        match &entry.value {
            Value::String(text) if text.is_empty() => println!("(no output)"),
            Value::String(text) => print!("{}{}", text, if text.ends_with('\n') { "" } else { "\n" }),
            Value::Array(items) if items.is_empty() => println!("(no diagnostics)"),
            other => println!("{other}"),
        }
    }
}
