use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;

use grader_core::check::{CheckReport, FileCheck, ForbiddenCall, Preprocessor, SourceFile, StaticCallChecker};
use grader_core::pipeline::{Retention, RunContext};

#[derive(Debug, Clone, Default)]
pub struct CheckArgs {
    pub files: Vec<PathBuf>,
    pub forbidden: Vec<String>,
    /// Preprocess with this program (`-E`) against the stub headers first.
    pub preprocessor: Option<String>,
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct CheckOutput<'a> {
    #[serde(flatten)]
    report: &'a CheckReport,
    forbidden: &'a [ForbiddenCall],
}

/// Run the static call check on C files. Returns `false` on parse errors or forbidden calls.
pub fn check_command(args: &CheckArgs) -> Result<bool> {
    let files = args
        .files
        .iter()
        .map(|p| SourceFile::read(p).with_context(|| format!("Failed to read {}", p.display())))
        .collect::<Result<Vec<_>>>()?;

    // Stub headers live in a throwaway directory for the duration of the check.
    let scratch = match &args.preprocessor {
        Some(_) => Some(RunContext::scratch(Retention::Discard).context("Failed to create scratch directory")?),
        None => None,
    };
    let preprocessor = match (&args.preprocessor, &scratch) {
        (Some(program), Some(ctx)) => Some(Preprocessor::new(
            program.clone(),
            ctx.materialize_stubs().context("Failed to write stub headers")?,
        )),
        _ => None,
    };

    let report = StaticCallChecker::new().with_preprocessor(preprocessor).analyze(&files);
    let hits = report.forbidden_hits(&args.forbidden);
    let clean = report.parse_errors().next().is_none() && hits.is_empty();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&CheckOutput { report: &report, forbidden: &hits })?);
    } else {
        for (name, check) in &report.files {
            match check {
                FileCheck::ParseError { message } => println!("{name}: parse error: {message}"),
                FileCheck::Functions(functions) => {
                    println!("{name}:");
                    for f in functions {
                        let callees: Vec<&str> = f.calls.iter().map(|c| c.callee.as_str()).collect();
                        println!("  {}: {}", f.name, if callees.is_empty() { "-".into() } else { callees.join(", ") });
                    }
                }
            }
        }
        for hit in &hits {
            println!(
                "forbidden call to {} in {} ({}:{}:{})",
                hit.callee, hit.function, hit.file, hit.line, hit.column
            );
        }
    }

    if let Some(ctx) = scratch {
        ctx.close().context("Failed to remove stub headers")?;
    }
    Ok(clean)
}
