//! The phased build pipeline.
//!
//! `Idle → Prepared → Compiled → Checked → Linked → Ran`. Preparation (merging
//! and writing sources) always happens; every later phase runs only if all
//! earlier phases succeeded and the exercise's `stopAfterPhase` ceiling allows
//! it. Each executed phase appends exactly one result entry, so a failure still
//! leaves its diagnostics in the report.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, info_span, warn};

use crate::check::{FileCheck, ForbiddenCall, Preprocessor, SourceFile};
use crate::error::{BuildError, ConfigurationError};
use crate::merge::{MergeOutput, MergedFile};
use crate::model::{CompilingConfig, Exercise, LanguageConfig, Phase, Solution};
use crate::report::{BuildReport, ResultAccumulator, ResultEntry, RunOutcome};
use crate::services::languages::{CheckOptions, LanguageBackend, LanguageRegistry};

pub mod context;
mod process;

pub use context::{Retention, RunContext, STUB_INCLUDE_DIR};
pub use process::{run_with_deadline, PhaseOutcome, ProcessOutput, ToolCommand};

/// Name of the linked executable inside the working directory.
pub const BINARY_NAME: &str = "out";

/// Wall-clock limits for the external phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseLimits {
    pub compile: Duration,
    pub link: Duration,
    pub run: Duration,
    /// Captured output beyond this is dropped (with a marker).
    pub max_output_bytes: usize,
}

impl Default for PhaseLimits {
    fn default() -> Self {
        Self {
            compile: Duration::from_secs(60),
            link: Duration::from_secs(30),
            run: Duration::from_secs(10),
            max_output_bytes: 64 * 1024,
        }
    }
}

impl PhaseLimits {
    pub fn for_phase(&self, phase: Phase) -> Duration {
        match phase {
            Phase::Compiling | Phase::Checking => self.compile,
            Phase::Linking => self.link,
            Phase::Running => self.run,
        }
    }
}

/// Which program preprocesses sources (`-E` against the stub headers) before the call check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Preprocessing {
    /// The language's compiler driver (`gcc` for C).
    #[default]
    Driver,
    Program(String),
    /// Parse merged sources as written; macros are not expanded.
    Off,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub limits: PhaseLimits,
    pub preprocessor: Preprocessing,
}

/// Last state the pipeline reached successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Prepared,
    Compiled,
    Checked,
    Linked,
    Ran,
}

impl PipelineState {
    fn after(phase: Phase) -> Self {
        match phase {
            Phase::Compiling => PipelineState::Compiled,
            Phase::Checking => PipelineState::Checked,
            Phase::Linking => PipelineState::Linked,
            Phase::Running => PipelineState::Ran,
        }
    }
}

/// Drives one grading run inside a [`RunContext`] for one language.
pub struct BuildPipeline<'a> {
    ctx: &'a RunContext,
    backend: &'a dyn LanguageBackend,
    options: &'a PipelineOptions,
    state: PipelineState,
}

impl<'a> BuildPipeline<'a> {
    pub fn new(
        ctx: &'a RunContext,
        backend: &'a dyn LanguageBackend,
        options: &'a PipelineOptions,
    ) -> Self {
        Self { ctx, backend, options, state: PipelineState::Idle }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Merge, then run every permitted phase until one fails.
    ///
    /// `exercise` is not modified; the student's edits are applied to a copy.
    /// Configuration problems return `Err` before anything is written or run.
    pub fn run(&mut self, exercise: &Exercise, solution: &Solution) -> Result<BuildReport, BuildError> {
        let started = Instant::now();
        let (language, config) = exercise.language_config()?;
        let _span = info_span!("grade", run = %solution.id, language).entered();

        let mut working = exercise.clone();
        let merged = self.backend.merger().merge(&mut working, solution, config)?;
        let compile_targets = select_compile_targets(&merged, &config.compiling)?;
        merged
            .write_to(self.ctx.dir())
            .map_err(|(path, source)| BuildError::WriteSources { path, source })?;
        self.state = PipelineState::Prepared;
        info!(files = merged.files.len(), dir = %self.ctx.dir().display(), "prepared sources");

        let mut acc = ResultAccumulator::new(solution.id.clone());
        let mut last = None;
        for phase in Phase::ALL {
            if !config.permits(phase) {
                debug!(%phase, "stopping at configured ceiling");
                break;
            }
            let outcome = match phase {
                Phase::Compiling => self.compile(&compile_targets, config, &mut acc),
                Phase::Checking if !self.backend.supports_check() => {
                    debug!(language, "no call check for this language");
                    continue;
                }
                Phase::Checking => self.check(&merged, config, &mut acc),
                Phase::Linking => self.link(&merged, config, &mut acc),
                Phase::Running => self.run_binary(&mut acc),
            };
            let succeeded = outcome.is_success();
            if succeeded {
                self.state = PipelineState::after(phase);
            } else {
                info!(%phase, ?outcome, "phase failed; halting");
            }
            last = Some((phase, outcome));
            if !succeeded {
                break;
            }
        }

        let outcome = RunOutcome::from_last(last);
        info!(status = outcome.status.as_str(), "grading run finished");
        Ok(acc.finalize(started.elapsed(), outcome))
    }

    fn compile(
        &self,
        targets: &[&MergedFile],
        config: &LanguageConfig,
        acc: &mut ResultAccumulator,
    ) -> PhaseOutcome {
        let sources: Vec<PathBuf> = targets.iter().map(|f| self.ctx.path(&f.file_name)).collect();
        let command = self.backend.compile_command(&config.compiling, &sources);
        let out = self.execute(Phase::Compiling, &command, acc);
        record(acc, Phase::Compiling, diagnostics_value(&out.output));
        out.outcome
    }

    fn check(&self, merged: &MergeOutput, config: &LanguageConfig, acc: &mut ResultAccumulator) -> PhaseOutcome {
        let files: Vec<SourceFile> = merged
            .files
            .iter()
            .map(|f| SourceFile::new(&f.file_name, self.ctx.path(&f.file_name), &f.text))
            .collect();
        let preprocessor = self.preprocessor();
        if let Some(pp) = &preprocessor {
            for file in &files {
                acc.record_command(Phase::Checking, pp.command(&file.path).to_string());
            }
        }
        let options = CheckOptions { preprocessor };
        let report = self.backend.check(&files, &options).unwrap_or_default();

        for (file, message) in report.parse_errors() {
            warn!(file, message, "call check could not parse file");
        }
        let forbidden = report.forbidden_hits(&config.checking.forbidden_calls);
        let enforced = config.checking.enforce && !forbidden.is_empty();

        let entry = CheckEntry { files: &report.files, forbidden: &forbidden, enforced };
        record(acc, Phase::Checking, serde_json::to_value(&entry).unwrap_or_default());

        if enforced {
            info!(hits = forbidden.len(), "forbidden calls found");
            PhaseOutcome::Failed { exit_code: Some(1) }
        } else {
            PhaseOutcome::Succeeded
        }
    }

    fn link(&self, merged: &MergeOutput, config: &LanguageConfig, acc: &mut ResultAccumulator) -> PhaseOutcome {
        let objects: Vec<PathBuf> = merged.files.iter().map(|f| self.ctx.path(&f.object_name())).collect();
        let command = self.backend.link_command(&config.linking, &self.ctx.path(BINARY_NAME), &objects);
        let out = self.execute(Phase::Linking, &command, acc);
        record(acc, Phase::Linking, Value::String(out.output));
        out.outcome
    }

    fn run_binary(&self, acc: &mut ResultAccumulator) -> PhaseOutcome {
        let binary = self.ctx.path(BINARY_NAME);
        if let Err(e) = make_executable(&binary) {
            let message = format!("failed to mark {} executable: {e}", binary.display());
            record(acc, Phase::Running, Value::String(message.clone()));
            return PhaseOutcome::SpawnFailed { message };
        }
        let command = self.backend.run_command(&binary);
        let out = self.execute(Phase::Running, &command, acc);
        record(acc, Phase::Running, Value::String(out.output));
        out.outcome
    }

    fn execute(&self, phase: Phase, command: &ToolCommand, acc: &mut ResultAccumulator) -> ProcessOutput {
        acc.record_command(phase, command.to_string());
        info!(%phase, %command, "starting phase");
        let capture = self.ctx.path(&format!("{}.log", phase.as_str()));
        let out = run_with_deadline(
            command,
            self.ctx.dir(),
            &capture,
            self.options.limits.for_phase(phase),
            self.options.limits.max_output_bytes,
        );
        debug!(%phase, outcome = ?out.outcome, bytes = out.output.len(), "phase finished");
        out
    }

    fn preprocessor(&self) -> Option<Preprocessor> {
        let program = match &self.options.preprocessor {
            Preprocessing::Driver => self.backend.driver().to_string(),
            Preprocessing::Program(program) => program.clone(),
            Preprocessing::Off => return None,
        };
        match self.ctx.materialize_stubs() {
            Ok(include_dir) => Some(
                Preprocessor::new(program, include_dir).with_limit(self.options.limits.for_phase(Phase::Checking)),
            ),
            Err(e) => {
                warn!(error = %e, "could not write stub headers; checking without preprocessing");
                None
            }
        }
    }
}

/// Resolve a language and run the pipeline for one submission.
pub fn grade(
    registry: &LanguageRegistry,
    ctx: &RunContext,
    options: &PipelineOptions,
    exercise: &Exercise,
    solution: &Solution,
) -> Result<BuildReport, BuildError> {
    let language = exercise.active_language()?;
    let backend =
        registry.get(language).ok_or_else(|| ConfigurationError::UnknownLanguage(language.to_string()))?;
    BuildPipeline::new(ctx, backend, options).run(exercise, solution)
}

#[derive(Serialize)]
struct CheckEntry<'a> {
    files: &'a BTreeMap<String, FileCheck>,
    forbidden: &'a [ForbiddenCall],
    enforced: bool,
}

fn record(acc: &mut ResultAccumulator, phase: Phase, value: Value) {
    let entry = ResultEntry::for_phase(acc.id(), phase, value);
    acc.append(entry);
}

fn select_compile_targets<'m>(
    merged: &'m MergeOutput,
    config: &CompilingConfig,
) -> Result<Vec<&'m MergedFile>, ConfigurationError> {
    match &config.sources {
        None => Ok(merged.files.iter().collect()),
        Some(names) => names
            .iter()
            .map(|n| merged.get(n).ok_or_else(|| ConfigurationError::UnknownCompileTarget(n.clone())))
            .collect(),
    }
}

/// Structured diagnostics when the compiler printed JSON, raw text otherwise.
fn diagnostics_value(output: &str) -> Value {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Value::Array(Vec::new());
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(output.to_string()))
}

#[cfg(unix)]
fn make_executable(path: &std::path::Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
fn make_executable(_path: &std::path::Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_fall_back_to_text() {
        assert_eq!(diagnostics_value(""), Value::Array(vec![]));
        assert_eq!(diagnostics_value("[]\n"), Value::Array(vec![]));
        assert!(diagnostics_value(r#"[{"kind":"warning"}]"#).is_array());
        assert_eq!(diagnostics_value("temp.c:1: error\n"), Value::String("temp.c:1: error\n".into()));
    }

    #[test]
    fn state_after_each_phase() {
        assert_eq!(PipelineState::after(Phase::Compiling), PipelineState::Compiled);
        assert_eq!(PipelineState::after(Phase::Running), PipelineState::Ran);
    }

    #[test]
    fn checking_shares_the_compile_limit() {
        let limits = PhaseLimits::default();
        assert_eq!(limits.for_phase(Phase::Checking), limits.compile);
        assert_eq!(limits.for_phase(Phase::Running), Duration::from_secs(10));
    }
}
