//! Grader configuration file (`grader.json` / `grader.yaml`).
//!
//! Every field is optional; an empty document yields the defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::pipeline::{PhaseLimits, PipelineOptions, Preprocessing, Retention};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraderConfig {
    /// Directory runs are prepared in. A fresh temp directory per run when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_root: Option<PathBuf>,
    /// Keep merged sources, objects and logs after the run.
    pub retain_artifacts: bool,
    pub limits: LimitsConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preprocessor: Option<PreprocessorConfig>,
    /// SQLite file grading runs are recorded in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_db: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LimitsConfig {
    pub compile_secs: u64,
    pub link_secs: u64,
    pub run_secs: u64,
    pub max_output_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        let limits = PhaseLimits::default();
        Self {
            compile_secs: limits.compile.as_secs(),
            link_secs: limits.link.as_secs(),
            run_secs: limits.run.as_secs(),
            max_output_bytes: limits.max_output_bytes,
        }
    }
}

/// Preprocessing before the call check. Defaults to the language's compiler driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessorConfig {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self { enabled: true, program: None }
    }
}

impl PreprocessorConfig {
    fn to_preprocessing(&self) -> Preprocessing {
        match (self.enabled, &self.program) {
            (false, _) => Preprocessing::Off,
            (true, Some(program)) => Preprocessing::Program(program.clone()),
            (true, None) => Preprocessing::Driver,
        }
    }
}

impl GraderConfig {
    pub fn retention(&self) -> Retention {
        if self.retain_artifacts {
            Retention::Keep
        } else {
            Retention::Discard
        }
    }

    pub fn to_pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            limits: PhaseLimits {
                compile: Duration::from_secs(self.limits.compile_secs),
                link: Duration::from_secs(self.limits.link_secs),
                run: Duration::from_secs(self.limits.run_secs),
                max_output_bytes: self.limits.max_output_bytes,
            },
            preprocessor: self.preprocessor.as_ref().map(PreprocessorConfig::to_preprocessing).unwrap_or_default(),
        }
    }
}

/// Read a config file; YAML for `.yaml`/`.yml`, JSON otherwise.
pub fn load_grader_config(path: &Path) -> Result<GraderConfig> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read grader config {}", path.display()))?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => serde_yaml::from_str(&body)
            .with_context(|| format!("Failed to parse YAML config {}", path.display())),
        _ => serde_json::from_str(&body)
            .with_context(|| format!("Failed to parse JSON config {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_document_gives_default_limits() {
        let cfg: GraderConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.to_pipeline_options().limits, PhaseLimits::default());
        assert_eq!(cfg.retention(), Retention::Discard);
        assert_eq!(cfg.to_pipeline_options().preprocessor, Preprocessing::Driver);
    }

    #[test]
    fn partial_limits_keep_other_defaults() {
        let cfg: GraderConfig =
            serde_json::from_str(r#"{"limits":{"runSecs":2},"preprocessor":{"program":"cpp"}}"#).unwrap();
        let opts = cfg.to_pipeline_options();
        assert_eq!(opts.limits.run, Duration::from_secs(2));
        assert_eq!(opts.limits.compile, Duration::from_secs(60));
        assert_eq!(opts.preprocessor, Preprocessing::Program("cpp".into()));
    }

    #[test]
    fn preprocessing_can_be_switched_off() {
        let cfg: GraderConfig = serde_json::from_str(r#"{"preprocessor":{"enabled":false}}"#).unwrap();
        assert_eq!(cfg.to_pipeline_options().preprocessor, Preprocessing::Off);
    }

    #[test]
    fn loads_yaml_by_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("grader.yaml");
        std::fs::write(&path, "retainArtifacts: true\nhistoryDb: runs.db\n").unwrap();
        let cfg = load_grader_config(&path).unwrap();
        assert_eq!(cfg.retention(), Retention::Keep);
        assert_eq!(cfg.history_db, Some(PathBuf::from("runs.db")));
    }
}
