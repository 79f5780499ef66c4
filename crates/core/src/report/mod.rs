//! Result accumulation for one grading run.
//!
//! The report shape is what the external reporting collaborator consumes:
//! one entry per executed phase, in execution order, plus timing and the
//! exact commands that were run.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::Phase;
use crate::pipeline::PhaseOutcome;

pub const TEXT_PLAIN: &str = "text/plain";

/// One phase's contribution to the report. Never modified once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry {
    #[serde(rename = "MIMEtype")]
    pub mime_type: String,
    pub identifier: String,
    pub value: Value,
}

impl ResultEntry {
    /// `text/plain` entry identified as `"<run_id> <Phase>"`.
    pub fn for_phase(run_id: &str, phase: Phase, value: Value) -> Self {
        Self {
            mime_type: TEXT_PLAIN.to_string(),
            identifier: format!("{run_id} {}", phase.label()),
            value,
        }
    }
}

/// Command lines actually executed, for troubleshooting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicalInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_command: Option<String>,
    /// One per checked file.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preprocess_commands: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Computation {
    pub duration_seconds: f64,
    pub started_at: String,
    pub finished_at: String,
    pub technical_info: TechnicalInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
    TimedOut,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::TimedOut => "timed_out",
        }
    }
}

/// Overall verdict, derived from the last phase attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_phase: Option<Phase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_outcome: Option<PhaseOutcome>,
}

impl RunOutcome {
    pub fn from_last(last: Option<(Phase, PhaseOutcome)>) -> Self {
        match last {
            None => Self { status: RunStatus::Succeeded, last_phase: None, exit_code: None, phase_outcome: None },
            Some((phase, outcome)) => Self {
                status: match outcome {
                    PhaseOutcome::Succeeded => RunStatus::Succeeded,
                    PhaseOutcome::TimedOut { .. } => RunStatus::TimedOut,
                    PhaseOutcome::Failed { .. } | PhaseOutcome::SpawnFailed { .. } => RunStatus::Failed,
                },
                last_phase: Some(phase),
                exit_code: outcome.exit_code(),
                phase_outcome: Some(outcome),
            },
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}

/// Finished report of one grading run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    pub id: String,
    pub elements: Vec<ResultEntry>,
    pub computation: Computation,
    pub outcome: RunOutcome,
}

impl BuildReport {
    pub fn entry(&self, phase: Phase) -> Option<&ResultEntry> {
        let suffix = format!(" {}", phase.label());
        self.elements.iter().find(|e| e.identifier.ends_with(&suffix))
    }
}

/// Append-only collector for a run's entries.
#[derive(Debug)]
pub struct ResultAccumulator {
    id: String,
    started_at: DateTime<Utc>,
    elements: Vec<ResultEntry>,
    technical_info: TechnicalInfo,
}

impl ResultAccumulator {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            started_at: Utc::now(),
            elements: Vec::new(),
            technical_info: TechnicalInfo::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn append(&mut self, entry: ResultEntry) {
        self.elements.push(entry);
    }

    pub fn entries(&self) -> &[ResultEntry] {
        &self.elements
    }

    /// Remember the command line executed for `phase`.
    pub fn record_command(&mut self, phase: Phase, command: String) {
        let slot = match phase {
            Phase::Compiling => &mut self.technical_info.compile_command,
            Phase::Linking => &mut self.technical_info.link_command,
            Phase::Running => &mut self.technical_info.run_command,
            Phase::Checking => {
                self.technical_info.preprocess_commands.push(command);
                return;
            }
        };
        *slot = Some(command);
    }

    pub fn finalize(self, duration: Duration, outcome: RunOutcome) -> BuildReport {
        BuildReport {
            id: self.id,
            elements: self.elements,
            computation: Computation {
                duration_seconds: duration.as_secs_f64(),
                started_at: self.started_at.to_rfc3339(),
                finished_at: Utc::now().to_rfc3339(),
                technical_info: self.technical_info,
            },
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entries_keep_append_order_and_identifier_format() {
        let mut acc = ResultAccumulator::new("run-7");
        acc.append(ResultEntry::for_phase("run-7", Phase::Compiling, json!([])));
        acc.append(ResultEntry::for_phase("run-7", Phase::Linking, json!("")));
        let ids: Vec<&str> = acc.entries().iter().map(|e| e.identifier.as_str()).collect();
        assert_eq!(ids, vec!["run-7 Compiling", "run-7 Linking"]);
    }

    #[test]
    fn serialized_entry_uses_platform_key_names() {
        let entry = ResultEntry::for_phase("r", Phase::Running, json!("hello\n"));
        let v = serde_json::to_value(&entry).unwrap();
        assert_eq!(v["MIMEtype"], "text/plain");
        assert_eq!(v["identifier"], "r Running");
        assert_eq!(v["value"], "hello\n");
    }

    #[test]
    fn outcome_follows_last_phase() {
        let ok = RunOutcome::from_last(Some((Phase::Running, PhaseOutcome::Succeeded)));
        assert!(ok.succeeded());
        assert_eq!(ok.exit_code, Some(0));

        let failed =
            RunOutcome::from_last(Some((Phase::Compiling, PhaseOutcome::Failed { exit_code: Some(1) })));
        assert_eq!(failed.status, RunStatus::Failed);
        assert_eq!(failed.last_phase, Some(Phase::Compiling));

        let slow = RunOutcome::from_last(Some((Phase::Running, PhaseOutcome::TimedOut { limit_ms: 5 })));
        assert_eq!(slow.status, RunStatus::TimedOut);
        assert_eq!(slow.exit_code, None);
    }

    #[test]
    fn finalize_records_commands_and_duration() {
        let mut acc = ResultAccumulator::new("r");
        acc.record_command(Phase::Compiling, "gcc -c temp.c".into());
        acc.record_command(Phase::Checking, "gcc -E a.c".into());
        acc.record_command(Phase::Checking, "gcc -E b.c".into());
        let report = acc.finalize(Duration::from_millis(1500), RunOutcome::from_last(None));
        assert_eq!(report.computation.technical_info.compile_command.as_deref(), Some("gcc -c temp.c"));
        assert_eq!(report.computation.technical_info.preprocess_commands, vec!["gcc -E a.c", "gcc -E b.c"]);
        assert!(report.computation.technical_info.link_command.is_none());
        assert!((report.computation.duration_seconds - 1.5).abs() < f64::EPSILON);
    }
}
