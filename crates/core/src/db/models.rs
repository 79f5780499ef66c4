use serde::{Deserialize, Serialize};

use crate::model::{Exercise, Phase, Solution};
use crate::report::{BuildReport, RunStatus};

/// One row of grading history.
///
/// The full report is stored next to it as JSON; this record carries the
/// columns worth filtering and listing by.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GradingRunRecord {
    pub run_id: String,
    pub exercise_id: String,
    pub language: String,
    /// SHA-256 of the submitted modifications.
    pub solution_hash: String,
    pub status: RunStatus,
    pub last_phase: Option<Phase>,
    pub exit_code: Option<i32>,
    pub duration_ms: i64,
    pub started_at: String,
    pub finished_at: String,
}

impl GradingRunRecord {
    pub fn from_report(
        report: &BuildReport,
        exercise: &Exercise,
        language: &str,
        solution: &Solution,
    ) -> Self {
        Self {
            run_id: report.id.clone(),
            exercise_id: exercise.id.clone(),
            language: language.to_string(),
            solution_hash: solution.content_hash(),
            status: report.outcome.status,
            last_phase: report.outcome.last_phase,
            exit_code: report.outcome.exit_code,
            duration_ms: (report.computation.duration_seconds * 1000.0).round() as i64,
            started_at: report.computation.started_at.clone(),
            finished_at: report.computation.finished_at.clone(),
        }
    }
}

pub(crate) fn parse_status(s: &str) -> Option<RunStatus> {
    [RunStatus::Succeeded, RunStatus::Failed, RunStatus::TimedOut].into_iter().find(|st| st.as_str() == s)
}

pub(crate) fn parse_phase(s: &str) -> Option<Phase> {
    Phase::ALL.into_iter().find(|p| p.as_str() == s)
}
