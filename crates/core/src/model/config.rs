use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// File name (without extension) used when an exercise merges into a single file.
pub const DEFAULT_MERGE_TARGET: &str = "temp";

/// Build phases after preparation, in execution order.
///
/// The derived ordering matches execution order, so `a < b` means `a` runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Compiling,
    Checking,
    Linking,
    Running,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Phase::Compiling, Phase::Checking, Phase::Linking, Phase::Running];

    /// Integer rank used for the stop-after ceiling (compiling = 1 .. running = 4).
    pub fn rank(self) -> u8 {
        match self {
            Phase::Compiling => 1,
            Phase::Checking => 2,
            Phase::Linking => 3,
            Phase::Running => 4,
        }
    }

    /// Configuration spelling (`stopAfterPhase` values).
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Compiling => "compiling",
            Phase::Checking => "checking",
            Phase::Linking => "linking",
            Phase::Running => "running",
        }
    }

    /// Name used in result identifiers (`"<runID> Compiling"`).
    pub fn label(self) -> &'static str {
        match self {
            Phase::Compiling => "Compiling",
            Phase::Checking => "Checking",
            Phase::Linking => "Linking",
            Phase::Running => "Running",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-language build configuration of an exercise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageConfig {
    pub merging: MergingConfig,
    #[serde(default)]
    pub compiling: CompilingConfig,
    #[serde(default)]
    pub checking: CheckingConfig,
    #[serde(default)]
    pub linking: LinkingConfig,
    /// Last phase to execute; absent means run everything.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_after_phase: Option<Phase>,
}

impl LanguageConfig {
    /// Highest phase rank the pipeline may execute.
    pub fn ceiling(&self) -> u8 {
        self.stop_after_phase.map(Phase::rank).unwrap_or(Phase::Running.rank())
    }

    /// Whether the ceiling permits `phase` to run.
    pub fn permits(&self, phase: Phase) -> bool {
        phase.rank() <= self.ceiling()
    }
}

/// Either the single-file shorthand `{ "sources": [...] }` or a list of named targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MergingConfig {
    Single { sources: Vec<String> },
    Multiple(Vec<MergeTarget>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeTarget {
    #[serde(rename = "mergeID")]
    pub merge_id: String,
    pub sources: Vec<String>,
}

/// One output file and the fragments concatenated into it, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSpec {
    pub target: String,
    pub sources: Vec<String>,
}

impl MergingConfig {
    /// Normalize into merge specs.
    ///
    /// Exactly one target always lands in [`DEFAULT_MERGE_TARGET`]; several
    /// targets keep their own `mergeID`.
    pub fn targets(&self) -> Result<Vec<MergeSpec>, ConfigurationError> {
        match self {
            MergingConfig::Single { sources } => {
                Ok(vec![MergeSpec { target: DEFAULT_MERGE_TARGET.into(), sources: sources.clone() }])
            }
            MergingConfig::Multiple(targets) => match targets.as_slice() {
                [] => Err(ConfigurationError::EmptyMerge),
                [only] => Ok(vec![MergeSpec {
                    target: DEFAULT_MERGE_TARGET.into(),
                    sources: only.sources.clone(),
                }]),
                many => {
                    let mut seen = HashSet::new();
                    let mut specs = Vec::with_capacity(many.len());
                    for t in many {
                        if t.merge_id.trim().is_empty() {
                            return Err(ConfigurationError::EmptyTargetName);
                        }
                        if !seen.insert(t.merge_id.as_str()) {
                            return Err(ConfigurationError::DuplicateTarget(t.merge_id.clone()));
                        }
                        specs.push(MergeSpec { target: t.merge_id.clone(), sources: t.sources.clone() });
                    }
                    Ok(specs)
                }
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilingConfig {
    /// Merge targets to compile; defaults to every merged file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<String>,
    /// Replaces the language's default compiler driver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiler: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkingConfig {
    #[serde(default)]
    pub flags: String,
    /// Replaces the language's default link driver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linker: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckingConfig {
    /// Callee names that must not appear at the top level of any function.
    #[serde(default)]
    pub forbidden_calls: Vec<String>,
    /// Fail the check phase when a forbidden call is found. Off means report only.
    #[serde(default)]
    pub enforce: bool,
}
