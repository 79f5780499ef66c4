use std::path::PathBuf;

use thiserror::Error;

/// Problems with the exercise definition itself.
///
/// These abort a grading run before any phase executes, so a caller seeing one
/// of these has no result entries and no artifacts on disk.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("merge target '{target}' references unknown fragment '{identifier}'")]
    UnknownFragment { target: String, identifier: String },

    #[error("merging configuration declares no merge targets")]
    EmptyMerge,

    #[error("a merge target has an empty mergeID")]
    EmptyTargetName,

    #[error("merge target '{0}' is declared more than once")]
    DuplicateTarget(String),

    #[error("no language backend registered for '{0}'")]
    UnknownLanguage(String),

    /// The exercise does not name its language and the config is not a single entry.
    #[error("exercise does not name a language and its config has {0} entries")]
    AmbiguousLanguage(usize),

    #[error("exercise has no configuration for language '{0}'")]
    MissingLanguageConfig(String),

    #[error("compiling.sources names '{0}', which is not a merge target")]
    UnknownCompileTarget(String),
}

/// Errors that end a grading run without a report.
///
/// Toolchain failures and timeouts are *not* errors at this level: the
/// pipeline records them as phase outcomes and halts, returning the partial
/// report to the caller.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid exercise configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("failed to write merged source {path}: {source}")]
    WriteSources {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
