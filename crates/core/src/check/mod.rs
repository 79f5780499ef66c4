//! Static call-site checker.
//!
//! Parses merged C sources and lists, per function definition, the call
//! statements that sit directly in the function body. Calls nested in blocks,
//! conditions, loops or larger expressions are not reported.

use std::collections::BTreeMap;
#[cfg(feature = "c-checker")]
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
#[cfg(feature = "c-checker")]
use tracing::warn;

use crate::pipeline::ToolCommand;
#[cfg(feature = "c-checker")]
use crate::pipeline::{run_with_deadline, PhaseOutcome};

#[cfg(feature = "c-checker")]
mod c;
pub mod stubs;

/// A merged source file handed to the checker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Name reported in results (usually `<target>.<ext>`).
    pub name: String,
    /// On-disk location, required when preprocessing.
    pub path: PathBuf,
    pub text: String,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self { name: name.into(), path: path.into(), text: text.into() }
    }

    /// A file that only exists in memory; cannot be preprocessed.
    pub fn in_memory(name: impl Into<String>, text: impl Into<String>) -> Self {
        let name = name.into();
        Self { path: PathBuf::from(&name), name, text: text.into() }
    }

    pub fn read(path: &Path) -> io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { name, path: path.to_path_buf(), text })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    pub callee: String,
    /// 1-based.
    pub line: usize,
    /// 1-based.
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRecord {
    pub file: String,
    pub name: String,
    pub calls: Vec<CallSite>,
}

/// Outcome of checking one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCheck {
    Functions(Vec<FunctionRecord>),
    ParseError { message: String },
}

/// A forbidden callee found at the top level of a function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForbiddenCall {
    pub file: String,
    pub function: String,
    pub callee: String,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
    pub files: BTreeMap<String, FileCheck>,
}

impl CheckReport {
    pub fn functions(&self, file: &str) -> Option<&[FunctionRecord]> {
        match self.files.get(file)? {
            FileCheck::Functions(f) => Some(f),
            FileCheck::ParseError { .. } => None,
        }
    }

    pub fn parse_errors(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().filter_map(|(name, check)| match check {
            FileCheck::ParseError { message } => Some((name.as_str(), message.as_str())),
            FileCheck::Functions(_) => None,
        })
    }

    /// Every call to one of `forbidden`, in file then source order.
    pub fn forbidden_hits(&self, forbidden: &[String]) -> Vec<ForbiddenCall> {
        let mut hits = Vec::new();
        for check in self.files.values() {
            let FileCheck::Functions(functions) = check else { continue };
            for f in functions {
                for call in f.calls.iter().filter(|c| forbidden.contains(&c.callee)) {
                    hits.push(ForbiddenCall {
                        file: f.file.clone(),
                        function: f.name.clone(),
                        callee: call.callee.clone(),
                        line: call.line,
                        column: call.column,
                    });
                }
            }
        }
        hits
    }
}

/// External C preprocessor run before parsing, e.g. `gcc -E -I<stubs>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preprocessor {
    pub program: String,
    /// Stub headers; preprocessed output and logs are written here too.
    pub include_dir: PathBuf,
    pub limit: Duration,
}

impl Preprocessor {
    pub fn new(program: impl Into<String>, include_dir: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), include_dir: include_dir.into(), limit: Duration::from_secs(60) }
    }

    pub fn with_limit(mut self, limit: Duration) -> Self {
        self.limit = limit;
        self
    }
}

/// Where a line of preprocessed output came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineOrigin {
    pub file: String,
    pub line: usize,
}

/// Preprocessed text with line markers blanked, plus the origin of every row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessedSource {
    pub text: String,
    pub origins: Vec<Option<LineOrigin>>,
}

impl PreprocessedSource {
    /// Split cpp output into parseable text and a row → origin table.
    pub fn from_cpp_output(output: &str) -> Self {
        let mut text = String::with_capacity(output.len());
        let mut origins = Vec::new();
        let mut current: Option<LineOrigin> = None;

        for line in output.lines() {
            if let Some(marker) = parse_line_marker(line) {
                current = Some(marker);
                origins.push(None);
                text.push('\n');
                continue;
            }
            origins.push(current.clone());
            if let Some(c) = current.as_mut() {
                c.line += 1;
            }
            text.push_str(line);
            text.push('\n');
        }
        Self { text, origins }
    }

    pub fn origin(&self, row: usize) -> Option<&LineOrigin> {
        self.origins.get(row).and_then(Option::as_ref)
    }
}

/// `# 12 "file.c" 1` (gcc) or `#line 12 "file.c"`.
fn parse_line_marker(line: &str) -> Option<LineOrigin> {
    let rest = line.strip_prefix('#')?.trim_start();
    let rest = rest.strip_prefix("line").unwrap_or(rest).trim_start();
    let (number, rest) = rest.split_once(char::is_whitespace)?;
    let line_no: usize = number.parse().ok()?;
    let quoted = rest.trim_start().strip_prefix('"')?;
    let (file, _) = quoted.split_once('"')?;
    Some(LineOrigin { file: file.to_string(), line: line_no })
}

/// Why preprocessing a file produced no output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreprocessError {
    /// The preprocessor program could not be started at all.
    Unavailable(String),
    Failed(String),
}

impl Preprocessor {
    /// `<program> -E -I<include_dir> <path> -o <include_dir>/<name>.i`
    pub fn command(&self, path: &Path) -> ToolCommand {
        ToolCommand::new(&self.program)
            .arg("-E")
            .arg(format!("-I{}", self.include_dir.display()))
            .arg(path.display().to_string())
            .arg("-o")
            .arg(self.output_path(path).display().to_string())
    }

    fn output_path(&self, path: &Path) -> PathBuf {
        self.include_dir.join(format!("{}.i", file_name_of(path)))
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

#[cfg(feature = "c-checker")]
impl Preprocessor {
    pub fn run(&self, path: &Path) -> Result<PreprocessedSource, PreprocessError> {
        let output = self.output_path(path);
        let log = self.include_dir.join(format!("{}.cpp.log", file_name_of(path)));
        let result = run_with_deadline(&self.command(path), &self.include_dir, &log, self.limit, 16 * 1024);
        match result.outcome {
            PhaseOutcome::Succeeded => {}
            PhaseOutcome::SpawnFailed { message } => return Err(PreprocessError::Unavailable(message)),
            other => {
                return Err(PreprocessError::Failed(format!(
                    "{} -E ended with {:?}: {}",
                    self.program,
                    other,
                    result.output.trim()
                )))
            }
        }
        let text = fs::read_to_string(&output)
            .map_err(|e| PreprocessError::Failed(format!("failed to read {}: {e}", output.display())))?;
        Ok(PreprocessedSource::from_cpp_output(&text))
    }
}

/// tree-sitter based checker for C sources.
#[cfg(feature = "c-checker")]
#[derive(Debug, Clone, Default)]
pub struct StaticCallChecker {
    preprocessor: Option<Preprocessor>,
}

#[cfg(feature = "c-checker")]
impl StaticCallChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_preprocessor(mut self, preprocessor: Option<Preprocessor>) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    /// Check every file; a file that fails to parse does not stop the others.
    pub fn analyze(&self, files: &[SourceFile]) -> CheckReport {
        let files = files.iter().map(|f| (f.name.clone(), self.analyze_file(f))).collect();
        CheckReport { files }
    }

    pub fn analyze_file(&self, file: &SourceFile) -> FileCheck {
        let preprocessed = match &self.preprocessor {
            Some(pp) => match pp.run(&file.path) {
                Ok(p) => Some(p),
                Err(PreprocessError::Unavailable(message)) => {
                    warn!(file = %file.name, %message, "preprocessor unavailable; checking raw source");
                    None
                }
                Err(PreprocessError::Failed(message)) => {
                    warn!(file = %file.name, %message, "preprocessing failed");
                    return FileCheck::ParseError { message };
                }
            },
            None => None,
        };
        let text = preprocessed.as_ref().map(|p| p.text.as_str()).unwrap_or(file.text.as_str());

        let tree = match c::parse(text) {
            Ok(tree) => tree,
            Err(message) => {
                warn!(file = %file.name, %message, "could not parse source");
                return FileCheck::ParseError { message };
            }
        };

        let own_name = file.path.file_name();
        let line_of = |row: usize| match &preprocessed {
            Some(p) => p.origin(row).map(|o| o.line).unwrap_or(row + 1),
            None => row + 1,
        };

        let functions = c::functions(&tree, text)
            .into_iter()
            .filter(|f| match &preprocessed {
                // Drop definitions pulled in from headers.
                Some(p) => p
                    .origin(f.row)
                    .map(|o| Path::new(&o.file).file_name() == own_name)
                    .unwrap_or(false),
                None => true,
            })
            .map(|f| FunctionRecord {
                file: file.name.clone(),
                name: f.name,
                calls: f
                    .calls
                    .into_iter()
                    .map(|c| CallSite { callee: c.callee, line: line_of(c.row), column: c.column + 1 })
                    .collect(),
            })
            .collect();
        FileCheck::Functions(functions)
    }
}
