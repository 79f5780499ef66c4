//! Fragment merging: reassemble complete source files from exercise fragments.
//!
//! Every fragment contributes whole lines. A fragment's text is terminated with
//! `\n` if it is not already, and an empty fragment contributes one blank line,
//! so every fragment owns at least one line and the spans of one file tile it
//! exactly: contiguous, non-overlapping, summing to the file's line count.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigurationError;
use crate::model::{Exercise, LanguageConfig, MergeSpec, Solution};

mod source_map;

pub use source_map::{FragmentSpan, SourceMap};

/// One merged output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedFile {
    /// Merge target name (file stem).
    pub target: String,
    /// `<target>.<ext>`.
    pub file_name: String,
    pub text: String,
    pub source_map: SourceMap,
}

impl MergedFile {
    /// Name of the object file the compiler produces for this target.
    pub fn object_name(&self) -> String {
        format!("{}.o", self.target)
    }
}

/// All files produced by one merge, in target order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutput {
    pub files: Vec<MergedFile>,
}

impl MergeOutput {
    pub fn get(&self, target: &str) -> Option<&MergedFile> {
        self.files.iter().find(|f| f.target == target)
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.target.as_str())
    }

    /// Write every merged file into `dir`, returning the written paths in order.
    pub fn write_to(&self, dir: &Path) -> Result<Vec<PathBuf>, (PathBuf, std::io::Error)> {
        let mut written = Vec::with_capacity(self.files.len());
        for file in &self.files {
            let path = dir.join(&file.file_name);
            fs::write(&path, &file.text).map_err(|e| (path.clone(), e))?;
            written.push(path);
        }
        Ok(written)
    }
}

/// Merges exercise fragments into source files with a fixed extension.
#[derive(Debug, Clone)]
pub struct FragmentMerger {
    extension: String,
}

impl FragmentMerger {
    pub fn new(extension: impl Into<String>) -> Self {
        Self { extension: extension.into() }
    }

    /// Apply the student's edits to `exercise` and merge every configured target.
    ///
    /// Nothing is written to disk; on error no output exists at all.
    pub fn merge(
        &self,
        exercise: &mut Exercise,
        solution: &Solution,
        config: &LanguageConfig,
    ) -> Result<MergeOutput, ConfigurationError> {
        let specs = config.merging.targets()?;
        let applied = exercise.apply_solution(solution);
        debug!(applied, targets = specs.len(), "applied student edits");
        self.merge_specs(exercise, &specs)
    }

    /// Merge already-normalized specs against the exercise's current fragment values.
    pub fn merge_specs(
        &self,
        exercise: &Exercise,
        specs: &[MergeSpec],
    ) -> Result<MergeOutput, ConfigurationError> {
        let files = specs
            .iter()
            .map(|spec| self.merge_target(exercise, spec))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MergeOutput { files })
    }

    fn merge_target(&self, exercise: &Exercise, spec: &MergeSpec) -> Result<MergedFile, ConfigurationError> {
        let mut text = String::new();
        let mut source_map = SourceMap::default();
        let mut cursor = 1usize;

        for identifier in &spec.sources {
            let element = exercise.element(identifier).ok_or_else(|| {
                ConfigurationError::UnknownFragment {
                    target: spec.target.clone(),
                    identifier: identifier.clone(),
                }
            })?;

            let start = cursor;
            text.push_str(&element.value);
            if !text.ends_with('\n') || element.value.is_empty() {
                text.push('\n');
            }
            let lines = line_count(&element.value);
            cursor += lines;

            source_map.push(FragmentSpan {
                identifier: identifier.clone(),
                visible: element.visible,
                start,
                stop: cursor - 1,
            });
        }

        debug!(target = %spec.target, lines = cursor - 1, "merged target");
        Ok(MergedFile {
            target: spec.target.clone(),
            file_name: format!("{}.{}", spec.target, self.extension),
            text,
            source_map,
        })
    }
}

/// Lines a fragment occupies once terminated; never zero.
fn line_count(value: &str) -> usize {
    let terminators = value.matches('\n').count();
    if value.ends_with('\n') {
        terminators.max(1)
    } else {
        terminators + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_count_treats_missing_terminator_as_a_line() {
        assert_eq!(line_count(""), 1);
        assert_eq!(line_count("x"), 1);
        assert_eq!(line_count("x\n"), 1);
        assert_eq!(line_count("x\ny"), 2);
        assert_eq!(line_count("x\ny\n"), 2);
        assert_eq!(line_count("\n\n"), 2);
    }

    #[test]
    fn empty_fragment_reserves_one_blank_line() {
        let exercise = Exercise {
            id: String::new(),
            language: None,
            config: Default::default(),
            elements: vec![
                crate::model::Element::new("a", "a();\n"),
                crate::model::Element::new("gap", ""),
                crate::model::Element::new("b", "b();"),
            ],
        };
        let spec = MergeSpec { target: "t".into(), sources: vec!["a".into(), "gap".into(), "b".into()] };
        let out = FragmentMerger::new("c").merge_specs(&exercise, &[spec]).unwrap();
        let file = &out.files[0];
        assert_eq!(file.text, "a();\n\nb();\n");
        assert_eq!(file.source_map.get("gap").map(|s| (s.start, s.stop)), Some((2, 2)));
        assert_eq!(file.source_map.get("b").map(|s| (s.start, s.stop)), Some((3, 3)));
        assert_eq!(file.file_name, "t.c");
        assert_eq!(file.object_name(), "t.o");
    }
}
