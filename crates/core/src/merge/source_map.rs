use serde::{Deserialize, Serialize};

/// Lines one fragment occupies in a merged file (1-based, inclusive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentSpan {
    pub identifier: String,
    pub visible: bool,
    pub start: usize,
    pub stop: usize,
}

impl FragmentSpan {
    pub fn line_count(&self) -> usize {
        self.stop + 1 - self.start
    }

    pub fn contains(&self, line: usize) -> bool {
        (self.start..=self.stop).contains(&line)
    }
}

/// Fragment layout of one merged file, in merge order.
///
/// Used to translate compiler and checker line numbers back to the fragment
/// (and therefore the student edit) they came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMap {
    pub fragments: Vec<FragmentSpan>,
}

impl SourceMap {
    pub fn get(&self, identifier: &str) -> Option<&FragmentSpan> {
        self.fragments.iter().find(|f| f.identifier == identifier)
    }

    /// Fragment covering `line` of the merged file.
    pub fn locate(&self, line: usize) -> Option<&FragmentSpan> {
        self.fragments.iter().find(|f| f.contains(line))
    }

    /// Translate a merged-file line into `(fragment, line within fragment)`.
    pub fn translate(&self, line: usize) -> Option<(&FragmentSpan, usize)> {
        self.locate(line).map(|f| (f, line + 1 - f.start))
    }

    pub fn total_lines(&self) -> usize {
        self.fragments.iter().map(FragmentSpan::line_count).sum()
    }

    pub(crate) fn push(&mut self, span: FragmentSpan) {
        self.fragments.push(span);
    }
}
