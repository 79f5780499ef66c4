//! In-memory exercise and solution model.
//!
//! An [`Exercise`] owns the authored code fragments ([`Element`]s) and the
//! per-language build configuration. A [`Solution`] carries the student's
//! replacement values for the fragments they were allowed to edit.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::ConfigurationError;

pub mod config;

pub use config::{
    CheckingConfig, CompilingConfig, LanguageConfig, LinkingConfig, MergeSpec, MergeTarget,
    MergingConfig, Phase, DEFAULT_MERGE_TARGET,
};

/// One named code fragment of an exercise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub identifier: String,
    #[serde(default)]
    pub modifiable: bool,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub value: String,
}

fn default_visible() -> bool {
    true
}

impl Element {
    pub fn new(identifier: impl Into<String>, value: impl Into<String>) -> Self {
        Self { identifier: identifier.into(), modifiable: false, visible: true, value: value.into() }
    }

    pub fn modifiable(mut self, modifiable: bool) -> Self {
        self.modifiable = modifiable;
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    #[serde(default)]
    pub id: String,
    /// Active language; inferred from `config` when it has a single entry.
    #[serde(default, alias = "lang", skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub config: BTreeMap<String, LanguageConfig>,
    #[serde(default)]
    pub elements: Vec<Element>,
}

impl Exercise {
    pub fn element(&self, identifier: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.identifier == identifier)
    }

    /// Resolve the language this exercise is graded in.
    pub fn active_language(&self) -> Result<&str, ConfigurationError> {
        if let Some(lang) = self.language.as_deref() {
            return Ok(lang);
        }
        match self.config.keys().next() {
            Some(only) if self.config.len() == 1 => Ok(only.as_str()),
            _ => Err(ConfigurationError::AmbiguousLanguage(self.config.len())),
        }
    }

    /// The active language together with its build configuration.
    pub fn language_config(&self) -> Result<(&str, &LanguageConfig), ConfigurationError> {
        let language = self.active_language()?;
        let config = self
            .config
            .get(language)
            .ok_or_else(|| ConfigurationError::MissingLanguageConfig(language.to_string()))?;
        Ok((language, config))
    }

    /// Overwrite modifiable fragments with the student's values.
    ///
    /// Modifications naming an unknown or non-modifiable fragment are skipped.
    /// Returns the number of fragments that were overwritten.
    pub fn apply_solution(&mut self, solution: &Solution) -> usize {
        let mut applied = 0;
        for m in &solution.exercise_modifications.elements {
            match self.elements.iter_mut().find(|e| e.identifier == m.identifier) {
                Some(el) if el.modifiable => {
                    el.value = m.value.clone();
                    applied += 1;
                }
                Some(_) => debug!(identifier = %m.identifier, "ignoring edit of non-modifiable fragment"),
                None => debug!(identifier = %m.identifier, "ignoring edit of unknown fragment"),
            }
        }
        applied
    }
}

/// A student's replacement value for one fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modification {
    pub identifier: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseModifications {
    #[serde(default)]
    pub elements: Vec<Modification>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Solution {
    /// Identifies this grading attempt; prefixes every result identifier.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exercise_id: Option<String>,
    #[serde(default)]
    pub exercise_modifications: ExerciseModifications,
}

impl Solution {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), exercise_id: None, exercise_modifications: Default::default() }
    }

    /// Builder-style helper to add one modification.
    pub fn with_modification(mut self, identifier: impl Into<String>, value: impl Into<String>) -> Self {
        self.exercise_modifications
            .elements
            .push(Modification { identifier: identifier.into(), value: value.into() });
        self
    }

    /// SHA-256 over the submitted modifications, used to spot resubmissions.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for m in &self.exercise_modifications.elements {
            hasher.update(m.identifier.as_bytes());
            hasher.update([0u8]);
            hasher.update(m.value.as_bytes());
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Load an exercise from a JSON or YAML file.
///
/// Accepts either a bare exercise object or one wrapped as `{"Exercise": {...}}`.
pub fn load_exercise(path: &Path) -> Result<Exercise> {
    load_document(path, "Exercise")
}

/// Load a solution from a JSON or YAML file (optionally wrapped as `{"Solution": {...}}`).
pub fn load_solution(path: &Path) -> Result<Solution> {
    load_document(path, "Solution")
}

fn load_document<T: DeserializeOwned>(path: &Path, wrapper: &str) -> Result<T> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} from {}", wrapper, path.display()))?;
    let is_yaml = matches!(path.extension().and_then(|e| e.to_str()), Some("yaml" | "yml"));
    let mut value: serde_json::Value = if is_yaml {
        serde_yaml::from_str(&body)
            .with_context(|| format!("Failed to parse YAML in {}", path.display()))?
    } else {
        serde_json::from_str(&body)
            .with_context(|| format!("Failed to parse JSON in {}", path.display()))?
    };
    if let Some(inner) = value.get_mut(wrapper).map(serde_json::Value::take) {
        value = inner;
    }
    serde_json::from_value(value)
        .with_context(|| format!("{} in {} does not match the expected shape", wrapper, path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise() -> Exercise {
        let mut config = BTreeMap::new();
        config.insert(
            "C".to_string(),
            serde_json::from_str::<LanguageConfig>(r#"{"merging":{"sources":["a","b"]}}"#).unwrap(),
        );
        Exercise {
            id: "ex".into(),
            language: None,
            config,
            elements: vec![
                Element::new("a", "int x = 1;\n"),
                Element::new("b", "int y = 2;").modifiable(true),
            ],
        }
    }

    #[test]
    fn language_is_inferred_from_single_config_entry() {
        let ex = exercise();
        assert_eq!(ex.active_language().unwrap(), "C");
        assert!(ex.language_config().is_ok());
    }

    #[test]
    fn explicit_language_without_config_is_reported() {
        let mut ex = exercise();
        ex.language = Some("C++".into());
        assert_eq!(
            ex.language_config().unwrap_err(),
            ConfigurationError::MissingLanguageConfig("C++".into())
        );
    }

    #[test]
    fn only_modifiable_fragments_are_overwritten() {
        let mut ex = exercise();
        let solution = Solution::new("run")
            .with_modification("a", "int x = 9;\n")
            .with_modification("b", "int y = 3;")
            .with_modification("nope", "???");
        assert_eq!(ex.apply_solution(&solution), 1);
        assert_eq!(ex.element("a").unwrap().value, "int x = 1;\n");
        assert_eq!(ex.element("b").unwrap().value, "int y = 3;");
    }

    #[test]
    fn content_hash_distinguishes_submissions() {
        let a = Solution::new("1").with_modification("b", "x");
        let b = Solution::new("2").with_modification("b", "y");
        assert_ne!(a.content_hash(), b.content_hash());
        assert_eq!(a.content_hash(), Solution::new("3").with_modification("b", "x").content_hash());
    }
}
