//! Per-language capabilities: file extension, toolchain commands, optional call check.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::check::{CheckReport, Preprocessor, SourceFile};
use crate::merge::FragmentMerger;
use crate::model::{CompilingConfig, LinkingConfig};
use crate::pipeline::ToolCommand;

mod c;
mod cpp;

pub use c::CBackend;
pub use cpp::CppBackend;

/// Flag asking gcc-compatible drivers for JSON diagnostics.
pub const JSON_DIAGNOSTICS_FLAG: &str = "-fdiagnostics-format=json";

/// Options the pipeline hands to a backend's call check.
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    pub preprocessor: Option<Preprocessor>,
}

/// Trait implemented by supported exercise languages.
pub trait LanguageBackend: Send + Sync {
    /// Name as used in exercise configs (e.g. `"C"`).
    fn name(&self) -> &'static str;

    /// Conventional source file extension, without the dot.
    fn source_extension(&self) -> &'static str;

    /// Default compiler/link driver.
    fn driver(&self) -> &'static str;

    fn merger(&self) -> FragmentMerger {
        FragmentMerger::new(self.source_extension())
    }

    /// `<driver> -c <sources...> <flags> -fdiagnostics-format=json`
    fn compile_command(&self, config: &CompilingConfig, sources: &[PathBuf]) -> ToolCommand {
        let driver = config.compiler.clone().unwrap_or_else(|| self.driver().to_string());
        ToolCommand::new(driver)
            .arg("-c")
            .args(sources.iter().map(|p| p.display().to_string()))
            .flags(config.flags.as_deref().unwrap_or(""))
            .arg(JSON_DIAGNOSTICS_FLAG)
    }

    /// Whether [`LanguageBackend::check`] does anything for this language.
    fn supports_check(&self) -> bool {
        false
    }

    /// Static call check over the merged files; `None` when unsupported.
    fn check(&self, _files: &[SourceFile], _options: &CheckOptions) -> Option<CheckReport> {
        None
    }

    /// `<driver> -o <output> <objects...> <flags>`
    fn link_command(&self, config: &LinkingConfig, output: &Path, objects: &[PathBuf]) -> ToolCommand {
        let driver = config.linker.clone().unwrap_or_else(|| self.driver().to_string());
        ToolCommand::new(driver)
            .arg("-o")
            .arg(output.display().to_string())
            .args(objects.iter().map(|p| p.display().to_string()))
            .flags(&config.flags)
    }

    /// The produced binary, run without arguments.
    fn run_command(&self, binary: &Path) -> ToolCommand {
        ToolCommand::new(binary.display().to_string())
    }
}

/// Registry of language backends; callers select by exercise language name.
#[derive(Default)]
pub struct LanguageRegistry {
    backends: HashMap<String, Box<dyn LanguageBackend>>,
}

impl LanguageRegistry {
    pub fn new() -> Self {
        Self { backends: HashMap::new() }
    }

    pub fn register<B: LanguageBackend + 'static>(&mut self, backend: B) -> &mut Self {
        self.backends.insert(backend.name().to_string(), Box::new(backend));
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn LanguageBackend> {
        self.backends.get(name).map(|b| &**b)
    }

    /// Sorted language names for error messages/help.
    pub fn names(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.backends.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Registry populated with every built-in language.
pub fn default_language_registry() -> LanguageRegistry {
    let mut registry = LanguageRegistry::new();
    registry.register(CBackend).register(CppBackend);
    registry
}
