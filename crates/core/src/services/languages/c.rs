#[cfg(feature = "c-checker")]
use crate::check::{CheckReport, SourceFile};
#[cfg(feature = "c-checker")]
use crate::services::languages::CheckOptions;
use crate::services::languages::LanguageBackend;

/// C, built with gcc. The only language with a static call check.
pub struct CBackend;

impl LanguageBackend for CBackend {
    fn name(&self) -> &'static str {
        "C"
    }

    fn source_extension(&self) -> &'static str {
        "c"
    }

    fn driver(&self) -> &'static str {
        "gcc"
    }

    fn supports_check(&self) -> bool {
        cfg!(feature = "c-checker")
    }

    #[cfg(feature = "c-checker")]
    fn check(&self, files: &[SourceFile], options: &CheckOptions) -> Option<CheckReport> {
        let checker =
            crate::check::StaticCallChecker::new().with_preprocessor(options.preprocessor.clone());
        Some(checker.analyze(files))
    }
}
