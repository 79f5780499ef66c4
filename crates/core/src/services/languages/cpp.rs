use crate::services::languages::LanguageBackend;

/// C++, built with g++. Sources use the `.cpp` extension; no call check.
pub struct CppBackend;

impl LanguageBackend for CppBackend {
    fn name(&self) -> &'static str {
        "C++"
    }

    fn source_extension(&self) -> &'static str {
        "cpp"
    }

    fn driver(&self) -> &'static str {
        "g++"
    }
}
