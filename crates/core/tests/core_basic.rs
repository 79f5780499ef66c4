use tempfile::tempdir;

use grader_core::pipeline::{Retention, RunContext, STUB_INCLUDE_DIR};
use grader_core::services::languages::default_language_registry;
use grader_core::version;

#[test]
fn version_is_non_empty() {
    assert!(!version().is_empty());
}

#[test]
fn registry_lists_builtin_languages() {
    let registry = default_language_registry();
    assert_eq!(registry.names(), vec!["C".to_string(), "C++".to_string()]);
    assert!(registry.get("C").expect("C backend").supports_check() == cfg!(feature = "c-checker"));
    assert!(!registry.get("C++").expect("C++ backend").supports_check());
}

#[test]
fn scratch_context_is_removed_on_close() {
    let ctx = RunContext::scratch(Retention::Discard).expect("scratch");
    let dir = ctx.dir().to_path_buf();
    std::fs::write(ctx.path("temp.c"), "int x;\n").expect("write");
    ctx.close().expect("close");
    assert!(!dir.exists());
}

#[test]
fn dropped_context_cleans_an_existing_directory_but_keeps_it() {
    let parent = tempdir().expect("tempdir");
    let dir = parent.path().to_path_buf();
    {
        let ctx = RunContext::open(&dir, Retention::Discard).expect("open");
        ctx.materialize_stubs().expect("stubs");
        std::fs::write(ctx.path("out"), "bin").expect("write");
        assert!(dir.join(STUB_INCLUDE_DIR).join("stdio.h").exists());
    }
    assert!(dir.exists());
    assert_eq!(std::fs::read_dir(&dir).expect("read_dir").count(), 0);
}

#[test]
fn kept_context_leaves_artifacts() {
    let parent = tempdir().expect("tempdir");
    let ctx = RunContext::open(parent.path().join("keep"), Retention::Keep).expect("open");
    std::fs::write(ctx.path("temp.c"), "int x;\n").expect("write");
    let file = ctx.path("temp.c");
    ctx.close().expect("close");
    assert!(file.exists());
}
