use std::fs;

use tempfile::tempdir;

use fragment_grader::commands::{check_command, language_infos, merge_command, CheckArgs};
use fragment_grader::default_log_level;

mod fixtures;

#[test]
fn log_level_rises_with_verbosity() {
    assert_eq!(default_log_level(0), "warn");
    assert_eq!(default_log_level(1), "info");
    assert_eq!(default_log_level(5), "debug");
}

#[test]
fn language_infos_mark_call_check_support() {
    let infos = language_infos();
    let c = infos.iter().find(|l| l.name == "C").expect("C");
    let cpp = infos.iter().find(|l| l.name == "C++").expect("C++");
    assert!(c.call_check);
    assert!(!cpp.call_check);
}

#[test]
fn check_command_is_clean_without_forbidden_calls() {
    let temp = tempdir().unwrap();
    let src = temp.path().join("a.c");
    fs::write(&src, "int main(void) { printf(\"%d\", 1); return 0; }\n").unwrap();

    let args = CheckArgs { files: vec![src.clone()], ..CheckArgs::default() };
    assert!(check_command(&args).unwrap());

    let args = CheckArgs { files: vec![src], forbidden: vec!["printf".into()], ..CheckArgs::default() };
    assert!(!check_command(&args).unwrap());
}

#[test]
fn merge_command_returns_the_merge() {
    let temp = tempdir().unwrap();
    let exercise = fixtures::exercise(temp.path(), serde_json::json!({"merging": {"sources": ["head", "body"]}}));
    let solution = fixtures::solution(temp.path());

    let merged = merge_command(&exercise, &solution, None, true).unwrap();
    assert_eq!(merged.files.len(), 1);
    assert!(merged.files[0].text.contains("puts(\"hi\");"));
}
