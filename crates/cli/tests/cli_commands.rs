use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use tempfile::tempdir;

mod fixtures;

#[test]
fn languages_lists_builtin_backends() {
    cargo_bin_cmd!("fragment-grader")
        .arg("languages")
        .assert()
        .success()
        .stdout(predicate::str::contains("- C: .c via gcc"))
        .stdout(predicate::str::contains("- C++: .cpp via g++"));

    let output = cargo_bin_cmd!("fragment-grader")
        .args(["languages", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let body: serde_json::Value = serde_json::from_slice(&output).expect("languages json");
    assert_eq!(body[0]["name"], "C");
    assert_eq!(body[1]["extension"], "cpp");
}

#[test]
fn merge_writes_files_and_source_map() {
    let temp = tempdir().unwrap();
    let exercise = fixtures::exercise(temp.path(), json!({"merging": {"sources": ["head", "body"]}}));
    let solution = fixtures::solution(temp.path());
    let out = temp.path().join("merged");

    cargo_bin_cmd!("fragment-grader")
        .arg("merge")
        .arg("--exercise")
        .arg(&exercise)
        .arg("--solution")
        .arg(&solution)
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("temp.c (6 lines)"))
        .stdout(predicate::str::contains("2-6"));

    let text = fs::read_to_string(out.join("temp.c")).expect("merged file");
    assert!(text.starts_with("#include <stdio.h>\nint main(void)\n"));
    let maps: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("sourcemap.json")).unwrap()).unwrap();
    assert_eq!(maps["temp"]["fragments"][1]["identifier"], "body");
    assert_eq!(maps["temp"]["fragments"][1]["start"], 2);
}

#[test]
fn merge_reports_unknown_fragment() {
    let temp = tempdir().unwrap();
    let exercise = fixtures::exercise(temp.path(), json!({"merging": {"sources": ["head", "missing"]}}));
    let solution = fixtures::solution(temp.path());

    cargo_bin_cmd!("fragment-grader")
        .arg("merge")
        .arg("--exercise")
        .arg(&exercise)
        .arg("--solution")
        .arg(&solution)
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing"));
}

#[test]
fn check_lists_calls_and_fails_on_forbidden() {
    let temp = tempdir().unwrap();
    let src = temp.path().join("temp.c");
    fs::write(&src, "void foo() { bar(); baz(1, 2); if (1) { qux(); } }\n").unwrap();

    cargo_bin_cmd!("fragment-grader")
        .arg("check")
        .arg(&src)
        .assert()
        .success()
        .stdout(predicate::str::contains("foo: bar, baz"))
        .stdout(predicate::str::contains("qux").not());

    cargo_bin_cmd!("fragment-grader")
        .arg("check")
        .arg(&src)
        .args(["--forbid", "baz"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("forbidden call to baz in foo (temp.c:1:21)"));
}

#[test]
fn check_reports_parse_errors_per_file() {
    let temp = tempdir().unwrap();
    let good = temp.path().join("good.c");
    let bad = temp.path().join("bad.c");
    fs::write(&good, "int main(void) { puts(\"x\"); return 0; }\n").unwrap();
    fs::write(&bad, "int main( {\n").unwrap();

    let output = cargo_bin_cmd!("fragment-grader")
        .arg("check")
        .arg(&good)
        .arg(&bad)
        .arg("--json")
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();
    let body: serde_json::Value = serde_json::from_slice(&output).expect("check json");
    assert!(body["files"]["bad.c"]["parse_error"]["message"].is_string());
    assert_eq!(body["files"]["good.c"]["functions"][0]["calls"][0]["callee"], "puts");
}

#[test]
fn history_requires_an_existing_database() {
    let temp = tempdir().unwrap();
    cargo_bin_cmd!("fragment-grader")
        .arg("history")
        .arg("--db")
        .arg(temp.path().join("nope.db"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}
