#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};

pub fn write_json(dir: &Path, name: &str, value: &Value) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_string_pretty(value).expect("serialize")).expect("write fixture");
    path
}

/// `{"Exercise": ...}` with a `head`/`body` split and the given C config.
pub fn exercise(dir: &Path, c_config: Value) -> PathBuf {
    write_json(
        dir,
        "exercise.json",
        &json!({
            "Exercise": {
                "id": "hello",
                "config": {"C": c_config},
                "elements": [
                    {"identifier": "head", "value": "#include <stdio.h>\n"},
                    {"identifier": "body", "value": "int main(void)\n{\n  return 0;\n}\n", "modifiable": true}
                ]
            }
        }),
    )
}

pub fn solution(dir: &Path) -> PathBuf {
    write_json(
        dir,
        "solution.json",
        &json!({
            "Solution": {
                "id": "run-1",
                "exerciseModifications": {
                    "elements": [
                        {"identifier": "body", "value": "int main(void)\n{\n  puts(\"hi\");\n  return 0;\n}\n"}
                    ]
                }
            }
        }),
    )
}

#[cfg(unix)]
pub fn script(dir: &Path, name: &str, body: &str) -> String {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    fs::write(&path, body).expect("write script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
    path.display().to_string()
}

pub const FAKE_CC: &str = r#"#!/bin/sh
for arg in "$@"; do
  case "$arg" in
    *.c) stem=$(basename "$arg" .c); cp "$arg" "$stem.o" ;;
  esac
done
echo '[]'
"#;

pub const FAKE_LD: &str = r#"#!/bin/sh
printf '#!/bin/sh\necho hi\n' > "$2"
"#;

pub const FAILING_CC: &str = "#!/bin/sh\necho 'temp.c:4:3: error: boom' >&2\nexit 1\n";
