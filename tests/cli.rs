use assert_cmd::prelude::*;
use predicates::prelude::*;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;

fn write_json(dir: &Path, name: &str, value: serde_json::Value) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, value.to_string()).unwrap();
    path
}

fn ab_doc(dir: &Path) -> PathBuf {
    write_json(
        dir,
        "doc.json",
        json!({"type": "doc", "content": [
            {"type": "paragraph", "content": [{"type": "text", "text": "ab"}]}
        ]}),
    )
}

#[test]
#[allow(deprecated)]
fn test_check_valid_doc() {
    let dir = tempdir().unwrap();
    let doc = ab_doc(dir.path());

    let mut cmd = Command::cargo_bin("rich-doc").unwrap();
    cmd.arg("check").arg(&doc);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("ok"));
}

#[test]
#[allow(deprecated)]
fn test_check_rejects_invalid_content() {
    let dir = tempdir().unwrap();
    let doc = write_json(
        dir.path(),
        "bad.json",
        json!({"type": "doc", "content": [{"type": "text", "text": "loose"}]}),
    );

    let mut cmd = Command::cargo_bin("rich-doc").unwrap();
    cmd.arg("check").arg(&doc);

    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Error:"));
}

#[test]
#[allow(deprecated)]
fn test_apply_prints_result() {
    let dir = tempdir().unwrap();
    let doc = ab_doc(dir.path());
    let steps = write_json(
        dir.path(),
        "steps.json",
        json!([{"stepType": "replace", "from": 1, "to": 1,
                "slice": {"content": [{"type": "text", "text": "x"}]}}]),
    );

    let mut cmd = Command::cargo_bin("rich-doc").unwrap();
    cmd.arg("apply").arg("--doc").arg(&doc).arg("--steps").arg(&steps);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(r#"doc(paragraph("xab"))"#));
}

#[test]
#[allow(deprecated)]
fn test_apply_json_output() {
    let dir = tempdir().unwrap();
    let doc = ab_doc(dir.path());
    let steps = write_json(dir.path(), "steps.json", json!([]));

    let mut cmd = Command::cargo_bin("rich-doc").unwrap();
    cmd.arg("apply")
        .arg("--doc")
        .arg(&doc)
        .arg("--steps")
        .arg(&steps)
        .arg("--json");

    let output = cmd.output().unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["type"], "doc");
    assert_eq!(json["content"][0]["content"][0]["text"], "ab");
}

#[test]
#[allow(deprecated)]
fn test_apply_reports_failing_step() {
    let dir = tempdir().unwrap();
    let doc = ab_doc(dir.path());
    let steps = write_json(
        dir.path(),
        "steps.json",
        json!([{"stepType": "replace", "from": 0, "to": 99}]),
    );

    let mut cmd = Command::cargo_bin("rich-doc").unwrap();
    cmd.arg("apply").arg("--doc").arg(&doc).arg("--steps").arg(&steps);

    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("step 0"));
}

#[test]
#[allow(deprecated)]
fn test_map_through_deletion() {
    let dir = tempdir().unwrap();
    let doc = ab_doc(dir.path());
    let steps = write_json(
        dir.path(),
        "steps.json",
        json!([{"stepType": "replace", "from": 1, "to": 2}]),
    );

    let mut cmd = Command::cargo_bin("rich-doc").unwrap();
    cmd.arg("map")
        .arg("--doc")
        .arg(&doc)
        .arg("--steps")
        .arg(&steps)
        .arg("--pos")
        .arg("3");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("2 deleted=false"));
}

#[test]
#[allow(deprecated)]
fn test_map_json_reports_deletion() {
    let dir = tempdir().unwrap();
    let doc = ab_doc(dir.path());
    let steps = write_json(
        dir.path(),
        "steps.json",
        json!([{"stepType": "replace", "from": 1, "to": 2}]),
    );

    let mut cmd = Command::cargo_bin("rich-doc").unwrap();
    cmd.arg("map")
        .arg("--doc")
        .arg(&doc)
        .arg("--steps")
        .arg(&steps)
        .arg("--pos")
        .arg("1")
        .arg("--json");

    let output = cmd.output().unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["pos"], 1);
    assert_eq!(json["deleted"], true);
    assert_eq!(json["deletedAfter"], true);
    assert_eq!(json["deletedAcross"], false);
}

#[test]
#[allow(deprecated)]
fn test_custom_schema_file() {
    let dir = tempdir().unwrap();
    let schema = write_json(
        dir.path(),
        "schema.json",
        json!({"nodes": {
            "doc": {"content": "line+"},
            "line": {"content": "text*"},
            "text": {}
        }}),
    );
    let doc = write_json(
        dir.path(),
        "doc.json",
        json!({"type": "doc", "content": [{"type": "line"}]}),
    );

    let mut cmd = Command::cargo_bin("rich-doc").unwrap();
    cmd.arg("--schema").arg(&schema).arg("check").arg(&doc);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("ok"));
}

#[test]
#[allow(deprecated)]
fn test_apply_rejects_reversed_step() {
    let dir = tempdir().unwrap();
    let doc = ab_doc(dir.path());
    let steps = write_json(
        dir.path(),
        "steps.json",
        json!([{"stepType": "replace", "from": 3, "to": 1}]),
    );

    let mut cmd = Command::cargo_bin("rich-doc").unwrap();
    cmd.arg("apply").arg("--doc").arg(&doc).arg("--steps").arg(&steps);

    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("step 0"));
}
