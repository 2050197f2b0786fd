//! Smoke tests for the command-line interface.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn sentinel() -> Command {
    Command::cargo_bin("nginx-sentinel").expect("binary builds")
}

#[test]
fn test_list_shows_rules() {
    sentinel()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("NS001"))
        .stdout(predicate::str::contains("HTTP Splitting"));
}

#[test]
fn test_version_prints_package_version() {
    sentinel()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_scan_reports_findings() {
    let dir = tempfile::tempdir().expect("tempdir");
    let conf = dir.path().join("nginx.conf");
    fs::write(&conf, "server { location /i { alias /data/images/; } }").expect("write");

    sentinel()
        .arg("scan")
        .arg(&conf)
        .assert()
        .success()
        .stdout(predicate::str::contains("NS002"))
        .stdout(predicate::str::contains("1 issue(s) found"));
}

#[test]
fn test_scan_clean_config() {
    let dir = tempfile::tempdir().expect("tempdir");
    let conf = dir.path().join("nginx.conf");
    fs::write(&conf, "server { listen 80; }").expect("write");

    sentinel()
        .arg("scan")
        .arg(&conf)
        .assert()
        .success()
        .stdout(predicate::str::contains("No problems found"));
}

#[test]
fn test_scan_json_output() {
    let dir = tempfile::tempdir().expect("tempdir");
    let conf = dir.path().join("nginx.conf");
    fs::write(&conf, "server { proxy_set_header Host $http_host; }").expect("write");

    let output = sentinel()
        .arg("scan")
        .arg(&conf)
        .args(["--format", "json"])
        .output()
        .expect("run scan");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    // The report is printed between the banner and the summary footer.
    let json_start = stdout.find('{').expect("json object in output");
    let json_end = stdout.rfind('}').expect("json object in output");
    let value: serde_json::Value =
        serde_json::from_str(&stdout[json_start..=json_end]).expect("valid json");
    assert_eq!(value["summary"]["total"], 1);
    assert_eq!(value["findings"][0]["rule_id"], "NS003");
}

#[test]
fn test_scan_only_filter() {
    let dir = tempfile::tempdir().expect("tempdir");
    let conf = dir.path().join("nginx.conf");
    fs::write(
        &conf,
        "server { location /i { alias /data/images/; } proxy_set_header Host $http_host; }",
    )
    .expect("write");

    sentinel()
        .arg("scan")
        .arg(&conf)
        .args(["--only", "NS003"])
        .assert()
        .success()
        .stdout(predicate::str::contains("NS003"))
        .stdout(predicate::str::contains("NS002").not());
}

#[test]
fn test_scan_severity_floor() {
    let dir = tempfile::tempdir().expect("tempdir");
    let conf = dir.path().join("nginx.conf");
    // Host spoofing defaults to Medium, so a High floor drops it.
    fs::write(&conf, "server { proxy_set_header Host $http_host; }").expect("write");

    sentinel()
        .arg("scan")
        .arg(&conf)
        .args(["--severity", "high"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No problems found"));
}

#[test]
fn test_scan_directory_collects_conf_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(
        dir.path().join("a.conf"),
        "server { location /i { alias /data/images/; } }",
    )
    .expect("write a");
    fs::write(dir.path().join("notes.txt"), "not a config").expect("write txt");

    sentinel()
        .arg("scan")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("NS002"));
}
