//! Integration tests for the textsplit CLI

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// A command isolated from any user or repository config
fn textsplit(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("textsplit").unwrap();
    cmd.current_dir(dir.path()).env("HOME", dir.path()).env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_cli_help() {
    let dir = TempDir::new().unwrap();
    textsplit(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("split"))
        .stdout(predicate::str::contains("serve"));
}

#[test]
fn test_cli_version() {
    let dir = TempDir::new().unwrap();
    textsplit(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("textsplit"));
}

#[test]
fn test_invalid_subcommand() {
    let dir = TempDir::new().unwrap();
    textsplit(&dir)
        .arg("invalid-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_split_from_stdin_on_every_mode() {
    let dir = TempDir::new().unwrap();
    for mode in ["auto", "backend", "fallback"] {
        textsplit(&dir)
            .args(["--mode", mode, "split", "_"])
            .write_stdin("a_b_c\n")
            .assert()
            .success()
            .stdout("a\tb\tc\n");
    }
}

#[test]
fn test_split_flat_with_trim() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input.txt");
    fs::write(&input, "a , b\nc , d\n").unwrap();

    textsplit(&dir)
        .args(["--mode", "fallback", "split", ",", "--trim", "--flat"])
        .arg(&input)
        .assert()
        .success()
        .stdout("a\nc\nb\nd\n");
}

#[test]
fn test_diff_two_files() {
    let dir = TempDir::new().unwrap();
    let old = dir.path().join("old.txt");
    let new = dir.path().join("new.txt");
    fs::write(&old, "L1\nL2\nL3\n").unwrap();
    fs::write(&new, "L1\nL3\nL4\n").unwrap();

    textsplit(&dir)
        .args(["--mode", "fallback", "diff"])
        .arg(&old)
        .arg(&new)
        .env("NO_COLOR", "1")
        .assert()
        .success()
        .stdout(predicate::str::contains("+ L4"))
        .stdout(predicate::str::contains("- L2"))
        .stdout(predicate::str::contains("~ L3"));
}

#[test]
fn test_diff_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    textsplit(&dir)
        .args(["diff", "nope.txt", "nope2.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read"));
}

#[test]
fn test_connect_joins_files_on_every_mode() {
    let dir = TempDir::new().unwrap();
    let left = dir.path().join("left.txt");
    let right = dir.path().join("right.txt");
    fs::write(&left, "a\nb\nc\n").unwrap();
    fs::write(&right, "1\n2\n").unwrap();

    for mode in ["auto", "backend", "fallback"] {
        textsplit(&dir)
            .args(["--mode", mode, "connect", "--separator", "="])
            .arg(&left)
            .arg(&right)
            .assert()
            .success()
            .stdout("a=1\nb=2\nc=\n");
    }
}

#[test]
fn test_filter_keeps_matches() {
    let dir = TempDir::new().unwrap();
    textsplit(&dir)
        .args(["--mode", "fallback", "filter", "--pattern", r"\d+"])
        .write_stdin("a1b2\n")
        .assert()
        .success()
        .stdout("12\n");
}

#[test]
fn test_filter_rejects_invalid_regex() {
    let dir = TempDir::new().unwrap();
    textsplit(&dir)
        .args(["filter", "--pattern", "("])
        .write_stdin("abc\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Filter failed"));
}

#[test]
fn test_remove_duplicates_reports_count() {
    let dir = TempDir::new().unwrap();
    textsplit(&dir)
        .args(["remove", "--remove-mode", "duplicates"])
        .write_stdin("x\ny\nx\nz\n")
        .assert()
        .success()
        .stdout("x\ny\nz\n")
        .stderr(predicate::str::contains("Removed 1 line(s)"));
}

#[test]
fn test_remove_not_containing() {
    let dir = TempDir::new().unwrap();
    textsplit(&dir)
        .args(["-q", "--mode", "fallback", "remove", "--remove-mode", "not-containing", "--pattern", "keep"])
        .write_stdin("keep me\ndrop me\nkeep too\n")
        .assert()
        .success()
        .stdout("keep me\nkeep too\n");
}

#[test]
fn test_stats_are_printed() {
    let dir = TempDir::new().unwrap();
    textsplit(&dir)
        .args(["--mode", "fallback", "split", "_", "--stats"])
        .write_stdin("a_b\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("execution time"));
}

#[test]
fn test_config_show_formats() {
    let dir = TempDir::new().unwrap();
    textsplit(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[pool]"))
        .stdout(predicate::str::contains("idle_timeout_secs = 60"));

    textsplit(&dir)
        .args(["config", "show", "--format", "json", "--section", "worker"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"chunk_lines\": 10"));
}

#[test]
fn test_repository_config_and_env_layers() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("textsplit.toml"), "[worker]\nchunk_lines = 3\n").unwrap();

    textsplit(&dir)
        .args(["config", "show", "--format", "json"])
        .env("TEXTSPLIT_METRICS__HISTORY", "4")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"chunk_lines\": 3"))
        .stdout(predicate::str::contains("\"history\": 4"));
}

#[test]
fn test_serve_answers_connect() {
    let dir = TempDir::new().unwrap();
    textsplit(&dir)
        .arg("serve")
        .write_stdin("{\"id\":2,\"command\":\"connect_texts\",\"args\":{\"text1\":\"a\",\"text2\":\"b\",\"separator\":\"-\"}}\n")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""result":"a-b""#));
}

#[test]
fn test_serve_answers_requests() {
    let dir = TempDir::new().unwrap();
    let request = concat!(
        r#"{"id":7,"command":"remove_lines","args":{"text":"x\ny\nx","pattern":"","removemode":"duplicates","casesensitive":true,"useregex":false,"trimparts":false}}"#,
        "\n"
    );
    textsplit(&dir)
        .arg("serve")
        .write_stdin(request)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""id":7"#))
        .stdout(predicate::str::contains(r#""removed_lines":1"#));
}
