// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Smoke tests for the `braid` binary: run demos and check their stdout.

use std::path::PathBuf;
use std::process::{Command, Output};

fn braid_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    // Walk up from the test binary to the target dir
    path.pop();
    if path.ends_with("deps") {
        path.pop();
    }
    path.push("braid");
    path
}

fn braid(args: &[&str]) -> Output {
    Command::new(braid_binary())
        .args(args)
        .env("NO_COLOR", "1")
        .output()
        .expect("failed to run braid")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

#[test]
fn list_names_every_demo() {
    let out = braid(&["list"]);
    assert!(out.status.success());
    let text = stdout(&out);
    for name in ["buffering", "fibonacci", "timeouts", "fan-in"] {
        assert!(text.contains(name), "missing {name} in:\n{text}");
    }
}

#[test]
fn buffering_prints_both_values() {
    let out = braid(&["run", "buffering", "--quiet"]);
    assert!(out.status.success());
    assert_eq!(stdout(&out), "buffered\nchannel\n");
}

#[test]
fn directions_passes_message_through_views() {
    let out = braid(&["run", "directions", "--quiet"]);
    assert!(out.status.success());
    assert_eq!(stdout(&out), "passed message\n");
}

#[test]
fn range_stops_at_close() {
    let out = braid(&["range", "--quiet"]);
    assert!(out.status.success());
    assert_eq!(stdout(&out), "one\ntwo\n");
}

#[test]
fn fibonacci_prints_ten_numbers_then_quit() {
    let out = braid(&["run", "fibonacci", "--quiet", "--seed", "1"]);
    assert!(out.status.success());
    assert_eq!(stdout(&out), "0\n1\n1\n2\n3\n5\n8\n13\n21\n34\nquit\n");
}

#[test]
fn timeouts_hit_first_deadline_only() {
    let out = braid(&["timeouts", "--quiet"]);
    assert!(out.status.success());
    assert_eq!(stdout(&out), "timeout 1\nresult 2\n");
}

#[test]
fn whispers_counts_the_chain() {
    let out = braid(&["run", "whispers", "--quiet"]);
    assert!(out.status.success());
    assert_eq!(stdout(&out), "1001\n");
}

#[test]
fn routine_limit_fails_the_demo() {
    let out = braid(&["run", "whispers", "--max-routines", "10"]);
    assert!(!out.status.success());
    let err = String::from_utf8_lossy(&out.stderr);
    assert!(err.contains("routine limit of 10 reached"), "stderr: {err}");
}

#[test]
fn config_file_is_loaded() {
    let dir = std::env::temp_dir().join(format!("braid-cli-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("braid.toml");
    std::fs::write(&path, "max_routines = 2\n").unwrap();

    let out = braid(&["run", "whispers", "--config", path.to_str().unwrap()]);
    assert!(!out.status.success());

    std::fs::write(&path, "max_routnes = 2\n").unwrap();
    let out = braid(&["run", "buffering", "--config", path.to_str().unwrap()]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("invalid runtime configuration"));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn unknown_demo_is_rejected() {
    let out = braid(&["run", "nope"]);
    assert!(!out.status.success());
}
