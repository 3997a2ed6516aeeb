//! Command-line surface of the `hybridpack` binary.

use std::process::{Command, Output};

fn hybridpack(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_hybridpack"))
        .args(args)
        .env_remove("DOCKER_HOST")
        .env_remove("HYBRIDPACK_WINDOWS_BASE_LAYER")
        .output()
        .expect("failed to spawn hybridpack")
}

#[test]
fn missing_ref_prints_usage() {
    let out = hybridpack(&[]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("--ref"), "{stderr}");
    assert!(stderr.contains("Usage"), "{stderr}");
    assert!(out.stdout.is_empty());
}

#[test]
fn malformed_ref_is_rejected() {
    let out = hybridpack(&["--ref", "Not/Lower:case"]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("repository"), "{stderr}");
}

#[test]
fn digest_ref_is_rejected() {
    let digest = format!("hybrid@sha256:{}", "0".repeat(64));
    let out = hybridpack(&["--ref", &digest]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("tag is required"), "{stderr}");
}

#[test]
fn unreachable_daemon_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let host = format!("unix://{}", dir.path().join("none.sock").display());
    let out = hybridpack(&["--ref", "localhost:5000/hybrid:dev", "--docker-host", &host]);
    assert!(!out.status.success());
    assert!(!String::from_utf8_lossy(&out.stdout).contains("image and layer written"));
}

#[test]
fn help_lists_options() {
    let out = hybridpack(&["--help"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    for flag in ["--ref", "--publish", "--windows-base-layer", "--docker-host"] {
        assert!(stdout.contains(flag), "{flag} missing from:\n{stdout}");
    }
}
