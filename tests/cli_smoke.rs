//! Smoke tests for the CLI binary.

use std::path::PathBuf;
use std::process::Command;

fn vireo_exe() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_vireo"))
}

#[test]
fn probe_of_a_missing_file_exits_nonzero() {
    let output = Command::new(vireo_exe())
        .args(["probe", "--in", "/nonexistent/clip.mp4"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}

#[test]
fn render_with_an_invalid_job_file_reports_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let job = dir.path().join("job.json");
    std::fs::write(&job, "{ not json").unwrap();

    let output = Command::new(vireo_exe())
        .args(["render", "--job"])
        .arg(&job)
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("job.json"));
}

#[test]
fn version_flag_works() {
    let output = Command::new(vireo_exe()).arg("--version").output().unwrap();
    assert!(output.status.success());
}
