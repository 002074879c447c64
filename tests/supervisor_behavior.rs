//! Behavioral tests for the process supervisor, using tiny shell scripts as
//! stand-ins for the encoder. Unix only: the scripts need `/bin/sh`.
#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vireo::{
    CancelToken, ChannelSink, NullSink, ProcessOutcome, ProcessRegistry, Severity, StallPolicy,
    StatusEvent, Supervisor,
};

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn fast_policy() -> StallPolicy {
    StallPolicy {
        warning: Duration::from_millis(200),
        warning_interval: Duration::from_millis(100),
        abort: Duration::from_millis(400),
        grace: Duration::from_millis(200),
    }
}

fn collecting_progress() -> (Arc<Mutex<Vec<f64>>>, impl FnMut(f64)) {
    let values = Arc::new(Mutex::new(Vec::new()));
    let sink_values = Arc::clone(&values);
    let callback = move |fraction: f64| sink_values.lock().unwrap().push(fraction);
    (values, callback)
}

#[test]
fn nonexistent_executable_fails_without_spawning() {
    let registry = ProcessRegistry::new();
    let supervisor = Supervisor::new("/nonexistent/ffmpeg", registry.clone());

    let outcome = supervisor.run(
        &["-version".to_owned()],
        1.0,
        None,
        &CancelToken::new(),
        "test",
        &NullSink,
    );

    assert!(!outcome.success);
    assert!(!outcome.stalled);
    assert!(!outcome.cancelled);
    assert!(registry.is_empty());
    assert!(outcome.diagnostic.unwrap().contains("not found"));
}

#[test]
fn progress_is_monotonic_and_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "fake-ffmpeg",
        // 2.5s, 5s, a duplicate, then 20s against a 10s expected duration.
        "echo 'out_time_ms=2500000'\n\
         echo 'out_time_ms=5000000'\n\
         echo 'out_time_ms=5000000'\n\
         echo 'out_time_ms=20000000'\n\
         exit 0",
    );

    let supervisor = Supervisor::with_policy(&script, ProcessRegistry::new(), fast_policy());
    let (values, mut callback) = collecting_progress();

    let outcome = supervisor.run(
        &[],
        10.0,
        Some(&mut callback),
        &CancelToken::new(),
        "test",
        &NullSink,
    );
    assert!(outcome.success, "outcome: {outcome:?}");

    let values = values.lock().unwrap();
    assert!(!values.is_empty());
    assert!(values.windows(2).all(|w| w[0] <= w[1]), "not monotonic: {values:?}");
    assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
    assert_eq!(*values.last().unwrap(), 1.0);
}

#[test]
fn stalled_run_is_classified_as_failure() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "fake-ffmpeg",
        "echo 'out_time_ms=1000000'\nsleep 30\nexit 0",
    );

    let supervisor = Supervisor::with_policy(&script, ProcessRegistry::new(), fast_policy());
    let outcome = supervisor.run(&[], 10.0, None, &CancelToken::new(), "test", &NullSink);

    assert!(!outcome.success);
    assert!(outcome.stalled);
    assert!(!outcome.cancelled);
}

#[test]
fn silence_emits_warning_status_lines() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "fake-ffmpeg",
        "echo 'out_time_ms=1000000'\nsleep 30\nexit 0",
    );

    let supervisor = Supervisor::with_policy(&script, ProcessRegistry::new(), fast_policy());
    let (sink, rx) = ChannelSink::new();
    let _ = supervisor.run(&[], 10.0, None, &CancelToken::new(), "test", &sink);

    let warned = rx.try_iter().any(|event| {
        matches!(
            event,
            StatusEvent::Status { text, severity: Severity::Warning }
                if text.contains("no output")
        )
    });
    assert!(warned);
}

#[test]
fn failure_surfaces_error_lines_from_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "fake-ffmpeg",
        "echo 'Input #0, mov' 1>&2\n\
         echo 'Error: Invalid data found when processing input' 1>&2\n\
         exit 1",
    );

    let supervisor = Supervisor::with_policy(&script, ProcessRegistry::new(), fast_policy());
    let outcome = supervisor.run(&[], 10.0, None, &CancelToken::new(), "test", &NullSink);

    assert!(!outcome.success);
    assert!(!outcome.stalled);
    assert!(outcome.diagnostic.unwrap().contains("Invalid data"));
}

#[test]
fn cancellation_produces_a_distinct_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "fake-ffmpeg", "sleep 30\nexit 0");

    let supervisor = Supervisor::with_policy(&script, ProcessRegistry::new(), fast_policy());
    let cancel = CancelToken::new();
    cancel.cancel();

    let outcome = supervisor.run(&[], 10.0, None, &cancel, "test", &NullSink);
    assert!(outcome.cancelled);
    assert!(!outcome.success);
    assert!(!outcome.stalled);
}

#[test]
fn registry_is_empty_after_every_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ProcessRegistry::new();
    let script = write_script(dir.path(), "fake-ffmpeg", "echo 'out_time_ms=500000'\nexit 0");
    let supervisor = Supervisor::with_policy(&script, registry.clone(), fast_policy());

    let outcome: ProcessOutcome =
        supervisor.run(&[], 1.0, None, &CancelToken::new(), "test", &NullSink);
    assert!(outcome.success);
    assert!(registry.is_empty());
}
