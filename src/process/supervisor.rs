//! The process supervisor: one encoder invocation, run to completion.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, unbounded};
use tracing::{debug, error, info, warn};

use crate::cancel::CancelToken;
use crate::process::registry::ProcessRegistry;
use crate::status::{Severity, StatusSink};

/// How many trailing non-progress output lines are kept for diagnostics.
const CAPTURE_TAIL_LINES: usize = 400;

/// Channel poll interval; also the cancellation observation latency.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Stall detection thresholds.
///
/// The thresholds are fixed rather than scaled with the expected job
/// duration; callers with very long jobs can construct a wider policy.
#[derive(Clone, Copy, Debug)]
pub struct StallPolicy {
    /// Output silence before the first warning status is emitted.
    pub warning: Duration,
    /// Interval between repeated warnings while silence continues.
    pub warning_interval: Duration,
    /// Progress silence (after at least one update) before the process is
    /// force-terminated and classified as stalled.
    pub abort: Duration,
    /// How long a graceful quit request may take before force-kill.
    pub grace: Duration,
}

impl Default for StallPolicy {
    fn default() -> Self {
        Self {
            warning: Duration::from_secs(45),
            warning_interval: Duration::from_secs(15),
            abort: Duration::from_secs(120),
            grace: Duration::from_secs(3),
        }
    }
}

/// Terminal result of one supervised encoder run.
#[derive(Clone, Debug)]
pub struct ProcessOutcome {
    /// Exit code zero, no stall, not cancelled.
    pub success: bool,
    /// The process stopped making progress and was force-terminated.
    /// Always reported as failure, whatever the exit code said.
    pub stalled: bool,
    /// The run was stopped through the cancellation token. Not an error.
    pub cancelled: bool,
    /// Diagnostic snippet extracted from the captured output tail.
    pub diagnostic: Option<String>,
}

impl ProcessOutcome {
    fn succeeded() -> Self {
        Self {
            success: true,
            stalled: false,
            cancelled: false,
            diagnostic: None,
        }
    }

    fn failed(diagnostic: Option<String>) -> Self {
        Self {
            success: false,
            stalled: false,
            cancelled: false,
            diagnostic,
        }
    }

    fn stalled_out(diagnostic: Option<String>) -> Self {
        Self {
            success: false,
            stalled: true,
            cancelled: false,
            diagnostic,
        }
    }

    fn cancelled_out() -> Self {
        Self {
            success: false,
            stalled: false,
            cancelled: true,
            diagnostic: None,
        }
    }
}

/// Runs one encoder invocation to completion.
///
/// The supervisor owns the mechanics the rest of the pipeline relies on:
/// machine-readable progress is requested on stdout, both output streams are
/// pumped by reader threads into one ordered channel, the polling loop
/// observes cancellation at sub-second latency, and a run that stops making
/// progress is force-terminated and never misreported as success.
pub struct Supervisor {
    ffmpeg: PathBuf,
    registry: ProcessRegistry,
    policy: StallPolicy,
}

impl Supervisor {
    /// Supervisor with the default stall policy.
    pub fn new(ffmpeg: impl Into<PathBuf>, registry: ProcessRegistry) -> Self {
        Self::with_policy(ffmpeg, registry, StallPolicy::default())
    }

    /// Supervisor with an explicit stall policy (tests shrink the windows).
    pub fn with_policy(
        ffmpeg: impl Into<PathBuf>,
        registry: ProcessRegistry,
        policy: StallPolicy,
    ) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            registry,
            policy,
        }
    }

    /// Path of the encoder executable this supervisor spawns.
    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg
    }

    /// Run `<ffmpeg> -progress pipe:1 -nostats <args...>` to completion.
    ///
    /// `expected_duration` converts `out_time` positions into a fraction;
    /// `on_progress` sees monotonically non-decreasing values in `[0, 1]`.
    /// Never panics and never leaves the child untracked: every spawned
    /// process is registered for the duration of the run.
    pub fn run(
        &self,
        args: &[String],
        expected_duration: f64,
        mut on_progress: Option<&mut dyn FnMut(f64)>,
        cancel: &CancelToken,
        label: &str,
        sink: &dyn StatusSink,
    ) -> ProcessOutcome {
        let Some(ffmpeg) = resolve_executable(&self.ffmpeg) else {
            let msg = format!(
                "[{label}] FATAL: encoder executable not found at '{}'",
                self.ffmpeg.display()
            );
            error!("{msg}");
            sink.status(&msg, Severity::Error);
            return ProcessOutcome::failed(Some(msg));
        };

        info!(label, ffmpeg = %ffmpeg.display(), "starting encoder process");
        sink.status(&format!("[{label}] starting encoder process..."), Severity::Info);

        let mut command = Command::new(&ffmpeg);
        command
            .args(["-progress", "pipe:1", "-nostats"])
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let msg = format!("[{label}] failed to start encoder: {e}");
                error!("{msg}");
                sink.status(&msg, Severity::Error);
                return ProcessOutcome::failed(Some(msg));
            }
        };

        let pid = child.id();
        let mut stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let child = Arc::new(Mutex::new(child));
        self.registry.add(pid, Arc::clone(&child));

        // Two producer threads feed one ordered channel; the polling loop is
        // the single consumer. Decouples OS pipe buffering from stall
        // accounting so bursty writes never back up the child.
        let (line_tx, line_rx) = unbounded::<String>();
        let mut readers = Vec::new();
        if let Some(stream) = stdout {
            readers.push(spawn_reader(stream, line_tx.clone()));
        }
        if let Some(stream) = stderr {
            readers.push(spawn_reader(stream, line_tx.clone()));
        }
        drop(line_tx);

        let mut captured: VecDeque<String> = VecDeque::with_capacity(CAPTURE_TAIL_LINES);
        let mut last_nonempty = String::new();
        let mut reported = 0.0_f64;
        let mut last_status_pct = 0.0_f64;
        let mut progress_seen = false;
        let mut last_activity = Instant::now();
        let mut last_progress = last_activity;
        let mut last_warning_bucket = 0_u32;
        let mut stalled = false;
        let mut cancelled = false;
        let mut channel_open = true;

        loop {
            if cancel.is_cancelled() {
                warn!(label, pid, "cancellation requested, stopping encoder");
                sink.status(
                    &format!("[{label}] cancellation in progress..."),
                    Severity::Warning,
                );
                stop_gracefully(&child, &mut stdin, self.policy.grace);
                cancelled = true;
                break;
            }

            if process_exited(&child) {
                break;
            }

            // The channel can disconnect while the process lives on (output
            // pipes closed early); stall accounting must keep running then.
            let received = if channel_open {
                match line_rx.recv_timeout(POLL_INTERVAL) {
                    Ok(line) => Some(line),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => {
                        channel_open = false;
                        None
                    }
                }
            } else {
                std::thread::sleep(POLL_INTERVAL);
                None
            };

            match received {
                Some(line) => {
                    last_activity = Instant::now();
                    last_warning_bucket = 0;

                    if let Some(time_sec) = parse_progress_time(&line) {
                        if expected_duration <= 0.0 {
                            continue;
                        }
                        let pct = (time_sec / expected_duration).min(1.0);
                        if pct > reported + 1e-9 {
                            last_progress = Instant::now();
                            progress_seen = true;
                            reported = pct;
                            if let Some(cb) = on_progress.as_deref_mut() {
                                cb(reported);
                            }
                            if reported - last_status_pct >= 0.01 {
                                sink.status(
                                    &format!("[{label}] {}% complete", (reported * 100.0) as u32),
                                    Severity::Info,
                                );
                                last_status_pct = reported;
                            }
                        }
                    } else {
                        let trimmed = line.trim();
                        if !trimmed.is_empty() {
                            last_nonempty = trimmed.to_owned();
                            debug!(label, "ffmpeg: {trimmed}");
                            push_capped(&mut captured, trimmed.to_owned());
                        }
                    }
                }
                None => {
                    let now = Instant::now();
                    let inactive = now.duration_since(last_activity);
                    if inactive > self.policy.warning {
                        let bucket = ((inactive - self.policy.warning).as_millis()
                            / self.policy.warning_interval.as_millis().max(1))
                            as u32;
                        if bucket > last_warning_bucket {
                            last_warning_bucket = bucket;
                            sink.status(
                                &format!(
                                    "[{label}] encoder has produced no output for {}s...",
                                    inactive.as_secs()
                                ),
                                Severity::Warning,
                            );
                        }
                    }

                    if progress_seen && now.duration_since(last_progress) > self.policy.abort {
                        warn!(label, pid, "no forward progress, force-terminating");
                        stalled = true;
                        kill_child(&child);
                        break;
                    }
                }
            }
        }

        // Pipes are closed (or the child is being torn down); reader threads
        // finish on their own. Drain whatever they already queued so the
        // diagnostic tail is complete.
        drop(stdin);
        for handle in readers {
            let _ = handle.join();
        }
        while let Ok(line) = line_rx.try_recv() {
            let trimmed = line.trim();
            if !trimmed.is_empty() && parse_progress_time(&line).is_none() {
                last_nonempty = trimmed.to_owned();
                push_capped(&mut captured, trimmed.to_owned());
            }
        }

        let status = {
            let mut child = child.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            child.wait()
        };
        self.registry.remove(pid);

        if cancelled {
            info!(label, pid, "encoder run cancelled");
            return ProcessOutcome::cancelled_out();
        }

        let exit_ok = matches!(&status, Ok(s) if s.success());

        if exit_ok && !stalled {
            if let Some(cb) = on_progress.as_deref_mut() {
                cb(1.0);
            }
            return ProcessOutcome::succeeded();
        }

        // A stalled process that was killed must never be reported as
        // success, even when the exit code comes back zero.
        if stalled {
            let detail = if last_nonempty.is_empty() {
                "no further output from the encoder".to_owned()
            } else {
                last_nonempty.clone()
            };
            let msg = format!(
                "[{label}] encoder aborted for lack of progress. Last known output: {detail}"
            );
            error!("{msg}");
            sink.status(&msg, Severity::Error);
            return ProcessOutcome::stalled_out(Some(detail));
        }

        let code = match &status {
            Ok(s) => format!("{s}"),
            Err(e) => format!("wait failed: {e}"),
        };
        let snippet = error_snippet(captured.make_contiguous(), &last_nonempty);
        error!(label, %code, "encoder run failed");
        let msg = match &snippet {
            Some(snippet) => format!("[{label}] encoder error: {snippet}"),
            None => format!("[{label}] encoder failed ({code})"),
        };
        sink.status(&msg, Severity::Error);
        ProcessOutcome::failed(snippet.or(Some(code)))
    }
}

/// Resolve the encoder executable without spawning anything: explicit paths
/// must exist as files, bare names are searched on `PATH`.
fn resolve_executable(path: &Path) -> Option<PathBuf> {
    if path.components().count() > 1 {
        return path.is_file().then(|| path.to_path_buf());
    }
    let dirs = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&dirs) {
        let candidate = dir.join(path);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

fn spawn_reader<R: std::io::Read + Send + 'static>(
    stream: R,
    tx: crossbeam_channel::Sender<String>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let reader = BufReader::new(stream);
        for line in reader.lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    })
}

fn push_capped(captured: &mut VecDeque<String>, line: String) {
    if captured.len() == CAPTURE_TAIL_LINES {
        captured.pop_front();
    }
    captured.push_back(line);
}

fn process_exited(child: &Arc<Mutex<Child>>) -> bool {
    let mut child = child.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    matches!(child.try_wait(), Ok(Some(_)))
}

fn kill_child(child: &Arc<Mutex<Child>>) {
    let mut child = child.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Err(e) = child.kill() {
        debug!(%e, "kill on already-dead child");
    }
}

/// Ask ffmpeg to quit (`q` on stdin), then force-kill after `grace`.
fn stop_gracefully(child: &Arc<Mutex<Child>>, stdin: &mut Option<ChildStdin>, grace: Duration) {
    if let Some(stdin) = stdin.as_mut() {
        let _ = stdin.write_all(b"q");
        let _ = stdin.flush();
    }
    drop(stdin.take());

    let start = Instant::now();
    while start.elapsed() < grace {
        if process_exited(child) {
            return;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    kill_child(child);
}

/// Convert one `key=value` progress line into a position in seconds.
///
/// `out_time_ms` and `out_time_us` are both microsecond counts; `out_time`
/// is a `H:MM:SS.frac` clock. ffmpeg emits sentinel negative values before
/// the first packet, which are ignored.
pub fn parse_progress_time(line: &str) -> Option<f64> {
    let (key, value) = line.trim().split_once('=')?;
    let value = value.trim();
    match key.trim() {
        "out_time_ms" | "out_time_us" => {
            let micros: i64 = value.parse().ok()?;
            (micros >= 0).then(|| micros as f64 / 1_000_000.0)
        }
        "out_time" => parse_clock_time(value),
        _ => None,
    }
}

fn parse_clock_time(value: &str) -> Option<f64> {
    let mut parts = value.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || hours < 0.0 || minutes < 0.0 || seconds < 0.0 {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Pull the most useful lines out of the captured tail: the last few lines
/// mentioning an error, else the last non-empty line, else the raw tail.
fn error_snippet(captured: &[String], last_nonempty: &str) -> Option<String> {
    let error_lines: Vec<&String> = captured
        .iter()
        .filter(|line| {
            let lower = line.to_lowercase();
            lower.contains("error") || lower.contains("invalid")
        })
        .collect();

    if !error_lines.is_empty() {
        let tail_start = error_lines.len().saturating_sub(3);
        return Some(
            error_lines[tail_start..]
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        );
    }

    if !last_nonempty.is_empty() {
        return Some(last_nonempty.to_owned());
    }

    if captured.is_empty() {
        None
    } else {
        let tail_start = captured.len().saturating_sub(5);
        Some(captured[tail_start..].join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_keys_convert_to_seconds() {
        assert_eq!(parse_progress_time("out_time_ms=1500000"), Some(1.5));
        assert_eq!(parse_progress_time("out_time_us=250000"), Some(0.25));
        assert_eq!(parse_progress_time("out_time=00:01:02.5"), Some(62.5));
        assert_eq!(parse_progress_time(" out_time_ms = 1000000 "), Some(1.0));
    }

    #[test]
    fn sentinel_and_noise_lines_are_ignored() {
        assert_eq!(parse_progress_time("out_time_ms=-9223372036854775808"), None);
        assert_eq!(parse_progress_time("frame=42"), None);
        assert_eq!(parse_progress_time("speed=1.02x"), None);
        assert_eq!(parse_progress_time("not a key value line"), None);
        assert_eq!(parse_progress_time("out_time=bogus"), None);
    }

    #[test]
    fn snippet_prefers_error_lines() {
        let captured = vec![
            "Input #0, mov".to_owned(),
            "Error while decoding stream".to_owned(),
            "Invalid data found when processing input".to_owned(),
        ];
        let snippet = error_snippet(&captured, "conversion failed").unwrap();
        assert!(snippet.contains("Error while decoding"));
        assert!(snippet.contains("Invalid data"));
        assert!(!snippet.contains("Input #0"));
    }

    #[test]
    fn snippet_falls_back_to_last_nonempty_line() {
        let captured = vec!["Input #0, mov".to_owned()];
        assert_eq!(
            error_snippet(&captured, "conversion failed").as_deref(),
            Some("conversion failed")
        );
        assert_eq!(error_snippet(&[], ""), None);
    }
}
