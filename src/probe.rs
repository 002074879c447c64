//! Read-only media inspection via `ffprobe`.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::warn;

use crate::error::{VireoError, VireoResult};

/// How long ffprobe may run before the probe is abandoned.
const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Stream kind tag from the container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamKind {
    /// A video stream.
    Video,
    /// An audio stream.
    Audio,
    /// Anything else (data, subtitles, attachments).
    Other,
}

/// One stream descriptor from a probed container.
#[derive(Clone, Debug)]
pub struct StreamInfo {
    /// Stream kind.
    pub kind: StreamKind,
    /// Codec name as reported by ffprobe (`h264`, `aac`, ...).
    pub codec: String,
}

/// Probed container/stream metadata for one media file.
///
/// Derived data, cached only for the lifetime of one job; never persisted.
#[derive(Clone, Debug)]
pub struct MediaProperties {
    /// Container duration in seconds.
    pub duration_sec: f64,
    /// Stream descriptors in container order.
    pub streams: Vec<StreamInfo>,
}

impl MediaProperties {
    /// Whether the container carries at least one audio stream.
    pub fn has_audio(&self) -> bool {
        self.streams.iter().any(|s| s.kind == StreamKind::Audio)
    }

    /// Whether the container carries at least one video stream.
    pub fn has_video(&self) -> bool {
        self.streams.iter().any(|s| s.kind == StreamKind::Video)
    }
}

/// Read-only media inspection through the encoder's companion `ffprobe`.
#[derive(Clone, Debug)]
pub struct MediaProber {
    ffprobe: PathBuf,
}

impl MediaProber {
    /// Resolve ffprobe next to the configured ffmpeg binary, falling back to
    /// whatever `ffprobe` resolves to on `PATH`.
    pub fn from_ffmpeg_path(ffmpeg: &Path) -> Self {
        let exe = if cfg!(windows) {
            "ffprobe.exe"
        } else {
            "ffprobe"
        };
        let sibling = ffmpeg.parent().map(|dir| dir.join(exe));
        let ffprobe = match sibling {
            Some(path) if path.is_file() => path,
            _ => PathBuf::from(exe),
        };
        Self { ffprobe }
    }

    /// Probe one file.
    ///
    /// Absence of a result is itself a valid, checkable outcome: a missing
    /// file, a missing tool, a timeout, or unparseable output all log a
    /// warning and return `None`. Callers substitute safe defaults rather
    /// than failing the job.
    pub fn probe(&self, path: &Path) -> Option<MediaProperties> {
        if !path.is_file() {
            return None;
        }
        match self.run_ffprobe(path) {
            Ok(json) => match parse_probe_output(&json) {
                Ok(props) => Some(props),
                Err(err) => {
                    warn!(path = %path.display(), %err, "unparseable ffprobe output");
                    None
                }
            },
            Err(err) => {
                warn!(path = %path.display(), %err, "media probe failed");
                None
            }
        }
    }

    fn run_ffprobe(&self, path: &Path) -> VireoResult<String> {
        let mut child = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                VireoError::probe(format!(
                    "failed to run '{}': {e}",
                    self.ffprobe.display()
                ))
            })?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| VireoError::probe("failed to open ffprobe stdout"))?;
        let reader = std::thread::spawn(move || {
            let mut buf = String::new();
            let _ = stdout.read_to_string(&mut buf);
            buf
        });

        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    let json = reader
                        .join()
                        .map_err(|_| VireoError::probe("ffprobe reader thread panicked"))?;
                    if !status.success() {
                        return Err(VireoError::probe(format!(
                            "ffprobe exited with status {status}"
                        )));
                    }
                    return Ok(json);
                }
                Ok(None) => {
                    if started.elapsed() > PROBE_TIMEOUT {
                        let _ = child.kill();
                        let _ = child.wait();
                        let _ = reader.join();
                        return Err(VireoError::probe(format!(
                            "ffprobe timed out after {}s",
                            PROBE_TIMEOUT.as_secs()
                        )));
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    let _ = reader.join();
                    return Err(VireoError::probe(format!("failed to wait for ffprobe: {e}")));
                }
            }
        }
    }
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
}

#[derive(Deserialize)]
struct ProbeOut {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

/// Parse ffprobe's `-print_format json` output into [`MediaProperties`].
pub fn parse_probe_output(json: &str) -> VireoResult<MediaProperties> {
    let parsed: ProbeOut = serde_json::from_str(json)
        .map_err(|e| VireoError::probe(format!("ffprobe json parse failed: {e}")))?;

    let duration_sec = parsed
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let streams = parsed
        .streams
        .into_iter()
        .map(|s| StreamInfo {
            kind: match s.codec_type.as_deref() {
                Some("video") => StreamKind::Video,
                Some("audio") => StreamKind::Audio,
                _ => StreamKind::Other,
            },
            codec: s.codec_name.unwrap_or_default(),
        })
        .collect();

    Ok(MediaProperties {
        duration_sec,
        streams,
    })
}
