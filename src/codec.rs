//! Encoder inventory and the ordered codec-attempt plan.

use std::collections::BTreeSet;
use std::path::Path;
use std::process::Command;

use tracing::{info, warn};

use crate::job::CodecPreference;

/// Encoder names the pipeline knows how to drive.
const KNOWN_ENCODERS: &[&str] = &[
    "h264_nvenc",
    "hevc_nvenc",
    "h264_amf",
    "h264_qsv",
    "h264_vaapi",
    "libx264",
    "libx265",
];

/// One candidate set of encoder parameters, tried in sequence until one
/// succeeds. Descriptors are immutable; the retry policy is a pure function
/// over the preference and the inventory, independent of the execution loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodecAttempt {
    /// Human-readable label used only for status reporting.
    pub label: &'static str,
    /// The `-c:v ...` argument block.
    pub video_args: Vec<String>,
    /// Whether this attempt targets a hardware encoder.
    pub hardware: bool,
}

impl CodecAttempt {
    fn stream_copy() -> Self {
        Self {
            label: "stream copy",
            video_args: vec!["-c:v".into(), "copy".into()],
            hardware: false,
        }
    }

    fn nvenc(encoder: &str) -> Self {
        Self {
            label: "GPU (NVENC)",
            video_args: [
                "-c:v", encoder, "-preset", "p2", "-cq", "23", "-rc-lookahead", "8", "-pix_fmt",
                "yuv420p",
            ]
            .iter()
            .map(|s| (*s).to_owned())
            .collect(),
            hardware: true,
        }
    }

    fn software(preset: &str, crf: &str) -> Self {
        Self {
            label: "CPU (libx264)",
            video_args: [
                "-c:v", "libx264", "-preset", preset, "-crf", crf, "-pix_fmt", "yuv420p",
            ]
            .iter()
            .map(|s| (*s).to_owned())
            .collect(),
            hardware: false,
        }
    }
}

/// The set of encoders the local ffmpeg build offers.
#[derive(Clone, Debug, Default)]
pub struct EncoderInventory {
    names: BTreeSet<String>,
}

impl EncoderInventory {
    /// Inventory from an explicit name list (tests, cached detections).
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Ask `ffmpeg -encoders` which of the known encoders exist.
    ///
    /// Detection failure yields an inventory with software only; rendering
    /// proceeds, it just never tries hardware.
    pub fn detect(ffmpeg: &Path) -> Self {
        let output = Command::new(ffmpeg)
            .args(["-hide_banner", "-encoders"])
            .output();
        let stdout = match output {
            Ok(out) => String::from_utf8_lossy(&out.stdout).into_owned(),
            Err(e) => {
                warn!(%e, "encoder detection failed; assuming software only");
                return Self::from_names(["libx264"]);
            }
        };

        let names: BTreeSet<String> = KNOWN_ENCODERS
            .iter()
            .filter(|name| stdout.contains(*name))
            .map(|name| (*name).to_owned())
            .collect();
        info!(?names, "detected encoders");
        Self { names }
    }

    /// Whether `name` is available.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Whether any NVENC hardware encoder is available.
    pub fn has_nvenc(&self) -> bool {
        self.contains("h264_nvenc") || self.contains("hevc_nvenc")
    }
}

/// Produce the ordered attempt list for one encode.
///
/// Guarantees: the list is never empty, and it ends with a software attempt
/// whenever the primary attempt targeted hardware, so driver or codec
/// incompatibilities never abort the whole job.
pub fn plan_attempts(
    preference: CodecPreference,
    available: &EncoderInventory,
    needs_reencode: bool,
) -> Vec<CodecAttempt> {
    if !needs_reencode {
        info!("no re-encode required, planning a direct stream copy");
        return vec![CodecAttempt::stream_copy()];
    }

    let wants_hardware = match preference {
        CodecPreference::Auto => available.has_nvenc(),
        CodecPreference::Hardware => true,
        CodecPreference::Software => false,
    };

    let primary = if wants_hardware {
        if available.contains("h264_nvenc") {
            info!("selected hardware encoder h264_nvenc");
            CodecAttempt::nvenc("h264_nvenc")
        } else if available.contains("hevc_nvenc") {
            info!("selected hardware encoder hevc_nvenc");
            CodecAttempt::nvenc("hevc_nvenc")
        } else {
            warn!("hardware acceleration requested but no NVENC encoder found; using libx264");
            CodecAttempt::software("veryfast", "23")
        }
    } else {
        info!("selected software encoder libx264");
        CodecAttempt::software("superfast", "26")
    };

    let mut attempts = vec![primary];
    if attempts[0].hardware {
        attempts.push(CodecAttempt::software("superfast", "26"));
    }
    attempts
}
