//! Background-music playlist assembly and pre-concatenation.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::error::{VireoError, VireoResult};
use crate::probe::MediaProber;
use crate::process::Supervisor;
use crate::status::{Severity, StatusSink};

/// Pick tracks to cover `target_duration` seconds of background music.
///
/// Tracks rotate in order (wrapping around as often as needed) until the
/// target is covered; entries with unknown duration are skipped. With no
/// usable target the first track alone is returned. Callers wanting variety
/// pre-shuffle the pool.
pub fn select_playlist(tracks: &[(PathBuf, f64)], target_duration: f64) -> Vec<PathBuf> {
    let usable: Vec<&(PathBuf, f64)> = tracks.iter().filter(|(_, d)| *d > 0.0).collect();
    if usable.is_empty() {
        return tracks.first().map(|(p, _)| vec![p.clone()]).unwrap_or_default();
    }
    if target_duration <= 0.0 {
        return vec![usable[0].0.clone()];
    }

    let mut playlist = Vec::new();
    let mut covered = 0.0;
    let mut cursor = 0;
    while covered < target_duration {
        let (path, duration) = usable[cursor % usable.len()];
        playlist.push(path.clone());
        covered += duration;
        cursor += 1;
    }
    playlist
}

/// Probe each track's duration. Unprobeable tracks get 0.0.
pub fn resolve_durations(prober: &MediaProber, tracks: &[PathBuf]) -> Vec<(PathBuf, f64)> {
    tracks
        .iter()
        .map(|path| {
            let duration = prober
                .probe(path)
                .map(|props| props.duration_sec)
                .unwrap_or(0.0);
            (path.clone(), duration)
        })
        .collect()
}

/// Concatenate a playlist into one audio file via the concat demuxer.
///
/// The list file lives in `temp_dir`; the result is re-encoded to AAC so the
/// graph compiler downstream always sees one clean input regardless of how
/// heterogeneous the source tracks were.
pub fn concat_tracks(
    supervisor: &Supervisor,
    tracks: &[(PathBuf, f64)],
    output: &Path,
    temp_dir: &Path,
    cancel: &CancelToken,
    label: &str,
    sink: &dyn StatusSink,
) -> VireoResult<()> {
    if tracks.is_empty() {
        return Err(VireoError::config("music playlist is empty"));
    }

    let list_path = temp_dir.join("music_concat.txt");
    let mut list = String::new();
    for (path, _) in tracks {
        let posix = path.to_string_lossy().replace('\\', "/");
        let escaped = posix.replace('\'', "'\\''");
        list.push_str(&format!("file '{escaped}'\n"));
    }
    std::fs::write(&list_path, list)
        .with_context(|| format!("failed to write '{}'", list_path.display()))?;

    let total_duration: f64 = tracks.iter().map(|(_, d)| d.max(0.0)).sum();
    debug!(tracks = tracks.len(), total_duration, "concatenating music playlist");
    sink.status(
        &format!("[{label}] concatenating {} background tracks...", tracks.len()),
        Severity::Info,
    );

    let args: Vec<String> = [
        "-y",
        "-f",
        "concat",
        "-safe",
        "0",
        "-i",
        &list_path.to_string_lossy(),
        "-c:a",
        "aac",
        "-b:a",
        "192k",
        &output.to_string_lossy(),
    ]
    .iter()
    .map(|s| (*s).to_owned())
    .collect();

    let outcome = supervisor.run(
        &args,
        total_duration.max(1.0),
        None,
        cancel,
        &format!("{label} - music concat"),
        sink,
    );

    if outcome.cancelled {
        return Err(VireoError::Cancelled);
    }
    if !outcome.success {
        return Err(VireoError::encode(
            outcome
                .diagnostic
                .unwrap_or_else(|| "music concatenation failed".to_owned()),
        ));
    }
    Ok(())
}
