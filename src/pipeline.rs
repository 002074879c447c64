//! The pipeline orchestrator.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use tracing::{error, info, warn};

use crate::cancel::CancelToken;
use crate::codec::{EncoderInventory, plan_attempts};
use crate::encode::encode_plan;
use crate::error::{VireoError, VireoResult};
use crate::graph::{CompileInputs, compile};
use crate::intro::{render_intro_clip, stitch_intro};
use crate::job::JobSpec;
use crate::lang::{infer_language_from_filename, resolve_intro_text};
use crate::playlist::{concat_tracks, resolve_durations};
use crate::probe::{MediaProber, MediaProperties};
use crate::process::{ProcessRegistry, StallPolicy, Supervisor};
use crate::status::{Severity, StatusSink};
use crate::subtitle::style_subtitles;

/// The coordinating entry point tying the pipeline together.
///
/// One pipeline instance is shared across jobs; each [`render`] call is
/// synchronous and blocking, works inside its own temporary-directory scope,
/// and communicates exclusively through the status sink. Run concurrent
/// jobs by calling `render` from multiple pool workers.
///
/// [`render`]: RenderPipeline::render
pub struct RenderPipeline {
    supervisor: Supervisor,
    prober: MediaProber,
    registry: ProcessRegistry,
    encoders: EncoderInventory,
}

impl RenderPipeline {
    /// Pipeline using `ffmpeg_path`, with encoder detection run once up
    /// front.
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        let ffmpeg = ffmpeg_path.into();
        let encoders = EncoderInventory::detect(&ffmpeg);
        Self::with_parts(
            ffmpeg,
            ProcessRegistry::new(),
            encoders,
            StallPolicy::default(),
        )
    }

    /// Fully injected construction for embedders and tests.
    pub fn with_parts(
        ffmpeg_path: impl Into<PathBuf>,
        registry: ProcessRegistry,
        encoders: EncoderInventory,
        policy: StallPolicy,
    ) -> Self {
        let ffmpeg = ffmpeg_path.into();
        Self {
            supervisor: Supervisor::with_policy(&ffmpeg, registry.clone(), policy),
            prober: MediaProber::from_ffmpeg_path(&ffmpeg),
            registry,
            encoders,
        }
    }

    /// The process registry backing this pipeline's supervisor.
    ///
    /// Hand it to the host's shutdown routine so no encoder process can
    /// outlive the application.
    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Render one job to completion.
    ///
    /// Never panics across this boundary and always emits exactly one
    /// `Finished` event: internal faults become a single fatal status line,
    /// cancellation a warning, and the return value mirrors the signal.
    pub fn render(&self, job: &JobSpec, cancel: &CancelToken, sink: &dyn StatusSink) -> bool {
        let success = match self.render_inner(job, cancel, sink) {
            Ok(success) => success,
            Err(VireoError::Cancelled) => {
                sink.status("[render] job cancelled", Severity::Warning);
                false
            }
            Err(err) => {
                error!(%err, "render job failed");
                sink.status(&format!("[render] FATAL: {err}"), Severity::Error);
                false
            }
        };
        sink.finished(success);
        success
    }

    fn render_inner(
        &self,
        job: &JobSpec,
        cancel: &CancelToken,
        sink: &dyn StatusSink,
    ) -> VireoResult<bool> {
        let label = "render";
        if cancel.is_cancelled() {
            return Err(VireoError::Cancelled);
        }
        if !job.base_video.is_file() {
            return Err(VireoError::config(format!(
                "base video not found: '{}'",
                job.base_video.display()
            )));
        }

        let temp_dir = tempfile::Builder::new()
            .prefix("vireo-job-")
            .tempdir()
            .context("failed to create job temp directory")?;
        info!(temp_dir = %temp_dir.path().display(), "job started");
        sink.status(&format!("[{label}] starting render..."), Severity::Info);

        // Narration/subtitle paths that point nowhere degrade to absence.
        let narration = job
            .narration
            .as_deref()
            .filter(|p| p.is_file())
            .map(Path::to_path_buf);
        if narration.is_none() && job.narration.is_some() {
            sink.status(
                &format!("[{label}] narration file missing, continuing without it"),
                Severity::Warning,
            );
        }

        let narration_duration = narration
            .as_deref()
            .map(|p| self.probed_duration(p, label, sink))
            .unwrap_or(0.0);
        let base_duration = self.probed_duration(&job.base_video, label, sink);

        let music = self.prepare_music(job, temp_dir.path(), cancel, label, sink)?;
        let subtitle_file = self.prepare_subtitles(job, temp_dir.path(), label, sink)?;

        let intro = self.prepare_intro(job, &narration, temp_dir.path(), cancel, label, sink)?;

        sink.status(&format!("[{label}] building filter graph..."), Severity::Info);
        let plan = compile(&CompileInputs {
            job,
            music: music.as_deref(),
            subtitle_file: subtitle_file.as_deref(),
            base_duration,
            narration_duration,
        })?;

        std::fs::create_dir_all(&job.output_dir).with_context(|| {
            format!("failed to create output dir '{}'", job.output_dir.display())
        })?;
        let final_path = job.output_path();
        let content_path = if intro.is_some() {
            temp_dir
                .path()
                .join(format!("main-content-{}", job.output_file_name()))
        } else {
            final_path.clone()
        };

        let attempts = plan_attempts(job.codec, &self.encoders, plan.needs_reencode);
        let outcome = encode_plan(
            &self.supervisor,
            &plan,
            &attempts,
            &content_path,
            cancel,
            label,
            sink,
        );
        if outcome.cancelled {
            return Err(VireoError::Cancelled);
        }
        if !outcome.success {
            return Ok(false);
        }

        if let Some(intro) = intro {
            let stitch_attempts = plan_attempts(job.codec, &self.encoders, true);
            match stitch_intro(
                &self.supervisor,
                &self.prober,
                &intro,
                &content_path,
                &final_path,
                &stitch_attempts,
                cancel,
                label,
                sink,
            ) {
                Ok(()) => {}
                Err(VireoError::Cancelled) => return Err(VireoError::Cancelled),
                Err(err) => {
                    warn!(%err, "intro stitching failed");
                    return Ok(false);
                }
            }
        }

        sink.status(
            &format!("[{label}] finished '{}'", final_path.display()),
            Severity::Info,
        );
        Ok(true)
    }

    fn probed_duration(&self, path: &Path, label: &str, sink: &dyn StatusSink) -> f64 {
        match self.prober.probe(path) {
            Some(MediaProperties { duration_sec, .. }) if duration_sec > 0.0 => duration_sec,
            _ => {
                sink.status(
                    &format!(
                        "[{label}] could not determine duration of '{}', using defaults",
                        path.display()
                    ),
                    Severity::Warning,
                );
                0.0
            }
        }
    }

    /// Resolve the background music input: none, a single track used as-is,
    /// or a playlist pre-concatenated into the temp directory.
    fn prepare_music(
        &self,
        job: &JobSpec,
        temp_dir: &Path,
        cancel: &CancelToken,
        label: &str,
        sink: &dyn StatusSink,
    ) -> VireoResult<Option<PathBuf>> {
        let tracks: Vec<PathBuf> = job.music.iter().filter(|p| p.is_file()).cloned().collect();
        if tracks.len() < job.music.len() {
            sink.status(
                &format!("[{label}] some music tracks are missing and were skipped"),
                Severity::Warning,
            );
        }

        match tracks.len() {
            0 => Ok(None),
            1 => Ok(Some(tracks[0].clone())),
            _ => {
                let with_durations = resolve_durations(&self.prober, &tracks);
                let playlist_path = temp_dir.join("music_playlist.m4a");
                concat_tracks(
                    &self.supervisor,
                    &with_durations,
                    &playlist_path,
                    temp_dir,
                    cancel,
                    label,
                    sink,
                )?;
                Ok(Some(playlist_path))
            }
        }
    }

    fn prepare_subtitles(
        &self,
        job: &JobSpec,
        temp_dir: &Path,
        label: &str,
        sink: &dyn StatusSink,
    ) -> VireoResult<Option<PathBuf>> {
        let Some(subtitles) = job.subtitles.as_deref().filter(|p| p.is_file()) else {
            if job.subtitles.is_some() {
                sink.status(
                    &format!("[{label}] subtitle file missing, continuing without it"),
                    Severity::Warning,
                );
            }
            return Ok(None);
        };

        let styled = style_subtitles(subtitles, &job.subtitle_style, temp_dir, job.resolution)?;
        Ok(Some(styled))
    }

    /// Build the intro clip when the job asks for one and a text resolves.
    ///
    /// Intro failures other than cancellation degrade to "no intro": the
    /// main render is worth finishing even when the opener cannot be built.
    fn prepare_intro(
        &self,
        job: &JobSpec,
        narration: &Option<PathBuf>,
        temp_dir: &Path,
        cancel: &CancelToken,
        label: &str,
        sink: &dyn StatusSink,
    ) -> VireoResult<Option<crate::intro::IntroClipResult>> {
        let Some(spec) = &job.intro else {
            return Ok(None);
        };

        let hint = narration.as_deref().and_then(infer_language_from_filename);
        let Some(resolved) = resolve_intro_text(spec, hint) else {
            return Ok(None);
        };

        sink.status(
            &format!("[{label}] typed intro selected ({})", resolved.label),
            Severity::Info,
        );

        match render_intro_clip(
            &self.supervisor,
            &resolved.text,
            job.resolution,
            spec,
            &job.subtitle_style,
            temp_dir,
            cancel,
            label,
            sink,
        ) {
            Ok(clip) => Ok(Some(clip)),
            Err(VireoError::Cancelled) => Err(VireoError::Cancelled),
            Err(err) => {
                warn!(%err, "intro clip generation failed");
                sink.status(
                    &format!("[{label}] intro generation failed ({err}), continuing without it"),
                    Severity::Warning,
                );
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{ChannelSink, StatusEvent};

    fn pipeline() -> RenderPipeline {
        RenderPipeline::with_parts(
            "/nonexistent/ffmpeg",
            ProcessRegistry::new(),
            EncoderInventory::from_names(["libx264"]),
            StallPolicy::default(),
        )
    }

    fn job(base_video: PathBuf, output_dir: PathBuf) -> JobSpec {
        JobSpec {
            base_video,
            narration: None,
            music: Vec::new(),
            subtitles: None,
            subtitle_style: Default::default(),
            effect_overlay: None,
            png_overlay: None,
            presenter: None,
            resolution: Default::default(),
            codec: Default::default(),
            narration_gain_db: 0.0,
            music_gain_db: 0.0,
            fade_out: None,
            intro: None,
            output_dir,
            output_name: Some("out.mp4".into()),
        }
    }

    #[test]
    fn missing_base_video_is_fatal_and_still_signals_finished() {
        let (sink, rx) = ChannelSink::new();
        let job = job(PathBuf::from("/nonexistent/base.mp4"), PathBuf::from("/tmp"));

        let ok = pipeline().render(&job, &CancelToken::new(), &sink);
        assert!(!ok);

        let events: Vec<StatusEvent> = rx.try_iter().collect();
        assert!(events.iter().any(|e| matches!(
            e,
            StatusEvent::Status { text, severity: Severity::Error } if text.contains("FATAL")
        )));
        assert_eq!(events.last(), Some(&StatusEvent::Finished(false)));
    }

    #[test]
    fn cancelled_job_reports_without_failure_styling() {
        let (sink, rx) = ChannelSink::new();
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base.mp4");
        std::fs::write(&base, b"stub").unwrap();
        let job = job(base, dir.path().to_path_buf());

        let cancel = CancelToken::new();
        cancel.cancel();
        let ok = pipeline().render(&job, &cancel, &sink);
        assert!(!ok);

        let events: Vec<StatusEvent> = rx.try_iter().collect();
        assert!(!events.iter().any(|e| matches!(
            e,
            StatusEvent::Status {
                severity: Severity::Error,
                ..
            }
        )));
        assert_eq!(events.last(), Some(&StatusEvent::Finished(false)));
    }
}
