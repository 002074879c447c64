//! Typed-text intro generation and stitching.
//!
//! [`typography`] rasterizes the animation frames, [`audio`] synthesizes the
//! keystroke track, and this module drives both into an encoded clip and
//! cross-fades it onto the main render.

pub mod audio;
pub mod typography;

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use tracing::info;

use crate::cancel::CancelToken;
use crate::codec::CodecAttempt;
use crate::error::{VireoError, VireoResult};
use crate::graph::builder::{GraphBuilder, Pad};
use crate::graph::compile::{FilterGraphPlan, MapTarget};
use crate::job::{IntroSpec, Resolution, SubtitleStyle};
use crate::probe::MediaProber;
use crate::process::Supervisor;
use crate::status::{Severity, StatusSink};

/// Frame/character timing of the typing animation.
#[derive(Clone, Copy, Debug)]
pub struct IntroTiming {
    /// Output frame rate.
    pub frame_rate: u32,
    /// Frames spent on each typed character.
    pub frames_per_char: u32,
    /// Frames the finished text holds on screen.
    pub hold_frames: u32,
}

impl IntroTiming {
    /// The standard animation: 30fps, ~0.08s per character, 1.5s hold.
    pub fn standard() -> Self {
        let frame_rate = 30u32;
        let base_char_duration = 0.08f64;
        let frames_per_char = ((frame_rate as f64 * base_char_duration).round() as u32).max(2);
        let hold_frames = ((frame_rate as f64 * 1.5).round() as u32).max(frame_rate);
        Self {
            frame_rate,
            frames_per_char,
            hold_frames,
        }
    }

    /// Seconds spent on each typed character.
    pub fn char_duration(&self) -> f64 {
        self.frames_per_char as f64 / self.frame_rate as f64
    }

    /// Seconds the finished text holds.
    pub fn hold_duration(&self) -> f64 {
        self.hold_frames as f64 / self.frame_rate as f64
    }

    /// Frames of the typing phase. Empty text still shows one frame.
    pub fn typing_frames(&self, char_count: usize) -> u32 {
        let typed = char_count as u32 * self.frames_per_char;
        typed.max(1)
    }

    /// Total frame count of the clip.
    pub fn total_frames(&self, char_count: usize) -> u32 {
        self.typing_frames(char_count) + self.hold_frames
    }

    /// Total clip duration in seconds.
    pub fn total_duration(&self, char_count: usize) -> f64 {
        self.total_frames(char_count) as f64 / self.frame_rate as f64
    }
}

/// A rendered intro clip plus the timing splits the stitcher needs to place
/// the cross-fade. Temp-directory scoped: the orchestrator deletes the whole
/// job directory after stitching.
#[derive(Clone, Debug)]
pub struct IntroClipResult {
    /// Path of the encoded clip.
    pub path: PathBuf,
    /// Full clip duration in seconds.
    pub duration: f64,
    /// Duration of the typing phase.
    pub typing_duration: f64,
    /// Duration of the hold phase.
    pub hold_duration: f64,
    /// Extra tail after the hold (zero for generated clips; kept because the
    /// cross-fade offset is defined over all three).
    pub post_hold_duration: f64,
}

/// Render the typing animation + keystroke audio and encode them into a
/// clip inside `temp_dir`.
#[allow(clippy::too_many_arguments)]
pub fn render_intro_clip(
    supervisor: &Supervisor,
    text: &str,
    resolution: Resolution,
    spec: &IntroSpec,
    subtitle_style: &SubtitleStyle,
    temp_dir: &Path,
    cancel: &CancelToken,
    label: &str,
    sink: &dyn StatusSink,
) -> VireoResult<IntroClipResult> {
    if cancel.is_cancelled() {
        return Err(VireoError::Cancelled);
    }

    let timing = IntroTiming::standard();
    let clip_dir = temp_dir.join("intro-clip");
    let frames_dir = clip_dir.join("frames");
    std::fs::create_dir_all(&frames_dir)
        .with_context(|| format!("failed to create '{}'", frames_dir.display()))?;

    let font_size = ((resolution.height as f64 * 0.08) as u32).max(36) as f32;
    let font = typography::load_intro_font(
        spec.font_file.as_deref(),
        subtitle_style.font_file.as_deref(),
        spec.bold,
        font_size,
    )?;
    let mut painter = typography::FramePainter::new(font, resolution.width, resolution.height);

    sink.status(
        &format!("[{label}] generating typed intro clip..."),
        Severity::Info,
    );

    // One rasterized frame per prefix, duplicated to fill the per-character
    // frame budget. Duplicates are file copies of the encoded PNG.
    let mut frame_index: u32 = 0;
    let chars: Vec<char> = text.chars().collect();
    let mut prefix = String::new();
    for ch in &chars {
        if cancel.is_cancelled() {
            return Err(VireoError::Cancelled);
        }
        prefix.push(*ch);
        frame_index = write_frames(
            &mut painter,
            &prefix,
            &frames_dir,
            frame_index,
            timing.frames_per_char,
        )?;
    }
    if frame_index == 0 {
        frame_index = write_frames(&mut painter, text, &frames_dir, 0, 1)?;
    }
    write_frames(&mut painter, text, &frames_dir, frame_index, timing.hold_frames)?;

    let char_count = chars.len();
    let typing_duration = timing.typing_frames(char_count) as f64 / timing.frame_rate as f64;
    let hold_duration = timing.hold_duration();
    let total_duration = timing.total_duration(char_count);

    let audio_path = clip_dir.join("typing_audio.wav");
    audio::generate_typing_audio(text, timing.char_duration(), hold_duration, &audio_path)?;

    let clip_path = clip_dir.join("typing_intro.mp4");
    let frame_pattern = frames_dir.join("frame_%05d.png");
    let args: Vec<String> = [
        "-y",
        "-framerate",
        &timing.frame_rate.to_string(),
        "-i",
        &frame_pattern.to_string_lossy(),
        "-i",
        &audio_path.to_string_lossy(),
        "-c:v",
        "libx264",
        "-pix_fmt",
        "yuv420p",
        "-c:a",
        "aac",
        "-shortest",
        &clip_path.to_string_lossy(),
    ]
    .iter()
    .map(|s| (*s).to_owned())
    .collect();

    let outcome = supervisor.run(
        &args,
        total_duration,
        None,
        cancel,
        &format!("{label} - intro"),
        sink,
    );
    if outcome.cancelled {
        return Err(VireoError::Cancelled);
    }
    if !outcome.success {
        return Err(VireoError::encode(
            outcome
                .diagnostic
                .unwrap_or_else(|| "intro clip encode failed".to_owned()),
        ));
    }

    info!(label, chars = char_count, total_duration, "intro clip rendered");
    Ok(IntroClipResult {
        path: clip_path,
        duration: total_duration,
        typing_duration,
        hold_duration,
        post_hold_duration: 0.0,
    })
}

fn write_frames(
    painter: &mut typography::FramePainter,
    text: &str,
    frames_dir: &Path,
    start_index: u32,
    count: u32,
) -> VireoResult<u32> {
    if count == 0 {
        return Ok(start_index);
    }

    let first = frames_dir.join(format!("frame_{start_index:05}.png"));
    painter
        .paint(text)
        .save(&first)
        .with_context(|| format!("failed to write frame '{}'", first.display()))?;

    for offset in 1..count {
        let copy = frames_dir.join(format!("frame_{:05}.png", start_index + offset));
        std::fs::copy(&first, &copy)
            .with_context(|| format!("failed to write frame '{}'", copy.display()))?;
    }
    Ok(start_index + count)
}

/// Cross-fade duration for stitching: starts at 0.6s, bounded above by half
/// of each clip, floored at 0.3s.
pub fn crossfade_duration(intro_duration: f64, main_duration: f64) -> f64 {
    let mut fade = 0.6f64;
    if intro_duration > 0.0 {
        fade = fade.min(intro_duration / 2.0);
    }
    if main_duration > 0.0 {
        fade = fade.min(main_duration / 2.0);
    }
    fade.max(0.3)
}

/// Cross-fade start offset into the intro clip.
///
/// The fade begins where the typed animation actually ends (typing + hold +
/// post-hold), not simply at "clip end minus fade", clamped so it never
/// exceeds `intro_duration - fade` and never goes negative.
pub fn crossfade_offset(
    intro_duration: f64,
    fade_duration: f64,
    typing_duration: f64,
    hold_duration: f64,
    post_hold_duration: f64,
) -> f64 {
    let max_offset = (intro_duration - fade_duration).max(0.0);
    let desired = typing_duration + hold_duration + post_hold_duration;
    if desired > 0.0 {
        desired.min(max_offset)
    } else {
        max_offset
    }
}

/// Cross-fade the intro clip onto the main render, writing `final_path`.
///
/// Audio handling depends on which side has any: both sides cross-fade,
/// a lone intro track fades out, a lone main track fades in, and with no
/// audio at all both inputs map their (optional) embedded tracks.
#[allow(clippy::too_many_arguments)]
pub fn stitch_intro(
    supervisor: &Supervisor,
    prober: &MediaProber,
    intro: &IntroClipResult,
    main_path: &Path,
    final_path: &Path,
    attempts: &[CodecAttempt],
    cancel: &CancelToken,
    label: &str,
    sink: &dyn StatusSink,
) -> VireoResult<()> {
    let intro_props = prober.probe(&intro.path);
    let main_props = prober.probe(main_path);

    let intro_duration = intro_props
        .as_ref()
        .map(|p| p.duration_sec)
        .filter(|d| *d > 0.0)
        .unwrap_or(intro.duration);
    let main_duration = main_props
        .as_ref()
        .map(|p| p.duration_sec)
        .unwrap_or(0.0);
    let total_duration = intro_duration + main_duration;

    let fade = crossfade_duration(intro_duration, main_duration);
    let offset = crossfade_offset(
        intro_duration,
        fade,
        intro.typing_duration,
        intro.hold_duration,
        intro.post_hold_duration,
    );

    let intro_has_audio = intro_props.as_ref().map(|p| p.has_audio()).unwrap_or(false);
    let main_has_audio = main_props.as_ref().map(|p| p.has_audio()).unwrap_or(false);

    let mut g = GraphBuilder::new();
    let intro_idx = g.add_input(&intro.path, false);
    let main_idx = g.add_input(main_path, false);
    g.statement(
        &[Pad::video(intro_idx), Pad::video(main_idx)],
        format!("xfade=transition=fade:duration={fade}:offset={offset}"),
        &["vout"],
    )?;

    let mut maps = vec![MapTarget::Pad("vout".to_owned())];
    let mut composed_audio = true;
    if intro_has_audio && main_has_audio {
        g.statement(
            &[Pad::audio(intro_idx), Pad::audio(main_idx)],
            format!("acrossfade=d={fade}"),
            &["aout"],
        )?;
        maps.push(MapTarget::Pad("aout".to_owned()));
    } else if intro_has_audio {
        g.statement(
            &[Pad::audio(intro_idx)],
            format!("afade=t=out:st={offset}:d={fade}"),
            &["introa"],
        )?;
        maps.push(MapTarget::Pad("introa".to_owned()));
    } else if main_has_audio {
        g.statement(
            &[Pad::audio(main_idx)],
            format!("afade=t=in:st=0:d={fade}"),
            &["maina"],
        )?;
        maps.push(MapTarget::Pad("maina".to_owned()));
    } else {
        maps.push(MapTarget::InputAudioOptional(intro_idx));
        maps.push(MapTarget::InputAudioOptional(main_idx));
        composed_audio = false;
    }

    let plan = FilterGraphPlan {
        inputs: g.inputs().to_vec(),
        filter_graph: g.serialize(),
        maps,
        has_composed_audio: composed_audio,
        needs_reencode: true,
        total_duration: if total_duration > 0.0 {
            total_duration
        } else {
            intro.duration.max(1.0)
        },
        fade_start: None,
    };

    sink.status(
        &format!("[{label}] combining intro with the main video..."),
        Severity::Info,
    );

    let outcome = crate::encode::encode_plan(
        supervisor,
        &plan,
        attempts,
        final_path,
        cancel,
        &format!("{label} - intro merge"),
        sink,
    );
    if outcome.cancelled {
        return Err(VireoError::Cancelled);
    }
    if !outcome.success {
        return Err(VireoError::encode(
            outcome
                .diagnostic
                .unwrap_or_else(|| "intro merge failed".to_owned()),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_timing_matches_the_documented_animation() {
        let t = IntroTiming::standard();
        assert_eq!(t.frame_rate, 30);
        assert_eq!(t.frames_per_char, 2);
        assert_eq!(t.hold_frames, 45);
        assert!((t.char_duration() - 2.0 / 30.0).abs() < 1e-12);
        assert!((t.hold_duration() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn three_character_text_yields_51_frames_and_1_7_seconds() {
        let t = IntroTiming::standard();
        let chars = "Olá".chars().count();
        assert_eq!(chars, 3);
        assert_eq!(t.typing_frames(chars), 6);
        assert_eq!(t.total_frames(chars), 51);
        assert!((t.total_duration(chars) - 1.7).abs() < 1e-12);
    }

    #[test]
    fn empty_text_still_shows_one_frame() {
        let t = IntroTiming::standard();
        assert_eq!(t.typing_frames(0), 1);
        assert_eq!(t.total_frames(0), 46);
    }

    #[test]
    fn crossfade_duration_is_bounded_by_both_clips() {
        assert!((crossfade_duration(10.0, 60.0) - 0.6).abs() < 1e-12);
        assert!((crossfade_duration(0.8, 60.0) - 0.4).abs() < 1e-12);
        // Very short clips floor at 0.3 even when half the clip is shorter.
        assert!((crossfade_duration(0.4, 60.0) - 0.3).abs() < 1e-12);
        assert!((crossfade_duration(10.0, 0.5) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn crossfade_offset_clamps_to_clip_bounds_and_never_goes_negative() {
        // Desired end of animation fits inside the clip.
        assert!((crossfade_offset(5.0, 0.6, 2.0, 1.5, 0.0) - 3.5).abs() < 1e-12);
        // Desired end beyond the fade window clamps to duration - fade.
        assert!((crossfade_offset(4.0, 0.6, 3.0, 1.5, 0.0) - 3.4).abs() < 1e-12);
        // Degenerate short clip: never negative.
        assert_eq!(crossfade_offset(0.4, 0.6, 1.0, 1.0, 0.0), 0.0);
        // No timing splits known: fall back to duration - fade.
        assert!((crossfade_offset(5.0, 0.6, 0.0, 0.0, 0.0) - 4.4).abs() < 1e-12);
    }
}
