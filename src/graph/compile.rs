//! Compilation of a [`JobSpec`] into a [`FilterGraphPlan`].

use std::path::Path;

use crate::error::VireoResult;
use crate::graph::builder::{GraphBuilder, InputSpec, Pad};
use crate::job::JobSpec;

/// One `-map` argument of the compiled plan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MapTarget {
    /// A labeled pad produced by the filter graph (`-map [vout]`).
    Pad(String),
    /// The optional embedded audio of a raw input (`-map N:a?`), used when
    /// no separate narration or music was supplied.
    InputAudioOptional(usize),
}

impl MapTarget {
    fn to_arg(&self) -> String {
        match self {
            Self::Pad(label) => format!("[{label}]"),
            Self::InputAudioOptional(index) => format!("{index}:a?"),
        }
    }
}

/// Everything the compiler resolved for one render: ordered inputs, the
/// serialized filter graph, the output-stream map and the timing facts the
/// supervisor and encoder need.
#[derive(Clone, Debug)]
pub struct FilterGraphPlan {
    /// Input files in registration order.
    pub inputs: Vec<InputSpec>,
    /// Serialized `-filter_complex` expression. Empty when no filter was
    /// required.
    pub filter_graph: String,
    /// Output-stream selection; always exactly one video pad and at most
    /// one audio target.
    pub maps: Vec<MapTarget>,
    /// Whether the plan maps a filter-composed audio pad (as opposed to the
    /// base video's own track, or nothing).
    pub has_composed_audio: bool,
    /// Whether the plan structurally requires a re-encode.
    pub needs_reencode: bool,
    /// Render duration handed to `-t` and to the supervisor's progress math.
    pub total_duration: f64,
    /// Start of the fade-out, when one is configured.
    pub fade_start: Option<f64>,
}

impl FilterGraphPlan {
    /// `-i` arguments (with per-input flags) in registration order.
    pub fn input_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for input in &self.inputs {
            if input.loop_forever {
                args.push("-stream_loop".to_owned());
                args.push("-1".to_owned());
            }
            args.push("-i".to_owned());
            args.push(input.path.to_string_lossy().into_owned());
        }
        args
    }

    /// `-map` arguments in order.
    pub fn map_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for map in &self.maps {
            args.push("-map".to_owned());
            args.push(map.to_arg());
        }
        args
    }
}

/// Inputs to graph compilation beyond the job itself: pre-resolved side
/// files and probed durations (0.0 when a probe produced nothing).
#[derive(Clone, Copy, Debug)]
pub struct CompileInputs<'a> {
    /// The job being rendered.
    pub job: &'a JobSpec,
    /// Pre-concatenated background music, when any was supplied.
    pub music: Option<&'a Path>,
    /// Subtitle file to burn in (already styled), when any was supplied.
    pub subtitle_file: Option<&'a Path>,
    /// Probed base-video duration in seconds.
    pub base_duration: f64,
    /// Probed narration duration in seconds.
    pub narration_duration: f64,
}

/// Compile a job into a [`FilterGraphPlan`].
///
/// Construction order is fixed: inputs register in priority order (base,
/// effect, PNG, presenter, narration, music) and every stage consumes the
/// running video pad and produces a new uniquely-named one. Input indices
/// are always taken from the registered list; optional inputs shift the
/// indices of everything registered after them.
pub fn compile(ci: &CompileInputs<'_>) -> VireoResult<FilterGraphPlan> {
    let job = ci.job;
    let width = job.resolution.width;
    let height = job.resolution.height;

    let mut content_duration = ci.base_duration.max(ci.narration_duration).max(0.0);
    if content_duration <= 0.0 {
        content_duration = 1.0;
    }

    let fade_tail = job
        .fade_out
        .map(|fade| fade.duration.max(0.0))
        .unwrap_or(0.0);
    let narration_with_tail = if ci.narration_duration > 0.0 {
        ci.narration_duration + fade_tail
    } else {
        0.0
    };
    let total_duration = content_duration.max(narration_with_tail);

    let fade_start = job.fade_out.map(|fade| {
        if ci.narration_duration > 0.0 {
            ci.narration_duration
        } else {
            (content_duration - fade.duration.max(0.0)).max(0.0)
        }
    });

    let mut g = GraphBuilder::new();
    let base_idx = g.add_input(&job.base_video, false);
    let effect_idx = job
        .effect_overlay
        .as_ref()
        .map(|e| g.add_input(&e.path, true));
    let png_idx = job.png_overlay.as_ref().map(|p| g.add_input(&p.path, false));
    let presenter_idx = job.presenter.as_ref().map(|p| g.add_input(&p.path, true));
    let narration_idx = job.narration.as_ref().map(|n| g.add_input(n, false));
    let music_idx = ci.music.map(|m| g.add_input(m, false));

    g.statement(
        &[Pad::video(base_idx)],
        format!("scale={width}:{height},setsar=1"),
        &["v_scaled"],
    )?;
    let mut video = "v_scaled".to_owned();

    if let (Some(effect), Some(idx)) = (job.effect_overlay.as_ref(), effect_idx) {
        g.statement(
            &[Pad::video(idx)],
            format!("scale={width}:{height},format=rgba"),
            &["effect_scaled"],
        )?;
        g.statement(
            &[Pad::label(&video), Pad::label("effect_scaled")],
            format!(
                "blend=all_mode={}:all_opacity={}",
                effect.blend_mode.filter_value(),
                effect.opacity
            ),
            &["v_effect"],
        )?;
        video = "v_effect".to_owned();
    }

    if let (Some(presenter), Some(idx)) = (job.presenter.as_ref(), presenter_idx) {
        let target_h = (height as f64 * presenter.scale) as u32;
        let position = presenter.position.overlay_position();

        if let Some(chroma) = &presenter.chroma {
            let color = chroma.color.replace('#', "0x");
            // Raw [0,1] values map into the range the keying filter behaves
            // well in; full-range similarity would eat the presenter.
            let raw_sim = chroma.similarity.clamp(0.0, 1.0);
            let raw_blend = chroma.blend.clamp(0.0, 1.0);
            let similarity = 0.05 + 0.45 * raw_sim;
            let blend = 0.02 + 0.28 * raw_blend;
            g.statement(
                &[Pad::video(idx)],
                format!(
                    "scale=w=-1:h={target_h},format=rgba,chromakey={color}:{similarity:.4}:{blend:.4}"
                ),
                &["presenter_keyed"],
            )?;
            g.statement(
                &[Pad::label(&video), Pad::label("presenter_keyed")],
                format!("overlay={position}:format=auto"),
                &["v_presenter"],
            )?;
        } else {
            g.statement(
                &[Pad::video(idx)],
                format!("scale=w=-1:h={target_h}"),
                &["presenter_scaled"],
            )?;
            g.statement(
                &[Pad::label(&video), Pad::label("presenter_scaled")],
                format!("overlay={position}:format=auto"),
                &["v_presenter"],
            )?;
        }
        video = "v_presenter".to_owned();
    }

    if let (Some(png), Some(idx)) = (job.png_overlay.as_ref(), png_idx) {
        let position = png.corner.overlay_position();
        g.statement(
            &[Pad::video(idx)],
            format!(
                "format=rgba,colorchannelmixer=aa={},scale=w='iw*{}':h=-1",
                png.opacity, png.scale
            ),
            &["png_scaled"],
        )?;
        g.statement(
            &[Pad::label(&video), Pad::label("png_scaled")],
            format!("overlay={position}:format=auto"),
            &["v_png"],
        )?;
        video = "v_png".to_owned();
    }

    if let (Some(fade), Some(start)) = (job.fade_out, fade_start) {
        g.statement(
            &[Pad::label(&video)],
            format!("fade=t=out:st={start}:d={}:c=black", fade.duration.max(0.0)),
            &["v_fadeout"],
        )?;
        video = "v_fadeout".to_owned();
    }

    if let Some(subtitle_file) = ci.subtitle_file {
        let escaped = escape_filter_path(subtitle_file);
        let mut filter = format!("subtitles=filename='{escaped}'");
        if let Some(font_file) = &job.subtitle_style.font_file
            && font_file.is_file()
            && let Some(font_dir) = font_file.parent()
        {
            filter.push_str(&format!(":fontsdir='{}'", escape_filter_path(font_dir)));
        }
        g.statement(&[Pad::label(&video)], filter, &["v_subs"])?;
        video = "v_subs".to_owned();
    }

    let mut audio: Option<String> = None;
    match (narration_idx, music_idx) {
        (Some(narr), Some(music)) => {
            g.statement(
                &[Pad::audio(narr)],
                format!("volume={}dB", job.narration_gain_db),
                &["narr_vol"],
            )?;
            g.statement(
                &[Pad::audio(music)],
                format!("volume={}dB", job.music_gain_db),
                &["music_vol"],
            )?;
            g.statement(
                &[Pad::label("narr_vol")],
                "asplit=2",
                &["narr_main", "narr_side"],
            )?;
            g.statement(
                &[Pad::label("music_vol"), Pad::label("narr_side")],
                "sidechaincompress=release=250",
                &["music_ducked"],
            )?;
            g.statement(
                &[Pad::label("narr_main"), Pad::label("music_ducked")],
                "amix=inputs=2:duration=longest:dropout_transition=3",
                &["a_mix"],
            )?;
            audio = Some("a_mix".to_owned());
        }
        (Some(narr), None) => {
            g.statement(
                &[Pad::audio(narr)],
                format!("volume={}dB", job.narration_gain_db),
                &["aout"],
            )?;
            audio = Some("aout".to_owned());
        }
        (None, Some(music)) => {
            g.statement(
                &[Pad::audio(music)],
                format!("volume={}dB", job.music_gain_db),
                &["aout"],
            )?;
            audio = Some("aout".to_owned());
        }
        (None, None) => {}
    }

    if let (Some(fade), Some(start), Some(pad)) = (job.fade_out, fade_start, audio.clone()) {
        g.statement(
            &[Pad::label(&pad)],
            format!("afade=t=out:st={start}:d={}", fade.duration.max(0.0)),
            &["a_fadeout"],
        )?;
        audio = Some("a_fadeout".to_owned());
    }

    // Pixel-format normalization is always the terminal video stage; without
    // it hardware encoders reject the odd formats overlays can produce.
    g.statement(&[Pad::label(&video)], "format=yuv420p", &["vout"])?;

    let mut maps = vec![MapTarget::Pad("vout".to_owned())];
    let has_composed_audio = audio.is_some();
    match audio {
        Some(pad) => maps.push(MapTarget::Pad(pad)),
        None => maps.push(MapTarget::InputAudioOptional(base_idx)),
    }

    let filter_graph = g.serialize();
    let needs_reencode = ["scale=", "blend=", "overlay=", "fade=", "subtitles="]
        .iter()
        .any(|marker| filter_graph.contains(marker));

    Ok(FilterGraphPlan {
        inputs: g.inputs().to_vec(),
        filter_graph,
        maps,
        has_composed_audio,
        needs_reencode,
        total_duration,
        fade_start,
    })
}

/// Escape a path for use inside a quoted filter option value.
pub fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .replace(':', "\\:")
        .replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{
        ChromaKey, CodecPreference, EffectOverlay, FadeOut, JobSpec, PngOverlay, PresenterOverlay,
        Resolution, SubtitleStyle,
    };
    use std::path::PathBuf;

    fn base_job() -> JobSpec {
        JobSpec {
            base_video: PathBuf::from("base.mp4"),
            narration: None,
            music: Vec::new(),
            subtitles: None,
            subtitle_style: SubtitleStyle::default(),
            effect_overlay: None,
            png_overlay: None,
            presenter: None,
            resolution: Resolution {
                width: 1280,
                height: 720,
            },
            codec: CodecPreference::Auto,
            narration_gain_db: 0.0,
            music_gain_db: -12.0,
            fade_out: None,
            intro: None,
            output_dir: PathBuf::from("out"),
            output_name: None,
        }
    }

    fn inputs<'a>(job: &'a JobSpec) -> CompileInputs<'a> {
        CompileInputs {
            job,
            music: None,
            subtitle_file: None,
            base_duration: 20.0,
            narration_duration: 0.0,
        }
    }

    #[test]
    fn minimal_job_scales_and_maps_embedded_audio() {
        let job = base_job();
        let plan = compile(&inputs(&job)).unwrap();

        assert!(plan.filter_graph.starts_with("[0:v]scale=1280:720,setsar=1[v_scaled]"));
        assert!(plan.filter_graph.ends_with("format=yuv420p[vout]"));
        assert_eq!(
            plan.maps,
            vec![
                MapTarget::Pad("vout".to_owned()),
                MapTarget::InputAudioOptional(0)
            ]
        );
        assert!(!plan.has_composed_audio);
        assert!(plan.needs_reencode);
        assert_eq!(plan.total_duration, 20.0);
    }

    #[test]
    fn narration_and_music_produce_one_duck_mix_chain() {
        let mut job = base_job();
        job.narration = Some(PathBuf::from("voice.wav"));
        let music = PathBuf::from("music.m4a");
        let ci = CompileInputs {
            music: Some(&music),
            narration_duration: 30.0,
            ..inputs(&job)
        };
        let plan = compile(&ci).unwrap();

        assert_eq!(plan.filter_graph.matches("sidechaincompress").count(), 1);
        assert_eq!(plan.filter_graph.matches("amix=").count(), 1);
        assert_eq!(
            plan.maps,
            vec![
                MapTarget::Pad("vout".to_owned()),
                MapTarget::Pad("a_mix".to_owned())
            ]
        );
        assert!(plan.has_composed_audio);
        // Inputs: base=0, narration=1, music=2; the chain references them by
        // registered index, not by a fixed layout.
        assert!(plan.filter_graph.contains("[1:a]volume=0dB[narr_vol]"));
        assert!(plan.filter_graph.contains("[2:a]volume=-12dB[music_vol]"));
    }

    #[test]
    fn fade_out_starts_at_narration_end_and_extends_duration() {
        let mut job = base_job();
        job.narration = Some(PathBuf::from("voice.wav"));
        job.fade_out = Some(FadeOut { duration: 4.0 });
        let ci = CompileInputs {
            narration_duration: 12.5,
            base_duration: 20.0,
            ..inputs(&job)
        };
        let plan = compile(&ci).unwrap();

        assert_eq!(plan.total_duration, 20.0);
        assert_eq!(plan.fade_start, Some(12.5));
        assert!(plan.filter_graph.contains("fade=t=out:st=12.5:d=4:c=black"));
        assert!(plan.filter_graph.contains("afade=t=out:st=12.5:d=4"));
    }

    #[test]
    fn fade_without_narration_starts_before_content_end() {
        let mut job = base_job();
        job.fade_out = Some(FadeOut { duration: 5.0 });
        let plan = compile(&inputs(&job)).unwrap();
        assert_eq!(plan.fade_start, Some(15.0));
        assert_eq!(plan.total_duration, 20.0);
    }

    #[test]
    fn optional_inputs_shift_indices_without_drift() {
        let mut job = base_job();
        // No effect overlay: presenter must land at index 2 (after png), not
        // at a hard-coded slot.
        job.png_overlay = Some(PngOverlay {
            path: PathBuf::from("logo.png"),
            corner: Default::default(),
            scale: 0.15,
            opacity: 1.0,
        });
        job.presenter = Some(PresenterOverlay {
            path: PathBuf::from("presenter.mp4"),
            position: Default::default(),
            scale: 0.4,
            chroma: None,
        });
        let plan = compile(&inputs(&job)).unwrap();

        assert_eq!(plan.inputs.len(), 3);
        assert!(plan.filter_graph.contains("[1:v]format=rgba,colorchannelmixer"));
        assert!(plan.filter_graph.contains("[2:v]scale=w=-1:h=288"));
        // Looping flags follow the input kind.
        let args = plan.input_args();
        let presenter_pos = args.iter().position(|a| a == "presenter.mp4").unwrap();
        assert_eq!(args[presenter_pos - 3], "-stream_loop");
        let png_pos = args.iter().position(|a| a == "logo.png").unwrap();
        assert_eq!(args[png_pos - 1], "-i");
        assert_ne!(args[png_pos - 3], "-stream_loop");
    }

    #[test]
    fn chroma_parameters_are_remapped_into_the_safe_range() {
        let mut job = base_job();
        job.presenter = Some(PresenterOverlay {
            path: PathBuf::from("presenter.mp4"),
            position: Default::default(),
            scale: 0.4,
            chroma: Some(ChromaKey {
                color: "#00FF00".to_owned(),
                similarity: 0.20,
                blend: 0.10,
            }),
        });
        let plan = compile(&inputs(&job)).unwrap();
        assert!(plan.filter_graph.contains("chromakey=0x00FF00:0.1400:0.0480"));
    }

    #[test]
    fn effect_overlay_blends_at_low_opacity() {
        let mut job = base_job();
        job.effect_overlay = Some(EffectOverlay {
            path: PathBuf::from("grain.mp4"),
            blend_mode: Default::default(),
            opacity: 0.25,
        });
        let plan = compile(&inputs(&job)).unwrap();
        assert!(plan.filter_graph.contains("blend=all_mode=screen:all_opacity=0.25"));
    }

    #[test]
    fn unknown_durations_clamp_to_a_positive_total() {
        let job = base_job();
        let ci = CompileInputs {
            base_duration: 0.0,
            ..inputs(&job)
        };
        let plan = compile(&ci).unwrap();
        assert_eq!(plan.total_duration, 1.0);
    }

    #[test]
    fn filter_path_escaping_handles_windows_and_quotes() {
        let escaped = escape_filter_path(Path::new("C:\\subs\\it's.ass"));
        assert_eq!(escaped, "C\\:/subs/it\\'s.ass");
    }
}
