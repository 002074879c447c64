//! The declarative job model: one [`JobSpec`] describes one render.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Target output resolution in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

impl Resolution {
    /// Parse a user-facing resolution string.
    ///
    /// Accepts `"1280x720"` (any `x`/`X` separator, surrounding text
    /// tolerated) and shorthand `"720p"` (16:9 width derived). Anything else
    /// falls back to 1920x1080.
    pub fn parse(text: &str) -> Self {
        if let Some((w, h)) = split_dimensions(text)
            && w > 0
            && h > 0
        {
            return Self {
                width: w,
                height: h,
            };
        }

        if let Some(height) = parse_p_shorthand(text)
            && height > 0
        {
            let width = ((height as f64) * 16.0 / 9.0).round() as u32;
            return Self { width, height };
        }

        Self::default()
    }
}

fn split_dimensions(text: &str) -> Option<(u32, u32)> {
    let lower = text.to_ascii_lowercase();
    let idx = lower.find('x')?;
    let before: String = lower[..idx]
        .trim_end()
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    let after: String = lower[idx + 1..]
        .chars()
        .skip_while(|c| c.is_whitespace())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if before.len() < 3 || after.len() < 3 {
        return None;
    }
    Some((before.parse().ok()?, after.parse().ok()?))
}

fn parse_p_shorthand(text: &str) -> Option<u32> {
    let lower = text.to_ascii_lowercase();
    let idx = lower.find('p')?;
    let digits: String = lower[..idx]
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Which encoder family the caller prefers for the final pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecPreference {
    /// Use hardware acceleration when available, software otherwise.
    #[default]
    Auto,
    /// Insist on hardware acceleration (still falls back on failure).
    Hardware,
    /// Software encoding only.
    Software,
}

/// Blend mode applied when compositing the looping effect overlay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectBlendMode {
    /// `blend=all_mode=screen`
    #[default]
    Screen,
    /// `blend=all_mode=overlay`
    Overlay,
    /// `blend=all_mode=softlight`
    SoftLight,
    /// `blend=all_mode=lighten`
    Lighten,
}

impl EffectBlendMode {
    /// The value the `blend` filter expects.
    pub fn filter_value(self) -> &'static str {
        match self {
            Self::Screen => "screen",
            Self::Overlay => "overlay",
            Self::SoftLight => "softlight",
            Self::Lighten => "lighten",
        }
    }
}

/// Corner placement for the PNG watermark overlay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Corner {
    /// Top-left, 10px margins.
    TopLeft,
    /// Top-right, 10px margins.
    TopRight,
    /// Bottom-left, 10px margins.
    BottomLeft,
    /// Bottom-right, 10px margins.
    #[default]
    BottomRight,
}

impl Corner {
    /// `overlay` filter x:y expression for this corner.
    pub fn overlay_position(self) -> &'static str {
        match self {
            Self::TopLeft => "10:10",
            Self::TopRight => "W-w-10:10",
            Self::BottomLeft => "10:H-h-10",
            Self::BottomRight => "W-w-10:H-h-10",
        }
    }
}

/// Horizontal placement of the presenter cutout along the bottom edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenterPosition {
    /// Flush left with a 10px margin.
    BottomLeft,
    /// Horizontally centered.
    #[default]
    BottomCenter,
    /// Flush right with a 10px margin.
    BottomRight,
}

impl PresenterPosition {
    /// `overlay` filter x:y expression for this position.
    pub fn overlay_position(self) -> &'static str {
        match self {
            Self::BottomLeft => "10:H-h",
            Self::BottomCenter => "(W-w)/2:H-h",
            Self::BottomRight => "W-w-10:H-h",
        }
    }
}

/// Chroma-key parameters for the presenter overlay.
///
/// `similarity` and `blend` are user-facing values in `[0, 1]`; the graph
/// compiler remaps them into the narrower operational range the `chromakey`
/// filter behaves well in.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChromaKey {
    /// Key color as `#RRGGBB`.
    #[serde(default = "default_chroma_color")]
    pub color: String,
    /// Color similarity, `[0, 1]`.
    #[serde(default = "default_chroma_similarity")]
    pub similarity: f64,
    /// Edge blend, `[0, 1]`.
    #[serde(default = "default_chroma_blend")]
    pub blend: f64,
}

fn default_chroma_color() -> String {
    "#00FF00".to_owned()
}

fn default_chroma_similarity() -> f64 {
    0.20
}

fn default_chroma_blend() -> f64 {
    0.10
}

impl Default for ChromaKey {
    fn default() -> Self {
        Self {
            color: default_chroma_color(),
            similarity: default_chroma_similarity(),
            blend: default_chroma_blend(),
        }
    }
}

/// Full-frame looping effect overlay (film grain, dust, light leaks).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EffectOverlay {
    /// Path to the overlay video. Looped for the whole render.
    pub path: PathBuf,
    /// Blend mode used for compositing.
    #[serde(default)]
    pub blend_mode: EffectBlendMode,
    /// Blend opacity. Kept low so the base footage stays readable.
    #[serde(default = "default_effect_opacity")]
    pub opacity: f64,
}

fn default_effect_opacity() -> f64 {
    0.25
}

/// Static PNG watermark overlay.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PngOverlay {
    /// Path to the PNG image.
    pub path: PathBuf,
    /// Corner placement.
    #[serde(default)]
    pub corner: Corner,
    /// Scale relative to the image's own width.
    #[serde(default = "default_png_scale")]
    pub scale: f64,
    /// Alpha multiplier, `[0, 1]`.
    #[serde(default = "default_png_opacity")]
    pub opacity: f64,
}

fn default_png_scale() -> f64 {
    0.15
}

fn default_png_opacity() -> f64 {
    1.0
}

/// Looping presenter video overlaid at the bottom of the frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PresenterOverlay {
    /// Path to the presenter video. Looped for the whole render.
    pub path: PathBuf,
    /// Bottom-edge placement.
    #[serde(default)]
    pub position: PresenterPosition,
    /// Presenter height as a fraction of the output height.
    #[serde(default = "default_presenter_scale")]
    pub scale: f64,
    /// Optional chroma key to remove the backdrop.
    #[serde(default)]
    pub chroma: Option<ChromaKey>,
}

fn default_presenter_scale() -> f64 {
    0.40
}

/// Styling applied when burning subtitles in.
///
/// Field semantics follow the ASS `[V4+ Styles]` format; colors are
/// user-facing `#RRGGBB` strings converted during ASS generation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubtitleStyle {
    /// Font file whose stem becomes the ASS font name. The file's directory
    /// is also handed to the `subtitles` filter as `fontsdir`.
    #[serde(default)]
    pub font_file: Option<PathBuf>,
    /// Font size in PlayRes units.
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    /// Primary fill color.
    #[serde(default = "default_text_color")]
    pub text_color: String,
    /// Outline color.
    #[serde(default = "default_outline_color")]
    pub outline_color: String,
    /// Box/back color (fully transparent by default).
    #[serde(default = "default_outline_color")]
    pub back_color: String,
    /// Bold flag.
    #[serde(default = "default_true")]
    pub bold: bool,
    /// Italic flag.
    #[serde(default)]
    pub italic: bool,
    /// Outline width.
    #[serde(default = "default_outline_width")]
    pub outline: u32,
    /// Shadow depth.
    #[serde(default = "default_shadow")]
    pub shadow: u32,
    /// ASS border style (1 = outline + shadow, 3 = opaque box).
    #[serde(default = "default_border_style")]
    pub border_style: u32,
    /// ASS numpad alignment code (2 = bottom center).
    #[serde(default = "default_alignment")]
    pub alignment: u32,
}

fn default_font_size() -> u32 {
    28
}

fn default_text_color() -> String {
    "#FFFFFF".to_owned()
}

fn default_outline_color() -> String {
    "#000000".to_owned()
}

fn default_true() -> bool {
    true
}

fn default_outline_width() -> u32 {
    2
}

fn default_shadow() -> u32 {
    1
}

fn default_border_style() -> u32 {
    1
}

fn default_alignment() -> u32 {
    2
}

impl Default for SubtitleStyle {
    fn default() -> Self {
        Self {
            font_file: None,
            font_size: default_font_size(),
            text_color: default_text_color(),
            outline_color: default_outline_color(),
            back_color: default_outline_color(),
            bold: true,
            italic: false,
            outline: default_outline_width(),
            shadow: default_shadow(),
            border_style: default_border_style(),
            alignment: default_alignment(),
        }
    }
}

/// Fade-to-black tail appended to video and audio.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FadeOut {
    /// Fade duration in seconds.
    #[serde(default = "default_fade_duration")]
    pub duration: f64,
}

fn default_fade_duration() -> f64 {
    10.0
}

impl Default for FadeOut {
    fn default() -> Self {
        Self {
            duration: default_fade_duration(),
        }
    }
}

/// Typed-text intro configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IntroSpec {
    /// Text used when no per-language entry matches.
    #[serde(default)]
    pub default_text: String,
    /// Per-language texts keyed by language code (normalized at selection).
    #[serde(default)]
    pub texts: BTreeMap<String, String>,
    /// Preferred language code; may also be inferred from the narration
    /// file name.
    #[serde(default)]
    pub language: Option<String>,
    /// Font file for the typed text. Falls back to the subtitle font, then
    /// to common system font locations.
    #[serde(default)]
    pub font_file: Option<PathBuf>,
    /// Render the text bold (double-struck when only a regular face loads).
    #[serde(default)]
    pub bold: bool,
}

/// Declarative description of one render job.
///
/// Immutable for the duration of the job; owned by the pipeline invocation
/// that consumes it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobSpec {
    /// The base visual track.
    pub base_video: PathBuf,
    /// Optional narration audio.
    #[serde(default)]
    pub narration: Option<PathBuf>,
    /// Background music tracks. More than one entry is pre-concatenated
    /// into a single playlist file before graph compilation.
    #[serde(default)]
    pub music: Vec<PathBuf>,
    /// Optional SRT subtitle file to burn in.
    #[serde(default)]
    pub subtitles: Option<PathBuf>,
    /// Styling for the burned-in subtitles.
    #[serde(default)]
    pub subtitle_style: SubtitleStyle,
    /// Optional looping effect overlay.
    #[serde(default)]
    pub effect_overlay: Option<EffectOverlay>,
    /// Optional PNG watermark.
    #[serde(default)]
    pub png_overlay: Option<PngOverlay>,
    /// Optional presenter video overlay.
    #[serde(default)]
    pub presenter: Option<PresenterOverlay>,
    /// Target output resolution.
    #[serde(default)]
    pub resolution: Resolution,
    /// Encoder preference for the final pass.
    #[serde(default)]
    pub codec: CodecPreference,
    /// Narration gain in dB.
    #[serde(default)]
    pub narration_gain_db: f64,
    /// Music gain in dB (typically negative so narration dominates).
    #[serde(default)]
    pub music_gain_db: f64,
    /// Optional fade-out tail.
    #[serde(default)]
    pub fade_out: Option<FadeOut>,
    /// Optional typed-text intro.
    #[serde(default)]
    pub intro: Option<IntroSpec>,
    /// Directory the finished file is written into.
    pub output_dir: PathBuf,
    /// Output file name. Derived from the narration file when absent.
    #[serde(default)]
    pub output_name: Option<String>,
}

impl JobSpec {
    /// Deterministic output file name.
    ///
    /// Priority: explicit name, narration stem, base-video stem with a
    /// `-final` suffix.
    pub fn output_file_name(&self) -> String {
        if let Some(name) = &self.output_name
            && !name.trim().is_empty()
        {
            return name.clone();
        }
        if let Some(narration) = &self.narration
            && let Some(stem) = file_stem(narration)
        {
            return format!("{stem}.mp4");
        }
        match file_stem(&self.base_video) {
            Some(stem) => format!("{stem}-final.mp4"),
            None => "output-final.mp4".to_owned(),
        }
    }

    /// Full path of the finished file.
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(self.output_file_name())
    }
}

fn file_stem(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_parse_accepts_dimensions_and_shorthand() {
        assert_eq!(
            Resolution::parse("1280x720"),
            Resolution {
                width: 1280,
                height: 720
            }
        );
        assert_eq!(
            Resolution::parse("Full HD (1920 X 1080)"),
            Resolution {
                width: 1920,
                height: 1080
            }
        );
        assert_eq!(
            Resolution::parse("720p"),
            Resolution {
                width: 1280,
                height: 720
            }
        );
        assert_eq!(Resolution::parse("garbage"), Resolution::default());
    }

    #[test]
    fn output_name_prefers_explicit_then_narration() {
        let mut job = JobSpec {
            base_video: "clips/base.mp4".into(),
            narration: Some("voice/episode-07 ING.wav".into()),
            music: Vec::new(),
            subtitles: None,
            subtitle_style: SubtitleStyle::default(),
            effect_overlay: None,
            png_overlay: None,
            presenter: None,
            resolution: Resolution::default(),
            codec: CodecPreference::Auto,
            narration_gain_db: 0.0,
            music_gain_db: 0.0,
            fade_out: None,
            intro: None,
            output_dir: "out".into(),
            output_name: None,
        };
        assert_eq!(job.output_file_name(), "episode-07 ING.mp4");

        job.output_name = Some("custom.mp4".into());
        assert_eq!(job.output_file_name(), "custom.mp4");

        job.output_name = None;
        job.narration = None;
        assert_eq!(job.output_file_name(), "base-final.mp4");
    }

    #[test]
    fn job_spec_round_trips_through_json() {
        let json = r#"{
            "base_video": "in.mp4",
            "output_dir": "out",
            "presenter": { "path": "p.mp4", "chroma": {} },
            "fade_out": {}
        }"#;
        let job: JobSpec = serde_json::from_str(json).unwrap();
        assert_eq!(job.resolution, Resolution::default());
        let presenter = job.presenter.as_ref().unwrap();
        assert_eq!(presenter.position, PresenterPosition::BottomCenter);
        assert!(presenter.chroma.is_some());
        assert_eq!(job.fade_out.unwrap().duration, 10.0);
    }
}
