//! SRT parsing and styled ASS generation for subtitle burn-in.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use tracing::info;

use crate::error::VireoResult;
use crate::job::{Resolution, SubtitleStyle};

/// One parsed SRT cue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SrtCue {
    /// Start time as ASS `H:MM:SS.cc`.
    pub start: String,
    /// End time as ASS `H:MM:SS.cc`.
    pub end: String,
    /// Cue text with line breaks collapsed to ASS `\N`.
    pub text: String,
}

/// Convert an SRT file into a styled ASS file next to `out_dir`.
///
/// Returns the path to burn in: the generated ASS, or the original subtitle
/// file unchanged when no cue could be parsed (the `subtitles` filter copes
/// with raw SRT, it just loses the styling).
pub fn style_subtitles(
    subtitle_path: &Path,
    style: &SubtitleStyle,
    out_dir: &Path,
    resolution: Resolution,
) -> VireoResult<PathBuf> {
    let content = std::fs::read_to_string(subtitle_path)
        .with_context(|| format!("failed to read subtitles '{}'", subtitle_path.display()))?;

    let cues = parse_srt(&content);
    if cues.is_empty() {
        return Ok(subtitle_path.to_path_buf());
    }

    let stem = subtitle_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "subtitles".to_owned());
    let out_path = out_dir.join(format!("styled_{stem}.ass"));

    let document = render_ass(&cues, style, resolution);
    std::fs::write(&out_path, document)
        .with_context(|| format!("failed to write '{}'", out_path.display()))?;

    info!(
        from = %subtitle_path.display(),
        to = %out_path.display(),
        cues = cues.len(),
        "converted SRT to styled ASS"
    );
    Ok(out_path)
}

/// Parse SRT content into cues. Malformed blocks are skipped.
pub fn parse_srt(content: &str) -> Vec<SrtCue> {
    let normalized = content.replace('\r', "");
    let mut cues = Vec::new();

    for block in normalized.split("\n\n") {
        let lines: Vec<&str> = block
            .lines()
            .map(|l| l.trim_start_matches('\u{feff}').trim())
            .filter(|l| !l.is_empty())
            .collect();
        if lines.len() < 2 {
            continue;
        }

        // The timing line is the first line, or the second when a numeric
        // index precedes it.
        let (timing_idx, timing) = if let Some(t) = parse_timing(lines[0]) {
            (0, t)
        } else if let Some(t) = parse_timing(lines[1]) {
            (1, t)
        } else {
            continue;
        };

        let text_lines = &lines[timing_idx + 1..];
        if text_lines.is_empty() {
            continue;
        }

        cues.push(SrtCue {
            start: timing.0,
            end: timing.1,
            text: text_lines.join("\\N"),
        });
    }

    cues
}

fn parse_timing(line: &str) -> Option<(String, String)> {
    let (start, end) = line.split_once("-->")?;
    Some((parse_timestamp(start.trim())?, parse_timestamp(end.trim())?))
}

fn parse_timestamp(value: &str) -> Option<String> {
    let (clock, millis) = value.split_once(',')?;
    let mut parts = clock.split(':');
    let hours: u32 = parts.next()?.parse().ok()?;
    let minutes: u32 = parts.next()?.parse().ok()?;
    let seconds: u32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || minutes > 59 || seconds > 59 {
        return None;
    }
    let millis: u32 = millis.trim().parse().ok()?;
    Some(format!(
        "{hours}:{minutes:02}:{seconds:02}.{:02}",
        (millis / 10).min(99)
    ))
}

/// Render a full ASS document with one style and one dialogue line per cue.
fn render_ass(cues: &[SrtCue], style: &SubtitleStyle, resolution: Resolution) -> String {
    let font_name = style
        .font_file
        .as_ref()
        .and_then(|f| f.file_stem())
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Arial".to_owned());

    let margin_v = (style.font_size as f64 * 0.7) as u32;
    let margin_lr = (style.font_size as f64 * 0.6) as u32;

    let style_line = [
        "Default".to_owned(),
        font_name,
        style.font_size.to_string(),
        hex_to_ass(&style.text_color, 0),
        hex_to_ass(&style.text_color, 0),
        hex_to_ass(&style.outline_color, 0),
        hex_to_ass(&style.back_color, 255),
        if style.bold { "-1" } else { "0" }.to_owned(),
        if style.italic { "-1" } else { "0" }.to_owned(),
        "0".to_owned(),
        "0".to_owned(),
        "100".to_owned(),
        "100".to_owned(),
        "0".to_owned(),
        "0".to_owned(),
        style.border_style.to_string(),
        style.outline.to_string(),
        style.shadow.to_string(),
        style.alignment.to_string(),
        margin_lr.to_string(),
        margin_lr.to_string(),
        margin_v.to_string(),
        "1".to_owned(),
    ]
    .join(",");

    let mut out = vec![
        "[Script Info]".to_owned(),
        format!("PlayResX: {}", resolution.width),
        format!("PlayResY: {}", resolution.height),
        "WrapStyle: 2".to_owned(),
        "ScaledBorderAndShadow: yes".to_owned(),
        String::new(),
        "[V4+ Styles]".to_owned(),
        "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, \
         BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, \
         BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding"
            .to_owned(),
        format!("Style: {style_line}"),
        String::new(),
        "[Events]".to_owned(),
        "Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text".to_owned(),
    ];

    for cue in cues {
        out.push(format!(
            "Dialogue: 0,{},{},Default,,0000,0000,0000,,{}",
            cue.start, cue.end, cue.text
        ));
    }

    out.join("\n")
}

/// `#RRGGBB` to ASS `&HAABBGGRR` (note the BGR order; AA=0 is opaque).
fn hex_to_ass(hex: &str, alpha: u8) -> String {
    let hex = hex.trim_start_matches('#');
    let expanded: String = if hex.len() == 3 {
        hex.chars().flat_map(|c| [c, c]).collect()
    } else {
        hex.to_owned()
    };
    let bytes = if expanded.len() == 6 {
        u32::from_str_radix(&expanded, 16).unwrap_or(0xFFFFFF)
    } else {
        0xFFFFFF
    };
    let r = (bytes >> 16) & 0xFF;
    let g = (bytes >> 8) & 0xFF;
    let b = bytes & 0xFF;
    format!("&H{alpha:02X}{b:02X}{g:02X}{r:02X}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "1\n00:00:01,000 --> 00:00:03,500\nHello there\nsecond line\n\n2\n00:00:04,000 --> 00:00:06,000\nNext cue\n";

    #[test]
    fn parses_indexed_cues_with_multiline_text() {
        let cues = parse_srt(SAMPLE);
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].start, "0:00:01.00");
        assert_eq!(cues[0].end, "0:00:03.50");
        assert_eq!(cues[0].text, "Hello there\\Nsecond line");
        assert_eq!(cues[1].text, "Next cue");
    }

    #[test]
    fn skips_malformed_blocks() {
        let cues = parse_srt("garbage\nwithout timing\n\n1\n00:00:01,000 --> 00:00:02,000\nok\n");
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].text, "ok");
    }

    #[test]
    fn colors_convert_to_bgr_with_alpha() {
        assert_eq!(hex_to_ass("#FFFFFF", 0), "&H00FFFFFF");
        assert_eq!(hex_to_ass("#FF8000", 0), "&H000080FF");
        assert_eq!(hex_to_ass("#000000", 255), "&HFF000000");
        assert_eq!(hex_to_ass("#F80", 0), "&H000088FF");
    }

    #[test]
    fn rendered_document_carries_play_resolution_and_style() {
        let cues = parse_srt(SAMPLE);
        let style = SubtitleStyle::default();
        let doc = render_ass(
            &cues,
            &style,
            Resolution {
                width: 1280,
                height: 720,
            },
        );
        assert!(doc.contains("PlayResX: 1280"));
        assert!(doc.contains("PlayResY: 720"));
        assert!(doc.contains("Style: Default,Arial,28,&H00FFFFFF"));
        assert!(doc.contains("Dialogue: 0,0:00:01.00,0:00:03.50,Default,,0000,0000,0000,,Hello there\\Nsecond line"));
    }

    #[test]
    fn unparseable_file_falls_back_to_the_original_path() {
        let dir = tempfile::tempdir().unwrap();
        let srt = dir.path().join("broken.srt");
        std::fs::write(&srt, "no cues here").unwrap();
        let out = style_subtitles(
            &srt,
            &SubtitleStyle::default(),
            dir.path(),
            Resolution::default(),
        )
        .unwrap();
        assert_eq!(out, srt);
    }
}
