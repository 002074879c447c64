//! Font loading and frame rasterization for the typed intro.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use fontdue::{Font, FontSettings};
use image::RgbImage;
use tracing::debug;

use crate::error::{VireoError, VireoResult};

/// Well-known font locations tried after the caller-provided candidates.
/// `(path, is_bold)` pairs; regular faces double as fake-bold sources.
const SYSTEM_FONTS: &[(&str, bool)] = &[
    ("/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf", true),
    ("/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf", false),
    ("/usr/share/fonts/TTF/DejaVuSans-Bold.ttf", true),
    ("/usr/share/fonts/TTF/DejaVuSans.ttf", false),
    ("C:\\Windows\\Fonts\\arialbd.ttf", true),
    ("C:\\Windows\\Fonts\\arial.ttf", false),
    ("/System/Library/Fonts/Supplemental/Arial Bold.ttf", true),
    ("/System/Library/Fonts/Supplemental/Arial.ttf", false),
];

/// A loaded intro font at a fixed pixel size.
pub struct IntroFont {
    font: Font,
    size: f32,
    /// Double-strike glyphs because a bold face was requested but only a
    /// regular one resolved.
    fake_bold: bool,
}

impl IntroFont {
    /// Pixel size the font was loaded at.
    pub fn size(&self) -> f32 {
        self.size
    }

    /// Advance width of `text` in pixels.
    pub fn measure(&self, text: &str) -> f32 {
        text.chars()
            .map(|c| self.font.metrics(c, self.size).advance_width)
            .sum()
    }
}

/// Load the intro font from the candidate chain: the intro's own font file,
/// the subtitle font, then well-known system locations.
pub fn load_intro_font(
    intro_font: Option<&Path>,
    subtitle_font: Option<&Path>,
    bold: bool,
    size: f32,
) -> VireoResult<IntroFont> {
    let mut candidates: Vec<(PathBuf, bool)> = Vec::new();
    if let Some(path) = intro_font {
        candidates.push((path.to_path_buf(), bold));
    }
    if let Some(path) = subtitle_font {
        candidates.push((path.to_path_buf(), bold));
    }
    for (path, is_bold) in SYSTEM_FONTS {
        if bold || !is_bold {
            candidates.push((PathBuf::from(path), bold && !is_bold));
        }
    }

    for (path, fake_bold) in candidates {
        let Ok(bytes) = std::fs::read(&path) else {
            continue;
        };
        match Font::from_bytes(bytes, FontSettings::default()) {
            Ok(font) => {
                debug!(font = %path.display(), fake_bold, "intro font loaded");
                return Ok(IntroFont {
                    font,
                    size,
                    fake_bold,
                });
            }
            Err(err) => {
                debug!(font = %path.display(), err, "unusable intro font candidate");
            }
        }
    }

    Err(VireoError::config(
        "no usable intro font found; set the intro font_file explicitly",
    ))
}

/// Word-wrap `text` so every line fits in `max_width` pixels as measured by
/// `font`. Words longer than a full line are broken per character.
pub fn wrap_text_to_width(text: &str, font: &IntroFont, max_width: f32) -> Vec<String> {
    if max_width <= 0.0 {
        return vec![text.to_owned()];
    }

    let mut lines = Vec::new();
    let paragraphs: Vec<&str> = if text.is_empty() {
        vec![""]
    } else {
        text.split('\n').collect()
    };

    for paragraph in paragraphs {
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        if words.is_empty() {
            lines.push(String::new());
            continue;
        }

        let mut current = String::new();
        for word in words {
            let tentative = if current.is_empty() {
                word.to_owned()
            } else {
                format!("{current} {word}")
            };
            if font.measure(&tentative) <= max_width {
                current = tentative;
                continue;
            }

            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }

            if font.measure(word) <= max_width {
                current = word.to_owned();
                continue;
            }

            // Break an overlong word per character.
            let mut chunk = String::new();
            for ch in word.chars() {
                let mut candidate = chunk.clone();
                candidate.push(ch);
                if font.measure(&candidate) <= max_width || chunk.is_empty() {
                    chunk = candidate;
                } else {
                    lines.push(chunk);
                    chunk = ch.to_string();
                }
            }
            current = chunk;
        }

        if !current.is_empty() {
            lines.push(current);
        }
    }

    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

#[derive(Clone)]
struct GlyphBitmap {
    metrics: fontdue::Metrics,
    coverage: Vec<u8>,
}

/// Rasterizes centered, word-wrapped text frames on a black background.
pub struct FramePainter {
    font: IntroFont,
    width: u32,
    height: u32,
    max_text_width: f32,
    line_gap: u32,
    glyph_cache: HashMap<char, GlyphBitmap>,
}

impl FramePainter {
    /// Painter for `width` x `height` frames; text wraps at 80% of the width.
    pub fn new(font: IntroFont, width: u32, height: u32) -> Self {
        let line_gap = ((font.size() * 0.3) as u32).max(10);
        Self {
            font,
            width,
            height,
            max_text_width: width as f32 * 0.8,
            line_gap,
            glyph_cache: HashMap::new(),
        }
    }

    /// Paint one frame showing `text`, centered both ways.
    pub fn paint(&mut self, text: &str) -> RgbImage {
        let mut frame = RgbImage::new(self.width, self.height);

        let lines = wrap_text_to_width(text, &self.font, self.max_text_width);
        let metrics = self
            .font
            .font
            .horizontal_line_metrics(self.font.size)
            .unwrap_or(fontdue::LineMetrics {
                ascent: self.font.size * 0.8,
                descent: -(self.font.size * 0.2),
                line_gap: 0.0,
                new_line_size: self.font.size,
            });
        let line_height = (metrics.ascent - metrics.descent).ceil() as u32;
        let total_height =
            line_height * lines.len() as u32 + self.line_gap * lines.len().saturating_sub(1) as u32;
        let mut y = (self.height.saturating_sub(total_height)) / 2;

        let offsets: &[(i32, i32)] = if self.font.fake_bold {
            &[(0, 0), (1, 0), (0, 1), (1, 1)]
        } else {
            &[(0, 0)]
        };

        for line in &lines {
            if !line.is_empty() {
                let line_width = self.font.measure(line);
                let x0 = ((self.width as f32 - line_width) / 2.0).max(0.0);
                let baseline = y as f32 + metrics.ascent;
                for (dx, dy) in offsets {
                    self.draw_line(&mut frame, line, x0 + *dx as f32, baseline + *dy as f32);
                }
            }
            y += line_height + self.line_gap;
        }

        frame
    }

    fn draw_line(&mut self, frame: &mut RgbImage, line: &str, x0: f32, baseline: f32) {
        let mut pen_x = x0;
        for ch in line.chars() {
            let glyph = match self.glyph_cache.get(&ch) {
                Some(glyph) => glyph.clone(),
                None => {
                    let (metrics, coverage) = self.font.font.rasterize(ch, self.font.size);
                    let glyph = GlyphBitmap { metrics, coverage };
                    self.glyph_cache.insert(ch, glyph.clone());
                    glyph
                }
            };

            let gx = (pen_x + glyph.metrics.xmin as f32).round() as i32;
            let gy = (baseline - (glyph.metrics.height as i32 + glyph.metrics.ymin) as f32).round()
                as i32;
            blend_glyph(frame, gx, gy, &glyph);
            pen_x += glyph.metrics.advance_width;
        }
    }
}

fn blend_glyph(frame: &mut RgbImage, gx: i32, gy: i32, glyph: &GlyphBitmap) {
    let (fw, fh) = (frame.width() as i32, frame.height() as i32);
    for row in 0..glyph.metrics.height as i32 {
        let py = gy + row;
        if py < 0 || py >= fh {
            continue;
        }
        for col in 0..glyph.metrics.width as i32 {
            let px = gx + col;
            if px < 0 || px >= fw {
                continue;
            }
            let coverage =
                glyph.coverage[(row * glyph.metrics.width as i32 + col) as usize] as u16;
            if coverage == 0 {
                continue;
            }
            let pixel = frame.get_pixel_mut(px as u32, py as u32);
            for channel in pixel.0.iter_mut() {
                let existing = *channel as u16;
                *channel = (existing + (255 - existing) * coverage / 255).min(255) as u8;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_font() -> Option<IntroFont> {
        load_intro_font(None, None, false, 32.0).ok()
    }

    #[test]
    fn wrapping_respects_the_measured_width() {
        let Some(font) = test_font() else {
            // No system font in this environment; nothing to measure with.
            return;
        };
        let lines = wrap_text_to_width("one two three four five six", &font, 120.0);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(font.measure(line) <= 120.0 + f32::EPSILON);
        }
    }

    #[test]
    fn empty_text_wraps_to_a_single_empty_line() {
        let Some(font) = test_font() else {
            return;
        };
        assert_eq!(wrap_text_to_width("", &font, 200.0), vec![String::new()]);
    }

    #[test]
    fn overlong_words_break_per_character() {
        let Some(font) = test_font() else {
            return;
        };
        let lines = wrap_text_to_width("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", &font, 80.0);
        assert!(lines.len() > 1);
    }

    #[test]
    fn painted_frame_has_content_only_when_text_is_present() {
        let Some(font) = test_font() else {
            return;
        };
        let mut painter = FramePainter::new(font, 320, 180);
        let blank = painter.paint("");
        assert!(blank.pixels().all(|p| p.0 == [0, 0, 0]));

        let frame = painter.paint("Hi");
        assert!(frame.pixels().any(|p| p.0 != [0, 0, 0]));
    }
}
