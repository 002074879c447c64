//! Keystroke audio synthesis for the typed intro.

use std::f64::consts::PI;
use std::path::Path;

use anyhow::Context as _;

use crate::error::VireoResult;

/// Sample rate of the synthesized keystroke track.
pub const SAMPLE_RATE: u32 = 44_100;

const AMPLITUDE: f64 = 0.35;
const TONE_HZ: f64 = 1_100.0;
/// Fraction of each character slot occupied by the tone burst.
const TONE_RATIO: f64 = 0.65;

/// Synthesize the keystroke track as mono i16 PCM.
///
/// Each non-whitespace character gets a short enveloped tone burst followed
/// by silence, sized to `char_duration`; whitespace is silent. A silent tail
/// of `hold_duration` matches the video hold.
pub fn synthesize_typing_audio(text: &str, char_duration: f64, hold_duration: f64) -> Vec<i16> {
    let mut samples: Vec<i16> = Vec::new();

    for ch in text.chars() {
        let total_samples = ((char_duration * SAMPLE_RATE as f64).round() as usize).max(1);
        let tone_samples = if ch.is_whitespace() {
            0
        } else {
            (((total_samples as f64) * TONE_RATIO).round() as usize)
                .max(1)
                .min(total_samples)
        };

        for n in 0..tone_samples {
            let envelope = (PI * n as f64 / tone_samples.max(1) as f64).sin();
            let tone = (2.0 * PI * TONE_HZ * n as f64 / SAMPLE_RATE as f64).sin();
            samples.push((envelope * AMPLITUDE * 32_767.0 * tone) as i16);
        }
        samples.extend(std::iter::repeat_n(0i16, total_samples - tone_samples));
    }

    let hold_samples = (hold_duration * SAMPLE_RATE as f64).round().max(0.0) as usize;
    samples.extend(std::iter::repeat_n(0i16, hold_samples));
    samples
}

/// Synthesize the keystroke track and write it as a mono 16-bit WAV.
///
/// Returns the written duration in seconds.
pub fn generate_typing_audio(
    text: &str,
    char_duration: f64,
    hold_duration: f64,
    output: &Path,
) -> VireoResult<f64> {
    let samples = synthesize_typing_audio(text, char_duration, hold_duration);

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(output, spec)
        .with_context(|| format!("failed to create '{}'", output.display()))?;
    for sample in &samples {
        writer
            .write_sample(*sample)
            .context("failed to write audio sample")?;
    }
    writer.finalize().context("failed to finalize wav")?;

    Ok(samples.len() as f64 / SAMPLE_RATE as f64)
}
