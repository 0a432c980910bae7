//! Lead-in tone played before every spoken announcement.

use crate::audio::pcm::PcmBuffer;
use crate::audio::wav::read_wav_file;
use crate::error::Result;
use std::f32::consts::TAU;
use std::path::Path;

/// Scale samples by a gain in decibels, saturating at the i16 range.
pub fn apply_gain_db(samples: &mut [i16], gain_db: f32) {
    if gain_db == 0.0 {
        return;
    }
    let factor = 10f32.powf(gain_db / 20.0);
    for sample in samples.iter_mut() {
        *sample = (f32::from(*sample) * factor)
            .round()
            .clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16;
    }
}

/// Sine tone with short linear fades to avoid clicks.
pub fn sine(frequency: f32, seconds: f32, amplitude: f32, sample_rate: u32) -> Vec<i16> {
    let len = (seconds * sample_rate as f32) as usize;
    let fade = (sample_rate as usize / 100).min(len / 2).max(1);
    (0..len)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let envelope = (i.min(len - 1 - i) as f32 / fade as f32).min(1.0);
            ((TAU * frequency * t).sin() * amplitude * envelope * f32::from(i16::MAX)) as i16
        })
        .collect()
}

/// Built-in two-note chime used when no pretone file is configured.
pub fn default_chime(sample_rate: u32) -> PcmBuffer {
    let mut samples = sine(880.0, 0.5, 0.5, sample_rate);
    samples.extend(sine(659.25, 0.5, 0.5, sample_rate));
    PcmBuffer::mono(samples, sample_rate)
}

/// Load the lead-in tone: the configured WAV file, or the built-in chime.
///
/// The gain is applied in both cases.
pub fn load_pretone(path: Option<&Path>, sample_rate: u32, gain_db: f32) -> Result<PcmBuffer> {
    let mut pcm = match path {
        Some(path) => read_wav_file(path, sample_rate)?,
        None => default_chime(sample_rate),
    };
    apply_gain_db(&mut pcm.samples, gain_db);
    Ok(pcm)
}
