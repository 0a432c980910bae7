//! WAV reading and writing, plus a WAV-backed audio source for offline replay.

use crate::audio::pcm::PcmBuffer;
use crate::audio::recorder::AudioSource;
use crate::defaults::{CAPTURE_CHUNK_BYTES, SAMPLE_RATE};
use crate::error::{RelayError, Result};
use std::fs::File;
use std::io::{BufReader, Read, Seek, Write};
use std::path::Path;

/// Parse WAV data and convert it to mono at `target_rate`.
///
/// Accepts 16-bit integer WAV with any channel count and sample rate.
pub fn read_wav<R: Read>(reader: R, target_rate: u32) -> Result<PcmBuffer> {
    let mut wav_reader = hound::WavReader::new(reader).map_err(|e| RelayError::Transcode {
        message: format!("Failed to parse WAV data: {}", e),
    })?;

    let spec = wav_reader.spec();
    let raw_samples: Vec<i16> = wav_reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| RelayError::Transcode {
            message: format!("Failed to read WAV samples: {}", e),
        })?;

    let channels = usize::from(spec.channels.max(1));
    let mono_samples: Vec<i16> = if channels == 1 {
        raw_samples
    } else {
        raw_samples
            .chunks_exact(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / channels as i32) as i16
            })
            .collect()
    };

    Ok(PcmBuffer::mono(
        resample(&mono_samples, spec.sample_rate, target_rate),
        target_rate,
    ))
}

/// Read a WAV file and convert it to mono at `target_rate`.
pub fn read_wav_file(path: &Path, target_rate: u32) -> Result<PcmBuffer> {
    let file = File::open(path)?;
    read_wav(BufReader::new(file), target_rate)
}

/// Encode a buffer as 16-bit PCM WAV into any seekable writer.
pub fn write_wav<W: Write + Seek>(writer: W, pcm: &PcmBuffer) -> Result<()> {
    let spec = hound::WavSpec {
        channels: pcm.channels,
        sample_rate: pcm.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let to_err = |e: hound::Error| RelayError::Other(format!("Failed to write WAV: {}", e));

    let mut wav_writer = hound::WavWriter::new(writer, spec).map_err(to_err)?;
    let mut sample_writer = wav_writer.get_i16_writer(pcm.samples.len() as u32);
    for &sample in &pcm.samples {
        sample_writer.write_sample(sample);
    }
    sample_writer.flush().map_err(to_err)?;
    wav_writer.finalize().map_err(to_err)
}

/// Encode a buffer as WAV bytes in memory.
pub fn wav_bytes(pcm: &PcmBuffer) -> Result<Vec<u8>> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    write_wav(&mut cursor, pcm)?;
    Ok(cursor.into_inner())
}

/// Audio source that replays a WAV recording as if it were a receiver.
///
/// Selected with a `file:` device name; useful for testing the relay offline.
pub struct WavAudioSource {
    name: String,
    samples: Vec<i16>,
    position: usize,
    chunk_size: usize,
}

impl WavAudioSource {
    /// Create from any reader.
    pub fn from_reader(name: &str, reader: impl Read) -> Result<Self> {
        let pcm = read_wav(reader, SAMPLE_RATE).map_err(|e| RelayError::AudioCapture {
            message: e.to_string(),
        })?;
        Ok(Self {
            name: name.to_string(),
            samples: pcm.samples,
            position: 0,
            chunk_size: CAPTURE_CHUNK_BYTES / 2,
        })
    }

    /// Open a WAV file.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| RelayError::AudioDeviceNotFound {
            device: format!("{} ({})", path.display(), e),
        })?;
        Self::from_reader(&path.display().to_string(), BufReader::new(file))
    }
}

impl AudioSource for WavAudioSource {
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        if self.position >= self.samples.len() {
            return Ok(Vec::new());
        }

        let end = std::cmp::min(self.position + self.chunk_size, self.samples.len());
        let chunk = self.samples[self.position..end].to_vec();
        self.position = end;

        Ok(chunk)
    }

    fn is_finite(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Simple linear interpolation resampling.
pub fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = (source_pos.floor() as usize).min(samples.len() - 1);
            let fraction = source_pos - source_idx as f64;

            if source_idx + 1 >= samples.len() {
                samples[source_idx]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as i16
            }
        })
        .collect()
}
