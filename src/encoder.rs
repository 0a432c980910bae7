//! SAME re-encoding of a recorded alert.
//!
//! The relayed waveform is: three header bursts, the recorded alert audio,
//! then three end-of-message bursts. Each burst is a 16-byte preamble followed
//! by the ASCII text, sent as AFSK with bytes least significant bit first.
//! No attention tone is generated.

use crate::alert::lock;
use crate::audio::pcm::PcmBuffer;
use crate::defaults::EOM_TOKEN;
use crate::error::{RelayError, Result};
use std::f64::consts::TAU;
use std::sync::{Arc, Mutex};

/// SAME bit rate (520 5/6 baud).
pub const BAUD: f64 = 520.0 + 5.0 / 6.0;
/// Frequency of a 1 bit.
pub const MARK_HZ: f64 = BAUD * 4.0;
/// Frequency of a 0 bit.
pub const SPACE_HZ: f64 = BAUD * 3.0;
const PREAMBLE: [u8; 16] = [0xAB; 16];
const BURSTS: usize = 3;
const GAP_SECS: f64 = 1.0;

/// Trait for producing the final relay waveform.
pub trait AlertEncoder: Send {
    /// Encode `header` around the recorded `audio`.
    fn encode(&self, header: &str, audio: &[i16]) -> Result<PcmBuffer>;
}

/// Native SAME AFSK encoder.
#[derive(Debug, Clone)]
pub struct SameEncoder {
    sample_rate: u32,
    amplitude: f64,
}

impl SameEncoder {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            amplitude: 0.5,
        }
    }

    /// Peak level of the data bursts, 0.0 to 1.0.
    pub fn with_amplitude(mut self, amplitude: f64) -> Self {
        self.amplitude = amplitude.clamp(0.0, 1.0);
        self
    }

    /// Samples for one burst: preamble plus `text`.
    pub fn burst(&self, text: &str) -> Vec<i16> {
        let rate = f64::from(self.sample_rate);
        let samples_per_bit = rate / BAUD;
        let peak = self.amplitude * f64::from(i16::MAX);

        let bytes = PREAMBLE.iter().copied().chain(text.bytes());
        let mut out = Vec::new();
        let mut phase = 0.0f64;
        // Fractional bit boundaries keep the overall bit rate exact
        let mut boundary = 0.0f64;
        for byte in bytes {
            for bit in 0..8 {
                let freq = if (byte >> bit) & 1 == 1 { MARK_HZ } else { SPACE_HZ };
                boundary += samples_per_bit;
                let step = TAU * freq / rate;
                while (out.len() as f64) < boundary.round() {
                    out.push((phase.sin() * peak) as i16);
                    phase = (phase + step) % TAU;
                }
            }
        }
        out
    }

    fn silence(&self) -> Vec<i16> {
        vec![0; (GAP_SECS * f64::from(self.sample_rate)) as usize]
    }

    fn repeated(&self, text: &str, out: &mut Vec<i16>) {
        let burst = self.burst(text);
        let gap = self.silence();
        for _ in 0..BURSTS {
            out.extend_from_slice(&burst);
            out.extend_from_slice(&gap);
        }
    }
}

impl AlertEncoder for SameEncoder {
    fn encode(&self, header: &str, audio: &[i16]) -> Result<PcmBuffer> {
        if header.is_empty() {
            return Err(RelayError::Encode {
                message: "empty header".to_string(),
            });
        }
        if !header.is_ascii() {
            return Err(RelayError::Encode {
                message: format!("header is not ASCII: {header:?}"),
            });
        }

        let mut samples = Vec::new();
        self.repeated(header, &mut samples);
        samples.extend_from_slice(audio);
        samples.extend(self.silence());
        self.repeated(EOM_TOKEN, &mut samples);

        Ok(PcmBuffer::mono(samples, self.sample_rate))
    }
}

/// One call recorded by [`MockEncoder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeCall {
    pub header: String,
    pub audio_len: usize,
}

/// Encoder that records its inputs and returns the audio unchanged.
#[derive(Debug, Clone, Default)]
pub struct MockEncoder {
    calls: Arc<Mutex<Vec<EncodeCall>>>,
    should_fail: bool,
}

impl MockEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    pub fn calls(&self) -> Vec<EncodeCall> {
        lock(&self.calls).clone()
    }
}

impl AlertEncoder for MockEncoder {
    fn encode(&self, header: &str, audio: &[i16]) -> Result<PcmBuffer> {
        if self.should_fail {
            return Err(RelayError::Encode {
                message: "mock encoder failure".to_string(),
            });
        }
        lock(&self.calls).push(EncodeCall {
            header: header.to_string(),
            audio_len: audio.len(),
        });
        // Never empty, so the final waveform is always distinguishable
        let mut samples = vec![i16::MAX];
        samples.extend_from_slice(audio);
        Ok(PcmBuffer::canonical(samples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Count sign changes, a rough frequency estimate.
    fn zero_crossings(samples: &[i16]) -> usize {
        samples
            .windows(2)
            .filter(|w| (w[0] < 0) != (w[1] < 0))
            .count()
    }

    #[test]
    fn frequencies_are_multiples_of_baud() {
        assert!((MARK_HZ - 2083.333).abs() < 0.01);
        assert!((SPACE_HZ - 1562.5).abs() < 0.01);
    }

    #[test]
    fn burst_length_matches_bit_rate() {
        let encoder = SameEncoder::new(24000);
        let burst = encoder.burst("NNNN");
        let bits = (16 + 4) * 8;
        let expected = (bits as f64 * 24000.0 / BAUD).round() as usize;
        assert_eq!(burst.len(), expected);
    }

    #[test]
    fn mark_bits_oscillate_faster_than_space_bits() {
        let encoder = SameEncoder::new(48000);
        // 0x7F is mostly mark, 0x00 all space; skip the preamble
        let preamble_len = encoder.burst("").len();
        let marks = &encoder.burst("\u{7f}")[preamble_len..];
        let spaces = &encoder.burst("\0")[preamble_len..];
        assert!(zero_crossings(marks) > zero_crossings(spaces));
    }

    #[test]
    fn encode_wraps_audio_with_bursts() {
        let encoder = SameEncoder::new(24000);
        let header = "ZCZC-WXR-TOR-024031+0030-1231745-JON435  -";
        let audio = vec![1234i16; 100];
        let pcm = encoder.encode(header, &audio).unwrap();

        let header_part = 3 * (encoder.burst(header).len() + 24000);
        let eom_part = 24000 + 3 * (encoder.burst("NNNN").len() + 24000);
        assert_eq!(pcm.samples.len(), header_part + audio.len() + eom_part);
        assert_eq!(&pcm.samples[header_part..header_part + 100], &audio[..]);
        assert_eq!(pcm.sample_rate, 24000);
        assert_eq!(pcm.channels, 1);
    }

    #[test]
    fn amplitude_bounds_peak() {
        let encoder = SameEncoder::new(24000).with_amplitude(0.25);
        let peak = encoder.burst("A").iter().map(|s| s.unsigned_abs()).max().unwrap();
        assert!(peak <= (0.25 * f64::from(i16::MAX)) as u16 + 1);
        assert!(peak > 7000);
    }

    #[test]
    fn encode_rejects_bad_headers() {
        let encoder = SameEncoder::new(24000);
        assert!(matches!(encoder.encode("", &[]), Err(RelayError::Encode { .. })));
        assert!(matches!(
            encoder.encode("ZCZC-É-", &[]),
            Err(RelayError::Encode { .. })
        ));
    }

    #[test]
    fn mock_encoder_records_calls() {
        let encoder = MockEncoder::new();
        let pcm = encoder.encode("ZCZC-X-", &[1, 2]).unwrap();
        assert_eq!(pcm.samples, vec![i16::MAX, 1, 2]);
        assert_eq!(
            encoder.calls(),
            vec![EncodeCall {
                header: "ZCZC-X-".to_string(),
                audio_len: 2
            }]
        );
        assert!(MockEncoder::new().with_failure().encode("Z", &[]).is_err());
    }
}
