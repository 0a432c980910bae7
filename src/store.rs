//! Content-addressed archive of relayed waveforms.

use crate::audio::pcm::PcmBuffer;
use crate::audio::wav::wav_bytes;
use crate::error::Result;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;

/// Writes each final waveform once, as `<sha256 of the WAV bytes>.wav`.
#[derive(Debug, Clone)]
pub struct WaveformStore {
    dir: PathBuf,
}

impl WaveformStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Persist `pcm` and return its path.
    ///
    /// If a file with the same content hash already exists it is left as is.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created or the file cannot
    /// be written.
    pub fn persist(&self, pcm: &PcmBuffer) -> Result<PathBuf> {
        let bytes = wav_bytes(pcm)?;
        let name = format!("{:x}.wav", Sha256::digest(&bytes));
        let path = self.dir.join(name);

        if path.exists() {
            log::debug!("waveform already archived: {}", path.display());
            return Ok(path);
        }

        fs::create_dir_all(&self.dir)?;
        // Write then rename so a partial file never carries a valid name
        let partial = path.with_extension("wav.part");
        fs::write(&partial, &bytes)?;
        fs::rename(&partial, &path)?;
        log::info!("archived waveform {}", path.display());
        Ok(path)
    }
}
