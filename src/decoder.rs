//! SAME marker decoder collaborator.
//!
//! A decoder consumes the monitor's raw PCM and emits text lines; header
//! lines contain the start token, end-of-message lines contain `NNNN`. The
//! production decoder is the `samedec` program run as a child process.

use crate::alert::lock;
use crate::error::{RelayError, Result};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::io::{self, BufRead, BufReader, Write};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Line stream produced by a decoder.
pub type DecoderLines = Box<dyn Iterator<Item = io::Result<String>> + Send>;

/// Line reader that tolerates invalid UTF-8.
///
/// Receiver noise can leak stray bytes into decoder output; they are replaced
/// rather than ending the stream. Only a real read error is yielded as `Err`.
pub struct LossyLines<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead> LossyLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }
}

impl<R: BufRead> Iterator for LossyLines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                if self.buf.ends_with(b"\n") {
                    self.buf.pop();
                    if self.buf.ends_with(b"\r") {
                        self.buf.pop();
                    }
                }
                Some(Ok(String::from_utf8_lossy(&self.buf).into_owned()))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// An open decoder: raw PCM goes into `input`, text comes out of `lines`.
pub struct DecoderSession {
    pub input: Box<dyn Write + Send>,
    pub lines: DecoderLines,
    /// Child process to reap when the session ends.
    pub process: Option<Child>,
}

/// Trait for opening decoder sessions, one per monitor.
pub trait MarkerDecoder: Send + Sync {
    fn open(&self, monitor_id: usize) -> Result<DecoderSession>;
}

/// `samedec` child process decoder.
#[derive(Debug, Clone)]
pub struct SamedecDecoder {
    program: String,
    sample_rate: u32,
}

impl SamedecDecoder {
    pub fn new(program: &str, sample_rate: u32) -> Self {
        Self {
            program: program.to_string(),
            sample_rate,
        }
    }

    pub fn args(&self) -> Vec<String> {
        vec!["-r".to_string(), self.sample_rate.to_string()]
    }
}

impl MarkerDecoder for SamedecDecoder {
    fn open(&self, monitor_id: usize) -> Result<DecoderSession> {
        let mut child = Command::new(&self.program)
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| RelayError::DecoderPipe {
                message: format!("[monitor {monitor_id}] failed to launch {}: {}", self.program, e),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| RelayError::DecoderPipe {
            message: format!("[monitor {monitor_id}] decoder stdin unavailable"),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| RelayError::DecoderPipe {
            message: format!("[monitor {monitor_id}] decoder stdout unavailable"),
        })?;

        Ok(DecoderSession {
            input: Box::new(stdin),
            lines: Box::new(LossyLines::new(BufReader::new(stdout))),
            process: Some(child),
        })
    }
}

/// Write sink for [`ScriptedDecoder`] that counts bytes or fails on demand.
struct ScriptedInput {
    bytes: Arc<AtomicUsize>,
    broken: bool,
}

impl Write for ScriptedInput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.broken {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "decoder went away"));
        }
        self.bytes.fetch_add(buf.len(), Ordering::SeqCst);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.broken {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "decoder went away"));
        }
        Ok(())
    }
}

/// Decoder whose output lines are pushed by a test through a channel.
///
/// The line stream ends when the paired sender is dropped. Can be opened once.
pub struct ScriptedDecoder {
    lines: Mutex<Option<Receiver<String>>>,
    bytes: Arc<AtomicUsize>,
    broken_input: bool,
}

impl ScriptedDecoder {
    pub fn new() -> (Self, Sender<String>) {
        let (tx, rx) = unbounded();
        (
            Self {
                lines: Mutex::new(Some(rx)),
                bytes: Arc::new(AtomicUsize::new(0)),
                broken_input: false,
            },
            tx,
        )
    }

    /// Make every write to the decoder input fail with a broken pipe.
    pub fn with_broken_input(mut self) -> Self {
        self.broken_input = true;
        self
    }

    /// Counter of PCM bytes forwarded to this decoder.
    pub fn bytes_forwarded(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.bytes)
    }
}

impl MarkerDecoder for ScriptedDecoder {
    fn open(&self, monitor_id: usize) -> Result<DecoderSession> {
        let rx = lock(&self.lines)
            .take()
            .ok_or_else(|| RelayError::DecoderPipe {
                message: format!("[monitor {monitor_id}] scripted decoder already opened"),
            })?;
        Ok(DecoderSession {
            input: Box::new(ScriptedInput {
                bytes: Arc::clone(&self.bytes),
                broken: self.broken_input,
            }),
            lines: Box::new(rx.into_iter().map(Ok)),
            process: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samedec_args_carry_sample_rate() {
        let decoder = SamedecDecoder::new("samedec", 24000);
        assert_eq!(decoder.args(), vec!["-r", "24000"]);
    }

    #[test]
    fn samedec_missing_binary_is_pipe_error() {
        let decoder = SamedecDecoder::new("/nonexistent/samedec", 24000);
        match decoder.open(3) {
            Err(RelayError::DecoderPipe { message }) => assert!(message.contains("[monitor 3]")),
            Err(other) => panic!("Expected DecoderPipe error, got {other}"),
            Ok(_) => panic!("Expected DecoderPipe error"),
        }
    }

    #[test]
    fn lossy_lines_survive_invalid_utf8() {
        let output: &[u8] =
            b"\xff\xfe\nEAS: ZCZC-WXR-RWT-024031+0015-1231745-KLWX/NWS-\r\nNNNN";
        let lines: Vec<String> = LossyLines::new(output).map(|l| l.unwrap()).collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains('\u{FFFD}'));
        assert_eq!(lines[1], "EAS: ZCZC-WXR-RWT-024031+0015-1231745-KLWX/NWS-");
        assert_eq!(lines[2], "NNNN");
    }

    #[test]
    fn scripted_decoder_streams_lines_until_sender_dropped() {
        let (decoder, tx) = ScriptedDecoder::new();
        let session = decoder.open(1).unwrap();
        tx.send("EAS: ZCZC-WXR-RWT-024031+0015-1231745-KLWX/NWS-".to_string())
            .unwrap();
        tx.send("NNNN".to_string()).unwrap();
        drop(tx);

        let lines: Vec<String> = session.lines.map(|l| l.unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "NNNN");
    }

    #[test]
    fn scripted_decoder_counts_forwarded_bytes() {
        let (decoder, _tx) = ScriptedDecoder::new();
        let counter = decoder.bytes_forwarded();
        let mut session = decoder.open(1).unwrap();
        session.input.write_all(&[0u8; 10]).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn scripted_decoder_broken_input() {
        let (decoder, _tx) = ScriptedDecoder::new();
        let mut session = decoder.with_broken_input().open(1).unwrap();
        let err = session.input.write_all(&[0u8; 2]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn scripted_decoder_opens_once() {
        let (decoder, _tx) = ScriptedDecoder::new();
        assert!(decoder.open(1).is_ok());
        assert!(decoder.open(1).is_err());
    }
}
