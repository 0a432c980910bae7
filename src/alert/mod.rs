//! Alert data model shared between monitors and the processor.
//!
//! An [`ActiveAlert`] is created by a monitor the moment a new SAME header is
//! detected and is enqueued immediately, while its audio is still being
//! recorded. The recording buffer and both completion signals live inside the
//! alert behind locks, so the monitor's feeder, the monitor's scanner and the
//! processor never share unguarded state.

pub mod describe;
pub mod header;

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub use describe::{HeaderDescriber, SameDescriber};
pub use header::{SameHeader, header_hash, substitute_station};

/// Lock a mutex, recovering the data if another thread panicked while holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One-shot completion signal.
///
/// Set at most once; later calls to [`Completion::set`] are no-ops. Any number
/// of threads may wait on it.
#[derive(Debug, Default)]
pub struct Completion {
    done: Mutex<bool>,
    cond: Condvar,
}

impl Completion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the signal. Returns `true` if this call was the one that set it.
    pub fn set(&self) -> bool {
        let mut done = lock(&self.done);
        if *done {
            return false;
        }
        *done = true;
        self.cond.notify_all();
        true
    }

    pub fn is_set(&self) -> bool {
        *lock(&self.done)
    }

    /// Block until the signal is set.
    pub fn wait(&self) {
        let mut done = lock(&self.done);
        while !*done {
            done = self
                .cond
                .wait(done)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block until the signal is set or `timeout` elapses.
    ///
    /// Returns `true` if the signal is set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let done = lock(&self.done);
        let (done, _) = self
            .cond
            .wait_timeout_while(done, timeout, |done| !*done)
            .unwrap_or_else(PoisonError::into_inner);
        *done
    }
}

/// How a recording was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingEnd {
    /// End-of-message token seen on the monitor.
    EndOfMessage,
    /// A newer, distinct header started on the same monitor.
    Superseded,
    /// The monitor's capture or decoder stream ended.
    MonitorStopped,
    /// The processor gave up waiting for the end-of-message.
    Expired,
}

#[derive(Debug)]
enum Recording {
    Open(Vec<i16>),
    Frozen {
        samples: Arc<[i16]>,
        end: RecordingEnd,
    },
}

/// A detected, non-duplicate alert moving through the relay.
#[derive(Debug)]
pub struct ActiveAlert {
    header: String,
    decoded_text: String,
    monitor_id: usize,
    detected_at: Instant,
    recording: Mutex<Recording>,
    announcement_done: Completion,
    recording_done: Completion,
}

impl ActiveAlert {
    pub fn new(
        header: impl Into<String>,
        decoded_text: impl Into<String>,
        monitor_id: usize,
        detected_at: Instant,
    ) -> Self {
        Self {
            header: header.into(),
            decoded_text: decoded_text.into(),
            monitor_id,
            detected_at,
            recording: Mutex::new(Recording::Open(Vec::new())),
            announcement_done: Completion::new(),
            recording_done: Completion::new(),
        }
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn decoded_text(&self) -> &str {
        &self.decoded_text
    }

    pub fn monitor_id(&self) -> usize {
        self.monitor_id
    }

    pub fn detected_at(&self) -> Instant {
        self.detected_at
    }

    /// Append captured samples to the open recording.
    ///
    /// Returns `false` once the recording is frozen; the samples are dropped.
    pub fn append(&self, samples: &[i16]) -> bool {
        match &mut *lock(&self.recording) {
            Recording::Open(buffer) => {
                buffer.extend_from_slice(samples);
                true
            }
            Recording::Frozen { .. } => false,
        }
    }

    /// Freeze the recording and set `recording_done`.
    ///
    /// Only the first call has an effect; it returns `true`.
    pub fn finish_recording(&self, end: RecordingEnd) -> bool {
        {
            let mut recording = lock(&self.recording);
            let samples = match &mut *recording {
                Recording::Open(buffer) => std::mem::take(buffer),
                Recording::Frozen { .. } => return false,
            };
            *recording = Recording::Frozen {
                samples: samples.into(),
                end,
            };
        }
        self.recording_done.set();
        true
    }

    pub fn is_recording(&self) -> bool {
        matches!(*lock(&self.recording), Recording::Open(_))
    }

    /// Number of samples captured so far.
    pub fn recorded_len(&self) -> usize {
        match &*lock(&self.recording) {
            Recording::Open(buffer) => buffer.len(),
            Recording::Frozen { samples, .. } => samples.len(),
        }
    }

    /// The frozen recording, or `None` while still recording.
    pub fn recorded_audio(&self) -> Option<Arc<[i16]>> {
        match &*lock(&self.recording) {
            Recording::Open(_) => None,
            Recording::Frozen { samples, .. } => Some(Arc::clone(samples)),
        }
    }

    /// Why the recording was closed, or `None` while still recording.
    pub fn recording_end(&self) -> Option<RecordingEnd> {
        match &*lock(&self.recording) {
            Recording::Open(_) => None,
            Recording::Frozen { end, .. } => Some(*end),
        }
    }

    pub fn announcement_done(&self) -> &Completion {
        &self.announcement_done
    }

    pub fn recording_done(&self) -> &Completion {
        &self.recording_done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn alert() -> ActiveAlert {
        ActiveAlert::new(
            "ZCZC-WXR-TOR-024031+0030-1231745-KLWX/NWS-",
            "Tornado Warning",
            1,
            Instant::now(),
        )
    }

    #[test]
    fn completion_sets_once() {
        let completion = Completion::new();
        assert!(!completion.is_set());
        assert!(completion.set());
        assert!(!completion.set());
        assert!(completion.is_set());
    }

    #[test]
    fn completion_wait_returns_after_set_from_other_thread() {
        let completion = Arc::new(Completion::new());
        let setter = Arc::clone(&completion);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            setter.set();
        });
        completion.wait();
        assert!(completion.is_set());
        handle.join().unwrap();
    }

    #[test]
    fn completion_wait_timeout_expires_when_unset() {
        let completion = Completion::new();
        assert!(!completion.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn completion_wait_timeout_returns_immediately_when_set() {
        let completion = Completion::new();
        completion.set();
        assert!(completion.wait_timeout(Duration::from_secs(10)));
    }

    #[test]
    fn new_alert_is_recording_and_empty() {
        let alert = alert();
        assert!(alert.is_recording());
        assert_eq!(alert.recorded_len(), 0);
        assert!(alert.recorded_audio().is_none());
        assert!(!alert.recording_done().is_set());
        assert!(!alert.announcement_done().is_set());
    }

    #[test]
    fn append_accumulates_until_finished() {
        let alert = alert();
        assert!(alert.append(&[1, 2, 3]));
        assert!(alert.append(&[4]));
        assert!(alert.finish_recording(RecordingEnd::EndOfMessage));

        assert!(!alert.append(&[5, 6]));
        assert_eq!(alert.recorded_audio().unwrap().as_ref(), &[1, 2, 3, 4]);
        assert_eq!(alert.recording_end(), Some(RecordingEnd::EndOfMessage));
        assert!(alert.recording_done().is_set());
    }

    #[test]
    fn finish_recording_only_first_call_wins() {
        let alert = alert();
        alert.append(&[7; 10]);
        assert!(alert.finish_recording(RecordingEnd::Expired));
        assert!(!alert.finish_recording(RecordingEnd::EndOfMessage));
        assert_eq!(alert.recording_end(), Some(RecordingEnd::Expired));
        assert_eq!(alert.recorded_len(), 10);
    }

    #[test]
    fn accessors_return_creation_values() {
        let alert = alert();
        assert_eq!(alert.header(), "ZCZC-WXR-TOR-024031+0030-1231745-KLWX/NWS-");
        assert_eq!(alert.decoded_text(), "Tornado Warning");
        assert_eq!(alert.monitor_id(), 1);
    }
}
