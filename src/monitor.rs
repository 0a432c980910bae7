//! Per-receiver monitor: feeds raw audio to the SAME decoder and records
//! alert audio between a header and its end-of-message.
//!
//! Each monitor runs two threads. The feeder reads the audio source, forwards
//! every chunk to the decoder and appends it to the current alert. The scanner
//! reads decoder lines and opens or closes alerts. Both share one guarded
//! slot holding the current alert.

use crate::alert::header::{extract_header, is_end_of_message};
use crate::alert::{ActiveAlert, HeaderDescriber, RecordingEnd, header_hash, lock};
use crate::audio::pcm::samples_to_le_bytes;
use crate::audio::recorder::AudioSource;
use crate::clock::{Clock, SystemClock};
use crate::decoder::{DecoderLines, MarkerDecoder};
use crate::dedup::AlertDeduper;
use crate::error::Result;
use crate::queue::AlertSender;
use std::io::Write;
use std::process::Child;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Poll interval for live sources that have nothing buffered yet.
const POLL_INTERVAL: Duration = Duration::from_millis(16);

/// Alert detection and recording state for one receiver.
pub struct MonitorCapture {
    id: usize,
    current: Mutex<Option<Arc<ActiveAlert>>>,
    deduper: Arc<AlertDeduper>,
    describer: Arc<dyn HeaderDescriber>,
    alerts: AlertSender,
    clock: Arc<dyn Clock>,
}

impl MonitorCapture {
    /// Create a monitor.
    ///
    /// # Arguments
    /// * `id` - 1-based receiver index used in logs and announcements
    /// * `deduper` - Record shared by all monitors
    /// * `describer` - Turns headers into announcement text
    /// * `alerts` - Producer half of the alert queue
    pub fn new(
        id: usize,
        deduper: Arc<AlertDeduper>,
        describer: Arc<dyn HeaderDescriber>,
        alerts: AlertSender,
    ) -> Self {
        Self {
            id,
            current: Mutex::new(None),
            deduper,
            describer,
            alerts,
            clock: Arc::new(SystemClock),
        }
    }

    /// Sets a custom clock for detection timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// The alert currently being recorded, if any.
    pub fn current(&self) -> Option<Arc<ActiveAlert>> {
        lock(&self.current).clone()
    }

    pub fn is_recording(&self) -> bool {
        lock(&self.current).is_some()
    }

    /// Handle one line of decoder output.
    pub fn handle_line(&self, line: &str) {
        if let Some(header) = extract_header(line) {
            self.open_alert(header);
        } else if is_end_of_message(line) {
            self.close(RecordingEnd::EndOfMessage);
        } else {
            log::trace!("[monitor {}] decoder: {}", self.id, line.trim());
        }
    }

    /// Append captured samples to the current alert, if one is recording.
    pub fn handle_samples(&self, samples: &[i16]) {
        let mut current = lock(&self.current);
        if let Some(alert) = current.as_ref()
            && !alert.append(samples)
        {
            // Frozen elsewhere (expired); stop feeding it
            log::debug!("[monitor {}] recording closed by processor", self.id);
            *current = None;
        }
    }

    /// Close the current recording, if any.
    ///
    /// Returns `true` if an open recording was closed by this call.
    pub fn close(&self, end: RecordingEnd) -> bool {
        let Some(alert) = lock(&self.current).take() else {
            if end == RecordingEnd::EndOfMessage {
                log::debug!("[monitor {}] end of message with no open alert", self.id);
            }
            return false;
        };
        let closed = alert.finish_recording(end);
        if closed {
            log::info!(
                "[monitor {}] recording closed ({:?}), {} samples",
                self.id,
                end,
                alert.recorded_len()
            );
        }
        closed
    }

    fn open_alert(&self, header: &str) {
        let hash = header_hash(header);
        if !self.deduper.check_and_record(&hash) {
            log::debug!("[monitor {}] duplicate header ignored: {}", self.id, header);
            return;
        }

        let text = self.describer.describe(header);
        let alert = Arc::new(ActiveAlert::new(header, text, self.id, self.clock.now()));

        {
            let mut current = lock(&self.current);
            if let Some(previous) = current.take()
                && previous.finish_recording(RecordingEnd::Superseded)
            {
                log::warn!(
                    "[monitor {}] new header before end of message, closed {}",
                    self.id,
                    previous.header()
                );
            }
            *current = Some(Arc::clone(&alert));
        }

        log::info!("[monitor {}] alert detected: {}", self.id, header);
        if !self.alerts.push(alert) {
            log::error!("[monitor {}] alert queue closed, alert not relayed", self.id);
        }
    }

    /// Start the feeder and scanner threads.
    ///
    /// # Arguments
    /// * `source` - Receiver audio
    /// * `decoder` - Opens this monitor's decoder session
    /// * `running` - Cleared to stop the feeder
    ///
    /// # Errors
    /// Returns an error if the source fails to start or the decoder cannot be
    /// opened. No thread is left running in that case.
    pub fn spawn(
        self,
        mut source: Box<dyn AudioSource>,
        decoder: &dyn MarkerDecoder,
        running: Arc<AtomicBool>,
    ) -> Result<MonitorHandle> {
        let mut session = decoder.open(self.id)?;
        if let Err(e) = source.start() {
            if let Some(mut child) = session.process.take() {
                if let Err(kill_err) = child.kill() {
                    log::debug!("[monitor {}] decoder already exited: {kill_err}", self.id);
                }
                if let Err(wait_err) = child.wait() {
                    log::warn!("[monitor {}] failed to reap decoder: {wait_err}", self.id);
                }
            }
            return Err(e);
        }
        log::info!("[monitor {}] listening on {}", self.id, source.name());

        let monitor = Arc::new(self);

        let feeder_monitor = Arc::clone(&monitor);
        let feeder_running = Arc::clone(&running);
        let input = session.input;
        let feeder = thread::spawn(move || feed(&feeder_monitor, source, input, &feeder_running));

        let scanner_monitor = Arc::clone(&monitor);
        let lines = session.lines;
        let scanner = thread::spawn(move || scan(&scanner_monitor, lines));

        Ok(MonitorHandle {
            id: monitor.id,
            monitor,
            running,
            process: session.process,
            threads: vec![feeder, scanner],
        })
    }
}

fn feed(
    monitor: &MonitorCapture,
    mut source: Box<dyn AudioSource>,
    mut input: Box<dyn Write + Send>,
    running: &AtomicBool,
) {
    let id = monitor.id;
    let finite = source.is_finite();

    while running.load(Ordering::SeqCst) {
        let samples = match source.read_samples() {
            Ok(samples) => samples,
            Err(e) => {
                log::error!("[monitor {id}] capture failed: {e}");
                break;
            }
        };
        if samples.is_empty() {
            if finite {
                log::info!("[monitor {id}] audio source ended");
                break;
            }
            thread::sleep(POLL_INTERVAL);
            continue;
        }

        if let Err(e) = input.write_all(&samples_to_le_bytes(&samples)) {
            log::error!("[monitor {id}] SAME decoder pipe error: {e}");
            break;
        }
        monitor.handle_samples(&samples);
    }

    monitor.close(RecordingEnd::MonitorStopped);
    if let Err(e) = source.stop() {
        log::warn!("[monitor {id}] failed to stop audio source: {e}");
    }
    // Dropping the input closes the decoder's stdin, which ends the scanner
    drop(input);
}

fn scan(monitor: &MonitorCapture, lines: DecoderLines) {
    let id = monitor.id;
    for line in lines {
        match line {
            Ok(line) => monitor.handle_line(&line),
            Err(e) => {
                log::error!("[monitor {id}] failed to read decoder output: {e}");
                break;
            }
        }
    }
    log::debug!("[monitor {id}] decoder output ended");
    monitor.close(RecordingEnd::MonitorStopped);
}

/// Handle to a running monitor.
pub struct MonitorHandle {
    id: usize,
    monitor: Arc<MonitorCapture>,
    running: Arc<AtomicBool>,
    process: Option<Child>,
    threads: Vec<JoinHandle<()>>,
}

impl MonitorHandle {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn monitor(&self) -> &MonitorCapture {
        &self.monitor
    }

    /// True once both threads have exited.
    pub fn is_finished(&self) -> bool {
        self.threads.iter().all(|t| t.is_finished())
    }

    /// Wait for both threads to exit on their own.
    pub fn join(mut self) {
        for handle in self.threads.drain(..) {
            join_thread(self.id, handle);
        }
        self.reap();
    }

    /// Stop the monitor, closing any open recording.
    ///
    /// Waits up to `timeout` for the threads; threads still blocked in a read
    /// after that are detached.
    pub fn stop(mut self, timeout: Duration) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(child) = self.process.as_mut()
            && let Err(e) = child.kill()
        {
            log::debug!("[monitor {}] decoder already exited: {e}", self.id);
        }
        self.monitor.close(RecordingEnd::MonitorStopped);

        let deadline = Instant::now() + timeout;
        loop {
            let (finished, remaining): (Vec<_>, Vec<_>) =
                self.threads.drain(..).partition(|t| t.is_finished());
            for handle in finished {
                join_thread(self.id, handle);
            }
            self.threads = remaining;

            if self.threads.is_empty() {
                break;
            }
            if Instant::now() >= deadline {
                log::warn!(
                    "[monitor {}] shutdown timeout, detaching {} thread(s)",
                    self.id,
                    self.threads.len()
                );
                self.threads.clear();
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        self.reap();
    }

    fn reap(&mut self) {
        if let Some(mut child) = self.process.take()
            && let Err(e) = child.wait()
        {
            log::warn!("[monitor {}] failed to reap decoder: {e}", self.id);
        }
    }
}

fn join_thread(id: usize, handle: JoinHandle<()>) {
    if let Err(panic_info) = handle.join() {
        let msg = panic_info
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| panic_info.downcast_ref::<String>().map(|s| s.as_str()))
            .unwrap_or("unknown panic");
        log::error!("[monitor {id}] thread panicked: {msg}");
    }
}
