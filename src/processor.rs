//! Single worker that relays queued alerts one at a time.
//!
//! For each alert: announce it, wait until both the announcement and the
//! recording are complete, re-encode it with the local station callsign,
//! archive and play the result, then hold a quiet interval before the next.

use crate::alert::{ActiveAlert, Completion, RecordingEnd, substitute_station};
use crate::announce::Announcer;
use crate::audio::playback::PlaybackSink;
use crate::callsign::Callsign;
use crate::defaults;
use crate::encoder::AlertEncoder;
use crate::error::Result;
use crate::store::WaveformStore;
use crossbeam_channel::{Receiver, select};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Configuration for the processor.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Station identifier written into relayed headers.
    pub callsign: Callsign,
    /// Quiet interval after each relayed alert.
    pub cooldown: Duration,
    /// Longest time after detection to wait for an end-of-message.
    pub max_recording: Duration,
}

impl ProcessorConfig {
    pub fn new(callsign: Callsign) -> Self {
        Self {
            callsign,
            cooldown: defaults::cooldown(),
            max_recording: Duration::from_secs(defaults::MAX_RECORDING_SECS),
        }
    }
}

/// What happened to one alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    pub header: String,
    /// Header actually encoded, with the local callsign.
    pub relayed_header: Option<String>,
    pub announced: bool,
    pub recording_end: Option<RecordingEnd>,
    pub archived: Option<PathBuf>,
    pub played: bool,
}

/// Sets `announcement_done` when dropped, whatever the announcement did.
struct AnnouncementGuard<'a>(&'a Completion);

impl Drop for AnnouncementGuard<'_> {
    fn drop(&mut self) {
        self.0.set();
    }
}

/// The relay's single alert worker.
pub struct AlertProcessor {
    config: ProcessorConfig,
    announcer: Announcer,
    encoder: Box<dyn AlertEncoder>,
    store: WaveformStore,
    sink: Box<dyn PlaybackSink>,
}

impl AlertProcessor {
    pub fn new(
        config: ProcessorConfig,
        announcer: Announcer,
        encoder: Box<dyn AlertEncoder>,
        store: WaveformStore,
        sink: Box<dyn PlaybackSink>,
    ) -> Self {
        Self {
            config,
            announcer,
            encoder,
            store,
            sink,
        }
    }

    /// Relay one alert, then wait out the cooldown.
    ///
    /// Errors are logged; every alert reaches the cooldown.
    pub fn process(&mut self, alert: &ActiveAlert) -> RelayOutcome {
        let id = alert.monitor_id();
        log::info!("[monitor {id}] processing alert {}", alert.header());

        let announced = {
            let _announcement = AnnouncementGuard(alert.announcement_done());
            match self.announcer.announce(alert, self.sink.as_mut()) {
                Ok(()) => true,
                Err(e) => {
                    log::error!("[monitor {id}] announcement failed: {e}");
                    false
                }
            }
        };

        self.await_completion(alert);

        let mut outcome = RelayOutcome {
            header: alert.header().to_string(),
            relayed_header: None,
            announced,
            recording_end: alert.recording_end(),
            archived: None,
            played: false,
        };
        if let Err(e) = self.relay(alert, &mut outcome) {
            log::error!("[monitor {id}] relay failed: {e}");
        }

        log::debug!("cooling down for {:?}", self.config.cooldown);
        thread::sleep(self.config.cooldown);
        outcome
    }

    /// Barrier on both completion signals, bounded by the recording limit.
    fn await_completion(&self, alert: &ActiveAlert) {
        alert.announcement_done().wait();

        let deadline = alert.detected_at() + self.config.max_recording;
        let remaining = deadline.saturating_duration_since(Instant::now());
        if !alert.recording_done().wait_timeout(remaining)
            && alert.finish_recording(RecordingEnd::Expired)
        {
            log::warn!(
                "[monitor {}] no end of message after {:?}, relaying {} recorded samples",
                alert.monitor_id(),
                self.config.max_recording,
                alert.recorded_len()
            );
        }
        // Covers the race where the monitor closed it between the two calls
        alert.recording_done().wait();
    }

    fn relay(&mut self, alert: &ActiveAlert, outcome: &mut RelayOutcome) -> Result<()> {
        let header = substitute_station(alert.header(), &self.config.callsign)?;
        outcome.relayed_header = Some(header.clone());

        let audio = alert.recorded_audio().unwrap_or_else(|| Arc::from(Vec::new()));
        let waveform = self.encoder.encode(&header, &audio)?;

        match self.store.persist(&waveform) {
            Ok(path) => outcome.archived = Some(path),
            Err(e) => log::error!(
                "[monitor {}] failed to archive waveform: {e}",
                alert.monitor_id()
            ),
        }

        log::info!("[monitor {}] relaying {}", alert.monitor_id(), header);
        self.sink.play(&waveform)?;
        outcome.played = true;
        Ok(())
    }

    /// Consume alerts until `shutdown` fires or every producer is gone.
    pub fn run(mut self, alerts: Receiver<Arc<ActiveAlert>>, shutdown: Receiver<()>) {
        log::info!("alert processor ready (output: {})", self.sink.name());
        loop {
            select! {
                recv(alerts) -> alert => match alert {
                    Ok(alert) => {
                        self.process(&alert);
                    }
                    Err(_) => {
                        log::info!("all monitors stopped, processor exiting");
                        break;
                    }
                },
                recv(shutdown) -> _ => {
                    log::info!("processor shutting down");
                    break;
                }
            }
        }
    }

    /// Run on a dedicated thread.
    pub fn spawn(
        self,
        alerts: Receiver<Arc<ActiveAlert>>,
        shutdown: Receiver<()>,
    ) -> Result<JoinHandle<()>> {
        let handle = thread::Builder::new()
            .name("alert-processor".to_string())
            .spawn(move || self.run(alerts, shutdown))?;
        Ok(handle)
    }
}
