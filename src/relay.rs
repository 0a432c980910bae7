//! Relay assembly: N monitors feeding one processor.

use crate::alert::HeaderDescriber;
use crate::announce::{Announcer, SpeechSynthesizer, Transcoder};
use crate::audio::playback::PlaybackSink;
use crate::audio::recorder::AudioSource;
use crate::audio::tone::load_pretone;
use crate::callsign::Callsign;
use crate::config::Config;
use crate::decoder::MarkerDecoder;
use crate::dedup::{AlertDeduper, DedupConfig};
use crate::encoder::AlertEncoder;
use crate::error::{RelayError, Result};
use crate::monitor::{MonitorCapture, MonitorHandle};
use crate::processor::{AlertProcessor, ProcessorConfig};
use crate::queue::AlertQueue;
use crate::store::WaveformStore;
use crossbeam_channel::{Sender, unbounded};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

/// How long `stop` waits for each monitor's threads.
const MONITOR_STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Runtime settings for a relay.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Unvalidated station callsign; checked when the relay starts.
    pub callsign: String,
    pub sample_rate: u32,
    pub cooldown: Duration,
    pub max_recording: Duration,
    pub dedup: DedupConfig,
    pub output_dir: PathBuf,
    pub work_dir: PathBuf,
    pub pretone: Option<PathBuf>,
    pub pretone_gain_db: f32,
}

impl RelaySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            callsign: config.station.callsign.clone(),
            sample_rate: config.audio.sample_rate,
            cooldown: config.relay.cooldown(),
            max_recording: config.relay.max_recording(),
            dedup: DedupConfig {
                max_age: Duration::from_secs(config.relay.dedup_max_age_secs),
                max_entries: config.relay.dedup_max_entries,
            },
            output_dir: config.relay.output_dir(),
            work_dir: config.relay.work_dir(),
            pretone: config.audio.pretone.clone(),
            pretone_gain_db: config.audio.pretone_gain_db,
        }
    }
}

/// One receiver: its audio and the decoder that listens to it.
pub struct MonitorInput {
    /// 1-based receiver number, as given on the command line.
    pub id: usize,
    pub source: Box<dyn AudioSource>,
    pub decoder: Box<dyn MarkerDecoder>,
}

/// The pluggable parts of the relay.
pub struct Collaborators {
    pub describer: Arc<dyn HeaderDescriber>,
    pub synthesizer: Box<dyn SpeechSynthesizer>,
    pub transcoder: Box<dyn Transcoder>,
    pub encoder: Box<dyn AlertEncoder>,
    pub sink: Box<dyn PlaybackSink>,
}

/// Start a relay.
///
/// The callsign is validated before anything else; on failure no thread is
/// started. Monitors that fail to start are logged and skipped.
///
/// # Arguments
/// * `settings` - Relay settings
/// * `monitors` - One entry per receiver, each carrying its receiver number
/// * `collaborators` - Describer, speech, encoder and output implementations
///
/// # Errors
/// Returns `InvalidCallsign` for a bad callsign, `ConfigInvalidValue` with no
/// receivers, pretone loading errors, or `AudioCapture` if no monitor starts.
pub fn start(
    settings: RelaySettings,
    monitors: Vec<MonitorInput>,
    collaborators: Collaborators,
) -> Result<RelayHandle> {
    let callsign = Callsign::parse(&settings.callsign)?;
    if monitors.is_empty() {
        return Err(RelayError::ConfigInvalidValue {
            key: "soundcard".to_string(),
            message: "at least one receiver is required".to_string(),
        });
    }

    let pretone = load_pretone(
        settings.pretone.as_deref(),
        settings.sample_rate,
        settings.pretone_gain_db,
    )?;
    let announcer = Announcer::new(
        collaborators.synthesizer,
        collaborators.transcoder,
        pretone,
        settings.work_dir.clone(),
    );
    let processor = AlertProcessor::new(
        ProcessorConfig {
            callsign: callsign.clone(),
            cooldown: settings.cooldown,
            max_recording: settings.max_recording,
        },
        announcer,
        collaborators.encoder,
        WaveformStore::new(settings.output_dir.clone()),
        collaborators.sink,
    );

    let deduper = Arc::new(AlertDeduper::new(settings.dedup));
    let queue = AlertQueue::new();
    let running = Arc::new(AtomicBool::new(true));

    let mut handles = Vec::with_capacity(monitors.len());
    for input in monitors {
        let id = input.id;
        let monitor = MonitorCapture::new(
            id,
            Arc::clone(&deduper),
            Arc::clone(&collaborators.describer),
            queue.sender(),
        );
        match monitor.spawn(input.source, input.decoder.as_ref(), Arc::clone(&running)) {
            Ok(handle) => handles.push(handle),
            Err(e) => log::error!("[monitor {id}] failed to start: {e}"),
        }
    }
    if handles.is_empty() {
        return Err(RelayError::AudioCapture {
            message: "no receiver could be started".to_string(),
        });
    }

    let (shutdown_tx, shutdown_rx) = unbounded();
    let alerts = queue.receiver().clone();
    // Only the monitors keep producer handles, so the processor sees the
    // queue disconnect once every monitor has stopped
    drop(queue);
    let processor = match processor.spawn(alerts, shutdown_rx) {
        Ok(processor) => processor,
        Err(e) => {
            running.store(false, Ordering::SeqCst);
            for handle in handles {
                handle.stop(MONITOR_STOP_TIMEOUT);
            }
            return Err(e);
        }
    };

    log::info!(
        "relay started as {:?} with {} receiver(s)",
        callsign.as_str(),
        handles.len()
    );
    Ok(RelayHandle {
        running,
        monitors: handles,
        processor: Some(processor),
        shutdown: Some(shutdown_tx),
        deduper,
    })
}

/// Handle to a running relay.
pub struct RelayHandle {
    running: Arc<AtomicBool>,
    monitors: Vec<MonitorHandle>,
    processor: Option<JoinHandle<()>>,
    shutdown: Option<Sender<()>>,
    deduper: Arc<AlertDeduper>,
}

impl RelayHandle {
    /// Ids of the monitors that started.
    pub fn monitor_ids(&self) -> Vec<usize> {
        self.monitors.iter().map(|m| m.id()).collect()
    }

    pub fn deduper(&self) -> &AlertDeduper {
        &self.deduper
    }

    /// True once every monitor has stopped on its own.
    pub fn monitors_finished(&self) -> bool {
        self.monitors.iter().all(|m| m.is_finished())
    }

    /// True once the processor thread has exited.
    pub fn is_finished(&self) -> bool {
        self.processor.as_ref().is_none_or(|p| p.is_finished())
    }

    /// Wait for every monitor to end, then for the processor to relay
    /// everything still queued.
    pub fn wait(mut self) {
        for monitor in self.monitors.drain(..) {
            monitor.join();
        }
        self.join_processor();
    }

    /// Stop monitors, closing open recordings, and stop the processor once
    /// its current alert is done. Queued alerts are abandoned.
    pub fn stop(mut self) {
        log::info!("stopping relay");
        self.running.store(false, Ordering::SeqCst);
        for monitor in self.monitors.drain(..) {
            monitor.stop(MONITOR_STOP_TIMEOUT);
        }
        self.shutdown.take();
        self.join_processor();
    }

    fn join_processor(&mut self) {
        if let Some(processor) = self.processor.take()
            && processor.join().is_err()
        {
            log::error!("alert processor panicked");
        }
    }
}
