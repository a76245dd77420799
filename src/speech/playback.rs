//! Audio output and the single "currently playing" slot.
//!
//! `PlaybackSlot` is the only thing allowed to start audio. Each playback
//! request carries a ticket (monotonic, issued when the request begins).
//! Starting playback stops whatever the slot holds first, under the same
//! lock, so two clips never overlap. A request whose ticket is older than
//! the newest clip already started is dropped instead of played.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::decode::AudioBuffer;

const REAP_INTERVAL: Duration = Duration::from_millis(50);

pub trait PlaybackHandle: Send {
    fn stop(&mut self);
    fn is_finished(&self) -> bool;
}

pub trait AudioOutput: Send + Sync {
    /// Begin playing `buffer` and return immediately.
    fn start(&self, buffer: AudioBuffer) -> Result<Box<dyn PlaybackHandle>, String>;
}

struct ActivePlayback {
    ticket: u64,
    handle: Box<dyn PlaybackHandle>,
}

#[derive(Default)]
struct SlotState {
    active: Option<ActivePlayback>,
    newest_started: u64,
}

impl SlotState {
    fn stop_active(&mut self) -> Option<u64> {
        let mut previous = self.active.take()?;
        previous.handle.stop();
        Some(previous.ticket)
    }
}

pub struct PlaybackSlot {
    output: Arc<dyn AudioOutput>,
    state: Arc<Mutex<SlotState>>,
}

impl PlaybackSlot {
    pub fn new(output: Arc<dyn AudioOutput>) -> Self {
        Self {
            output,
            state: Arc::new(Mutex::new(SlotState::default())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_playing(&self) -> bool {
        self.lock()
            .active
            .as_ref()
            .is_some_and(|a| !a.handle.is_finished())
    }

    /// Silence anything started by an earlier request.
    pub fn preempt(&self, ticket: u64) {
        let mut state = self.lock();
        if state.active.as_ref().is_some_and(|a| a.ticket < ticket) {
            if let Some(stopped) = state.stop_active() {
                debug!("Request #{ticket} preempted playback #{stopped}");
            }
        }
    }

    pub fn stop(&self) {
        if let Some(stopped) = self.lock().stop_active() {
            info!("Playback #{stopped} stopped");
        }
    }

    /// Stop the current clip and start `buffer`. Returns `Ok(false)` when a
    /// newer request already reached playback.
    pub fn play(&self, ticket: u64, buffer: AudioBuffer) -> Result<bool, String> {
        {
            let mut state = self.lock();
            if state.newest_started > ticket {
                debug!(
                    "Request #{ticket} superseded by #{}, not playing",
                    state.newest_started
                );
                return Ok(false);
            }
            if let Some(stopped) = state.stop_active() {
                debug!("Stopped playback #{stopped} for #{ticket}");
            }
            let seconds = buffer.duration_secs();
            let handle = self.output.start(buffer)?;
            state.active = Some(ActivePlayback { ticket, handle });
            state.newest_started = ticket;
            debug!("Playback #{ticket} started ({seconds:.2}s)");
        }
        self.spawn_reaper(ticket);
        Ok(true)
    }

    /// Release the slot once the clip ends on its own.
    fn spawn_reaper(&self, ticket: u64) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let state = self.state.clone();
        runtime.spawn(async move {
            loop {
                tokio::time::sleep(REAP_INTERVAL).await;
                let mut slot = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                let finished = match &slot.active {
                    Some(active) if active.ticket == ticket => active.handle.is_finished(),
                    // replaced or stopped elsewhere
                    _ => break,
                };
                if finished {
                    slot.active = None;
                    debug!("Playback #{ticket} finished");
                    break;
                }
            }
        });
    }
}

// --- Outputs ---

/// Output that plays nothing but keeps real timing, for headless runs.
#[derive(Default)]
pub struct NullOutput;

struct NullHandle {
    until: Instant,
    stopped: bool,
}

impl PlaybackHandle for NullHandle {
    fn stop(&mut self) {
        self.stopped = true;
    }

    fn is_finished(&self) -> bool {
        self.stopped || Instant::now() >= self.until
    }
}

impl AudioOutput for NullOutput {
    fn start(&self, buffer: AudioBuffer) -> Result<Box<dyn PlaybackHandle>, String> {
        let duration = Duration::from_secs_f64(buffer.duration_secs());
        debug!("Null output: {:.2}s of audio", duration.as_secs_f64());
        Ok(Box::new(NullHandle {
            until: Instant::now() + duration,
            stopped: false,
        }))
    }
}

#[cfg(feature = "playback")]
pub use self::rodio_output::RodioOutput;

#[cfg(feature = "playback")]
mod rodio_output {
    use std::sync::mpsc;

    use rodio::buffer::SamplesBuffer;
    use rodio::mixer::Mixer;
    use rodio::{OutputStreamBuilder, Sink};
    use tracing::info;

    use super::{AudioBuffer, AudioOutput, PlaybackHandle};

    /// Default output device via rodio. The stream lives on its own thread
    /// for the lifetime of this value; sinks attach through its mixer.
    pub struct RodioOutput {
        mixer: Mixer,
        _shutdown: mpsc::Sender<()>,
    }

    impl RodioOutput {
        pub fn open() -> Result<Self, String> {
            let (ready_tx, ready_rx) = mpsc::channel();
            let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

            std::thread::Builder::new()
                .name("audio-output".into())
                .spawn(move || match OutputStreamBuilder::open_default_stream() {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(stream.mixer().clone()));
                        // park until the owner goes away
                        let _ = shutdown_rx.recv();
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("Failed to open audio output: {e}")));
                    }
                })
                .map_err(|e| format!("Failed to spawn audio thread: {e}"))?;

            let mixer = ready_rx
                .recv()
                .map_err(|_| "Audio thread exited before opening output".to_string())??;
            info!("Audio output opened");
            Ok(Self {
                mixer,
                _shutdown: shutdown_tx,
            })
        }
    }

    struct SinkHandle(Sink);

    impl PlaybackHandle for SinkHandle {
        fn stop(&mut self) {
            self.0.stop();
        }

        fn is_finished(&self) -> bool {
            self.0.empty()
        }
    }

    impl AudioOutput for RodioOutput {
        fn start(&self, buffer: AudioBuffer) -> Result<Box<dyn PlaybackHandle>, String> {
            let sink = Sink::connect_new(&self.mixer);
            sink.append(SamplesBuffer::new(buffer.channels, buffer.sample_rate, buffer.samples));
            Ok(Box::new(SinkHandle(sink)))
        }
    }
}

/// Pick the real device when built with `playback`, else the null output.
pub fn default_output(enabled: bool) -> Arc<dyn AudioOutput> {
    if !enabled {
        info!("Audio output disabled by config");
        return Arc::new(NullOutput);
    }
    #[cfg(feature = "playback")]
    {
        match RodioOutput::open() {
            Ok(output) => return Arc::new(output),
            Err(e) => warn!("{e}; continuing without sound"),
        }
    }
    #[cfg(not(feature = "playback"))]
    warn!("Built without the `playback` feature; audio will not be audible");
    Arc::new(NullOutput)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Records start/stop events. Clips never end on their own unless
    /// `finish_all` is called.
    #[derive(Default)]
    pub struct RecordingOutput {
        pub events: Arc<Mutex<Vec<String>>>,
        pub played: Arc<Mutex<Vec<Vec<f32>>>>,
        finished: Arc<AtomicBool>,
        fail: AtomicBool,
    }

    impl RecordingOutput {
        pub fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        pub fn played(&self) -> Vec<Vec<f32>> {
            self.played.lock().unwrap().clone()
        }

        pub fn finish_all(&self) {
            self.finished.store(true, Ordering::SeqCst);
        }

        pub fn fail_next(&self) {
            self.fail.store(true, Ordering::SeqCst);
        }
    }

    struct RecordingHandle {
        id: usize,
        events: Arc<Mutex<Vec<String>>>,
        finished: Arc<AtomicBool>,
        stopped: bool,
    }

    impl PlaybackHandle for RecordingHandle {
        fn stop(&mut self) {
            self.stopped = true;
            self.events.lock().unwrap().push(format!("stop {}", self.id));
        }

        fn is_finished(&self) -> bool {
            self.stopped || self.finished.load(Ordering::SeqCst)
        }
    }

    impl AudioOutput for RecordingOutput {
        fn start(&self, buffer: AudioBuffer) -> Result<Box<dyn PlaybackHandle>, String> {
            if self.fail.swap(false, Ordering::SeqCst) {
                return Err("device gone".into());
            }
            let mut played = self.played.lock().unwrap();
            let id = played.len();
            played.push(buffer.samples);
            self.events.lock().unwrap().push(format!("start {id}"));
            Ok(Box::new(RecordingHandle {
                id,
                events: self.events.clone(),
                finished: self.finished.clone(),
                stopped: false,
            }))
        }
    }
}
