use super::config::SessionConfig;
use super::state::CaptureState;
use super::stats::{SessionCounters, SessionStats};
use crate::audio::{AudioBackend, AudioChunk, AudioFrame, ChunkSlicer, MicrophoneProvider};
use crate::error::CaptureError;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Receives every chunk emitted while recording
pub type ChunkHandler = Box<dyn FnMut(AudioChunk) + Send>;

type StreamSlot = Arc<tokio::sync::Mutex<Option<Box<dyn AudioBackend>>>>;

/// State shared between a session, its recording task and attached pipelines
pub(crate) struct Shared {
    session_id: String,
    started_at: DateTime<Utc>,
    state: Mutex<CaptureState>,
    handler: Mutex<ChunkHandler>,
    pub(crate) counters: SessionCounters,
    next_sequence: AtomicU64,
    /// Bumped on every successful `start`, identifies the current recording
    recording_number: AtomicU64,
}

impl Shared {
    fn state(&self) -> CaptureState {
        lock(&self.state).clone()
    }

    fn set_state(&self, state: CaptureState) {
        *lock(&self.state) = state;
    }

    /// Move to `to` only if currently in `from`
    fn transition(&self, from: &CaptureState, to: CaptureState) -> bool {
        let mut state = lock(&self.state);
        if *state == *from {
            *state = to;
            true
        } else {
            false
        }
    }

    fn emit(&self, chunk: AudioChunk) {
        if !self.state().is_recording() {
            debug!("Session no longer recording, chunk {} not emitted", chunk.sequence());
            return;
        }

        self.next_sequence.store(chunk.sequence() + 1, Ordering::SeqCst);
        SessionCounters::bump(&self.counters.chunks_emitted);

        let mut handler = lock(&self.handler);
        (*handler)(chunk);
    }
}

/// Cheap, cloneable view of a session's state for observers
#[derive(Clone)]
pub struct SessionHandle {
    pub(crate) shared: Arc<Shared>,
}

impl SessionHandle {
    pub fn state(&self) -> CaptureState {
        self.shared.state()
    }

    pub fn is_recording(&self) -> bool {
        self.shared.state().is_recording()
    }

    /// Number of the current (or most recent) recording, starting at 1
    pub fn recording_number(&self) -> u64 {
        self.shared.recording_number.load(Ordering::SeqCst)
    }

    /// Whether `recording_number` is still the active recording
    pub fn is_recording_current(&self, recording_number: u64) -> bool {
        self.is_recording() && self.recording_number() == recording_number
    }

    pub fn stats(&self) -> SessionStats {
        let shared = &self.shared;
        let counters = &shared.counters;
        let state = shared.state();
        let duration = Utc::now().signed_duration_since(shared.started_at);

        SessionStats {
            session_id: shared.session_id.clone(),
            state: state.label().to_string(),
            is_recording: state.is_recording(),
            started_at: shared.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            acquisitions: SessionCounters::get(&counters.acquisitions),
            chunks_emitted: SessionCounters::get(&counters.chunks_emitted),
            chunks_decoded: SessionCounters::get(&counters.chunks_decoded),
            chunks_dropped: SessionCounters::get(&counters.chunks_dropped),
            sequences_delivered: SessionCounters::get(&counters.sequences_delivered),
            results_discarded: SessionCounters::get(&counters.results_discarded),
        }
    }
}

struct RecorderTask {
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// A microphone capture session
///
/// Owns the acquired input stream exclusively and emits WAV-encoded chunks on
/// a fixed interval while recording.
pub struct CaptureSession {
    config: SessionConfig,
    provider: Box<dyn MicrophoneProvider>,
    shared: Arc<Shared>,
    stream: StreamSlot,
    recorder: Option<RecorderTask>,
}

impl CaptureSession {
    pub fn new(config: SessionConfig, provider: Box<dyn MicrophoneProvider>) -> Self {
        info!(
            "Creating capture session: {} (provider: {}, interval: {}ms)",
            config.session_id,
            provider.name(),
            config.chunk_interval_ms
        );

        let shared = Arc::new(Shared {
            session_id: config.session_id.clone(),
            started_at: Utc::now(),
            state: Mutex::new(CaptureState::Idle),
            handler: Mutex::new(Box::new(|_| {})),
            counters: SessionCounters::default(),
            next_sequence: AtomicU64::new(0),
            recording_number: AtomicU64::new(0),
        });

        Self {
            config,
            provider,
            shared,
            stream: Arc::new(tokio::sync::Mutex::new(None)),
            recorder: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.shared.state()
    }

    pub fn is_recording(&self) -> bool {
        self.state().is_recording()
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn stats(&self) -> SessionStats {
        self.handle().stats()
    }

    /// Register the chunk handler, replacing any previous one
    ///
    /// The handler runs on the recording task while the handler slot is
    /// locked. It must not call `on_chunk_available` or `clear_chunk_handler`
    /// (that deadlocks) and should return quickly; hand the chunk off to a
    /// channel rather than blocking, or the tokio worker thread stalls.
    pub fn on_chunk_available<F>(&self, handler: F)
    where
        F: FnMut(AudioChunk) + Send + 'static,
    {
        *lock(&self.shared.handler) = Box::new(handler);
    }

    /// Restore the default no-op chunk handler
    pub fn clear_chunk_handler(&self) {
        self.on_chunk_available(|_| {});
    }

    /// Acquire the microphone
    ///
    /// A no-op when the session is already ready or recording. Any failure
    /// leaves the session in the terminal `Failed` state.
    pub async fn initialize(&mut self) -> Result<(), CaptureError> {
        match self.state() {
            CaptureState::Ready | CaptureState::Recording => {
                debug!("Session {} already initialized", self.config.session_id);
                return Ok(());
            }
            CaptureState::Failed(err) => {
                warn!("Session {} has failed: {}", self.config.session_id, err);
                return Err(err);
            }
            CaptureState::Acquiring => {
                warn!("Acquisition already in progress");
                return Ok(());
            }
            CaptureState::Idle | CaptureState::Stopped => {}
        }

        if !self.provider.is_available() {
            let err = CaptureError::CapabilityUnavailable;
            error!("{} ({})", err, self.provider.name());
            self.shared.set_state(CaptureState::Failed(err.clone()));
            return Err(err);
        }

        info!("Requesting microphone access via {}", self.provider.name());
        self.shared.set_state(CaptureState::Acquiring);

        match self.provider.acquire().await {
            Ok(backend) => {
                info!("Microphone acquired: {}", backend.name());
                *self.stream.lock().await = Some(backend);
                SessionCounters::bump(&self.shared.counters.acquisitions);
                self.shared.set_state(CaptureState::Ready);
                Ok(())
            }
            Err(platform) => {
                let err = CaptureError::from(platform.clone());
                error!("Microphone acquisition failed ({}): {}", platform, err);
                self.shared.set_state(CaptureState::Failed(err.clone()));
                Err(err)
            }
        }
    }

    /// Start recording
    ///
    /// Emits one chunk every `interval_ms` (or the configured default) holding
    /// everything captured since the previous emission.
    pub async fn start(&mut self, interval_ms: Option<u64>) -> Result<(), CaptureError> {
        match self.state() {
            CaptureState::Ready => {}
            CaptureState::Recording => {
                warn!("Recording already started");
                return Ok(());
            }
            other => {
                warn!("Cannot start from state {}: {}", other, CaptureError::NotInitialized);
                return Err(CaptureError::NotInitialized);
            }
        }

        let interval_ms = match interval_ms {
            Some(0) => {
                warn!(
                    "Ignoring zero chunk interval, using {}ms",
                    self.config.chunk_interval_ms
                );
                self.config.chunk_interval_ms
            }
            Some(ms) => ms,
            None => self.config.chunk_interval_ms,
        }
        .max(1);

        let started = {
            let mut stream = self.stream.lock().await;
            match stream.as_mut() {
                Some(backend) => backend.start().await,
                None => Err(CaptureError::NotInitialized),
            }
        };

        let frames = match started {
            Ok(frames) => frames,
            Err(err) => {
                error!("Failed to start audio capture: {}", err);
                if err.is_fatal() {
                    self.shared.set_state(CaptureState::Failed(err.clone()));
                    release_stream(&self.stream).await;
                }
                return Err(err);
            }
        };

        self.shared.recording_number.fetch_add(1, Ordering::SeqCst);
        self.shared.set_state(CaptureState::Recording);
        info!(
            "Recording session {} started ({}ms chunks)",
            self.config.session_id, interval_ms
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(record_loop(
            Arc::clone(&self.shared),
            Arc::clone(&self.stream),
            frames,
            shutdown_rx,
            Duration::from_millis(interval_ms),
        ));

        self.recorder = Some(RecorderTask {
            shutdown_tx,
            handle,
        });

        Ok(())
    }

    /// Stop recording
    ///
    /// Releases the input stream and discards the partially filled slice.
    /// Does nothing unless the session is recording.
    pub async fn stop(&mut self) {
        if !self.shared.transition(&CaptureState::Recording, CaptureState::Stopped) {
            debug!("Recording not active ({}), stop ignored", self.state());
            self.join_recorder().await;
            return;
        }

        info!("Stopping recording session: {}", self.config.session_id);

        self.join_recorder().await;
        release_stream(&self.stream).await;

        info!("Recording session stopped: {}", self.config.session_id);
    }

    async fn join_recorder(&mut self) {
        if let Some(recorder) = self.recorder.take() {
            let _ = recorder.shutdown_tx.send(());
            if let Err(e) = recorder.handle.await {
                error!("Recording task panicked: {}", e);
            }
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if let Some(recorder) = self.recorder.take() {
            recorder.handle.abort();
        }
    }
}

async fn record_loop(
    shared: Arc<Shared>,
    stream: StreamSlot,
    mut frames: mpsc::Receiver<AudioFrame>,
    mut shutdown_rx: oneshot::Receiver<()>,
    interval: Duration,
) {
    let mut slicer = ChunkSlicer::starting_at(shared.next_sequence.load(Ordering::SeqCst));
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!("Recording task started");

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown_rx => {
                let discarded = slicer.discard();
                debug!("Recording task stopping, {} buffered samples discarded", discarded);
                break;
            }

            frame = frames.recv() => match frame {
                Some(frame) => match slicer.push_frame(frame) {
                    Ok(Some(chunk)) => shared.emit(chunk),
                    Ok(None) => {}
                    Err(e) => {
                        error!("Failed to encode chunk: {:#}", e);
                        SessionCounters::bump(&shared.counters.chunks_dropped);
                    }
                },
                None => {
                    slicer.discard();
                    if shared.transition(
                        &CaptureState::Recording,
                        CaptureState::Failed(CaptureError::DeviceUnreadable),
                    ) {
                        error!("Audio stream ended unexpectedly, input device lost");
                        release_stream(&stream).await;
                    }
                    break;
                }
            },

            _ = ticker.tick() => match slicer.flush() {
                Ok(Some(chunk)) => shared.emit(chunk),
                Ok(None) => debug!("No audio captured during interval"),
                Err(e) => {
                    error!("Failed to encode chunk: {:#}", e);
                    SessionCounters::bump(&shared.counters.chunks_dropped);
                }
            },
        }
    }

    debug!("Recording task finished");
}

async fn release_stream(stream: &StreamSlot) {
    let backend = stream.lock().await.take();
    if let Some(mut backend) = backend {
        if let Err(e) = backend.stop().await {
            error!("Failed to stop audio backend {}: {}", backend.name(), e);
        }
        debug!("Released audio stream: {}", backend.name());
    }
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
