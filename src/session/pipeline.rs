use super::session::{CaptureSession, SessionHandle};
use super::stats::SessionCounters;
use crate::audio::{AudioChunk, MonoAmplitudeSequence, MonoDownmixer};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A chunk waiting for decode, tagged with the recording it came from
struct QueuedChunk {
    recording_number: u64,
    chunk: AudioChunk,
}

/// Routes a session's chunks through a [`MonoDownmixer`]
///
/// Chunks are decoded one at a time on the blocking pool, so results reach
/// `on_amplitude_data` in sequence order while the session keeps capturing.
/// Results that finish decoding after their recording stopped are discarded,
/// even if a newer recording has started since.
pub struct AmplitudePipeline {
    session: SessionHandle,
    worker: Option<JoinHandle<()>>,
}

impl AmplitudePipeline {
    /// Take over the session's chunk handler
    ///
    /// Must be called from within a tokio runtime.
    pub fn attach<F>(session: &CaptureSession, downmixer: MonoDownmixer, on_amplitude_data: F) -> Self
    where
        F: FnMut(MonoAmplitudeSequence) + Send + 'static,
    {
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel::<QueuedChunk>();
        let handle = session.handle();

        // The handler runs inside the emission, so the recording number read
        // here is the one the chunk was captured under
        let emitter = handle.clone();
        session.on_chunk_available(move |chunk| {
            let queued = QueuedChunk {
                recording_number: emitter.recording_number(),
                chunk,
            };
            if chunk_tx.send(queued).is_err() {
                debug!("Amplitude pipeline closed, chunk dropped");
            }
        });

        let worker = tokio::spawn(run_worker(handle.clone(), downmixer, chunk_rx, on_amplitude_data));

        info!("Amplitude pipeline attached");

        Self {
            session: handle,
            worker: Some(worker),
        }
    }

    /// Detach from the session and wait for queued chunks to finish
    pub async fn shutdown(mut self, session: &CaptureSession) {
        session.clear_chunk_handler();

        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                error!("Amplitude worker panicked: {}", e);
            }
        }

        let stats = self.session.stats();
        info!(
            "Amplitude pipeline finished: {} delivered, {} dropped, {} discarded",
            stats.sequences_delivered, stats.chunks_dropped, stats.results_discarded
        );
    }
}

impl Drop for AmplitudePipeline {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

async fn run_worker<F>(
    session: SessionHandle,
    downmixer: MonoDownmixer,
    mut chunk_rx: mpsc::UnboundedReceiver<QueuedChunk>,
    mut on_amplitude_data: F,
) where
    F: FnMut(MonoAmplitudeSequence) + Send + 'static,
{
    let counters = &session.shared.counters;

    while let Some(QueuedChunk { recording_number, chunk }) = chunk_rx.recv().await {
        let sequence = chunk.sequence();
        let downmixer = downmixer.clone();

        let result = tokio::task::spawn_blocking(move || downmixer.downmix(&chunk)).await;

        match result {
            Ok(Ok(mono)) => {
                SessionCounters::bump(&counters.chunks_decoded);

                if !session.is_recording_current(recording_number) {
                    debug!(
                        "Recording {} no longer active, discarding amplitude data for chunk {}",
                        recording_number, sequence
                    );
                    SessionCounters::bump(&counters.results_discarded);
                    continue;
                }

                on_amplitude_data(mono);
                SessionCounters::bump(&counters.sequences_delivered);
            }
            Ok(Err(e)) => {
                warn!("Dropping chunk {}: {}", sequence, e);
                SessionCounters::bump(&counters.chunks_dropped);
            }
            Err(e) => {
                error!("Downmix of chunk {} panicked: {}", sequence, e);
                SessionCounters::bump(&counters.chunks_dropped);
            }
        }
    }

    debug!("Amplitude worker finished");
}
