use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::io::Cursor;
use tracing::{debug, warn};

use super::backend::AudioFrame;

/// MIME type of every chunk produced by [`ChunkSlicer`]
pub const WAV_MIME_TYPE: &str = "audio/wav";

/// One time-sliced unit of encoded audio
///
/// Immutable once emitted. Consumers take ownership of the bytes with
/// [`AudioChunk::into_bytes`].
#[derive(Debug, Clone)]
pub struct AudioChunk {
    sequence: u64,
    data: Vec<u8>,
    start_ms: u64,
    end_ms: u64,
    captured_at: DateTime<Utc>,
}

impl AudioChunk {
    pub fn new(sequence: u64, data: Vec<u8>) -> Self {
        Self {
            sequence,
            data,
            start_ms: 0,
            end_ms: 0,
            captured_at: Utc::now(),
        }
    }

    /// Attach the capture time range (ms since recording started)
    pub fn with_time_range(mut self, start_ms: u64, end_ms: u64) -> Self {
        self.start_ms = start_ms;
        self.end_ms = end_ms;
        self
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn mime_type(&self) -> &'static str {
        WAV_MIME_TYPE
    }

    pub fn start_ms(&self) -> u64 {
        self.start_ms
    }

    pub fn end_ms(&self) -> u64 {
        self.end_ms
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Audio buffered since the last emission
struct PendingSlice {
    sample_rate: u32,
    channels: u16,
    start_ms: u64,
    end_ms: u64,
    samples: Vec<i16>,
}

/// Time-slices raw frames into WAV-encoded chunks
///
/// The caller decides when a slice ends by calling [`ChunkSlicer::flush`];
/// slice boundaries follow frame boundaries, not exact sample counts.
pub struct ChunkSlicer {
    next_sequence: u64,
    pending: Option<PendingSlice>,
}

impl ChunkSlicer {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Continue numbering from `next_sequence` (used when a session restarts)
    pub fn starting_at(next_sequence: u64) -> Self {
        Self {
            next_sequence,
            pending: None,
        }
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Number of interleaved samples waiting for the next flush
    pub fn buffered_samples(&self) -> usize {
        self.pending.as_ref().map_or(0, |p| p.samples.len())
    }

    /// Buffer a frame
    ///
    /// If the frame's format differs from what is already buffered, the
    /// buffered audio is flushed first and returned.
    pub fn push_frame(&mut self, frame: AudioFrame) -> Result<Option<AudioChunk>> {
        if frame.channels == 0 || frame.sample_rate == 0 {
            warn!(
                "Dropping frame with invalid format: {}Hz, {} channels",
                frame.sample_rate, frame.channels
            );
            return Ok(None);
        }

        let format_changed = self
            .pending
            .as_ref()
            .is_some_and(|p| p.sample_rate != frame.sample_rate || p.channels != frame.channels);

        let flushed = if format_changed {
            debug!(
                "Frame format changed to {}Hz/{}ch, flushing early",
                frame.sample_rate, frame.channels
            );
            self.flush()
        } else {
            Ok(None)
        };

        let end_ms = frame.timestamp_ms + frame.duration_ms();
        let whole_frames = frame.frame_count() * frame.channels as usize;

        let pending = self.pending.get_or_insert_with(|| PendingSlice {
            sample_rate: frame.sample_rate,
            channels: frame.channels,
            start_ms: frame.timestamp_ms,
            end_ms,
            samples: Vec::new(),
        });
        pending.samples.extend_from_slice(&frame.samples[..whole_frames]);
        pending.end_ms = end_ms;

        // The new frame stays buffered even when the old slice failed to encode
        flushed
    }

    /// Encode everything buffered into one chunk
    ///
    /// Returns `None` when nothing was captured since the last flush.
    pub fn flush(&mut self) -> Result<Option<AudioChunk>> {
        let Some(pending) = self.pending.take() else {
            return Ok(None);
        };

        if pending.samples.is_empty() {
            return Ok(None);
        }

        let data = encode_wav(&pending.samples, pending.sample_rate, pending.channels)?;
        let chunk = AudioChunk::new(self.next_sequence, data)
            .with_time_range(pending.start_ms, pending.end_ms);

        self.next_sequence += 1;

        debug!(
            "Chunk {} sliced: {}ms - {}ms ({} samples, {} bytes)",
            chunk.sequence(),
            chunk.start_ms(),
            chunk.end_ms(),
            pending.samples.len(),
            chunk.len()
        );

        Ok(Some(chunk))
    }

    /// Drop the in-progress slice without emitting it
    ///
    /// Returns the number of samples discarded.
    pub fn discard(&mut self) -> usize {
        self.pending.take().map_or(0, |p| p.samples.len())
    }
}

impl Default for ChunkSlicer {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode interleaved 16-bit PCM as an in-memory WAV file
pub fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .context("Failed to create WAV writer")?;
        for &sample in samples {
            writer.write_sample(sample)
                .context("Failed to write sample to WAV")?;
        }
        writer.finalize()
            .context("Failed to finalize WAV chunk")?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(samples: Vec<i16>, sample_rate: u32, channels: u16, timestamp_ms: u64) -> AudioFrame {
        AudioFrame {
            samples,
            sample_rate,
            channels,
            timestamp_ms,
        }
    }

    #[test]
    fn test_flush_without_audio_emits_nothing() {
        let mut slicer = ChunkSlicer::new();
        assert!(slicer.flush().unwrap().is_none());
        assert_eq!(slicer.next_sequence(), 0);
    }

    #[test]
    fn test_sequence_numbers_increase_per_emission() {
        let mut slicer = ChunkSlicer::new();

        slicer.push_frame(frame(vec![1, 2, 3, 4], 16000, 2, 0)).unwrap();
        let first = slicer.flush().unwrap().unwrap();

        // An empty interval does not consume a sequence number
        assert!(slicer.flush().unwrap().is_none());

        slicer.push_frame(frame(vec![5, 6], 16000, 2, 100)).unwrap();
        let second = slicer.flush().unwrap().unwrap();

        assert_eq!(first.sequence(), 0);
        assert_eq!(second.sequence(), 1);
        assert_eq!(second.mime_type(), WAV_MIME_TYPE);
    }

    #[test]
    fn test_slice_contains_all_buffered_frames() {
        let mut slicer = ChunkSlicer::new();
        slicer.push_frame(frame(vec![10; 1600], 16000, 1, 0)).unwrap();
        slicer.push_frame(frame(vec![20; 1600], 16000, 1, 100)).unwrap();
        assert_eq!(slicer.buffered_samples(), 3200);

        let chunk = slicer.flush().unwrap().unwrap();
        assert_eq!(chunk.start_ms(), 0);
        assert_eq!(chunk.end_ms(), 200);

        let reader = hound::WavReader::new(Cursor::new(chunk.into_bytes())).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.len(), 3200);
    }

    #[test]
    fn test_format_change_flushes_early() {
        let mut slicer = ChunkSlicer::new();
        slicer.push_frame(frame(vec![1; 480], 48000, 1, 0)).unwrap();

        let early = slicer
            .push_frame(frame(vec![2; 320], 16000, 2, 10))
            .unwrap()
            .expect("format change should flush the previous slice");

        let reader = hound::WavReader::new(Cursor::new(early.data().to_vec())).unwrap();
        assert_eq!(reader.spec().sample_rate, 48000);
        assert_eq!(slicer.buffered_samples(), 320);
    }

    #[test]
    fn test_frame_after_format_change_starts_new_slice() {
        let mut slicer = ChunkSlicer::new();
        slicer.push_frame(frame(vec![1; 480], 48000, 1, 0)).unwrap();
        let early = slicer.push_frame(frame(vec![2; 320], 16000, 2, 10)).unwrap().unwrap();

        let next = slicer.flush().unwrap().expect("new-format frame must not be lost");

        assert_eq!(early.sequence(), 0);
        assert_eq!(next.sequence(), 1);
        assert_eq!(next.start_ms(), 10);
        assert_eq!(next.end_ms(), 20);

        let reader = hound::WavReader::new(Cursor::new(next.data().to_vec())).unwrap();
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.len(), 320);
    }

    #[test]
    fn test_partial_trailing_frame_is_trimmed() {
        let mut slicer = ChunkSlicer::new();
        slicer.push_frame(frame(vec![1, 2, 3], 16000, 2, 0)).unwrap();
        assert_eq!(slicer.buffered_samples(), 2);
    }

    #[test]
    fn test_discard_drops_pending_slice() {
        let mut slicer = ChunkSlicer::starting_at(7);
        slicer.push_frame(frame(vec![1; 100], 16000, 1, 0)).unwrap();

        assert_eq!(slicer.discard(), 100);
        assert!(slicer.flush().unwrap().is_none());
        assert_eq!(slicer.next_sequence(), 7);
    }

    #[test]
    fn test_invalid_frame_is_ignored() {
        let mut slicer = ChunkSlicer::new();
        assert!(slicer.push_frame(frame(vec![1, 2], 16000, 0, 0)).unwrap().is_none());
        assert_eq!(slicer.buffered_samples(), 0);
    }
}
