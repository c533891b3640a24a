// Mono downmix for analysis consumers
//
// Each chunk is decoded independently and every channel is averaged into a
// single amplitude sequence, one output value per input sample index.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use super::chunk::AudioChunk;
use super::decode::{AudioDecoder, DecodedAudioBuffer, SymphoniaDecoder};
use crate::error::CaptureError;

/// Mono amplitude data derived from one chunk
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonoAmplitudeSequence {
    /// Sequence number of the chunk this was decoded from
    pub sequence: u64,
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl MonoAmplitudeSequence {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Largest absolute amplitude (0.0 for an empty sequence)
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |peak, s| peak.max(s.abs()))
    }

    /// Root mean square level (0.0 for an empty sequence)
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = self.samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum_sq / self.samples.len() as f64).sqrt() as f32
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}

/// Decodes chunks and collapses their channels to mono
#[derive(Clone)]
pub struct MonoDownmixer {
    decoder: Arc<dyn AudioDecoder>,
}

impl MonoDownmixer {
    pub fn new(decoder: Arc<dyn AudioDecoder>) -> Self {
        Self { decoder }
    }

    /// Decode one chunk and average its channels
    pub fn downmix(&self, chunk: &AudioChunk) -> Result<MonoAmplitudeSequence, CaptureError> {
        let decoded = self.decoder.decode(chunk.data()).map_err(|e| {
            warn!("Chunk {} failed to decode: {}", chunk.sequence(), e);
            e
        })?;

        let samples = downmix_buffer(&decoded)?;

        debug!(
            "Chunk {} downmixed: {} channels -> {} mono samples",
            chunk.sequence(),
            decoded.num_channels(),
            samples.len()
        );

        Ok(MonoAmplitudeSequence {
            sequence: chunk.sequence(),
            sample_rate: decoded.sample_rate,
            samples,
        })
    }
}

impl Default for MonoDownmixer {
    fn default() -> Self {
        Self::new(Arc::new(SymphoniaDecoder::wav()))
    }
}

/// Average all channels of a decoded buffer into one sequence
///
/// `mono[i] = (Σ channel[c][i]) / num_channels` for every sample index `i`.
pub fn downmix_buffer(buffer: &DecodedAudioBuffer) -> Result<Vec<f32>, CaptureError> {
    let num_channels = buffer.num_channels();
    if num_channels == 0 {
        return Err(CaptureError::DecodeError("buffer has no channels".into()));
    }

    let num_samples = buffer.num_samples();

    if num_channels == 1 {
        return Ok(buffer.channels[0][..num_samples].to_vec());
    }

    let mut mono = Vec::with_capacity(num_samples);
    for i in 0..num_samples {
        let sum: f32 = buffer.channels.iter().map(|channel| channel[i]).sum();
        mono.push(sum / num_channels as f32);
    }

    Ok(mono)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::chunk::encode_wav;

    fn assert_close(actual: &[f32], expected: &[f32], tolerance: f32) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() <= tolerance, "expected {:?}, got {:?}", expected, actual);
        }
    }

    #[test]
    fn test_opposite_channels_cancel() {
        let buffer = DecodedAudioBuffer::new(48000, vec![vec![1.0, -1.0], vec![-1.0, 1.0]]);
        let mono = downmix_buffer(&buffer).unwrap();
        assert_eq!(mono, vec![0.0, 0.0]);
    }

    #[test]
    fn test_channels_are_averaged_per_sample() {
        let buffer = DecodedAudioBuffer::new(48000, vec![vec![0.5, 0.2], vec![0.5, 0.8]]);
        let mono = downmix_buffer(&buffer).unwrap();
        assert_close(&mono, &[0.5, 0.5], 1e-6);
    }

    #[test]
    fn test_single_channel_is_identity() {
        let channel = vec![0.1, -0.7, 0.33, 1.0, -1.0];
        let buffer = DecodedAudioBuffer::new(16000, vec![channel.clone()]);
        assert_eq!(downmix_buffer(&buffer).unwrap(), channel);
    }

    #[test]
    fn test_zero_channels_is_decode_error() {
        let buffer = DecodedAudioBuffer::new(16000, Vec::new());
        assert!(matches!(downmix_buffer(&buffer), Err(CaptureError::DecodeError(_))));
    }

    #[test]
    fn test_one_output_per_input_sample() {
        let buffer = DecodedAudioBuffer::new(
            16000,
            vec![vec![0.3; 480], vec![0.1; 480], vec![-0.1; 480]],
        );
        let mono = downmix_buffer(&buffer).unwrap();
        assert_eq!(mono.len(), 480);
        assert!(mono.iter().all(|s| (s - 0.1).abs() < 1e-6));
    }

    #[test]
    fn test_downmix_chunk_end_to_end() {
        // L = 0.5, R = -0.25 -> mono 0.125
        let samples: Vec<i16> = [16384, -8192].repeat(100);
        let chunk = AudioChunk::new(3, encode_wav(&samples, 22050, 2).unwrap());

        let mono = MonoDownmixer::default().downmix(&chunk).unwrap();

        assert_eq!(mono.sequence, 3);
        assert_eq!(mono.sample_rate, 22050);
        assert_eq!(mono.len(), 100);
        assert!(mono.samples.iter().all(|s| (s - 0.125).abs() < 1e-3));
    }

    #[test]
    fn test_downmix_undecodable_chunk_fails() {
        let chunk = AudioChunk::new(0, vec![0u8; 64]);
        let result = MonoDownmixer::default().downmix(&chunk);
        assert!(matches!(result, Err(CaptureError::DecodeError(_))));
    }

    #[test]
    fn test_peak_and_rms() {
        let seq = MonoAmplitudeSequence {
            sequence: 0,
            sample_rate: 16000,
            samples: vec![0.5, -0.5, 0.5, -0.5],
        };
        assert!((seq.peak() - 0.5).abs() < 1e-6);
        assert!((seq.rms() - 0.5).abs() < 1e-6);

        let empty = MonoAmplitudeSequence {
            sequence: 1,
            sample_rate: 16000,
            samples: Vec::new(),
        };
        assert_eq!(empty.peak(), 0.0);
        assert_eq!(empty.rms(), 0.0);
    }
}
