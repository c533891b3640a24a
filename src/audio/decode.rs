// Chunk decoding
//
// Turns an encoded chunk back into per-channel f32 samples. The decoder
// decides sample rate and channel count; callers never configure them.

use std::borrow::Cow;
use std::io::Cursor;

use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::conv::FromSample;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;
use tracing::debug;

use crate::error::CaptureError;

/// Per-channel float samples decoded from one chunk
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudioBuffer {
    pub sample_rate: u32,
    /// One `Vec` per channel, all of equal length
    pub channels: Vec<Vec<f32>>,
}

impl DecodedAudioBuffer {
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Sample count per channel (shortest channel if lengths disagree)
    pub fn num_samples(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }
}

/// Decodes encoded chunk bytes
pub trait AudioDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedAudioBuffer, CaptureError>;
}

/// Decoder backed by symphonia's default probe and codec registry
#[derive(Debug, Clone, Default)]
pub struct SymphoniaDecoder {
    /// File extension hint for the prober (e.g. "wav")
    pub extension_hint: Option<String>,
}

impl SymphoniaDecoder {
    pub fn wav() -> Self {
        Self {
            extension_hint: Some("wav".to_string()),
        }
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedAudioBuffer, CaptureError> {
        let source = Cursor::new(bytes.to_vec());
        let mss = MediaSourceStream::new(Box::new(source), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = &self.extension_hint {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(decode_error)?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| CaptureError::DecodeError("no supported audio track".into()))?;

        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.unwrap_or(0);
        let num_channels = track.codec_params.channels.map_or(0, |c| c.count());
        if num_channels == 0 {
            return Err(CaptureError::DecodeError("stream has no channels".into()));
        }

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(decode_error)?;

        let mut channels = vec![Vec::new(); num_channels];

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break
                }
                Err(e) => return Err(decode_error(e)),
            };

            while !format.metadata().is_latest() {
                format.metadata().pop();
            }

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet).map_err(decode_error)? {
                AudioBufferRef::F32(buf) => extend_channels(&mut channels, buf),
                AudioBufferRef::F64(buf) => extend_channels(&mut channels, buf),
                AudioBufferRef::U8(buf) => extend_channels(&mut channels, buf),
                AudioBufferRef::U16(buf) => extend_channels(&mut channels, buf),
                AudioBufferRef::U24(buf) => extend_channels(&mut channels, buf),
                AudioBufferRef::U32(buf) => extend_channels(&mut channels, buf),
                AudioBufferRef::S8(buf) => extend_channels(&mut channels, buf),
                AudioBufferRef::S16(buf) => extend_channels(&mut channels, buf),
                AudioBufferRef::S24(buf) => extend_channels(&mut channels, buf),
                AudioBufferRef::S32(buf) => extend_channels(&mut channels, buf),
            }
        }

        debug!(
            "Decoded {} bytes: {}Hz, {} channels, {} samples",
            bytes.len(),
            sample_rate,
            num_channels,
            channels[0].len()
        );

        Ok(DecodedAudioBuffer::new(sample_rate, channels))
    }
}

fn extend_channels<T>(channels: &mut [Vec<f32>], data: Cow<AudioBuffer<T>>)
where
    T: Sample,
    f32: FromSample<T>,
{
    let available = data.spec().channels.count();
    for (c, out) in channels.iter_mut().enumerate().take(available) {
        out.extend(data.chan(c).iter().map(|v| f32::from_sample(*v)));
    }
}

fn decode_error(err: SymphoniaError) -> CaptureError {
    CaptureError::DecodeError(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::chunk::encode_wav;

    #[test]
    fn test_decode_stereo_wav() {
        // Interleaved L/R: left is positive, right is negative
        let samples = vec![16384, -16384, 8192, -8192, 0, 0];
        let bytes = encode_wav(&samples, 44100, 2).unwrap();

        let decoded = SymphoniaDecoder::wav().decode(&bytes).unwrap();

        assert_eq!(decoded.sample_rate, 44100);
        assert_eq!(decoded.num_channels(), 2);
        assert_eq!(decoded.num_samples(), 3);
        assert!((decoded.channels[0][0] - 0.5).abs() < 1e-4);
        assert!((decoded.channels[1][0] + 0.5).abs() < 1e-4);
        assert!((decoded.channels[0][1] - 0.25).abs() < 1e-4);
    }

    #[test]
    fn test_decode_garbage_is_decode_error() {
        let result = SymphoniaDecoder::default().decode(b"definitely not audio");
        assert!(matches!(result, Err(CaptureError::DecodeError(_))));
    }

    #[test]
    fn test_decoded_samples_stay_in_range() {
        let samples = vec![i16::MIN, i16::MAX, 0, -1];
        let bytes = encode_wav(&samples, 8000, 1).unwrap();

        let decoded = SymphoniaDecoder::wav().decode(&bytes).unwrap();

        for &s in &decoded.channels[0] {
            assert!((-1.0..=1.0).contains(&s), "sample {} out of range", s);
        }
    }
}
