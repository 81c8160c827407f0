//! WAV decoding for uploaded audio clips.
//!
//! Turns raw upload bytes into an [`AudioClip`] with de-interleaved f32
//! channels. Anything that cannot be parsed as WAV is a recoverable
//! [`DecodeError`] surfaced to the caller; decoding never panics on bad
//! input.

use std::io::Cursor;
use thiserror::Error;

/// Errors produced while decoding uploaded bytes into audio.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("could not parse audio: {0}")]
    InvalidWav(String),

    #[error("audio has no channels")]
    NoChannels,

    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),
}

/// A decoded audio clip: per-channel sample buffers plus the native rate.
///
/// Immutable once decoded; it is consumed by one pipeline run and then
/// discarded.
#[derive(Debug, Clone)]
pub struct AudioClip {
    /// De-interleaved samples, one inner buffer per channel, in [-1, 1]
    pub channels: Vec<Vec<f32>>,
    /// Native sample rate in Hz
    pub sample_rate: u32,
}

impl AudioClip {
    /// Sample count per channel.
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decode a WAV byte buffer into an [`AudioClip`].
///
/// Accepts PCM integer (8/16/24/32-bit) and IEEE float WAV. Integer samples
/// are normalized to [-1, 1] by their nominal full scale.
pub fn decode_wav(bytes: &[u8]) -> Result<AudioClip, DecodeError> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| DecodeError::InvalidWav(e.to_string()))?;

    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(DecodeError::NoChannels);
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<f32>, _>>()
            .map_err(|e| DecodeError::InvalidWav(e.to_string()))?,
        hound::SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(DecodeError::UnsupportedFormat(format!(
                    "{}-bit PCM",
                    spec.bits_per_sample
                )));
            }
            let full_scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / full_scale))
                .collect::<Result<Vec<f32>, _>>()
                .map_err(|e| DecodeError::InvalidWav(e.to_string()))?
        }
    };

    let n_channels = spec.channels as usize;
    let frames = interleaved.len() / n_channels;
    let mut channels = vec![Vec::with_capacity(frames); n_channels];
    for frame in interleaved.chunks_exact(n_channels) {
        for (ch, &sample) in frame.iter().enumerate() {
            channels[ch].push(sample);
        }
    }

    Ok(AudioClip {
        channels,
        sample_rate: spec.sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Encode interleaved PCM16 samples as an in-memory WAV file.
    fn wav_bytes_pcm16(channels: u16, sample_rate: u32, interleaved: &[i16]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &sample in interleaved {
                writer.write_sample(sample).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_decode_mono_pcm16_roundtrip() {
        let samples: Vec<i16> = vec![0, 16384, -16384, 32767, -32768];
        let bytes = wav_bytes_pcm16(1, 16000, &samples);

        let clip = decode_wav(&bytes).unwrap();
        assert_eq!(clip.sample_rate, 16000);
        assert_eq!(clip.channels.len(), 1);
        assert_eq!(clip.len(), samples.len());

        for (&raw, &decoded) in samples.iter().zip(clip.channels[0].iter()) {
            let expected = raw as f32 / 32768.0;
            assert!(
                (decoded - expected).abs() < 1e-6,
                "sample {} decoded as {}",
                raw,
                decoded
            );
        }
    }

    #[test]
    fn test_decode_stereo_deinterleaves() {
        // Left channel ramps up, right channel ramps down
        let interleaved: Vec<i16> = vec![100, -100, 200, -200, 300, -300];
        let bytes = wav_bytes_pcm16(2, 44100, &interleaved);

        let clip = decode_wav(&bytes).unwrap();
        assert_eq!(clip.channels.len(), 2);
        assert_eq!(clip.len(), 3);
        assert!(clip.channels[0].iter().all(|&s| s > 0.0));
        assert!(clip.channels[1].iter().all(|&s| s < 0.0));
    }

    #[test]
    fn test_decode_zero_length_clip() {
        let bytes = wav_bytes_pcm16(1, 16000, &[]);
        let clip = decode_wav(&bytes).unwrap();
        assert!(clip.is_empty());
        assert_eq!(clip.channels.len(), 1);
    }

    #[test]
    fn test_decode_empty_bytes_is_error() {
        assert!(matches!(decode_wav(&[]), Err(DecodeError::InvalidWav(_))));
    }

    #[test]
    fn test_decode_garbage_is_error() {
        let garbage: Vec<u8> = (0..=255).collect();
        assert!(decode_wav(&garbage).is_err());
    }

    #[test]
    fn test_decode_float_wav() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22050,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for sample in [0.0f32, 0.5, -0.5, 1.0] {
                writer.write_sample(sample).unwrap();
            }
            writer.finalize().unwrap();
        }

        let clip = decode_wav(&cursor.into_inner()).unwrap();
        assert_eq!(clip.sample_rate, 22050);
        assert_eq!(clip.channels[0], vec![0.0, 0.5, -0.5, 1.0]);
    }

    proptest! {
        #[test]
        fn prop_decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..1024)) {
            // Arbitrary bytes must produce Ok or DecodeError, never a panic
            let _ = decode_wav(&bytes);
        }

        #[test]
        fn prop_decoded_samples_are_in_range(
            samples in proptest::collection::vec(any::<i16>(), 1..256)
        ) {
            let bytes = wav_bytes_pcm16(1, 16000, &samples);
            let clip = decode_wav(&bytes).unwrap();
            for &s in &clip.channels[0] {
                prop_assert!((-1.0..=1.0).contains(&s));
            }
        }
    }
}
