//! Whole-clip sample-rate conversion.
//!
//! Wraps `rubato`'s FFT resampler for offline use: the clip is fed through
//! in fixed-size chunks, the tail is flushed with zeros, and the resampler's
//! output delay is trimmed so the result has exactly
//! `round(to_rate / from_rate * input_len)` samples per channel.

use rubato::{FftFixedIn, Resampler};
use thiserror::Error;
use tracing::debug;

/// Input chunk size fed to the resampler
const CHUNK_SIZE: usize = 1024;

#[derive(Debug, Error)]
pub enum ResampleError {
    #[error("failed to create resampler: {0}")]
    Construction(String),

    #[error("resampling failed: {0}")]
    Process(String),
}

/// Resample every channel of a clip from `from_rate` to `to_rate`.
///
/// Channels are converted together through one multi-channel resampler, so
/// their relative alignment is preserved. When the rates already match the
/// input is returned unchanged.
pub fn resample(
    channels: &[Vec<f32>],
    from_rate: u32,
    to_rate: u32,
) -> Result<Vec<Vec<f32>>, ResampleError> {
    if from_rate == to_rate {
        return Ok(channels.to_vec());
    }
    let n_channels = channels.len();
    if n_channels == 0 {
        return Ok(Vec::new());
    }

    let input_len = channels[0].len();
    let expected = (input_len as f64 * to_rate as f64 / from_rate as f64).round() as usize;
    if expected == 0 {
        return Ok(vec![Vec::new(); n_channels]);
    }

    debug!(
        "Resampling {} channel(s): {} Hz -> {} Hz ({} -> {} samples)",
        n_channels, from_rate, to_rate, input_len, expected
    );

    let mut resampler = FftFixedIn::<f32>::new(
        from_rate as usize,
        to_rate as usize,
        CHUNK_SIZE,
        2, // sub_chunks for quality
        n_channels,
    )
    .map_err(|e| ResampleError::Construction(e.to_string()))?;

    // The first `delay` output frames are transient; trimming them aligns
    // the output with the start of the input.
    let delay = resampler.output_delay();
    let needed = delay + expected;

    let mut input_buffer = vec![vec![0.0f32; CHUNK_SIZE]; n_channels];
    let mut output_buffer = resampler.output_buffer_allocate(true);
    let mut collected: Vec<Vec<f32>> = vec![Vec::with_capacity(needed + CHUNK_SIZE); n_channels];
    let mut position = 0;

    while collected[0].len() < needed {
        // Past the end of the clip the resampler is flushed with zeros
        for (ch, buffer) in input_buffer.iter_mut().enumerate() {
            for (i, slot) in buffer.iter_mut().enumerate() {
                *slot = channels[ch].get(position + i).copied().unwrap_or(0.0);
            }
        }
        position += CHUNK_SIZE;

        let (_, output_frames) = resampler
            .process_into_buffer(&input_buffer, &mut output_buffer, None)
            .map_err(|e| ResampleError::Process(e.to_string()))?;

        for (ch, collected_ch) in collected.iter_mut().enumerate() {
            collected_ch.extend_from_slice(&output_buffer[ch][..output_frames]);
        }
    }

    for channel in &mut collected {
        channel.drain(..delay);
        channel.truncate(expected);
    }
    Ok(collected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::f32::consts::PI;

    fn generate_sine(freq_hz: f32, sample_rate: u32, duration_samples: usize) -> Vec<f32> {
        (0..duration_samples)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                0.5 * (2.0 * PI * freq_hz * t).sin()
            })
            .collect()
    }

    fn expected_len(input_len: usize, from: u32, to: u32) -> usize {
        (input_len as f64 * to as f64 / from as f64).round() as usize
    }

    #[test]
    fn test_identity_when_rates_match() {
        let signal = generate_sine(440.0, 16000, 1000);
        let out = resample(&[signal.clone()], 16000, 16000).unwrap();
        assert_eq!(out[0], signal);
    }

    #[test]
    fn test_48k_to_16k_length() {
        let signal = generate_sine(440.0, 48000, 48000);
        let out = resample(&[signal], 48000, 16000).unwrap();
        let expected = expected_len(48000, 48000, 16000);
        assert!(
            (out[0].len() as i64 - expected as i64).abs() <= 1,
            "expected ~{} samples, got {}",
            expected,
            out[0].len()
        );
    }

    #[test]
    fn test_44100_to_16k_length() {
        let signal = generate_sine(440.0, 44100, 22050);
        let out = resample(&[signal], 44100, 16000).unwrap();
        let expected = expected_len(22050, 44100, 16000);
        assert!((out[0].len() as i64 - expected as i64).abs() <= 1);
    }

    #[test]
    fn test_upsampling_8k_to_16k_length() {
        let signal = generate_sine(200.0, 8000, 4000);
        let out = resample(&[signal], 8000, 16000).unwrap();
        let expected = expected_len(4000, 8000, 16000);
        assert!((out[0].len() as i64 - expected as i64).abs() <= 1);
    }

    #[test]
    fn test_resampled_tone_keeps_energy() {
        let signal = generate_sine(440.0, 48000, 48000);
        let out = resample(&[signal], 48000, 16000).unwrap();

        // The middle of the clip should still carry the tone
        let middle = &out[0][4000..12000];
        let rms: f32 =
            (middle.iter().map(|s| s * s).sum::<f32>() / middle.len() as f32).sqrt();
        assert!(rms > 0.2, "resampled tone lost energy: rms {}", rms);
    }

    #[test]
    fn test_empty_input_yields_empty_output() {
        let out = resample(&[Vec::new()], 44100, 16000).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].is_empty());
    }

    #[test]
    fn test_channels_stay_aligned() {
        // Two identical channels must come out identical
        let signal = generate_sine(440.0, 44100, 8820);
        let out = resample(&[signal.clone(), signal], 44100, 16000).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], out[1]);
    }

    proptest! {
        #[test]
        fn prop_output_length_matches_ratio(
            rate_index in 0usize..7,
            input_len in 1usize..2048
        ) {
            let from_rate = [8000u32, 11025, 16000, 22050, 24000, 44100, 48000][rate_index];
            let signal = vec![0.1f32; input_len];
            let out = resample(&[signal], from_rate, 16000).unwrap();
            let expected = expected_len(input_len, from_rate, 16000);
            prop_assert!((out[0].len() as i64 - expected as i64).abs() <= 1);
        }
    }
}
