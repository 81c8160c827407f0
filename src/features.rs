//! Mel spectrogram extraction.
//!
//! Converts a length-normalized waveform into the power mel spectrogram the
//! emotion classifier was trained on: Hann-windowed centered FFT frames,
//! an HTK-scale triangular filterbank, and log compression with a small
//! epsilon floor. Frames are centered on multiples of the hop length with
//! reflection padding at the edges, so a clip of `n` samples yields
//! `n / hop_length + 1` frames.

use ndarray::Array3;
use realfft::{RealFftPlanner, RealToComplex};
use std::f32::consts::PI;
use std::sync::Arc;
use thiserror::Error;

use crate::config::PipelineConfig;

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("FFT failed: {0}")]
    Fft(String),
}

/// Mel spectrogram generator with pre-computed filterbank and FFT plan.
pub struct MelSpectrogramGenerator {
    n_fft: usize,
    hop_length: usize,
    n_mels: usize,
    fft: Arc<dyn RealToComplex<f32>>,
    mel_filterbank: Vec<Vec<f32>>,
    window: Vec<f32>,
}

impl MelSpectrogramGenerator {
    /// Create a new generator for the given pipeline parameters.
    pub fn new(config: &PipelineConfig) -> Self {
        // Periodic Hann window over the full FFT length
        let window: Vec<f32> = (0..config.n_fft)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / config.n_fft as f32).cos()))
            .collect();

        let mel_filterbank = create_mel_filterbank(
            config.n_mels,
            config.n_fft / 2 + 1,
            config.target_sample_rate as f32,
            config.f_min,
            config.f_max,
        );

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(config.n_fft);

        Self {
            n_fft: config.n_fft,
            hop_length: config.hop_length,
            n_mels: config.n_mels,
            fft,
            mel_filterbank,
            window,
        }
    }

    /// Number of frames produced for an input of `n_samples` samples.
    pub fn n_frames(&self, n_samples: usize) -> usize {
        n_samples / self.hop_length + 1
    }

    /// Compute the power mel spectrogram of a mono waveform.
    ///
    /// Returns a `(1, n_mels, frames)` tensor: a single-channel image with
    /// mel bands on the vertical axis and time frames on the horizontal.
    pub fn compute(&self, samples: &[f32]) -> Result<Array3<f32>, FeatureError> {
        let n_frames = self.n_frames(samples.len());
        let n_bins = self.n_fft / 2 + 1;
        let pad = (self.n_fft / 2) as isize;

        let mut mel = Array3::<f32>::zeros((1, self.n_mels, n_frames));
        let mut fft_input = vec![0.0f32; self.n_fft];
        let mut fft_output =
            vec![realfft::num_complex::Complex::new(0.0f32, 0.0); n_bins];
        let mut power_spec = vec![0.0f32; n_bins];

        for frame_idx in 0..n_frames {
            // Frame is centered on frame_idx * hop_length; edges reflect
            let start = (frame_idx * self.hop_length) as isize - pad;
            for (i, slot) in fft_input.iter_mut().enumerate() {
                *slot = reflected_sample(samples, start + i as isize) * self.window[i];
            }

            self.fft
                .process(&mut fft_input, &mut fft_output)
                .map_err(|e| FeatureError::Fft(e.to_string()))?;

            for (bin, c) in fft_output.iter().enumerate() {
                power_spec[bin] = c.re * c.re + c.im * c.im;
            }

            for (band, filter) in self.mel_filterbank.iter().enumerate() {
                let energy: f32 = filter
                    .iter()
                    .zip(power_spec.iter())
                    .map(|(f, p)| f * p)
                    .sum();
                mel[[0, band, frame_idx]] = energy;
            }
        }

        Ok(mel)
    }
}

/// Apply `ln(x + offset)` element-wise.
///
/// The epsilon floor keeps the result finite for zero magnitudes; for any
/// non-negative input the output is never -inf or NaN.
pub fn log_compress(mel: &mut Array3<f32>, offset: f32) {
    mel.mapv_inplace(|v| (v + offset).ln());
}

/// Look up a sample with reflection at the buffer edges.
fn reflected_sample(samples: &[f32], index: isize) -> f32 {
    let len = samples.len() as isize;
    if len == 0 {
        return 0.0;
    }
    if len == 1 {
        return samples[0];
    }
    let mut i = index;
    // Fold until the index lands inside the buffer
    while i < 0 || i >= len {
        if i < 0 {
            i = -i;
        }
        if i >= len {
            i = 2 * (len - 1) - i;
        }
    }
    samples[i as usize]
}

/// Convert frequency to mel scale (HTK formula)
fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

/// Convert mel scale to frequency
fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0_f32.powf(mel / 2595.0) - 1.0)
}

/// Create a triangular mel filterbank.
///
/// Returns one weight vector of `n_fft_bins` entries per mel band.
fn create_mel_filterbank(
    n_mels: usize,
    n_fft_bins: usize,
    sample_rate: f32,
    f_min: f32,
    f_max: f32,
) -> Vec<Vec<f32>> {
    let mel_min = hz_to_mel(f_min);
    let mel_max = hz_to_mel(f_max);

    // n_mels + 2 equally spaced points in mel scale
    let mel_points: Vec<f32> = (0..=n_mels + 1)
        .map(|i| mel_min + (mel_max - mel_min) * (i as f32) / ((n_mels + 1) as f32))
        .collect();

    let hz_points: Vec<f32> = mel_points.iter().map(|&m| mel_to_hz(m)).collect();

    // Fractional FFT bin index of each corner frequency
    let fft_bin_points: Vec<f32> = hz_points
        .iter()
        .map(|&hz| (n_fft_bins as f32 - 1.0) * hz / (sample_rate / 2.0))
        .collect();

    let mut filterbank = Vec::with_capacity(n_mels);

    for i in 0..n_mels {
        let mut filter = vec![0.0f32; n_fft_bins];

        let left = fft_bin_points[i];
        let center = fft_bin_points[i + 1];
        let right = fft_bin_points[i + 2];

        for (bin, weight) in filter.iter_mut().enumerate() {
            let bin_f = bin as f32;

            if bin_f >= left && bin_f < center {
                *weight = (bin_f - left) / (center - left);
            } else if bin_f >= center && bin_f <= right {
                *weight = (right - bin_f) / (right - center);
            }
        }

        filterbank.push(filter);
    }

    filterbank
}
