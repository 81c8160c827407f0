//! Configuration for the preprocessing-and-inference pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Startup-time configuration errors.
///
/// Any of these prevents the application from serving requests at all; they
/// are never retried.
#[derive(Debug, Error)]
pub enum FatalConfigError {
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    #[error("classifier model not found at {0}")]
    ModelNotFound(PathBuf),

    #[error("failed to load classifier model: {0}")]
    ModelLoad(String),

    #[error("classifier model is incompatible: {0}")]
    IncompatibleModel(String),
}

/// Compute device for classifier inference.
///
/// Passed explicitly into the classifier rather than read from ambient
/// global state. The parameter artifact is always mapped onto the CPU at
/// load time, whatever device it was trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    #[default]
    Cpu,
}

/// Fixed numeric parameters of the preprocessing pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Sample rate every clip is resampled to (Hz)
    pub target_sample_rate: u32,

    /// Sample count every clip is padded/truncated to
    pub num_samples: usize,

    /// FFT window size
    pub n_fft: usize,

    /// Hop length between frames (in samples)
    pub hop_length: usize,

    /// Number of mel frequency bands
    pub n_mels: usize,

    /// Minimum frequency for the mel filterbank (Hz)
    pub f_min: f32,

    /// Maximum frequency for the mel filterbank (Hz)
    pub f_max: f32,

    /// Small value added before log for numerical stability
    pub log_offset: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000,
            num_samples: 22050,
            n_fft: 1024,
            hop_length: 512,
            n_mels: 64,
            f_min: 0.0,
            f_max: 8000.0,
            log_offset: 1e-5,
        }
    }
}

impl PipelineConfig {
    /// Number of time frames the spectral transform produces for a
    /// length-normalized clip: `num_samples / hop_length + 1` (centered
    /// frames, the boundary convention of the transform primitive).
    pub fn n_frames(&self) -> usize {
        self.num_samples / self.hop_length + 1
    }

    /// Check the mutual consistency of the parameters.
    pub fn validate(&self) -> Result<(), FatalConfigError> {
        if self.target_sample_rate == 0 {
            return Err(FatalConfigError::InvalidConfig(
                "target sample rate must be positive".to_string(),
            ));
        }
        if self.num_samples == 0 {
            return Err(FatalConfigError::InvalidConfig(
                "target sample count must be positive".to_string(),
            ));
        }
        if self.n_fft == 0 || self.hop_length == 0 || self.n_mels == 0 {
            return Err(FatalConfigError::InvalidConfig(
                "FFT size, hop length and mel band count must be positive".to_string(),
            ));
        }
        if self.hop_length >= self.n_fft {
            return Err(FatalConfigError::InvalidConfig(format!(
                "hop length {} must be smaller than FFT size {}",
                self.hop_length, self.n_fft
            )));
        }
        let nyquist = self.target_sample_rate as f32 / 2.0;
        if self.f_min < 0.0 || self.f_min >= self.f_max || self.f_max > nyquist {
            return Err(FatalConfigError::InvalidConfig(format!(
                "mel filterbank range {}..{} Hz is invalid for a {} Hz Nyquist",
                self.f_min, self.f_max, nyquist
            )));
        }
        if self.log_offset <= 0.0 {
            return Err(FatalConfigError::InvalidConfig(
                "log offset must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
