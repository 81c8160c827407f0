//! The preprocessing-and-inference pipeline.
//!
//! A straight-line sequence of stateless transforms, run once per submitted
//! clip:
//!
//! 1. Resample to the target rate (all channels together)
//! 2. Retain the first channel only
//! 3. Pad with zeros / truncate at the end to the target sample count
//! 4. Mel spectrogram
//! 5. Log compression
//! 6. Batch-dimension insertion
//! 7. Classifier inference
//! 8. Argmax label selection
//!
//! The pipeline is a pure function of (clip, config, loaded model); the
//! display plots are fed through a [`TensorSink`] so rendering stays out of
//! the pipeline itself.

use ndarray::Axis;
use std::cmp::Ordering;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::classifier::{ClassifierError, EmotionClassifier, Prediction};
use crate::config::{FatalConfigError, PipelineConfig};
use crate::decode::AudioClip;
use crate::features::{log_compress, FeatureError, MelSpectrogramGenerator};
use crate::resample::{resample, ResampleError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("audio clip has no channels")]
    NoChannels,

    #[error("resampling failed: {0}")]
    Resample(#[from] ResampleError),

    #[error("feature extraction failed: {0}")]
    Feature(#[from] FeatureError),

    #[error("classification failed: {0}")]
    Classifier(#[from] ClassifierError),
}

/// Consumer of named intermediate tensors, for display purposes only.
///
/// The pipeline publishes the tensors a UI would plot ("waveform",
/// "mel_spectrogram") without knowing anything about rendering.
pub trait TensorSink {
    fn accept(&mut self, name: &str, shape: &[usize], data: &[f32]);
}

/// Sink that drops every tensor, for headless runs.
pub struct NullSink;

impl TensorSink for NullSink {
    fn accept(&mut self, _name: &str, _shape: &[usize], _data: &[f32]) {}
}

/// Preprocessing-and-inference pipeline with a fixed configuration and a
/// loaded classifier.
///
/// Holds no per-request state; one instance is shared across requests.
pub struct Pipeline {
    config: PipelineConfig,
    mel: MelSpectrogramGenerator,
    classifier: Arc<dyn EmotionClassifier>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        classifier: Arc<dyn EmotionClassifier>,
    ) -> Result<Self, FatalConfigError> {
        config.validate()?;
        let mel = MelSpectrogramGenerator::new(&config);
        Ok(Self {
            config,
            mel,
            classifier,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline on a decoded clip.
    pub fn run(&self, clip: &AudioClip) -> Result<Prediction, PipelineError> {
        self.run_with_sink(clip, &mut NullSink)
    }

    /// Run the pipeline, publishing display tensors to `sink`.
    pub fn run_with_sink(
        &self,
        clip: &AudioClip,
        sink: &mut dyn TensorSink,
    ) -> Result<Prediction, PipelineError> {
        let resampled = resample(
            &clip.channels,
            clip.sample_rate,
            self.config.target_sample_rate,
        )?;

        // Mono-only simplification: only the first channel is carried
        // forward; the rest are discarded, not mixed down.
        let mono = resampled
            .into_iter()
            .next()
            .ok_or(PipelineError::NoChannels)?;

        let signal = length_normalize(mono, self.config.num_samples);
        sink.accept("waveform", &[signal.len()], &signal);

        let mut mel = self.mel.compute(&signal)?;
        log_compress(&mut mel, self.config.log_offset);

        let (_, n_mels, n_frames) = mel.dim();
        if let Some(data) = mel.as_slice() {
            sink.accept("mel_spectrogram", &[n_mels, n_frames], data);
        }

        // The classifier expects (batch, channel, mel, time)
        let features = mel.insert_axis(Axis(0));
        debug!("Running classifier on {:?} features", features.dim());

        let scores = self.classifier.classify(features.view())?;
        let prediction = Prediction::from_scores(scores)?;
        debug!("Predicted label: {}", prediction.label());
        Ok(prediction)
    }
}

/// Pad with zeros at the end, or truncate from the end, to `target_len`
/// samples. A clip already at the target length passes through unchanged;
/// a zero-length clip becomes silence.
fn length_normalize(mut samples: Vec<f32>, target_len: usize) -> Vec<f32> {
    match samples.len().cmp(&target_len) {
        Ordering::Greater => samples.truncate(target_len),
        Ordering::Less => samples.resize(target_len, 0.0),
        Ordering::Equal => {}
    }
    samples
}
