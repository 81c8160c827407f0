//! Emotion classification over preprocessed feature tensors.
//!
//! The classifier itself is an opaque, externally trained artifact. This
//! module defines the inference seam ([`EmotionClassifier`]) the pipeline
//! calls through, the fixed six-class label set, and the [`Prediction`]
//! produced from raw scores. The ONNX-backed implementation lives in
//! [`onnx`].

pub mod onnx;

pub use onnx::OnnxClassifier;

use ndarray::ArrayView4;
use thiserror::Error;

/// The six emotion classes, in the classifier's output order.
pub const EMOTION_LABELS: [&str; 6] = ["HAP", "NEU", "ANG", "FEA", "DIS", "SAD"];

/// Errors produced while running the classifier.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("inference failed: {0}")]
    Inference(String),

    #[error("classifier returned {got} scores, expected {expected}")]
    UnexpectedOutput { expected: usize, got: usize },
}

/// Inference seam: a prepared `(batch, channel, mel, time)` tensor in, one
/// raw score per emotion class out.
///
/// Implementations run in inference-only mode; they never update
/// parameters, and the loaded parameters may be shared read-only across
/// requests.
pub trait EmotionClassifier: Send + Sync {
    fn classify(&self, features: ArrayView4<'_, f32>) -> Result<Vec<f32>, ClassifierError>;
}

/// Raw classifier scores aligned to [`EMOTION_LABELS`].
///
/// Scores are surfaced exactly as the model produced them; no softmax or
/// other normalization is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    scores: [f32; 6],
}

impl Prediction {
    /// Build a prediction from raw scores, enforcing the six-class contract.
    pub fn from_scores(scores: Vec<f32>) -> Result<Self, ClassifierError> {
        let scores: [f32; 6] = scores.try_into().map_err(|v: Vec<f32>| {
            ClassifierError::UnexpectedOutput {
                expected: EMOTION_LABELS.len(),
                got: v.len(),
            }
        })?;
        Ok(Self { scores })
    }

    pub fn scores(&self) -> &[f32; 6] {
        &self.scores
    }

    /// Index of the winning class.
    ///
    /// Strict greater-than comparison keeps the lowest index on ties, the
    /// usual argmax convention.
    pub fn predicted_index(&self) -> usize {
        let mut best = 0;
        for (i, &score) in self.scores.iter().enumerate() {
            if score > self.scores[best] {
                best = i;
            }
        }
        best
    }

    /// Label of the winning class.
    pub fn label(&self) -> &'static str {
        EMOTION_LABELS[self.predicted_index()]
    }

    /// Scores paired with their labels, in fixed order.
    pub fn labeled_scores(&self) -> impl Iterator<Item = (&'static str, f32)> + '_ {
        EMOTION_LABELS.iter().copied().zip(self.scores.iter().copied())
    }
}
