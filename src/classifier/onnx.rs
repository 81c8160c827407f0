//! ONNX Runtime implementation of the classifier seam.
//!
//! Loads the trained parameter artifact once at startup and keeps the
//! session alive for the lifetime of the process. Load failures are fatal:
//! a missing, unloadable, or shape-incompatible artifact must prevent the
//! application from serving any request.

use std::path::Path;
use std::sync::Mutex;

use ndarray::{Array4, ArrayView4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::Value,
};
use tracing::info;

use super::{ClassifierError, EmotionClassifier, EMOTION_LABELS};
use crate::config::{Device, FatalConfigError, PipelineConfig};

/// Emotion classifier backed by an ONNX Runtime session.
///
/// `Session::run` needs exclusive access, so the session sits behind a
/// mutex; the parameters themselves are read-only after load.
pub struct OnnxClassifier {
    session: Mutex<Session>,
}

impl OnnxClassifier {
    /// Load the classifier artifact and verify it against the pipeline's
    /// feature shape.
    ///
    /// The verification pass runs one inference on an all-zero tensor of
    /// the exact shape the pipeline will produce, so incompatible models
    /// fail here rather than on the first user request.
    pub fn load(
        model_path: &Path,
        config: &PipelineConfig,
        device: Device,
        intra_threads: usize,
    ) -> Result<Self, FatalConfigError> {
        if !model_path.exists() {
            return Err(FatalConfigError::ModelNotFound(model_path.to_path_buf()));
        }

        // Only CPU inference is supported; the artifact is mapped onto the
        // CPU regardless of the device it was trained on.
        match device {
            Device::Cpu => {}
        }

        info!("Loading emotion classifier from {:?}", model_path);

        let session = Session::builder()
            .and_then(|b| Ok(b.with_optimization_level(GraphOptimizationLevel::Level3)?))
            .and_then(|b| Ok(b.with_intra_threads(intra_threads)?))
            .and_then(|mut b| b.commit_from_file(model_path))
            .map_err(|e| FatalConfigError::ModelLoad(e.to_string()))?;

        let classifier = Self {
            session: Mutex::new(session),
        };

        let probe = Array4::<f32>::zeros((1, 1, config.n_mels, config.n_frames()));
        classifier
            .infer(probe.view())
            .map_err(|e| FatalConfigError::IncompatibleModel(e.to_string()))?;

        info!(
            "Emotion classifier loaded ({} classes, input 1x1x{}x{})",
            EMOTION_LABELS.len(),
            config.n_mels,
            config.n_frames()
        );

        Ok(classifier)
    }

    fn infer(&self, features: ArrayView4<'_, f32>) -> Result<Vec<f32>, ClassifierError> {
        let (batch, channels, mels, frames) = features.dim();
        let flat: Vec<f32> = features.iter().copied().collect();

        let input = Value::from_array(([batch, channels, mels, frames], flat))
            .map_err(|e| ClassifierError::Inference(format!("failed to create input tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ClassifierError::Inference("classifier lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        let output = outputs
            .iter()
            .next()
            .ok_or_else(|| ClassifierError::Inference("model produced no output".to_string()))?;

        let (_shape, scores) = output
            .1
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        if scores.len() != EMOTION_LABELS.len() {
            return Err(ClassifierError::UnexpectedOutput {
                expected: EMOTION_LABELS.len(),
                got: scores.len(),
            });
        }

        Ok(scores.to_vec())
    }
}

impl EmotionClassifier for OnnxClassifier {
    fn classify(&self, features: ArrayView4<'_, f32>) -> Result<Vec<f32>, ClassifierError> {
        self.infer(features)
    }
}
