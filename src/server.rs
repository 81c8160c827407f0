//! HTTP surface for the emotion classifier.
//!
//! Serves the embedded single-page UI, a JSON classification endpoint, and
//! a health check. Each upload triggers one synchronous pipeline run; a
//! clip that cannot be decoded is a 422 for that request only, while the
//! process keeps serving.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
};
use tracing::{error, info};

use crate::decode::{decode_wav, DecodeError};
use crate::pipeline::{Pipeline, TensorSink};

/// Upload size cap; a few minutes of uncompressed stereo WAV
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Shared state for the web server
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/classify", post(classify))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_UPLOAD_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(state);

    info!("Emotion classifier listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {}: {}", addr, e))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("server error: {}", e))?;
    Ok(())
}

async fn index() -> Html<&'static str> {
    Html(include_str!("../assets/index.html"))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "healthy": true,
        "service": "emotion-classifier",
    }))
}

#[derive(Debug, Serialize)]
struct LabeledScore {
    label: &'static str,
    score: f32,
}

#[derive(Debug, Serialize)]
struct WaveformPlot {
    sample_rate: u32,
    samples: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct SpectrogramPlot {
    n_mels: usize,
    n_frames: usize,
    /// Row-major (mel band x frame) log-mel values
    values: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct ClassifyResponse {
    label: &'static str,
    predictions: Vec<LabeledScore>,
    waveform: WaveformPlot,
    spectrogram: SpectrogramPlot,
}

/// Collects the pipeline's display tensors into plot payloads.
#[derive(Default)]
struct PlotCollector {
    waveform: Option<Vec<f32>>,
    spectrogram: Option<(usize, usize, Vec<f32>)>,
}

impl TensorSink for PlotCollector {
    fn accept(&mut self, name: &str, shape: &[usize], data: &[f32]) {
        match name {
            "waveform" => self.waveform = Some(data.to_vec()),
            "mel_spectrogram" => {
                if let [n_mels, n_frames] = shape {
                    self.spectrogram = Some((*n_mels, *n_frames, data.to_vec()));
                }
            }
            _ => {}
        }
    }
}

/// User-visible API error with an HTTP status.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: String) -> Self {
        Self { status, message }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

impl From<DecodeError> for ApiError {
    fn from(e: DecodeError) -> Self {
        // Recoverable: the request is rejected, the server keeps serving
        ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
    }
}

/// Classify an uploaded WAV clip.
async fn classify(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ClassifyResponse>, ApiError> {
    let mut audio_bytes = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ApiError::new(StatusCode::BAD_REQUEST, format!("invalid upload: {}", e))
    })? {
        if field.name() == Some("file") {
            let data = field.bytes().await.map_err(|e| {
                ApiError::new(
                    StatusCode::BAD_REQUEST,
                    format!("failed to read upload: {}", e),
                )
            })?;
            audio_bytes = Some(data);
        }
    }
    let audio_bytes = audio_bytes.ok_or_else(|| {
        ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "no audio file in upload".to_string(),
        )
    })?;

    let clip = decode_wav(&audio_bytes)?;
    info!(
        "Classifying clip: {} channel(s), {} samples at {} Hz",
        clip.channels.len(),
        clip.len(),
        clip.sample_rate
    );

    let mut plots = PlotCollector::default();
    let prediction = state.pipeline.run_with_sink(&clip, &mut plots).map_err(|e| {
        error!("Pipeline failed: {}", e);
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "classification failed".to_string(),
        )
    })?;

    let (n_mels, n_frames, values) = plots.spectrogram.unwrap_or((0, 0, Vec::new()));
    let response = ClassifyResponse {
        label: prediction.label(),
        predictions: prediction
            .labeled_scores()
            .map(|(label, score)| LabeledScore { label, score })
            .collect(),
        waveform: WaveformPlot {
            sample_rate: state.pipeline.config().target_sample_rate,
            samples: plots.waveform.unwrap_or_default(),
        },
        spectrogram: SpectrogramPlot {
            n_mels,
            n_frames,
            values,
        },
    };

    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plot_collector_keeps_known_tensors() {
        let mut collector = PlotCollector::default();
        collector.accept("waveform", &[4], &[0.0, 0.1, 0.2, 0.3]);
        collector.accept("mel_spectrogram", &[2, 3], &[1.0; 6]);
        collector.accept("unknown", &[1], &[9.0]);

        assert_eq!(collector.waveform.as_deref(), Some(&[0.0, 0.1, 0.2, 0.3][..]));
        let (n_mels, n_frames, values) = collector.spectrogram.unwrap();
        assert_eq!((n_mels, n_frames), (2, 3));
        assert_eq!(values.len(), 6);
    }

    #[test]
    fn test_decode_error_maps_to_422() {
        let api: ApiError = DecodeError::NoChannels.into();
        assert_eq!(api.status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
