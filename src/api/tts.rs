//! Streaming text-to-speech endpoints

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{Query, State, rejection::JsonRejection},
    http::{HeaderName, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use serde_json::{Map, Value};

use super::ApiState;
use crate::effects::{PRESET_VERSION, Preset};
use crate::synthesis::{SynthesisRequest, parse_overrides};
use crate::voice::Prosody;

const SAMPLE_RATE_HEADER: HeaderName = HeaderName::from_static("x-sample-rate");
const VOICE_HEADER: HeaderName = HeaderName::from_static("x-voice");

/// Build TTS router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/stream", get(stream_query).post(stream_json))
        .route("/presets", get(presets))
        .route("/voices", get(voices))
        .with_state(state)
}

/// Build a request from a JSON body
///
/// `voice_id` and `voice` are both accepted; overrides live in their own
/// object and prosody fields sit at the top level.
fn request_from_json(body: &Map<String, Value>) -> Result<SynthesisRequest, TtsError> {
    let text = match body.get("text") {
        Some(Value::String(text)) => text.clone(),
        Some(_) => return Err(TtsError::BadRequest("text must be a string".to_string())),
        None => String::new(),
    };
    let string_field = |key: &str| body.get(key).and_then(Value::as_str).map(str::to_string);

    let overrides = match body.get("overrides") {
        Some(Value::Object(map)) => parse_overrides(map),
        Some(Value::Null) | None => HashMap::new(),
        Some(_) => {
            return Err(TtsError::BadRequest(
                "overrides must be an object".to_string(),
            ));
        }
    };

    Ok(SynthesisRequest {
        text,
        voice: string_field("voice_id")
            .or_else(|| string_field("voice"))
            .unwrap_or_default(),
        preset: string_field("preset").unwrap_or_default(),
        overrides,
        prosody: Prosody::from_map(body),
    })
}

/// Stream synthesized speech as WAV
async fn stream_json(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, TtsError> {
    let Json(body) = body.map_err(|e| TtsError::BadRequest(e.body_text()))?;
    let Value::Object(body) = body else {
        return Err(TtsError::BadRequest("body must be a JSON object".to_string()));
    };
    let request = request_from_json(&body)?;
    stream(&state, request).await
}

/// Stream synthesized speech as WAV from query parameters
async fn stream_query(
    State(state): State<Arc<ApiState>>,
    Query(pairs): Query<HashMap<String, String>>,
) -> Result<Response, TtsError> {
    stream(&state, SynthesisRequest::from_flat(&pairs)).await
}

async fn stream(state: &ApiState, request: SynthesisRequest) -> Result<Response, TtsError> {
    let wav = state.synthesis.open_stream(request).await?;
    let headers = [
        (header::CONTENT_TYPE, "audio/wav".to_string()),
        (SAMPLE_RATE_HEADER, wav.sample_rate().to_string()),
        (VOICE_HEADER, wav.voice().to_string()),
    ];
    Ok((headers, Body::from_stream(wav.into_stream())).into_response())
}

#[derive(Debug, Serialize)]
pub struct PresetInfo {
    pub name: &'static str,
    pub defaults: BTreeMap<&'static str, f32>,
}

#[derive(Debug, Serialize)]
pub struct PresetsResponse {
    pub version: u32,
    pub presets: Vec<PresetInfo>,
}

/// List presets and their parameter defaults
async fn presets() -> Json<PresetsResponse> {
    Json(PresetsResponse {
        version: PRESET_VERSION,
        presets: Preset::ALL
            .iter()
            .map(|preset| PresetInfo {
                name: preset.name(),
                defaults: preset.defaults().iter().copied().collect(),
            })
            .collect(),
    })
}

#[derive(Debug, Serialize)]
pub struct VoicesResponse {
    pub default: String,
    pub available: Vec<String>,
    /// Loaded voices, most recently used first
    pub resident: Vec<String>,
    pub capacity: usize,
}

/// List installed and resident voices
async fn voices(State(state): State<Arc<ApiState>>) -> Json<VoicesResponse> {
    let cache = state.synthesis.voices();
    let provider = Arc::clone(cache.provider());
    let available = tokio::task::spawn_blocking(move || provider.list_voice_ids())
        .await
        .unwrap_or_default();

    Json(VoicesResponse {
        default: state.synthesis.default_voice().to_string(),
        available,
        resident: cache.resident_ids().await,
        capacity: cache.capacity().await,
    })
}

/// TTS API errors
#[derive(Debug)]
pub enum TtsError {
    NotConfigured(String),
    BadRequest(String),
    SynthesisFailed(String),
}

impl From<crate::Error> for TtsError {
    fn from(err: crate::Error) -> Self {
        match err {
            crate::Error::ConfigurationMissing(msg) => Self::NotConfigured(msg),
            crate::Error::Config(msg) | crate::Error::Voice(msg) => Self::BadRequest(msg),
            other => Self::SynthesisFailed(other.to_string()),
        }
    }
}

impl IntoResponse for TtsError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: ErrorBody,
        }

        #[derive(Serialize)]
        struct ErrorBody {
            code: &'static str,
            message: String,
        }

        let (status, code, message) = match self {
            Self::NotConfigured(msg) => (StatusCode::SERVICE_UNAVAILABLE, "not_configured", msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::SynthesisFailed(msg) => {
                tracing::warn!(error = %msg, "synthesis request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "synthesis_failed", msg)
            }
        };

        (status, Json(ErrorResponse { error: ErrorBody { code, message } })).into_response()
    }
}
