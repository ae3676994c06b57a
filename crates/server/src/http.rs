//! HTTP endpoints
//!
//! REST surface over the speech pipeline. Stage failures never become
//! 5xx responses; every handler answers with structured JSON so clients
//! can distinguish "the pipeline declined" from "the server broke".

use axum::{
    extract::{rejection::FormRejection, DefaultBodyLimit, Multipart, State},
    http::{HeaderValue, Method},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use vaani_core::{PipelineOutput, DEFAULT_LANGUAGE};

use crate::state::AppState;

/// Upload cap for audio chunks
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let cors_layer = build_cors_layer(
        &state.settings.server.cors_origins,
        state.settings.server.cors_enabled,
    );

    Router::new()
        .route("/transcribe", post(transcribe))
        .route("/tts", post(tts))
        .route("/tts_info", get(tts_info))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

/// Build the CORS layer from configured origins.
///
/// Disabled checks give a permissive layer for development. An empty
/// origin list falls back to localhost.
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins (NOT FOR PRODUCTION)");
        return CorsLayer::permissive();
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    let methods = [Method::GET, Method::POST, Method::OPTIONS];
    if parsed.is_empty() {
        tracing::info!("No CORS origins configured, defaulting to localhost:3000");
        return CorsLayer::new()
            .allow_origin(HeaderValue::from_static("http://localhost:3000"))
            .allow_methods(methods)
            .allow_headers(Any);
    }

    tracing::info!("CORS configured with {} origins", parsed.len());
    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods(methods)
        .allow_headers(Any)
}

/// Transcribe (and optionally translate) one uploaded audio chunk
async fn transcribe(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Json<PipelineOutput> {
    let mut audio: Option<Vec<u8>> = None;
    let mut lang = DEFAULT_LANGUAGE.to_string();
    let mut target_lang: Option<String> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Malformed multipart request");
                return Json(PipelineOutput::failed("Malformed multipart request"));
            }
        };

        match field.name().unwrap_or_default() {
            "audio" => match field.bytes().await {
                Ok(bytes) => audio = Some(bytes.to_vec()),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read audio field");
                    return Json(PipelineOutput::failed("Failed to read audio field"));
                }
            },
            "lang" => {
                if let Ok(value) = field.text().await {
                    lang = value;
                }
            }
            "target_lang" => {
                if let Ok(value) = field.text().await {
                    if !value.is_empty() {
                        target_lang = Some(value);
                    }
                }
            }
            other => {
                tracing::debug!(field = other, "Ignoring unknown multipart field");
            }
        }
    }

    let Some(audio) = audio else {
        return Json(PipelineOutput::failed("No audio file provided"));
    };

    let output = state
        .orchestrator
        .process_speech(&audio, &lang, target_lang.as_deref())
        .await;
    Json(output)
}

/// Speech generation request
#[derive(Debug, Deserialize)]
struct TtsRequest {
    text: String,
    lang: String,
    #[serde(default = "default_gender")]
    gender: String,
}

fn default_gender() -> String {
    "male".to_string()
}

/// Synthesize speech, returning base64-encoded WAV
///
/// The form is extracted fallibly so a missing field still gets the
/// structured JSON error shape instead of a bare 422.
async fn tts(
    State(state): State<AppState>,
    form: Result<Form<TtsRequest>, FormRejection>,
) -> Json<serde_json::Value> {
    let Form(request) = match form {
        Ok(form) => form,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed speech generation request");
            return Json(serde_json::json!({ "error": format!("Invalid request: {e}") }));
        }
    };

    match state
        .orchestrator
        .generate_tts(&request.text, &request.lang, &request.gender)
        .await
    {
        Ok(audio) => Json(serde_json::json!({ "audio": audio })),
        Err(e) => {
            tracing::warn!(lang = %request.lang, error = %e, "Speech generation request failed");
            Json(serde_json::json!({ "error": e.to_string() }))
        }
    }
}

/// Languages with an available voice
async fn tts_info(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "supported_languages": state.orchestrator.tts_languages(),
    }))
}

/// Liveness probe
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
