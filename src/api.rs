//! Loopback HTTP API used by the lesson UI.
//!
//! Progress reads and writes, unlock queries, pronunciation playback, and
//! the peripheral tutor calls (translation, feedback, topics). Binds to
//! 127.0.0.1:8780 by default.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::gemini::{ConversationTopic, GeminiClient};
use crate::lessons::{LessonGraph, Tense};
use crate::progress::{ProgressState, ProgressTracker};
use crate::speech::cache::CacheStats;
use crate::speech::{PlaybackOutcome, SpeechPipeline};
use crate::unlock::{self, LearningPath};

#[derive(Clone)]
pub struct AppState {
    pub lessons: Arc<LessonGraph>,
    pub progress: Arc<ProgressTracker>,
    pub speech: Arc<SpeechPipeline>,
    pub tutor: Arc<GeminiClient>,
}

// --- Request/Response types ---

#[derive(Deserialize)]
struct VerbMarkRequest {
    binyan: String,
    tense: Tense,
    verb: String,
    #[serde(default = "default_completed")]
    completed: bool,
}

fn default_completed() -> bool {
    true
}

#[derive(Deserialize)]
struct CategoryRequest {
    category: String,
}

#[derive(Deserialize)]
struct BinyanRequest {
    binyan: String,
}

#[derive(Deserialize)]
struct SpeakRequest {
    text: String,
}

#[derive(Deserialize)]
struct TranslateRequest {
    hebrew: String,
    #[serde(default)]
    context: String,
}

#[derive(Deserialize)]
struct FeedbackRequest {
    audio_base64: String,
    phrase: String,
}

#[derive(Serialize)]
struct StatusResponse {
    playing: bool,
    loading: bool,
    credential_present: bool,
    cache: CacheStats,
}

#[derive(Serialize)]
struct ProgressResponse {
    progress: ProgressState,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    persist_warning: bool,
}

#[derive(Serialize)]
struct AccessResponse {
    accessible: bool,
}

#[derive(Serialize)]
struct TextResponse {
    text: String,
}

#[derive(Serialize)]
struct SimpleResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl SimpleResponse {
    fn ok(status: &str) -> Self {
        Self {
            status: status.into(),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            status: "error".into(),
            error: Some(message.into()),
        }
    }
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<SimpleResponse>)>;

fn upstream_error(what: &str, e: impl std::fmt::Display) -> (StatusCode, Json<SimpleResponse>) {
    warn!("{what} failed: {e}");
    (StatusCode::BAD_GATEWAY, Json(SimpleResponse::err(format!("{what} failed"))))
}

/// Build the axum router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(handle_status))
        .route("/progress", get(handle_get_progress))
        .route("/progress/verb", post(handle_mark_verb))
        .route("/progress/adjectives/toggle", post(handle_toggle_adjective))
        .route("/progress/adjectives/reset", post(handle_reset_adjectives))
        .route("/progress/binyan/reset", post(handle_reset_binyan))
        .route("/access/binyan/{id}", get(handle_binyan_access))
        .route("/access/binyan/{id}/tense/{tense}", get(handle_tense_access))
        .route("/path", get(handle_learning_path))
        .route("/speak", post(handle_speak))
        .route("/stop", post(handle_stop))
        .route("/translate", post(handle_translate))
        .route("/feedback", post(handle_feedback))
        .route("/topic", post(handle_topic))
        .with_state(state)
}

/// Bind and serve until `shutdown` resolves.
pub async fn serve(
    state: AppState,
    host: &str,
    port: u16,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Lesson API listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

// --- Handlers ---

async fn handle_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        playing: state.speech.is_playing(),
        loading: state.speech.is_loading(),
        credential_present: state.tutor.has_credential(),
        cache: state.speech.cache().stats().await,
    })
}

fn progress_response(state: &AppState, progress: ProgressState) -> Json<ProgressResponse> {
    Json(ProgressResponse {
        progress,
        persist_warning: state.progress.take_persist_warning(),
    })
}

async fn handle_get_progress(State(state): State<AppState>) -> Json<ProgressResponse> {
    let progress = state.progress.snapshot().await;
    progress_response(&state, progress)
}

async fn handle_mark_verb(
    State(state): State<AppState>,
    Json(req): Json<VerbMarkRequest>,
) -> Json<ProgressResponse> {
    let progress = state
        .progress
        .update(|p| {
            let mut next = p.clone();
            next.set_verb_completed(&req.binyan, req.tense, &req.verb, req.completed);
            next
        })
        .await;
    info!(
        "Verb {}/{}/{} completed={}",
        req.binyan, req.tense, req.verb, req.completed
    );
    progress_response(&state, progress)
}

async fn handle_toggle_adjective(
    State(state): State<AppState>,
    Json(req): Json<CategoryRequest>,
) -> Json<ProgressResponse> {
    let progress = state
        .progress
        .update(|p| {
            let mut next = p.clone();
            next.toggle_adjective_category(&req.category);
            next
        })
        .await;
    progress_response(&state, progress)
}

async fn handle_reset_adjectives(State(state): State<AppState>) -> Json<ProgressResponse> {
    let progress = state
        .progress
        .update(|p| {
            let mut next = p.clone();
            next.reset_adjectives();
            next
        })
        .await;
    progress_response(&state, progress)
}

async fn handle_reset_binyan(
    State(state): State<AppState>,
    Json(req): Json<BinyanRequest>,
) -> Json<ProgressResponse> {
    let progress = state
        .progress
        .update(|p| {
            let mut next = p.clone();
            next.reset_binyan(&req.binyan);
            next
        })
        .await;
    progress_response(&state, progress)
}

async fn handle_binyan_access(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<AccessResponse> {
    let progress = state.progress.snapshot().await;
    Json(AccessResponse {
        accessible: unlock::can_access_binyan(&state.lessons, &id, &progress),
    })
}

async fn handle_tense_access(
    State(state): State<AppState>,
    Path((id, tense)): Path<(String, String)>,
) -> ApiResult<AccessResponse> {
    let tense: Tense = tense
        .parse()
        .map_err(|e: String| (StatusCode::BAD_REQUEST, Json(SimpleResponse::err(e))))?;
    let progress = state.progress.snapshot().await;
    Ok(Json(AccessResponse {
        accessible: unlock::can_access_tense(&state.lessons, &id, tense, &progress),
    }))
}

async fn handle_learning_path(State(state): State<AppState>) -> Json<LearningPath> {
    let progress = state.progress.snapshot().await;
    Json(unlock::learning_path(&state.lessons, &progress))
}

async fn handle_speak(
    State(state): State<AppState>,
    Json(req): Json<SpeakRequest>,
) -> Json<PlaybackOutcome> {
    let preview: String = req.text.chars().take(40).collect();
    info!("HTTP /speak: \"{}\" ({} chars)", preview.replace('\n', " "), req.text.chars().count());

    // Detached so a client disconnect can't abort the cache write-back.
    let speech = state.speech.clone();
    let outcome = tokio::spawn(async move { speech.generate_and_play(&req.text).await })
        .await
        .unwrap_or_else(|e| PlaybackOutcome::Failed(format!("speech task: {e}")));
    Json(outcome)
}

async fn handle_stop(State(state): State<AppState>) -> Json<SimpleResponse> {
    state.speech.stop();
    Json(SimpleResponse::ok("stopped"))
}

async fn handle_translate(
    State(state): State<AppState>,
    Json(req): Json<TranslateRequest>,
) -> ApiResult<TextResponse> {
    let text = state
        .tutor
        .translate_for_drill(&req.hebrew, &req.context)
        .await
        .map_err(|e| upstream_error("translation", e))?;
    Ok(Json(TextResponse { text }))
}

async fn handle_feedback(
    State(state): State<AppState>,
    Json(req): Json<FeedbackRequest>,
) -> ApiResult<TextResponse> {
    let text = state
        .tutor
        .pronunciation_feedback(&req.audio_base64, &req.phrase)
        .await
        .map_err(|e| upstream_error("pronunciation feedback", e))?;
    Ok(Json(TextResponse { text }))
}

async fn handle_topic(State(state): State<AppState>) -> ApiResult<ConversationTopic> {
    let topic = state
        .tutor
        .conversation_topic()
        .await
        .map_err(|e| upstream_error("topic generation", e))?;
    Ok(Json(topic))
}
