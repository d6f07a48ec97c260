//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use reading_progress_core::domain::{
    Chapter, ChapterReadingProgress, NavPoint, ProgressSnapshot, TrackRequest,
};
use reading_progress_core::ports::{PortError, PortResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        ingest_chapters_handler,
        list_chapters_handler,
        track_progress_handler,
        get_progress_handler,
        list_chapter_progress_handler,
        start_session_handler,
        end_session_handler,
        list_progress_handler,
    ),
    components(
        schemas(TrackPayload, ProgressResponse, ChapterResponse, ChapterProgressResponse)
    ),
    tags(
        (name = "Reading Progress API", description = "Chapter hierarchy ingestion and reading progress tracking.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// A tracking event reported by the reader client.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TrackPayload {
    pub chapter_id: Option<Uuid>,
    /// EPUB canonical fragment identifier of the current reading position.
    pub cfi: Option<String>,
    #[serde(default)]
    pub is_completed: bool,
}

/// The aggregate reading state of one document for the calling user.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProgressResponse {
    pub document_id: Uuid,
    pub current_cfi: Option<String>,
    pub current_chapter_id: Option<Uuid>,
    pub spine_progress: f64,
    pub chapter_progress: f64,
    pub overall_progress: f64,
    pub completed_chapter_ids: Vec<Uuid>,
    pub total_reading_time_minutes: u32,
    pub last_read_at: DateTime<Utc>,
    pub session_started_at: Option<DateTime<Utc>>,
    pub is_completed: bool,
}

impl From<ProgressSnapshot> for ProgressResponse {
    fn from(s: ProgressSnapshot) -> Self {
        Self {
            document_id: s.document_id,
            current_cfi: s.current_cfi,
            current_chapter_id: s.current_chapter_id,
            spine_progress: s.spine_progress,
            chapter_progress: s.chapter_progress,
            overall_progress: s.overall_progress,
            completed_chapter_ids: s.completed_chapter_ids,
            total_reading_time_minutes: s.total_reading_time_minutes,
            last_read_at: s.last_read_at,
            session_started_at: s.session_started_at,
            is_completed: s.is_completed,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChapterResponse {
    pub id: Uuid,
    pub document_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub title: String,
    pub order: u32,
    pub href: String,
    pub cfi: Option<String>,
    pub status: String,
}

impl From<Chapter> for ChapterResponse {
    fn from(c: Chapter) -> Self {
        Self {
            id: c.id,
            document_id: c.document_id,
            parent_id: c.parent_id,
            title: c.title,
            order: c.order,
            href: c.href,
            cfi: c.cfi,
            status: c.status.as_str().to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChapterProgressResponse {
    pub chapter_id: Uuid,
    pub last_cfi: Option<String>,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_read_at: DateTime<Utc>,
}

impl From<ChapterReadingProgress> for ChapterProgressResponse {
    fn from(r: ChapterReadingProgress) -> Self {
        Self {
            chapter_id: r.chapter_id,
            last_cfi: r.last_cfi,
            completed: r.completed,
            completed_at: r.completed_at,
            last_read_at: r.last_read_at,
        }
    }
}

type HandlerError = (StatusCode, String);

/// Maps a port failure onto an HTTP status, logging anything unexpected.
fn port_failure(context: &str, e: PortError) -> HandlerError {
    match e {
        PortError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        PortError::Conflict(msg) => {
            warn!("{}: {}", context, msg);
            (
                StatusCode::CONFLICT,
                "The reading progress was updated concurrently; please retry".to_string(),
            )
        }
        PortError::Unexpected(msg) => {
            error!("{}: {}", context, msg);
            (StatusCode::INTERNAL_SERVER_ERROR, context.to_string())
        }
    }
}

/// Re-runs `op` while it fails with a write conflict, at most `max_retries` extra times.
pub async fn with_conflict_retry<T, F, Fut>(max_retries: u32, mut op: F) -> PortResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PortResult<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(PortError::Conflict(msg)) if attempt < max_retries => {
                attempt += 1;
                warn!(attempt, "Retrying after concurrent update: {}", msg);
            }
            other => return other,
        }
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up"))
)]
pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Store the chapter hierarchy of a document from its navigation tree.
///
/// The body is the document's navigation tree: a JSON array of nodes with `title`,
/// optional `content_path` and `anchor`, and nested `children`. A document's chapters
/// are created once; repeating the call returns the stored hierarchy.
#[utoipa::path(
    post,
    path = "/documents/{document_id}/chapters",
    request_body(content_type = "application/json", description = "The navigation tree of the document."),
    responses(
        (status = 201, description = "Chapters extracted and stored, or the existing hierarchy", body = [ChapterResponse]),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("document_id" = Uuid, Path, description = "The document the navigation belongs to."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn ingest_chapters_handler(
    State(app_state): State<Arc<AppState>>,
    Path(document_id): Path<Uuid>,
    Json(nav): Json<Vec<NavPoint>>,
) -> Result<impl IntoResponse, HandlerError> {
    let chapters = app_state
        .tracker
        .ingest_navigation(document_id, &nav)
        .await
        .map_err(|e| port_failure("Failed to store chapters", e))?;

    let body: Vec<ChapterResponse> = chapters.into_iter().map(Into::into).collect();
    Ok((StatusCode::CREATED, Json(body)))
}

#[utoipa::path(
    get,
    path = "/documents/{document_id}/chapters",
    responses(
        (status = 200, description = "Chapters in depth-first order", body = [ChapterResponse])
    ),
    params(
        ("document_id" = Uuid, Path, description = "The document to list."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn list_chapters_handler(
    State(app_state): State<Arc<AppState>>,
    Path(document_id): Path<Uuid>,
) -> Result<Json<Vec<ChapterResponse>>, HandlerError> {
    let chapters = app_state
        .tracker
        .chapters(document_id)
        .await
        .map_err(|e| port_failure("Failed to load chapters", e))?;
    Ok(Json(chapters.into_iter().map(Into::into).collect()))
}

/// Report a reading position and/or a chapter completion.
///
/// A malformed `cfi` never fails the request; the position update is skipped.
#[utoipa::path(
    post,
    path = "/documents/{document_id}/progress",
    request_body = TrackPayload,
    responses(
        (status = 200, description = "Updated progress", body = ProgressResponse),
        (status = 409, description = "Concurrent updates kept conflicting"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("document_id" = Uuid, Path, description = "The document being read."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn track_progress_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(document_id): Path<Uuid>,
    Json(payload): Json<TrackPayload>,
) -> Result<Json<ProgressResponse>, HandlerError> {
    let retries = app_state.config.track_max_retries;
    let tracker = &app_state.tracker;

    let idle_limit = app_state.session_idle_limit();

    with_conflict_retry(retries, move || {
        tracker.close_stale_session(user_id, document_id, idle_limit)
    })
    .await
    .map_err(|e| port_failure("Failed to close stale session", e))?;

    let request = TrackRequest {
        document_id,
        user_id,
        chapter_id: payload.chapter_id,
        cfi: payload.cfi,
        is_completed: payload.is_completed,
    };
    let snapshot = with_conflict_retry(retries, move || tracker.track_reading(request.clone()))
        .await
        .map_err(|e| port_failure("Failed to track reading progress", e))?;

    Ok(Json(snapshot.into()))
}

#[utoipa::path(
    get,
    path = "/documents/{document_id}/progress",
    responses(
        (status = 200, description = "Current progress", body = ProgressResponse),
        (status = 404, description = "The user has not started this document")
    ),
    params(
        ("document_id" = Uuid, Path, description = "The document being read."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn get_progress_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(document_id): Path<Uuid>,
) -> Result<Json<ProgressResponse>, HandlerError> {
    let snapshot = app_state
        .tracker
        .get_progress(user_id, document_id)
        .await
        .map_err(|e| port_failure("Failed to load progress", e))?;
    Ok(Json(snapshot.into()))
}

#[utoipa::path(
    get,
    path = "/documents/{document_id}/progress/chapters",
    responses(
        (status = 200, description = "Per-chapter progress", body = [ChapterProgressResponse])
    ),
    params(
        ("document_id" = Uuid, Path, description = "The document being read."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn list_chapter_progress_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(document_id): Path<Uuid>,
) -> Result<Json<Vec<ChapterProgressResponse>>, HandlerError> {
    let records = app_state
        .tracker
        .chapter_progress(user_id, document_id)
        .await
        .map_err(|e| port_failure("Failed to load chapter progress", e))?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    post,
    path = "/documents/{document_id}/session/start",
    responses(
        (status = 200, description = "Session open (a second start is a no-op)", body = ProgressResponse)
    ),
    params(
        ("document_id" = Uuid, Path, description = "The document being read."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn start_session_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(document_id): Path<Uuid>,
) -> Result<Json<ProgressResponse>, HandlerError> {
    let tracker = &app_state.tracker;
    let snapshot = with_conflict_retry(app_state.config.track_max_retries, move || {
        tracker.start_session(user_id, document_id)
    })
    .await
    .map_err(|e| port_failure("Failed to start reading session", e))?;

    info!(%user_id, %document_id, "Reading session started");
    Ok(Json(snapshot.into()))
}

#[utoipa::path(
    post,
    path = "/documents/{document_id}/session/end",
    responses(
        (status = 200, description = "Session closed and time accumulated", body = ProgressResponse)
    ),
    params(
        ("document_id" = Uuid, Path, description = "The document being read."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn end_session_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(document_id): Path<Uuid>,
) -> Result<Json<ProgressResponse>, HandlerError> {
    let tracker = &app_state.tracker;
    let snapshot = with_conflict_retry(app_state.config.track_max_retries, move || {
        tracker.end_session(user_id, document_id)
    })
    .await
    .map_err(|e| port_failure("Failed to end reading session", e))?;
    Ok(Json(snapshot.into()))
}

/// The calling user's reading history, most recent first.
#[utoipa::path(
    get,
    path = "/progress",
    responses(
        (status = 200, description = "Progress for every document the user has opened", body = [ProgressResponse])
    ),
    params(
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn list_progress_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<Vec<ProgressResponse>>, HandlerError> {
    let history = app_state
        .tracker
        .list_progress(user_id)
        .await
        .map_err(|e| port_failure("Failed to list reading history", e))?;
    Ok(Json(history.into_iter().map(Into::into).collect()))
}
