//! REST API.
//!
//! Chat messages and podcast generation are enqueued as background jobs and
//! answered with `202 {task_id}`; clients poll the status endpoint.

use crate::config::QueueSettings;
use crate::cost::{CostFilter, CostTracker};
use crate::db::Database;
use crate::error::NewscastError;
use crate::feed::ArticleStore;
use crate::orchestrator::Orchestrator;
use crate::podcasts::PodcastStore;
use crate::queue::{JobKind, JobQueue};
use crate::research::ResearchAssistant;
use crate::scheduler::{NewTask, ScheduleStore};
use crate::session::{SessionLocks, SessionStore};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared handler state.
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub locks: Arc<SessionLocks>,
    pub queue: Arc<JobQueue>,
    pub podcasts: Arc<PodcastStore>,
    pub articles: Arc<ArticleStore>,
    pub costs: Arc<CostTracker>,
    pub schedules: Arc<ScheduleStore>,
    pub research: Option<Arc<ResearchAssistant>>,
    pub queue_settings: QueueSettings,
}

impl AppState {
    /// State over a database, without the research assistant.
    pub fn new(db: Arc<Database>, queue_settings: QueueSettings) -> Self {
        Self {
            sessions: Arc::new(SessionStore::new(db.clone())),
            locks: Arc::new(SessionLocks::new(db.clone())),
            queue: Arc::new(JobQueue::new(db.clone())),
            podcasts: Arc::new(PodcastStore::new(db.clone())),
            articles: Arc::new(ArticleStore::new(db.clone())),
            costs: Arc::new(CostTracker::new(db.clone())),
            schedules: Arc::new(ScheduleStore::new(db)),
            research: None,
            queue_settings,
        }
    }

    pub fn from_orchestrator(orchestrator: &Orchestrator) -> Self {
        Self {
            sessions: orchestrator.sessions().clone(),
            locks: orchestrator.locks().clone(),
            queue: orchestrator.queue().clone(),
            podcasts: orchestrator.podcasts().clone(),
            articles: orchestrator.articles().clone(),
            costs: orchestrator.costs().clone(),
            schedules: orchestrator.schedules().clone(),
            research: Some(orchestrator.research().clone()),
            queue_settings: orchestrator.settings().queue.clone(),
        }
    }
}

/// Handler error rendered as `{"error": ...}`.
#[derive(Debug)]
pub struct ApiError(NewscastError);

impl From<NewscastError> for ApiError {
    fn from(e: NewscastError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            NewscastError::NotFound(_) => StatusCode::NOT_FOUND,
            NewscastError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

fn bad_request(message: &str) -> ApiError {
    ApiError(NewscastError::InvalidInput(message.to_string()))
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/podcast-agent/session", post(create_session))
        .route("/api/podcast-agent/sessions", get(list_sessions))
        .route(
            "/api/podcast-agent/session/{id}",
            get(get_session).delete(delete_session),
        )
        .route("/api/podcast-agent/chat", post(chat))
        .route("/api/podcast-agent/status/{task_id}", get(task_status))
        .route("/api/podcasts", get(list_podcasts))
        .route("/api/podcasts/generate", post(generate_podcast))
        .route("/api/podcasts/{id}", get(get_podcast).delete(delete_podcast))
        .route("/api/podcasts/{id}/audio", get(podcast_audio))
        .route("/api/articles", get(list_articles))
        .route("/api/articles/{id}", get(get_article))
        .route("/api/research", post(research))
        .route("/api/costs", get(costs))
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/{id}", axum::routing::delete(delete_task))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until Ctrl-C.
pub async fn serve(state: Arc<AppState>, host: &str, port: u16) -> crate::error::Result<()> {
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API listening on http://{}", addr);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

// === Request/Response Types ===

#[derive(Deserialize)]
struct ChatRequest {
    session_id: String,
    message: String,
}

#[derive(Serialize)]
struct Accepted {
    task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
    is_processing: bool,
}

#[derive(Deserialize)]
struct GenerateRequest {
    query: String,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Deserialize)]
struct ResearchRequest {
    query: String,
}

#[derive(Deserialize)]
struct Page {
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
    #[serde(default)]
    q: Option<String>,
}

fn default_limit() -> usize {
    20
}

const MAX_PAGE: usize = 500;

impl Page {
    fn limit(&self) -> usize {
        self.limit.min(MAX_PAGE)
    }
}

// === Handlers ===

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "newscast",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn create_session(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let session = state.sessions.create()?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "session_id": session.id,
            "session_state": session.state,
        })),
    ))
}

async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Query(page): Query<Page>,
) -> ApiResult<impl IntoResponse> {
    let sessions = state.sessions.list(page.limit())?;
    Ok(Json(json!({ "sessions": sessions })))
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let session = state.sessions.get(&id)?;
    let history = state.sessions.history(&id, 500)?;
    let is_processing = state.queue.session_busy(&id)? || state.locks.is_locked(&id)?;

    Ok(Json(json!({
        "session_id": session.id,
        "stage": session.state.stage,
        "session_state": session.state,
        "history": history,
        "is_processing": is_processing,
        "created_at": session.created_at,
        "updated_at": session.updated_at,
    })))
}

async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.sessions.delete(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.message.trim().is_empty() {
        return Err(bad_request("message is empty"));
    }
    state.sessions.get(&req.session_id)?;

    let is_processing =
        state.queue.session_busy(&req.session_id)? || state.locks.is_locked(&req.session_id)?;
    let task_id = state.queue.enqueue(
        &JobKind::AgentChat {
            session_id: req.session_id.clone(),
            message: req.message,
        },
        state.queue_settings.max_retries,
    )?;

    Ok((
        StatusCode::ACCEPTED,
        Json(Accepted {
            task_id,
            session_id: Some(req.session_id),
            is_processing,
        }),
    ))
}

async fn task_status(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let job = state.queue.get(&task_id)?;
    let is_processing = !job.status.is_finished();

    Ok(Json(json!({
        "task_id": job.id,
        "status": job.status,
        "is_processing": is_processing,
        "process_type": is_processing.then(|| job.kind.name()),
        "session_id": job.kind.session_id(),
        "result": job.result,
        "error": job.error,
        "attempts": job.attempts,
        "created_at": job.created_at,
        "finished_at": job.finished_at,
    })))
}

async fn list_podcasts(
    State(state): State<Arc<AppState>>,
    Query(page): Query<Page>,
) -> ApiResult<impl IntoResponse> {
    let podcasts = state.podcasts.list(page.limit(), page.offset)?;
    let total = state.podcasts.count()?;
    Ok(Json(json!({ "podcasts": podcasts, "total": total })))
}

async fn get_podcast(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.podcasts.get(&id)?))
}

async fn delete_podcast(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let podcast = state.podcasts.delete(&id)?;
    if let Err(e) = tokio::fs::remove_file(&podcast.audio_path).await {
        info!(
            "Audio file {} not removed: {}",
            podcast.audio_path.display(),
            e
        );
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn podcast_audio(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let podcast = state.podcasts.get(&id)?;
    let bytes = match tokio::fs::read(&podcast.audio_path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError(NewscastError::NotFound(format!(
                "audio for podcast {}",
                id
            ))))
        }
        Err(e) => return Err(ApiError(e.into())),
    };

    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], bytes))
}

async fn generate_podcast(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query is empty"));
    }
    let task_id = state.queue.enqueue(
        &JobKind::GeneratePodcast {
            query: req.query.trim().to_string(),
            language: req.language.filter(|l| !l.trim().is_empty()),
        },
        0,
    )?;

    Ok((
        StatusCode::ACCEPTED,
        Json(Accepted {
            task_id,
            session_id: None,
            is_processing: true,
        }),
    ))
}

async fn list_articles(
    State(state): State<Arc<AppState>>,
    Query(page): Query<Page>,
) -> ApiResult<impl IntoResponse> {
    let articles = match page.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        Some(q) => state.articles.search(q, page.limit())?,
        None => state.articles.list(page.limit(), page.offset)?,
    };
    let total = state.articles.count()?;
    Ok(Json(json!({ "articles": articles, "total": total })))
}

async fn get_article(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.articles.get(id)?))
}

async fn research(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResearchRequest>,
) -> ApiResult<impl IntoResponse> {
    let Some(assistant) = &state.research else {
        return Err(ApiError(NewscastError::Config(
            "research assistant is not configured".to_string(),
        )));
    };
    Ok(Json(assistant.run(&req.query).await?))
}

async fn costs(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<CostFilter>,
) -> ApiResult<impl IntoResponse> {
    let summary = state.costs.summary(&filter)?;
    let by_context: Vec<_> = state
        .costs
        .by_context()?
        .into_iter()
        .map(|(context, cost, calls)| json!({ "context": context, "cost": cost, "calls": calls }))
        .collect();
    Ok(Json(json!({ "summary": summary, "by_context": by_context })))
}

async fn list_tasks(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    Ok(Json(json!({ "tasks": state.schedules.list()? })))
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(new): Json<NewTask>,
) -> ApiResult<impl IntoResponse> {
    let task = state.schedules.add(new)?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.schedules.remove(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let status = |e: NewscastError| ApiError(e).into_response().status();
        assert_eq!(status(NewscastError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status(NewscastError::InvalidInput("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(NewscastError::Queue("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_page_defaults() {
        let page: Page = serde_json::from_str("{}").unwrap();
        assert_eq!(page.limit, 20);
        assert_eq!(page.offset, 0);
        assert!(page.q.is_none());
    }

    #[test]
    fn test_page_limit_is_capped() {
        let page: Page = serde_json::from_str(r#"{"limit": 18446744073709551615}"#).unwrap();
        assert_eq!(page.limit(), 500);
        let page: Page = serde_json::from_str(r#"{"limit": 50}"#).unwrap();
        assert_eq!(page.limit(), 50);
    }
}
