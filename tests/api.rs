//! Integration tests for the REST API.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use newscast::config::QueueSettings;
use newscast::db::Database;
use newscast::podcasts::NewPodcast;
use newscast::queue::JobStatus;
use newscast::script::PodcastScript;
use newscast::server::{build_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;

fn setup() -> (Router, Arc<AppState>) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let state = Arc::new(AppState::new(db, QueueSettings::default()));
    (build_router(state.clone()), state)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn new_session(app: &Router) -> String {
    let (status, body) = send(app, post_json("/api/podcast-agent/session", json!({}))).await;
    assert_eq!(status, StatusCode::CREATED);
    body["session_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let (app, _) = setup();
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "newscast");
}

#[tokio::test]
async fn test_session_lifecycle() {
    let (app, _) = setup();
    let id = new_session(&app).await;

    let (status, body) = send(&app, get(&format!("/api/podcast-agent/session/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stage"], "welcome");
    assert_eq!(body["is_processing"], false);
    assert_eq!(body["history"], json!([]));

    let (status, _) = send(&app, delete(&format!("/api/podcast-agent/session/{}", id))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, get(&format!("/api/podcast-agent/session/{}", id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("session"));
}

#[tokio::test]
async fn test_chat_is_queued_and_reported_processing() {
    let (app, state) = setup();
    let id = new_session(&app).await;

    let (status, body) = send(
        &app,
        post_json(
            "/api/podcast-agent/chat",
            json!({ "session_id": id, "message": "A podcast about fusion" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["is_processing"], false);
    let task_id = body["task_id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, get(&format!("/api/podcast-agent/status/{}", task_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "queued");
    assert_eq!(body["is_processing"], true);
    assert_eq!(body["process_type"], "agent_chat");
    assert_eq!(body["session_id"], id.as_str());

    let (_, session) = send(&app, get(&format!("/api/podcast-agent/session/{}", id))).await;
    assert_eq!(session["is_processing"], true);

    // A worker finishes the job.
    let job = state.queue.claim("test-worker").unwrap().unwrap();
    assert_eq!(job.id, task_id);
    state
        .queue
        .complete(&job.id, &json!({ "response": "On it!", "stage": "search" }))
        .unwrap();

    let (_, body) = send(&app, get(&format!("/api/podcast-agent/status/{}", task_id))).await;
    assert_eq!(body["status"], "completed");
    assert_eq!(body["is_processing"], false);
    assert_eq!(body["process_type"], Value::Null);
    assert_eq!(body["result"]["response"], "On it!");
}

#[tokio::test]
async fn test_second_chat_reports_busy_session() {
    let (app, _) = setup();
    let id = new_session(&app).await;
    let message = json!({ "session_id": id, "message": "hello" });

    send(&app, post_json("/api/podcast-agent/chat", message.clone())).await;
    let (status, body) = send(&app, post_json("/api/podcast-agent/chat", message)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["is_processing"], true);
}

#[tokio::test]
async fn test_chat_validation() {
    let (app, _) = setup();

    let (status, body) = send(
        &app,
        post_json(
            "/api/podcast-agent/chat",
            json!({ "session_id": "missing", "message": "hi" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let id = new_session(&app).await;
    let (status, _) = send(
        &app,
        post_json(
            "/api/podcast-agent/chat",
            json!({ "session_id": id, "message": "   " }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, get("/api/podcast-agent/status/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_podcasts_and_audio() {
    let (app, state) = setup();
    let dir = tempfile::tempdir().unwrap();
    let audio_path = dir.path().join("episode.mp3");
    std::fs::write(&audio_path, b"ID3 fake mp3").unwrap();

    let (_, body) = send(&app, get("/api/podcasts")).await;
    assert_eq!(body["total"], 0);

    let podcast = state
        .podcasts
        .insert(NewPodcast {
            title: "Fusion Weekly".to_string(),
            query: Some("fusion".to_string()),
            session_id: None,
            language_code: "en".to_string(),
            tts_engine: "edge".to_string(),
            audio_path: audio_path.clone(),
            duration_secs: None,
            script: PodcastScript {
                title: "Fusion Weekly".to_string(),
                sections: Vec::new(),
                sources: vec!["https://news.example/fusion".to_string()],
            },
        })
        .unwrap();

    let (status, body) = send(&app, get("/api/podcasts")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["podcasts"][0]["title"], "Fusion Weekly");

    let (status, body) = send(&app, get(&format!("/api/podcasts/{}", podcast.id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sources"], json!(["https://news.example/fusion"]));

    let response = app
        .clone()
        .oneshot(get(&format!("/api/podcasts/{}/audio", podcast.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"ID3 fake mp3");

    let (status, _) = send(&app, delete(&format!("/api/podcasts/{}", podcast.id))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!audio_path.exists());

    let (status, _) = send(&app, get(&format!("/api/podcasts/{}", podcast.id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_generate_podcast_enqueues_job() {
    let (app, state) = setup();

    let (status, body) = send(
        &app,
        post_json(
            "/api/podcasts/generate",
            json!({ "query": "AI chips", "language": "es" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job = state.queue.get(body["task_id"].as_str().unwrap()).unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.kind.name(), "generate_podcast");

    let (status, _) = send(
        &app,
        post_json("/api/podcasts/generate", json!({ "query": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_articles() {
    let (app, _) = setup();

    let (status, body) = send(&app, get("/api/articles?limit=5&q=fusion")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["articles"], json!([]));

    let (status, _) = send(&app, get("/api/articles/42")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_scheduled_tasks() {
    let (app, _) = setup();

    let (status, task) = send(
        &app,
        post_json(
            "/api/tasks",
            json!({
                "name": "hourly feeds",
                "interval_secs": 3600,
                "kind": { "kind": "fetch_feeds", "urls": ["https://news.example/rss"] }
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(task["enabled"], true);

    let (_, body) = send(&app, get("/api/tasks")).await;
    assert_eq!(body["tasks"].as_array().unwrap().len(), 1);

    let id = task["id"].as_str().unwrap();
    let (status, _) = send(&app, delete(&format!("/api/tasks/{}", id))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, delete(&format!("/api/tasks/{}", id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        post_json(
            "/api/tasks",
            json!({
                "name": "broken",
                "interval_secs": 0,
                "kind": { "kind": "fetch_feeds", "urls": [] }
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_costs_and_research_without_assistant() {
    let (app, _) = setup();

    let (status, body) = send(&app, get("/api/costs")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"]["total_calls"], 0);
    assert_eq!(body["by_context"], json!([]));

    let (status, body) = send(
        &app,
        post_json("/api/research", json!({ "query": "rust" })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("research"));
}
