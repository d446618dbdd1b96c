use super::*;
use crate::Config;
use crate::engine::{FetchEngine, FetchRequest, FetchedFile};
use crate::error::EngineError;
use crate::reporter::{DownloadProgress, ProgressReporter};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::time::Duration;
use tempfile::tempdir;
use tower::ServiceExt;

mod system;
mod tasks;

/// Engine that writes `{task_id}_Title.mp4` into the output directory, or
/// fails with a canned diagnostic when the URL contains "forbidden"
struct FakeEngine;

#[async_trait]
impl FetchEngine for FakeEngine {
    async fn fetch(
        &self,
        request: FetchRequest,
        reporter: ProgressReporter,
    ) -> std::result::Result<FetchedFile, EngineError> {
        reporter.downloading(DownloadProgress::bytes(50, Some(100)));
        if request.url.contains("forbidden") {
            return Err(EngineError::Fetch("ERROR: 403 Forbidden".into()));
        }

        let path = request
            .output_dir
            .join(format!("{}_Title.mp4", request.task_id));
        tokio::fs::write(&path, b"fake video bytes")
            .await
            .map_err(|e| EngineError::Other(e.to_string()))?;
        reporter.finished(path.clone(), Some("Title".into()));
        Ok(FetchedFile {
            path,
            title: Some("Title".into()),
        })
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Orchestrator plus config over a temp download directory
fn test_setup() -> (Orchestrator, Arc<Config>, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let mut config = Config::default();
    config.download.download_dir = temp_dir.path().to_path_buf();
    config.download.max_concurrent_tasks = 2;
    let config = Arc::new(config);
    let orchestrator = Orchestrator::from_config(&config, Arc::new(FakeEngine));
    (orchestrator, config, temp_dir)
}

fn test_app() -> (Router, Orchestrator, tempfile::TempDir) {
    let (orchestrator, config, temp_dir) = test_setup();
    let app = create_router(orchestrator.clone(), config);
    (app, orchestrator, temp_dir)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_api_server_spawns() {
    let (orchestrator, config, _temp_dir) = test_setup();

    // Port 0 = OS assigns a free port
    let mut config = (*config).clone();
    config.server.api.bind_address = "127.0.0.1:0".parse().unwrap();
    let config = Arc::new(config);

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let api_handle = tokio::spawn(start_api_server_with_shutdown(
        orchestrator,
        config,
        async move {
            stop_rx.await.ok();
        },
    ));

    tokio::time::sleep(Duration::from_millis(100)).await;
    stop_tx.send(()).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), api_handle)
        .await
        .expect("server should stop after the shutdown signal")
        .unwrap();
    assert!(result.is_ok(), "server returned {result:?}");
}

#[tokio::test]
async fn test_cors_enabled() {
    let (orchestrator, config, _temp_dir) = test_setup();

    let mut config = (*config).clone();
    config.server.api.cors_enabled = true;
    config.server.api.cors_origins = vec!["*".to_string()];
    let app = create_router(orchestrator, Arc::new(config));

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}

#[tokio::test]
async fn test_cors_specific_origin() {
    let (orchestrator, config, _temp_dir) = test_setup();

    let mut config = (*config).clone();
    config.server.api.cors_enabled = true;
    config.server.api.cors_origins = vec!["http://allowed.example".to_string()];
    let app = create_router(orchestrator, Arc::new(config));

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://allowed.example")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("http://allowed.example")
    );
}

#[tokio::test]
async fn test_cors_disabled() {
    let (orchestrator, config, _temp_dir) = test_setup();

    let mut config = (*config).clone();
    config.server.api.cors_enabled = false;
    let app = create_router(orchestrator, Arc::new(config));

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert!(
        response
            .headers()
            .get("access-control-allow-origin")
            .is_none()
    );
}

#[tokio::test]
async fn test_swagger_ui_toggle() {
    let (orchestrator, config, _temp_dir) = test_setup();

    let mut enabled = (*config).clone();
    enabled.server.api.swagger_ui = true;
    let app = create_router(orchestrator.clone(), Arc::new(enabled));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut disabled = (*config).clone();
    disabled.server.api.swagger_ui = false;
    let app = create_router(orchestrator, Arc::new(disabled));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
