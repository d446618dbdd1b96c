use super::*;
use crate::api::routes::UNKNOWN_TASK_MESSAGE;
use crate::orchestrator::MISSING_URL_MESSAGE;

fn post_json(uri: &str, body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Poll /check_status until the task leaves "processing"
async fn poll_until_settled(app: &Router, task_id: &str) -> serde_json::Value {
    for _ in 0..500 {
        let response = app
            .clone()
            .oneshot(get(&format!("/check_status/{}", task_id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        if json["status"] != "processing" {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {task_id} never settled");
}

#[tokio::test]
async fn test_start_download_missing_url() {
    let (app, orchestrator, _temp_dir) = test_app();

    for body in [r#"{}"#, r#"{"url":""}"#, r#"{"url":"   "}"#, r#"{"url":7}"#] {
        let response = app
            .clone()
            .oneshot(post_json("/start_download", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {body}");
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], MISSING_URL_MESSAGE);
        assert!(json.get("task_id").is_none());
    }

    assert!(orchestrator.registry().is_empty());
}

#[tokio::test]
async fn test_start_download_malformed_json() {
    let (app, orchestrator, _temp_dir) = test_app();

    let response = app
        .oneshot(post_json("/start_download", "{not json"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], MISSING_URL_MESSAGE);
    assert!(orchestrator.registry().is_empty());
}

#[tokio::test]
async fn test_start_download_accepts_non_url_input() {
    let (app, orchestrator, _temp_dir) = test_app();

    // Bare video ids and search queries are left for the engine to interpret
    for body in [r#"{"url":"dQw4w9WgXcQ"}"#, r#"{"url":"ytsearch:rust talk"}"#] {
        let response = app
            .clone()
            .oneshot(post_json("/start_download", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED, "body {body}");
        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert!(json["task_id"].is_string());
    }

    assert_eq!(orchestrator.registry().len(), 2);
}

#[tokio::test]
async fn test_start_download_and_poll_to_completion() {
    let (app, _orchestrator, _temp_dir) = test_app();

    let response = app
        .clone()
        .oneshot(post_json(
            "/start_download",
            r#"{"url":"https://example.com/watch?v=1"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert!(json.get("error").is_none());
    let task_id = json["task_id"].as_str().unwrap().to_string();

    let status = poll_until_settled(&app, &task_id).await;
    let expected_name = format!("{}_Title.mp4", task_id);
    assert_eq!(status["status"], "completed");
    assert_eq!(status["title"], "Title");
    assert_eq!(status["filename"], expected_name.as_str());
    assert_eq!(
        status["download_url"],
        format!("/downloads/{}", expected_name).as_str()
    );

    // The download URL serves the produced file
    let response = app
        .oneshot(get(status["download_url"].as_str().unwrap()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"fake video bytes");
}

#[tokio::test]
async fn test_failed_task_reports_sanitized_error() {
    let (app, _orchestrator, _temp_dir) = test_app();

    let response = app
        .clone()
        .oneshot(post_json(
            "/start_download",
            r#"{"url":"https://example.com/forbidden"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let task_id = body_json(response).await["task_id"]
        .as_str()
        .unwrap()
        .to_string();

    let status = poll_until_settled(&app, &task_id).await;
    assert_eq!(status["status"], "failed");
    assert_eq!(
        status["error"],
        "Download failed: 403 Forbidden. Please check the link."
    );
}

#[tokio::test]
async fn test_check_status_processing_shape() {
    let (app, orchestrator, _temp_dir) = test_app();

    // A task registered directly, with no job behind it, stays processing
    let id = crate::types::TaskId::from("manual");
    orchestrator.registry().create(id.clone()).unwrap();
    orchestrator
        .registry()
        .report_progress(&id, Some(42), Some("Downloading...".into()))
        .unwrap();

    let response = app.oneshot(get("/check_status/manual")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "processing");
    assert_eq!(json["progress"], 42);
    assert_eq!(json["message"], "Downloading...");
}

#[tokio::test]
async fn test_check_status_unknown_task() {
    let (app, _orchestrator, _temp_dir) = test_app();

    let response = app.oneshot(get("/check_status/does-not-exist")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["status"], "unknown");
    assert_eq!(json["error"], UNKNOWN_TASK_MESSAGE);
}

#[tokio::test]
async fn test_serve_file_headers() {
    let (app, _orchestrator, temp_dir) = test_app();
    std::fs::write(temp_dir.path().join("abc_My Clip.webm"), b"0123456789").unwrap();

    let response = app
        .oneshot(get("/downloads/abc_My%20Clip.webm"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["content-type"], "video/webm");
    assert_eq!(headers["content-length"], "10");
    assert_eq!(
        headers["content-disposition"],
        "attachment; filename*=UTF-8''abc_My%20Clip.webm"
    );
}

#[tokio::test]
async fn test_serve_file_with_dotted_title() {
    let (app, _orchestrator, temp_dir) = test_app();
    let name = "abc_Wait... what.mp4";
    std::fs::write(temp_dir.path().join(name), b"dots").unwrap();

    let response = app
        .oneshot(get(&crate::api::routes::download_url(name)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"dots");
}

#[tokio::test]
async fn test_serve_file_missing() {
    let (app, _orchestrator, _temp_dir) = test_app();

    let response = app.oneshot(get("/downloads/nothing.mp4")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "file_not_found");
}

#[tokio::test]
async fn test_serve_file_rejects_traversal() {
    let (app, _orchestrator, temp_dir) = test_app();
    std::fs::write(temp_dir.path().join("secret"), b"nope").unwrap();

    // %2F decodes to '/' inside the path parameter
    for uri in ["/downloads/..%2Fsecret", "/downloads/..", "/downloads/a%5Cb"] {
        let response = app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "uri {uri}");
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "invalid_file_name");
    }
}

#[tokio::test]
async fn test_serve_file_directory_is_not_found() {
    let (app, _orchestrator, temp_dir) = test_app();
    std::fs::create_dir(temp_dir.path().join("subdir")).unwrap();

    let response = app.oneshot(get("/downloads/subdir")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_start_download_rejected_while_shutting_down() {
    let (app, orchestrator, _temp_dir) = test_app();
    assert!(orchestrator.shutdown(Duration::from_secs(1)).await);

    let response = app
        .oneshot(post_json(
            "/start_download",
            r#"{"url":"https://example.com/v"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(response).await;
    assert_eq!(json["success"], false);
}
