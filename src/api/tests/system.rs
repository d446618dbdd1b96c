use super::*;

#[tokio::test]
async fn test_health_check() {
    let (app, _orchestrator, _temp_dir) = test_app();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["accepting"], true);
    assert_eq!(json["capacity"], 2);
    assert_eq!(json["active"], 0);
}

#[tokio::test]
async fn test_openapi_spec() {
    let (app, _orchestrator, _temp_dir) = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["openapi"].as_str().unwrap().starts_with("3."));
    assert!(json["paths"]["/start_download"].is_object());
}

#[tokio::test]
async fn test_sse_event_stream() {
    use crate::types::{Event, TaskId};

    let (app, orchestrator, _temp_dir) = test_app();

    let request = Request::builder()
        .uri("/events")
        .header("Accept", "text/event-stream")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    assert!(
        content_type.contains("text/event-stream"),
        "Content-Type should be text/event-stream, got: {}",
        content_type
    );

    // Registry changes reach subscribers of the same channel the stream reads
    let mut receiver = orchestrator.subscribe();
    orchestrator
        .registry()
        .create(TaskId::from("sse-task"))
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(1), receiver.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event, Event::Created { ref id } if id.as_str() == "sse-task"));
    assert_eq!(event.name(), "created");
}
