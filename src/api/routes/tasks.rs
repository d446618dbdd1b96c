//! Task handlers: submission, status polling, produced-file download.

use super::{StartDownloadResponse, StatusResponse};
use crate::api::AppState;
use crate::error::{Error, ToHttpStatus};
use crate::orchestrator::MISSING_URL_MESSAGE;
use crate::types::TaskId;
use crate::utils::ensure_plain_file_name;
use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;

fn rejected(status: StatusCode, error: impl Into<String>) -> Response {
    (status, Json(StartDownloadResponse::rejected(error))).into_response()
}

/// Pull a non-blank `url` string out of a raw JSON body
fn url_from_body(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    let url = value.get("url")?.as_str()?.trim();
    (!url.is_empty()).then(|| url.to_string())
}

/// POST /start_download - Submit a URL for asynchronous fetching
#[utoipa::path(
    post,
    path = "/start_download",
    tag = "tasks",
    request_body = super::StartDownloadRequest,
    responses(
        (status = 202, description = "Task created", body = StartDownloadResponse),
        (status = 400, description = "Missing URL", body = StartDownloadResponse),
        (status = 503, description = "Shutting down", body = StartDownloadResponse)
    )
)]
pub async fn start_download(State(state): State<AppState>, body: Bytes) -> Response {
    // Malformed JSON is treated exactly like a missing url
    let Some(url) = url_from_body(&body) else {
        return rejected(StatusCode::BAD_REQUEST, MISSING_URL_MESSAGE);
    };

    match state.orchestrator.start_task(&url) {
        Ok(task_id) => (
            StatusCode::ACCEPTED,
            Json(StartDownloadResponse::accepted(task_id)),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Rejected download request");
            let status =
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            rejected(status, e.to_string())
        }
    }
}

/// GET /check_status/:task_id - Poll a task's progress or result
#[utoipa::path(
    get,
    path = "/check_status/{task_id}",
    tag = "tasks",
    params(
        ("task_id" = String, Path, description = "Task ID returned by /start_download")
    ),
    responses(
        (status = 200, description = "Task state", body = StatusResponse),
        (status = 404, description = "Unknown task", body = StatusResponse)
    )
)]
pub async fn check_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> impl IntoResponse {
    match state.orchestrator.status(&TaskId::from(task_id)) {
        Ok(task) => (StatusCode::OK, Json(StatusResponse::from(task))),
        Err(_) => (StatusCode::NOT_FOUND, Json(StatusResponse::unknown())),
    }
}

fn content_type_for(file_name: &str) -> &'static str {
    let extension = std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("mp4" | "m4v") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("ts") => "video/mp2t",
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        Some("opus" | "ogg") => "audio/ogg",
        _ => "application/octet-stream",
    }
}

/// GET /downloads/:filename - Download a produced file
#[utoipa::path(
    get,
    path = "/downloads/{filename}",
    tag = "tasks",
    params(
        ("filename" = String, Path, description = "Public file name from /check_status")
    ),
    responses(
        (status = 200, description = "File contents", content_type = "application/octet-stream"),
        (status = 400, description = "File name is not a plain name", body = crate::error::ApiError),
        (status = 404, description = "File not found", body = crate::error::ApiError)
    )
)]
pub async fn serve_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, Error> {
    ensure_plain_file_name(&filename)?;

    let path = state.orchestrator.output_dir().join(&filename);
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::FileNotFound(filename));
        }
        Err(e) => return Err(Error::Io(e)),
    };

    let metadata = file.metadata().await?;
    if !metadata.is_file() {
        return Err(Error::FileNotFound(filename));
    }

    let disposition = format!(
        "attachment; filename*=UTF-8''{}",
        urlencoding::encode(&filename)
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(&filename))
        .header(header::CONTENT_LENGTH, metadata.len())
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| Error::Other(format!("failed to build file response: {}", e)))
}
