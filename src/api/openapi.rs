//! OpenAPI documentation and schema generation
//!
//! This module defines the OpenAPI specification for the vidfetch REST API
//! using utoipa for compile-time spec generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the vidfetch REST API
///
/// The spec can be accessed via:
/// - `/openapi.json` - JSON format OpenAPI specification
/// - `/swagger-ui` - Interactive Swagger UI documentation (if enabled)
#[derive(OpenApi)]
#[openapi(
    info(
        title = "vidfetch REST API",
        version = "0.1.0",
        description = "Submit media URLs for asynchronous fetching and poll their progress",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:5000", description = "Local development server")
    ),
    paths(
        // Tasks
        crate::api::routes::start_download,
        crate::api::routes::check_status,
        crate::api::routes::serve_file,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(schemas(
        // Core types from types.rs
        crate::types::TaskId,
        crate::types::TaskStatus,

        // API request/response types from routes
        crate::api::routes::StartDownloadRequest,
        crate::api::routes::StartDownloadResponse,
        crate::api::routes::StatusResponse,

        // Error types from error.rs
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "tasks", description = "Tasks - Submit URLs, poll status and download produced files"),
        (name = "system", description = "System endpoints - Health checks, OpenAPI spec, events"),
    )
)]
pub struct ApiDoc;
