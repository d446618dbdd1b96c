//! REST API server module
//!
//! Provides the HTTP surface for submitting fetch tasks, polling their
//! status and downloading the produced files.

use crate::{Config, Orchestrator, Result};
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Tasks
/// - `POST /start_download` - Submit a URL, returns a task id
/// - `GET /check_status/:task_id` - Poll progress or result
/// - `GET /downloads/:filename` - Download a produced file
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
/// - `GET /events` - Server-sent events stream
pub fn create_router(orchestrator: Orchestrator, config: Arc<Config>) -> Router {
    let state = AppState::new(orchestrator, config.clone());

    let router = Router::new()
        // Tasks
        .route("/start_download", post(routes::start_download))
        .route("/check_status/:task_id", get(routes::check_status))
        .route("/downloads/:filename", get(routes::serve_file))
        // System
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec))
        .route("/events", get(routes::event_stream));

    // Swagger UI serves its own copy of the document so it cannot collide with /openapi.json
    let router = if config.server.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router.with_state(state).layer(TraceLayer::new_for_http());

    // Apply CORS middleware if enabled in config
    if config.server.api.cors_enabled {
        let cors = build_cors_layer(&config.server.api.cors_origins);
        router.layer(cors)
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` (or an empty list) allows any origin; otherwise only the listed
/// origins are allowed. All methods and headers are permitted.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Runs until the server fails. See [`start_api_server_with_shutdown`] for a
/// variant that stops on a signal.
///
/// # Example
///
/// ```no_run
/// use vidfetch::{Config, Orchestrator, engine::HttpEngine};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let orchestrator = Orchestrator::from_config(&config, Arc::new(HttpEngine::new()));
///
/// // Start API server (blocks until shutdown)
/// vidfetch::api::start_api_server(orchestrator, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(orchestrator: Orchestrator, config: Arc<Config>) -> Result<()> {
    start_api_server_with_shutdown(orchestrator, config, std::future::pending()).await
}

/// Start the API server and stop accepting connections once `shutdown` resolves.
///
/// In-flight requests are allowed to finish. Running tasks are not touched;
/// call [`Orchestrator::shutdown`] afterwards to drain them.
pub async fn start_api_server_with_shutdown<F>(
    orchestrator: Orchestrator,
    config: Arc<Config>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let bind_address = config.server.api.bind_address;

    tracing::info!(
        address = %bind_address,
        "Starting API server"
    );

    let app = create_router(orchestrator, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(
        address = %bind_address,
        "API server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
