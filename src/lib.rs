pub mod auth;
pub mod config;
pub mod database;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod storage;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, Method},
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use handlers::AppState;

/// Assembles the full router. Protected routes resolve an identity first and
/// rate-limit on it; public routes rate-limit on the origin address only.
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/upload", post(handlers::files::upload))
        .route("/api/list", get(handlers::files::list_files))
        .route("/api/projects", get(handlers::files::list_projects))
        .route("/api/delete", delete(handlers::files::delete_file))
        .route(
            "/api/project/delete",
            delete(handlers::files::delete_project),
        )
        .route(
            "/api/user/rotate-api-key",
            post(handlers::auth::rotate_api_key),
        )
        .route("/api/user/status", get(handlers::auth::user_status))
        // Layers run outermost-last: require_auth first, then rate_limit
        // sees the resolved identity in the request extensions.
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit))
        .layer(from_fn_with_state(state.clone(), middleware::require_auth));

    let public = Router::new()
        .route("/register", post(handlers::auth::register))
        .route("/login", post(handlers::auth::login))
        .route("/health", get(handlers::health::health))
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit));

    // Headroom over the file-size cap so multipart framing does not trip the
    // transport limit before the handler's own check runs.
    let body_limit = state.config.max_file_size + 64 * 1024;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ACCEPT,
            header::ACCEPT_ENCODING,
            header::AUTHORIZATION,
            header::CONTENT_LENGTH,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-api-key"),
            HeaderName::from_static("x-csrf-token"),
        ]);

    Router::new()
        .merge(protected)
        .merge(public)
        .nest_service("/files", ServeDir::new(&state.config.upload_dir))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
