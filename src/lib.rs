pub mod auth;
pub mod bibtex;
pub mod citation;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod ingest;
pub mod models;
pub mod routes;
pub mod terms;
pub mod timezone;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use auth::TokenVerifier;
use db::Repository;
use routes::{auth_routes, dashboard_routes, posts_routes, profile_routes};
use terms::TermExtractor;

/// Shared, immutable application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repository>,
    pub terms: Arc<dyn TermExtractor>,
    pub verifier: Arc<TokenVerifier>,
    pub local_user_id: Option<String>,
    pub frontend_dir: PathBuf,
}

pub fn app(state: AppState) -> Router {
    let frontend_dir = state.frontend_dir.clone();

    // CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API routes
    let api_routes = Router::new()
        .nest("/api/auth", auth_routes())
        .nest("/api/posts", posts_routes())
        .nest("/api/dashboard", dashboard_routes())
        .nest("/api/profile", profile_routes())
        .route("/api/health", get(health_check));

    Router::new()
        .merge(api_routes)
        .nest_service("/assets", ServeDir::new(frontend_dir.join("assets")))
        .fallback(serve_spa)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    axum::Json(serde_json::json!({"status": "healthy"}))
}

async fn serve_spa(State(state): State<AppState>) -> impl IntoResponse {
    match read_index(&state.frontend_dir).await {
        Some(html) => Html(html).into_response(),
        None => (
            StatusCode::OK,
            axum::Json(serde_json::json!({
                "message": "Welcome to the Paperjunkies API",
                "docs": "Frontend bundle not found; the JSON API lives under /api"
            })),
        )
            .into_response(),
    }
}

async fn read_index(frontend_dir: &Path) -> Option<String> {
    tokio::fs::read_to_string(frontend_dir.join("index.html"))
        .await
        .ok()
}
