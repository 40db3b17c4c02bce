use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use paperjunkies::{
    AppState, app, auth::TokenVerifier, config::Settings, db, terms::KeywordExtractor,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "paperjunkies=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;

    // Storage setup
    let repo = db::connect(&settings).await?;
    tracing::info!("Database initialized");

    let verifier = TokenVerifier::from_settings(&settings)?;
    if matches!(verifier, TokenVerifier::Disabled) {
        tracing::warn!("No token verification configured; bearer tokens will be rejected");
    }

    let state = AppState {
        repo,
        terms: Arc::new(KeywordExtractor::default()),
        verifier: Arc::new(verifier),
        local_user_id: settings.local_user_id.clone(),
        frontend_dir: settings.frontend_dir.clone(),
    };

    // Run the server
    tracing::info!("Server running on http://{}", settings.bind_addr);

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
