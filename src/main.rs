mod certificates;
mod config;
mod db;
mod error;
mod pdf;
mod routes;
mod state;
mod storage;
mod templates;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "certify=info,tower_http=info".into()),
        )
        .init();

    let config = Arc::new(config::Config::from_env()?);

    storage::ensure_dirs(&config.certificates_folder, &config.upload_folder)?;

    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    db::run_migrations(pool.as_ref()).await?;

    let state = Arc::new(state::AppState::new(db::PgStore::new(pool), config.clone()));

    let app = Router::new()
        .nest("/api/certificates", routes::certificate_api())
        .route("/verify/:code", get(routes::pages::verify_page))
        .nest_service(
            storage::FILES_ROUTE,
            ServeDir::new(&config.certificates_folder),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!(
        "Certify listening on http://{} (verification links point at {})",
        addr,
        config.public_base_url
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
