//! Inksign API Server - Backend for collaborative document signing
//!
//! Provides REST endpoints for:
//! - Google-identity login and session cookies
//! - PDF upload with signer rosters
//! - Reusable signature-image assets
//! - Finalization: compositing signature placements into the stored PDF
//! - A per-session realtime peer channel

use anyhow::Result;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{delete, get, patch, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

mod auth;
mod error;
mod handlers;
mod models;
mod notify;
mod realtime;
mod signing;
mod state;
mod storage;
#[cfg(test)]
mod testutil;

use state::{AppState, Config};

fn router(state: Arc<AppState>) -> Result<Router> {
    // The frontend sends the session cookie, so the origin must be
    // explicit; credentialed CORS cannot use a wildcard.
    let cors = CorsLayer::new()
        .allow_origin(state.config.frontend_origin.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    let serve_resources = ServeDir::new(state.storage.root());

    Ok(Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Identity boundary
        .route("/auth/google/login", get(auth::google_login))
        .route("/auth/google/callback", get(auth::google_callback))
        // Documents and signer rosters
        .route(
            "/api/documents",
            post(handlers::upload_document).get(handlers::list_documents),
        )
        .route(
            "/api/documents/:stored_filename",
            get(handlers::get_document).delete(handlers::delete_document),
        )
        .route(
            "/api/documents/:stored_filename/signers",
            get(handlers::list_signers),
        )
        .route(
            "/api/documents/:stored_filename/signers/:signer_id",
            patch(handlers::update_signer_status),
        )
        .route(
            "/api/documents/:stored_filename/sign/:signer_id",
            post(handlers::finalize_document),
        )
        // Signature assets
        .route(
            "/api/signatures",
            post(handlers::upload_signature).get(handlers::list_signatures),
        )
        .route(
            "/api/signatures/:stored_filename",
            delete(handlers::delete_signature),
        )
        // Realtime peer channel
        .route("/ws", get(realtime::ws_handler))
        // Stored blobs; a document keeps this URL across finalization
        .nest_service("/resources", serve_resources)
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("inksign_api=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    let config = Config::from_env();
    let port = config.port;

    info!("Initializing Inksign API...");
    let state = Arc::new(AppState::new(config).await?);
    let app = router(state)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting Inksign API on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
