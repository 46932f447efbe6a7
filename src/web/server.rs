//! Axum web server setup

use axum::{
    extract::Request,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::WebConfig;

use super::handlers::{self, AppState};
use super::static_files::serve_static;

/// API and static UI routes
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route(
            "/config",
            get(handlers::get_config).put(handlers::put_config),
        )
        .route("/layout", post(handlers::switch_layout))
        .route("/layouts", get(handlers::list_layouts))
        .route("/status", get(handlers::get_status))
        .route(
            "/network",
            get(handlers::get_network).put(handlers::put_network),
        )
        .route("/storage", get(handlers::get_storage))
        .route("/keycodes", get(handlers::list_keycodes))
        .route("/keypad-mode", post(handlers::enter_keypad_mode))
        .with_state(state);

    let static_handler = |req: Request| async move {
        let path = req.uri().path();
        serve_static(path).await
    };

    Router::new()
        .nest("/api", api_routes)
        .fallback(static_handler)
        .layer(cors)
}

/// Serve until the listener fails
pub async fn start_server(config: &WebConfig, state: Arc<AppState>) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.bind, config.port).parse()?;
    let app = router(state);

    info!(
        "Config UI available at http://{}:{} ({}.local)",
        config.bind, config.port, config.hostname
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
