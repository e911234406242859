//! Eventscope -- headless-browser extraction service for game event schedules.
//!
//! This crate provides the core library for driving a headless renderer
//! against a client-rendered schedule page, normalizing the result into
//! typed date-grouped events, and streaming pipeline progress as NDJSON.

pub mod api;
pub mod config;
pub mod extract;
pub mod normalize;
pub mod pipeline;
pub mod render;
pub mod selfcheck;

use std::sync::Arc;

use anyhow::Result;

use crate::api::state::AppState;
use crate::config::AppConfig;
use crate::render::ChromiumBackend;

/// Start the eventscope daemon: API server with the scrape pipeline behind it.
pub async fn serve(bind: &str, config: AppConfig) -> Result<()> {
    let backend = Arc::new(ChromiumBackend::new(config.renderer.clone()));
    let state = AppState {
        config: Arc::new(config),
        backend,
    };

    let addr: std::net::SocketAddr = bind.parse()?;
    let app = api::router(state);

    tracing::info!(%addr, "eventscope listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
