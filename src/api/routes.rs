//! API route definitions.

use std::convert::Infallible;

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::{routing::get, Json, Router};
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::api::state::AppState;
use crate::pipeline::{self, StreamRecord};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/scrape", get(scrape))
        .route("/sample", get(sample))
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

/// Start one extraction pipeline and stream its progress as NDJSON: any
/// number of `progress` records, then exactly one `final` record.
async fn scrape(State(state): State<AppState>) -> impl IntoResponse {
    let (tx, rx) = mpsc::channel::<StreamRecord>(16);
    let cancel = CancellationToken::new();

    tokio::spawn(pipeline::run_pipeline(
        state.backend.clone(),
        state.config.clone(),
        tx,
        cancel.clone(),
    ));

    // The guard lives inside the body stream: a client that goes away drops
    // the stream, which cancels the pipeline and releases the renderer.
    let guard = cancel.drop_guard();
    let lines = ReceiverStream::new(rx).map(move |record| {
        let _guard = &guard;
        Ok::<_, Infallible>(record.to_ndjson())
    });

    (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(lines),
    )
}

/// The degraded-mode fixture dataset, for offline consumers.
async fn sample() -> Json<Value> {
    Json(json!({
        "data": pipeline::sample::sample_events(),
        "meta": { "note": "fixture dataset, not live data" }
    }))
}
