//! Rendering capability: a headless browser session behind a trait seam.
//!
//! The pipeline only sees [`RenderBackend`] and [`RenderSession`]; the
//! production implementation drives Chromium over CDP.

pub mod chromium;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use chromium::ChromiumBackend;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no browser executable found (searched: {searched})")]
    Unavailable { searched: String },

    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("timed out after {timeout_ms}ms waiting for selector {selector:?}")]
    SelectorTimeout { selector: String, timeout_ms: u64 },

    #[error("session error: {0}")]
    Session(String),

    #[error("failed to close browser session: {0}")]
    Close(String),
}

impl RenderError {
    /// True for the distinguished "capability unavailable" condition that
    /// routes the pipeline to the sample-data fallback. Launch-argument and
    /// protocol errors are deliberately not included.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// One exclusive browser session. Acquired by pipeline step 1 and closed on
/// every exit path.
#[async_trait]
pub trait RenderSession: Send {
    /// Navigate to `url` and wait for network-idle-equivalent quiescence,
    /// bounded by `timeout`.
    async fn open_page(&mut self, url: &str, timeout: Duration) -> Result<(), RenderError>;

    /// Wait for `selector` to appear in the rendered document, bounded by
    /// `timeout`.
    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration)
        -> Result<(), RenderError>;

    /// Unconditional fixed delay.
    async fn wait_fixed(&mut self, delay: Duration);

    /// Snapshot of the current rendered document as HTML.
    async fn content(&mut self) -> Result<String, RenderError>;

    /// Release the session. Idempotent best effort; errors are reported so
    /// the caller can log them without masking an earlier failure.
    async fn close(&mut self) -> Result<(), RenderError>;
}

/// Factory for render sessions.
#[async_trait]
pub trait RenderBackend: Send + Sync {
    /// Short identifier reported as `successfulMethodName` on success.
    fn method_name(&self) -> &str;

    async fn launch(&self) -> Result<Box<dyn RenderSession>, RenderError>;
}
