//! Chromium-backed render sessions over the DevTools protocol.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::RendererConfig;
use crate::render::{RenderBackend, RenderError, RenderSession};

/// Executable names searched on PATH when no explicit path is configured.
const EXECUTABLE_CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
];

/// Poll interval for selector waits.
const SELECTOR_POLL: Duration = Duration::from_millis(250);

/// Launches headless Chromium processes as render sessions.
pub struct ChromiumBackend {
    config: RendererConfig,
}

impl ChromiumBackend {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    /// Locate the browser executable. A miss here is the distinguished
    /// "capability unavailable" condition, not a launch error.
    pub fn locate_executable(&self) -> Result<PathBuf, RenderError> {
        if let Some(path) = &self.config.executable {
            if path.exists() {
                return Ok(path.clone());
            }
            return Err(RenderError::Unavailable {
                searched: path.display().to_string(),
            });
        }

        for name in EXECUTABLE_CANDIDATES {
            if let Ok(path) = which::which(name) {
                debug!(executable = %path.display(), "found browser executable");
                return Ok(path);
            }
        }

        Err(RenderError::Unavailable {
            searched: EXECUTABLE_CANDIDATES.join(", "),
        })
    }
}

#[async_trait]
impl RenderBackend for ChromiumBackend {
    fn method_name(&self) -> &str {
        "headless-chromium"
    }

    async fn launch(&self) -> Result<Box<dyn RenderSession>, RenderError> {
        let executable = self.locate_executable()?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(executable.clone())
            .no_sandbox();
        if !self.config.headless {
            builder = builder.with_head();
        }
        let browser_config = builder.build().map_err(RenderError::Launch)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| RenderError::Launch(e.to_string()))?;

        // The handler drives the CDP websocket; it must be polled for the
        // lifetime of the session.
        let handler_task = tokio::spawn(async move {
            while handler.next().await.is_some() {}
        });

        info!(executable = %executable.display(), "browser session launched");
        Ok(Box::new(ChromiumSession {
            browser,
            handler_task,
            page: None,
        }))
    }
}

struct ChromiumSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    page: Option<Page>,
}

impl ChromiumSession {
    fn page(&self) -> Result<&Page, RenderError> {
        self.page
            .as_ref()
            .ok_or_else(|| RenderError::Session("no page open".to_string()))
    }
}

#[async_trait]
impl RenderSession for ChromiumSession {
    async fn open_page(&mut self, url: &str, timeout: Duration) -> Result<(), RenderError> {
        let navigate = async {
            let page = self.browser.new_page(url).await?;
            page.wait_for_navigation().await?;
            Ok::<Page, chromiumoxide::error::CdpError>(page)
        };

        let outcome = tokio::time::timeout(timeout, navigate).await;
        match outcome {
            Ok(Ok(page)) => {
                self.page = Some(page);
                Ok(())
            }
            Ok(Err(e)) => Err(RenderError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(RenderError::Navigation {
                url: url.to_string(),
                reason: format!("no network quiescence within {}ms", timeout.as_millis()),
            }),
        }
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), RenderError> {
        let page = self.page()?;
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if tokio::time::Instant::now() + SELECTOR_POLL > deadline {
                return Err(RenderError::SelectorTimeout {
                    selector: selector.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(SELECTOR_POLL).await;
        }
    }

    async fn wait_fixed(&mut self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }

    async fn content(&mut self) -> Result<String, RenderError> {
        let page = self.page()?;
        page.content()
            .await
            .map_err(|e| RenderError::Session(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), RenderError> {
        self.page = None;
        let result = self
            .browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| RenderError::Close(e.to_string()));
        // Reap the child process and stop the websocket handler regardless of
        // whether the close command itself went through.
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        result
    }
}
