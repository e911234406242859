//! TOML configuration for eventscope.
//!
//! Layered model with compiled-in defaults, an environment variable override
//! for the config file path, and a standard filesystem location.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for the eventscope process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub renderer: RendererConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Try to load configuration from, in order:
    /// 1. The path specified by the `EVENTSCOPE_CONFIG` environment variable.
    /// 2. `/etc/eventscope/eventscope.toml`.
    /// 3. Fall back to compiled-in defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var("EVENTSCOPE_CONFIG") {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "EVENTSCOPE_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new("/etc/eventscope/eventscope.toml");
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Source page
// ---------------------------------------------------------------------------

/// The scraped schedule page and the selectors that locate its parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// URL of the client-rendered schedule page.
    pub url: String,

    /// Selector for the one list container holding the per-day sections.
    pub container_selector: String,

    /// Selector for the card element surrounding each event's icon and text.
    pub card_selector: String,

    /// Fixed prefix stripped from icon `title`/`alt` text to get the event name.
    pub name_prefix: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "https://monopolygo.events/schedule".to_string(),
            container_selector: "div.schedule-list".to_string(),
            card_selector: "div.event-card".to_string(),
            name_prefix: "Monopoly GO! ".to_string(),
        }
    }
}

impl SourceConfig {
    /// Scheme+host prefix used to resolve relative icon paths.
    pub fn origin(&self) -> Result<String> {
        let url = url::Url::parse(&self.url)
            .with_context(|| format!("invalid source url: {}", self.url))?;
        Ok(url.origin().ascii_serialization())
    }
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Headless renderer acquisition and wait budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Explicit browser executable. When unset, well-known names are searched
    /// on PATH and a miss is reported as "capability unavailable".
    pub executable: Option<PathBuf>,

    /// Run the browser headless. Off is only useful for local debugging.
    pub headless: bool,

    /// Budget for navigation to reach network quiescence.
    pub navigation_timeout_ms: u64,

    /// Budget for the schedule container selector to appear.
    pub selector_timeout_ms: u64,

    /// Fixed settle delay after the selector appears, for late-binding
    /// scripts that keep mutating the DOM.
    pub settle_delay_ms: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            navigation_timeout_ms: 30_000,
            selector_timeout_ms: 15_000,
            settle_delay_ms: 3_000,
        }
    }
}
