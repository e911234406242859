//! Environment self-check for the scrape pipeline.
//!
//! Answers "will a scrape have a chance on this machine?" without driving a
//! full pipeline: renderer executable, configuration, source reachability.

use std::time::{Duration, Instant};

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use crate::config::AppConfig;
use crate::extract::Extractor;
use crate::render::ChromiumBackend;

/// Run the full self-check suite.
pub async fn run(config: &AppConfig) -> Result<SelfCheckReport> {
    info!("self-check: verifying scrape environment...");

    let mut results = Vec::new();

    // 1. Renderer executable
    let backend = ChromiumBackend::new(config.renderer.clone());
    match backend.locate_executable() {
        Ok(path) => results.push(ComponentResult {
            component: "Renderer".to_string(),
            status: CheckStatus::Pass,
            details: format!("browser executable at {}", path.display()),
            remediation: None,
        }),
        Err(e) => results.push(ComponentResult {
            component: "Renderer".to_string(),
            status: CheckStatus::Fail,
            details: e.to_string(),
            remediation: Some(
                "Install Chromium or set renderer.executable in eventscope.toml.".to_string(),
            ),
        }),
    }

    // 2. Configuration (source URL + selectors)
    let config_ok = match check_configuration(config) {
        Ok(details) => {
            results.push(ComponentResult {
                component: "Configuration".to_string(),
                status: CheckStatus::Pass,
                details,
                remediation: None,
            });
            true
        }
        Err(details) => {
            results.push(ComponentResult {
                component: "Configuration".to_string(),
                status: CheckStatus::Fail,
                details,
                remediation: Some("Fix the [source] section of eventscope.toml.".to_string()),
            });
            false
        }
    };

    // 3. Source reachability (plain HTTP; the real scrape renders client-side,
    // this only proves the host answers)
    if config_ok {
        results.push(probe_source(&config.source.url).await?);
    } else {
        results.push(ComponentResult {
            component: "Source".to_string(),
            status: CheckStatus::Skipped,
            details: "source url invalid, reachability probe skipped".to_string(),
            remediation: None,
        });
    }

    info!("self-check complete. {} check(s) run.", results.len());

    let ready = results.iter().all(|r| r.status != CheckStatus::Fail);
    Ok(SelfCheckReport { results, ready })
}

async fn probe_source(url: &str) -> Result<ComponentResult> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;

    let start = Instant::now();
    let result = client.get(url).send().await;
    let elapsed_ms = start.elapsed().as_millis();

    Ok(match result {
        Ok(response) if response.status().is_success() => ComponentResult {
            component: "Source".to_string(),
            status: CheckStatus::Pass,
            details: format!("HTTP {} in {}ms", response.status().as_u16(), elapsed_ms),
            remediation: None,
        },
        Ok(response) => ComponentResult {
            component: "Source".to_string(),
            status: CheckStatus::Warning,
            details: format!("HTTP {}", response.status().as_u16()),
            remediation: Some("The schedule page may have moved; check source.url.".to_string()),
        },
        Err(e) => ComponentResult {
            component: "Source".to_string(),
            status: CheckStatus::Fail,
            details: format!("request failed: {}", e),
            remediation: Some("Check network connectivity and source.url.".to_string()),
        },
    })
}

fn check_configuration(config: &AppConfig) -> Result<String, String> {
    let origin = config
        .source
        .origin()
        .map_err(|e| format!("source url: {}", e))?;
    Extractor::from_config(&config.source).map_err(|e| e.to_string())?;
    Ok(format!(
        "source origin {}, selectors {:?} / {:?}",
        origin, config.source.container_selector, config.source.card_selector
    ))
}

/// Self-check result for a single component.
#[derive(Debug, Serialize, Clone)]
pub struct ComponentResult {
    pub component: String,
    pub status: CheckStatus,
    pub details: String,
    pub remediation: Option<String>,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Fail,
    Warning,
    Skipped,
}

#[derive(Debug, Serialize)]
pub struct SelfCheckReport {
    pub results: Vec<ComponentResult>,
    pub ready: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_configuration_passes() {
        let details = check_configuration(&AppConfig::default()).unwrap();
        assert!(details.contains("https://monopolygo.events"));
    }

    #[test]
    fn broken_selector_fails_configuration() {
        let mut config = AppConfig::default();
        config.source.container_selector = ":::".to_string();
        assert!(check_configuration(&config).is_err());
    }

    #[test]
    fn broken_url_fails_configuration() {
        let mut config = AppConfig::default();
        config.source.url = "not a url".to_string();
        assert!(check_configuration(&config).is_err());
    }
}
