//! End-to-end pipeline protocol tests with a scripted render backend.
//!
//! Each test drives `run_pipeline` through the same channel the HTTP layer
//! uses and asserts on the decoded NDJSON records.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use eventscope::config::AppConfig;
use eventscope::pipeline::run_pipeline;
use eventscope::render::{RenderBackend, RenderError, RenderSession};

const VALID_PAGE: &str = r#"<html><body>
<div class="schedule-list">
  <div>
    <h2>Events for 2025/05/29</h2>
    <div class="event-card">
      <img src="/i/highroller.png" title="Monopoly GO! High Roller">
      <span>2025/05/29 01:00:00 - 2025/05/29 06:59:00</span>
      <span>Duration: 5 Minutes</span>
    </div>
  </div>
</div>
</body></html>"#;

const NO_CONTAINER_PAGE: &str =
    "<html><body><div class=\"unrelated\">nothing</div></body></html>";

/// Backend whose sessions serve canned HTML instead of driving a browser.
struct ScriptedBackend {
    /// `None` simulates a launch failure (distinct from unavailability).
    html: Option<String>,
    unavailable: bool,
    closed: Arc<AtomicBool>,
}

impl ScriptedBackend {
    fn serving(html: &str) -> (Self, Arc<AtomicBool>) {
        let closed = Arc::new(AtomicBool::new(false));
        (
            Self {
                html: Some(html.to_string()),
                unavailable: false,
                closed: closed.clone(),
            },
            closed,
        )
    }
}

#[async_trait]
impl RenderBackend for ScriptedBackend {
    fn method_name(&self) -> &str {
        "scripted"
    }

    async fn launch(&self) -> Result<Box<dyn RenderSession>, RenderError> {
        if self.unavailable {
            return Err(RenderError::Unavailable {
                searched: "scripted".to_string(),
            });
        }
        match &self.html {
            Some(html) => Ok(Box::new(ScriptedSession {
                html: html.clone(),
                closed: self.closed.clone(),
            })),
            None => Err(RenderError::Launch("scripted launch failure".to_string())),
        }
    }
}

struct ScriptedSession {
    html: String,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl RenderSession for ScriptedSession {
    async fn open_page(&mut self, _url: &str, _timeout: Duration) -> Result<(), RenderError> {
        Ok(())
    }

    async fn wait_for_selector(
        &mut self,
        _selector: &str,
        _timeout: Duration,
    ) -> Result<(), RenderError> {
        Ok(())
    }

    async fn wait_fixed(&mut self, _delay: Duration) {}

    async fn content(&mut self) -> Result<String, RenderError> {
        Ok(self.html.clone())
    }

    async fn close(&mut self) -> Result<(), RenderError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Run one pipeline to completion and decode every emitted record.
async fn collect_records(backend: ScriptedBackend, cancel: CancellationToken) -> Vec<Value> {
    let backend: Arc<dyn RenderBackend> = Arc::new(backend);
    let (tx, mut rx) = mpsc::channel(16);
    let handle = tokio::spawn(run_pipeline(
        backend,
        Arc::new(AppConfig::default()),
        tx,
        cancel,
    ));

    let mut records = Vec::new();
    while let Some(record) = rx.recv().await {
        let line = record.to_ndjson();
        assert!(line.ends_with('\n'));
        records.push(serde_json::from_str(line.trim_end()).unwrap());
    }
    handle.await.unwrap();
    records
}

fn progress_values(records: &[Value]) -> Vec<i64> {
    records
        .iter()
        .filter(|r| r["type"] == "progress")
        .map(|r| r["progress"].as_i64().unwrap())
        .collect()
}

fn final_record(records: &[Value]) -> &Value {
    let finals: Vec<&Value> = records.iter().filter(|r| r["type"] == "final").collect();
    assert_eq!(finals.len(), 1, "exactly one final record ends the stream");
    assert_eq!(
        records.last().unwrap()["type"],
        "final",
        "final record is last"
    );
    finals[0]
}

fn step_states(record: &Value) -> Vec<(String, String)> {
    record["methods"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| {
            (
                m["name"].as_str().unwrap().to_string(),
                m["state"].as_str().unwrap().to_string(),
            )
        })
        .collect()
}

#[tokio::test]
async fn scenario_a_valid_fragment_round_trips() {
    let (backend, closed) = ScriptedBackend::serving(VALID_PAGE);
    let records = collect_records(backend, CancellationToken::new()).await;

    assert_eq!(progress_values(&records), [10, 25, 50, 75, 90, 100]);

    let last = final_record(&records);
    assert_eq!(last["success"], true);
    assert_eq!(last["successfulMethodName"], "scripted");
    assert!(last.get("error").is_none());

    let day = last["events"]["2025-05-29"].as_array().unwrap();
    assert_eq!(day.len(), 1);
    let event = &day[0];
    assert_eq!(event["name"], "High Roller");
    assert_eq!(event["startTime"], "2025-05-29T01:00:00");
    assert_eq!(event["endTime"], "2025-05-29T06:59:00");
    assert_eq!(event["duration"], "5 Minutes");
    assert_eq!(event["category"], "QuickEvent");
    assert_eq!(event["iconUrl"], "https://monopolygo.events/i/highroller.png");

    // Terminal progress snapshot has every step succeeded.
    let terminal = records[records.len() - 2].clone();
    for (name, state) in step_states(&terminal) {
        assert_eq!(state, "success", "step {name} should have succeeded");
    }

    assert!(closed.load(Ordering::SeqCst), "session must be released");
}

#[tokio::test]
async fn scenario_b_unavailable_renderer_serves_sample_data() {
    let backend = ScriptedBackend {
        html: None,
        unavailable: true,
        closed: Arc::new(AtomicBool::new(false)),
    };
    let records = collect_records(backend, CancellationToken::new()).await;

    assert_eq!(progress_values(&records), [10, 100]);

    let last = final_record(&records);
    assert_eq!(last["success"], false);
    assert!(last.get("successfulMethodName").is_none());
    assert!(last["error"].as_str().unwrap().contains("unavailable"));

    // Degraded, not hard-failed: sample events are present.
    let events = last["events"].as_object().unwrap();
    assert_eq!(events.len(), 2);
    let total: usize = events.values().map(|day| day.as_array().unwrap().len()).sum();
    assert_eq!(total, 3);

    let states = step_states(&records[records.len() - 2]);
    assert_eq!(states[0], ("acquire renderer".to_string(), "failed".to_string()));
    for (_, state) in &states[1..] {
        assert_eq!(state, "pending");
    }
}

#[tokio::test]
async fn scenario_c_missing_container_fails_extract_step() {
    let (backend, closed) = ScriptedBackend::serving(NO_CONTAINER_PAGE);
    let records = collect_records(backend, CancellationToken::new()).await;

    assert_eq!(progress_values(&records), [10, 25, 50, 100]);

    let last = final_record(&records);
    assert_eq!(last["success"], false);
    assert!(last.get("events").is_none());
    assert!(last["error"].as_str().unwrap().contains("container"));

    // Steps before the failure succeeded, the failing step carries the
    // error, everything after stays pending.
    let terminal = &records[records.len() - 2];
    let states = step_states(terminal);
    assert_eq!(states[0].1, "success");
    assert_eq!(states[1].1, "success");
    assert_eq!(states[2], ("extract".to_string(), "failed".to_string()));
    assert_eq!(states[3].1, "pending");
    assert_eq!(states[4].1, "pending");
    assert!(terminal["methods"][2]["error"].as_str().is_some());

    assert!(closed.load(Ordering::SeqCst), "session must be released");
}

#[tokio::test]
async fn launch_error_is_a_hard_failure_not_fallback() {
    let backend = ScriptedBackend {
        html: None,
        unavailable: false,
        closed: Arc::new(AtomicBool::new(false)),
    };
    let records = collect_records(backend, CancellationToken::new()).await;

    let last = final_record(&records);
    assert_eq!(last["success"], false);
    assert!(last.get("events").is_none(), "no sample data for launch errors");
    assert!(last["error"].as_str().unwrap().contains("launch"));
}

#[tokio::test]
async fn cancellation_releases_the_session() {
    let (backend, closed) = ScriptedBackend::serving(VALID_PAGE);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let records = collect_records(backend, cancel).await;

    let last = final_record(&records);
    assert_eq!(last["success"], false);
    assert_eq!(last["error"], "pipeline cancelled");
    assert!(last.get("events").is_none());

    assert!(closed.load(Ordering::SeqCst), "session must be released");
}
