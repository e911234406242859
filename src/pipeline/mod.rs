//! Extraction pipeline: step tracking, the caller-facing stream protocol,
//! and the five-step runner.

pub mod runner;
pub mod sample;

use serde::Serialize;
use std::fmt;

use crate::normalize::EventsByDate;

pub use runner::run_pipeline;

/// The five pipeline steps, in execution order. Names are part of the wire
/// protocol; callers key diagnostics off them.
pub const STEP_NAMES: [&str; 5] = [
    "acquire renderer",
    "load and wait",
    "extract",
    "normalize",
    "finalize",
];

/// Fixed progress checkpoints broadcast after each step transition. Not
/// proportional to elapsed time.
pub const PROGRESS_CHECKPOINTS: [u8; 6] = [10, 25, 50, 75, 90, 100];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    Pending,
    Running,
    Success,
    Failed,
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Tracked status of one pipeline step.
#[derive(Debug, Clone, Serialize)]
pub struct StepStatus {
    pub name: String,
    pub state: StepState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "durationMs", skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl StepStatus {
    fn pending(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: StepState::Pending,
            result: None,
            error: None,
            duration_ms: None,
        }
    }
}

/// One self-delimited record of the caller-facing stream.
///
/// A stream is any number of `progress` records followed by exactly one
/// `final` record. `success:false` with events present is the degraded
/// sample-data outcome, distinct from a hard failure with no events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamRecord {
    Progress {
        progress: u8,
        methods: Vec<StepStatus>,
    },
    Final {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        events: Option<EventsByDate>,
        #[serde(
            rename = "successfulMethodName",
            skip_serializing_if = "Option::is_none"
        )]
        successful_method_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl StreamRecord {
    /// Encode as one newline-terminated JSON wire record.
    pub fn to_ndjson(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("{json}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_record_wire_shape() {
        let record = StreamRecord::Progress {
            progress: 25,
            methods: vec![
                StepStatus {
                    name: "acquire renderer".to_string(),
                    state: StepState::Success,
                    result: None,
                    error: None,
                    duration_ms: Some(42),
                },
                StepStatus::pending("load and wait"),
            ],
        };

        let value: serde_json::Value =
            serde_json::from_str(record.to_ndjson().trim_end()).unwrap();
        assert_eq!(value["type"], "progress");
        assert_eq!(value["progress"], 25);
        assert_eq!(value["methods"][0]["state"], "success");
        assert_eq!(value["methods"][0]["durationMs"], 42);
        // Absent optionals are omitted entirely, not serialized as null.
        assert!(value["methods"][1].get("durationMs").is_none());
        assert!(value["methods"][1].get("error").is_none());
    }

    #[test]
    fn final_record_wire_shape() {
        let record = StreamRecord::Final {
            success: false,
            events: None,
            successful_method_name: None,
            error: Some("boom".to_string()),
        };
        let value: serde_json::Value =
            serde_json::from_str(record.to_ndjson().trim_end()).unwrap();
        assert_eq!(value["type"], "final");
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "boom");
        assert!(value.get("events").is_none());
        assert!(value.get("successfulMethodName").is_none());
    }

    #[test]
    fn ndjson_records_are_newline_terminated() {
        let record = StreamRecord::Progress {
            progress: 10,
            methods: vec![],
        };
        let line = record.to_ndjson();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }
}
