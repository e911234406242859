//! Normalization: raw fragments into typed, date-grouped, sorted events.
//!
//! Failures here are per-fragment: anything malformed is dropped and logged,
//! never surfaced as a pipeline error. Only the extractor's missing-container
//! case aborts a scrape.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::debug;

use crate::extract::{RawFragment, DURATION_LABEL, TIME_RANGE_RE};

/// Calendar-date key (`YYYY-MM-DD`) to that day's events, ascending by start
/// time. `BTreeMap` keeps the keys themselves in ascending order.
pub type EventsByDate = BTreeMap<String, Vec<Event>>;

/// One normalized schedule entry.
///
/// Start and end are naive local instants: the source page carries no
/// timezone and none is inferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub name: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    /// Human label as published (e.g. "5 Minutes"), not a number of seconds.
    pub duration: String,
    pub category: EventCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventCategory {
    Event,
    Milestone,
    PartnerEvent,
    Tournament,
    QuickEvent,
    Season,
    SpecialEvent,
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event => write!(f, "Event"),
            Self::Milestone => write!(f, "Milestone"),
            Self::PartnerEvent => write!(f, "PartnerEvent"),
            Self::Tournament => write!(f, "Tournament"),
            Self::QuickEvent => write!(f, "QuickEvent"),
            Self::Season => write!(f, "Season"),
            Self::SpecialEvent => write!(f, "SpecialEvent"),
        }
    }
}

/// Keyword rules tested in order against the lower-cased name; the first
/// matching rule wins. The order is site behavior, not an implementation
/// detail: "Mega Season Heist" is a Tournament because `heist|mega` is
/// declared before `season|league`.
const CLASSIFICATION_RULES: &[(&[&str], EventCategory)] = &[
    (&["milestone"], EventCategory::Milestone),
    (&["partners", "jedi"], EventCategory::PartnerEvent),
    (&["bash", "builders"], EventCategory::Tournament),
    (&["roller", "high"], EventCategory::QuickEvent),
    (&["heist", "mega"], EventCategory::Tournament),
    (&["chance", "lucky"], EventCategory::QuickEvent),
    (&["season", "league"], EventCategory::Season),
    (&["blitz", "golden"], EventCategory::SpecialEvent),
    (&["boom", "sticker"], EventCategory::SpecialEvent),
];

/// Classify an event name into its category.
pub fn classify(name: &str) -> EventCategory {
    let lower = name.to_lowercase();
    for (keywords, category) in CLASSIFICATION_RULES {
        if keywords.iter().any(|k| lower.contains(k)) {
            return *category;
        }
    }
    EventCategory::Event
}

/// Normalize raw fragments into the final grouped structure.
///
/// `origin` is the scheme+host prefix used to absolutize relative icon paths.
/// Deterministic: equal input yields byte-identical serialized output.
pub fn normalize(fragments: &[RawFragment], origin: &str) -> EventsByDate {
    let mut by_date: EventsByDate = BTreeMap::new();

    for fragment in fragments {
        let Some(date) = parse_header_date(&fragment.date_text) else {
            debug!(date_text = %fragment.date_text, name = %fragment.name, "dropping fragment: unparseable date header");
            continue;
        };

        let Some((start_time, end_time)) = parse_time_range(fragment.time_text.as_deref()) else {
            debug!(name = %fragment.name, time_text = ?fragment.time_text, "dropping fragment: unparseable time range");
            continue;
        };

        if start_time > end_time {
            debug!(name = %fragment.name, %start_time, %end_time, "dropping fragment: start after end");
            continue;
        }

        let event = Event {
            name: fragment.name.clone(),
            start_time,
            end_time,
            duration: duration_label(fragment.duration_text.as_deref()),
            category: classify(&fragment.name),
            icon_url: resolve_icon(fragment.icon_path.as_deref(), origin),
        };

        // Key by the header's own date, not by start_time: overnight events
        // can legitimately start on a different calendar day.
        by_date
            .entry(date.format("%Y-%m-%d").to_string())
            .or_default()
            .push(event);
    }

    for events in by_date.values_mut() {
        events.sort_by(|a, b| a.start_time.cmp(&b.start_time));
    }

    by_date
}

fn parse_header_date(date_text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(date_text.trim(), "%Y/%m/%d").ok()
}

fn parse_time_range(time_text: Option<&str>) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let caps = TIME_RANGE_RE.captures(time_text?)?;
    let start = NaiveDateTime::parse_from_str(&caps[1], "%Y/%m/%d %H:%M:%S").ok()?;
    let end = NaiveDateTime::parse_from_str(&caps[2], "%Y/%m/%d %H:%M:%S").ok()?;
    Some((start, end))
}

/// Text after the duration label, trimmed; `Unknown` when missing or empty.
fn duration_label(duration_text: Option<&str>) -> String {
    let label = duration_text
        .and_then(|text| text.split_once(DURATION_LABEL))
        .map(|(_, rest)| rest.trim())
        .unwrap_or("");
    if label.is_empty() {
        "Unknown".to_string()
    } else {
        label.to_string()
    }
}

/// Keep absolute icon URLs as-is; resolve anything else against the origin.
fn resolve_icon(icon_path: Option<&str>, origin: &str) -> Option<String> {
    let path = icon_path?;
    if path.starts_with("http://") || path.starts_with("https://") {
        return Some(path.to_string());
    }
    if path.starts_with('/') {
        Some(format!("{origin}{path}"))
    } else {
        Some(format!("{origin}/{path}"))
    }
}
