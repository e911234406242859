//! Compiled-in sample dataset for the degraded (renderer unavailable) path.
//!
//! This is a fixture: it mirrors the Event shape exactly but makes no claim
//! about what the live site currently publishes.

use chrono::{NaiveDate, NaiveDateTime};

use crate::normalize::{Event, EventCategory, EventsByDate};

/// Terminal error string for the degraded outcome. Callers distinguish this
/// case from a hard failure by the presence of `events`, but the message is
/// part of the observable behavior too.
pub const UNAVAILABLE_ERROR: &str =
    "rendering capability unavailable, sample data provided";

/// Two dates, three events, matching the live Event shape.
pub fn sample_events() -> EventsByDate {
    let mut events = EventsByDate::new();

    events.insert(
        "2025-06-14".to_string(),
        vec![
            Event {
                name: "Mega Heist".to_string(),
                start_time: dt(2025, 6, 14, 0, 0, 0),
                end_time: dt(2025, 6, 14, 23, 59, 0),
                duration: "1 Day".to_string(),
                category: EventCategory::Tournament,
                icon_url: Some("https://monopolygo.events/i/mega-heist.png".to_string()),
            },
            Event {
                name: "Golden Blitz".to_string(),
                start_time: dt(2025, 6, 14, 10, 0, 0),
                end_time: dt(2025, 6, 14, 22, 0, 0),
                duration: "25 Minutes".to_string(),
                category: EventCategory::SpecialEvent,
                icon_url: Some("https://monopolygo.events/i/golden-blitz.png".to_string()),
            },
        ],
    );

    events.insert(
        "2025-06-15".to_string(),
        vec![Event {
            name: "High Roller".to_string(),
            start_time: dt(2025, 6, 15, 1, 0, 0),
            end_time: dt(2025, 6, 15, 6, 59, 0),
            duration: "5 Minutes".to_string(),
            category: EventCategory::QuickEvent,
            icon_url: Some("https://monopolygo.events/i/high-roller.png".to_string()),
        }],
    );

    events
}

fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, mo, d)
        .and_then(|date| date.and_hms_opt(h, mi, s))
        .expect("valid fixture timestamp")
}
