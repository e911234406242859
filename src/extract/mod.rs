//! DOM extraction: pull raw event fragments out of a rendered schedule page.
//!
//! This stage is a pure read over an HTML snapshot. It knows nothing about
//! dates or categories; it only locates text and hands it to the normalizer.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

use crate::config::SourceConfig;

/// Day sections are labelled `Events for <date>`; anything else is ignored.
pub const HEADER_PREFIX: &str = "Events for ";

/// Literal marker for the duration text block inside an event card.
pub const DURATION_LABEL: &str = "Duration:";

/// Matches `YYYY/MM/DD HH:MM:SS - YYYY/MM/DD HH:MM:SS` with the two
/// endpoints captured for the normalizer.
pub static TIME_RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2}) - (\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2})")
        .expect("time range pattern compiles")
});

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("schedule container {selector:?} not found in rendered document")]
    MissingContainer { selector: String },

    #[error("invalid selector {selector:?}: {message}")]
    InvalidSelector { selector: String, message: String },
}

/// One raw, unparsed event record scraped directly from rendered markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFragment {
    /// Date text from the surrounding day header, e.g. `2025/05/29`.
    pub date_text: String,
    /// Event name from the icon's `title`/`alt`, with the site prefix stripped.
    pub name: String,
    /// Raw time range text, when a text block in the card matched the pattern.
    pub time_text: Option<String>,
    /// Raw duration text block, when one contained the duration label.
    pub duration_text: Option<String>,
    /// Icon `src` as it appears in the document (possibly relative).
    pub icon_path: Option<String>,
}

/// Compiled selectors for one source page schema.
pub struct Extractor {
    container: Selector,
    card: Selector,
    img: Selector,
    name_prefix: String,
    container_selector: String,
}

impl Extractor {
    pub fn from_config(config: &SourceConfig) -> Result<Self, ExtractError> {
        Ok(Self {
            container: parse_selector(&config.container_selector)?,
            card: parse_selector(&config.card_selector)?,
            img: parse_selector("img")?,
            name_prefix: config.name_prefix.clone(),
            container_selector: config.container_selector.clone(),
        })
    }

    /// Walk the schedule container and collect raw fragments in document
    /// order. Items without a recognized day header and images without a
    /// usable name are skipped silently; a missing container is fatal.
    pub fn extract(&self, html: &str) -> Result<Vec<RawFragment>, ExtractError> {
        let document = Html::parse_document(html);

        let container = document
            .select(&self.container)
            .next()
            .ok_or_else(|| ExtractError::MissingContainer {
                selector: self.container_selector.clone(),
            })?;

        let mut fragments = Vec::new();

        for item in container.children().filter_map(ElementRef::wrap) {
            let Some(label) = first_text(item) else {
                continue;
            };
            let Some(date_text) = label.strip_prefix(HEADER_PREFIX) else {
                continue;
            };

            let cards: Vec<ElementRef> = item.select(&self.card).collect();

            for img in item.select(&self.img) {
                let Some(raw_name) = img
                    .value()
                    .attr("title")
                    .or_else(|| img.value().attr("alt"))
                else {
                    // No title and no alt: cannot derive a name.
                    continue;
                };
                let name = raw_name
                    .strip_prefix(&self.name_prefix)
                    .unwrap_or(raw_name)
                    .trim()
                    .to_string();

                let Some(card) = enclosing_card(img, &cards) else {
                    continue;
                };

                let (time_text, duration_text) = scan_text_blocks(card);

                fragments.push(RawFragment {
                    date_text: date_text.trim().to_string(),
                    name,
                    time_text,
                    duration_text,
                    icon_path: img.value().attr("src").map(str::to_string),
                });
            }
        }

        Ok(fragments)
    }
}

fn parse_selector(selector: &str) -> Result<Selector, ExtractError> {
    Selector::parse(selector).map_err(|e| ExtractError::InvalidSelector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

/// First non-whitespace text node under `element`, in document order.
fn first_text(element: ElementRef) -> Option<String> {
    element
        .text()
        .map(str::trim)
        .find(|t| !t.is_empty())
        .map(str::to_string)
}

/// Nearest ancestor of `img` that is one of the item's event cards.
fn enclosing_card<'a>(img: ElementRef<'a>, cards: &[ElementRef<'a>]) -> Option<ElementRef<'a>> {
    let mut node = img.parent();
    while let Some(n) = node {
        if cards.iter().any(|card| card.id() == n.id()) {
            return ElementRef::wrap(n);
        }
        node = n.parent();
    }
    None
}

/// Scan every nested text block of a card in document order; on each match
/// the later block overwrites the earlier one (last wins).
fn scan_text_blocks(card: ElementRef) -> (Option<String>, Option<String>) {
    let mut time_text = None;
    let mut duration_text = None;

    for node in card.descendants().filter_map(ElementRef::wrap) {
        let text = node.text().collect::<Vec<_>>().join(" ");
        if let Some(m) = TIME_RANGE_RE.find(&text) {
            time_text = Some(m.as_str().to_string());
        }
        if text.contains(DURATION_LABEL) {
            duration_text = Some(text.trim().to_string());
        }
    }

    (time_text, duration_text)
}
