//! Caption text printed around the code and the logo on each label.
//!
//! Every label page carries five short lines of text. Where that text comes
//! from is the job of a [`CaptionSource`]:
//!
//! * [`PlaceholderCaptions`] (default) prints the field names with blank
//!   values for hand-filling, plus the box number, which is always known.
//! * [`BoxCaptions`] binds each page to the box's actual data (item count,
//!   contents, gender, size), typically loaded from a JSON file exported by
//!   the inventory system.
//!
//! Custom sources implement the trait and are injected through
//! [`crate::config::LabelConfigBuilder::captions`].

use crate::identifier::Identifier;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const NUMBER_OF_ITEMS_LABEL: &str = "Number of items";
pub const BOX_NUMBER_LABEL: &str = "Box Number";
pub const CONTENTS_LABEL: &str = "Contents";
pub const GENDER_LABEL: &str = "Gender";
pub const SIZE_LABEL: &str = "Size";

/// The five caption lines of one label page.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageCaptions {
    /// Printed above the matrix code.
    pub above_code: String,
    /// Printed below the matrix code.
    pub below_code: String,
    /// Heading between the two halves.
    pub contents: String,
    /// Printed above the logo.
    pub above_logo: String,
    /// Printed below the logo.
    pub below_logo: String,
}

impl PageCaptions {
    /// Caption lines in the order they appear on the page, top to bottom.
    pub fn lines(&self) -> [&str; 5] {
        [
            &self.above_code,
            &self.below_code,
            &self.contents,
            &self.above_logo,
            &self.below_logo,
        ]
    }
}

/// Supplies caption text for each page.
///
/// Called once per page during assembly, in page order. Implementations
/// must be deterministic for a given `(index, identifier)`; the pipeline
/// relies on it to produce identical documents for identical input.
pub trait CaptionSource: Send + Sync {
    fn captions_for(&self, index: usize, identifier: &Identifier) -> PageCaptions;
}

/// Field names with empty values; only the box number is filled in.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderCaptions;

impl CaptionSource for PlaceholderCaptions {
    fn captions_for(&self, _index: usize, identifier: &Identifier) -> PageCaptions {
        BoxLabelData::default().captions(identifier)
    }
}

/// Per-box data printed on a label.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxLabelData {
    pub number_of_items: Option<u32>,
    pub contents: Option<String>,
    pub gender: Option<String>,
    pub size: Option<String>,
}

impl BoxLabelData {
    fn captions(&self, identifier: &Identifier) -> PageCaptions {
        PageCaptions {
            above_code: field(
                NUMBER_OF_ITEMS_LABEL,
                self.number_of_items.map(|n| n.to_string()).as_deref(),
            ),
            below_code: field(BOX_NUMBER_LABEL, Some(identifier.as_str())),
            contents: field(CONTENTS_LABEL, self.contents.as_deref()),
            above_logo: field(GENDER_LABEL, self.gender.as_deref()),
            below_logo: field(SIZE_LABEL, self.size.as_deref()),
        }
    }
}

/// Captions bound to real box data, keyed by identifier.
///
/// Boxes missing from the map fall back to placeholder captions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoxCaptions {
    boxes: HashMap<String, BoxLabelData>,
}

impl BoxCaptions {
    pub fn new(boxes: HashMap<String, BoxLabelData>) -> Self {
        Self { boxes }
    }

    /// Parse a JSON object of `{ "<identifier>": { "number_of_items": 3, … } }`.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn insert(&mut self, identifier: impl Into<String>, data: BoxLabelData) {
        self.boxes.insert(identifier.into(), data);
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}

impl CaptionSource for BoxCaptions {
    fn captions_for(&self, _index: usize, identifier: &Identifier) -> PageCaptions {
        self.boxes
            .get(identifier.as_str())
            .cloned()
            .unwrap_or_default()
            .captions(identifier)
    }
}

fn field(label: &str, value: Option<&str>) -> String {
    match value.map(clean_caption) {
        Some(v) if !v.is_empty() => format!("{label}: {v}"),
        _ => format!("{label}:"),
    }
}

// Control characters break the PDF text operator; collapse runs of
// whitespace so one caption stays on one line.
static CONTROL_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{Cc}\s]+").unwrap());

/// Normalise caption text to a single printable line.
pub fn clean_caption(text: &str) -> String {
    CONTROL_CHARS.replace_all(text, " ").trim().to_string()
}
