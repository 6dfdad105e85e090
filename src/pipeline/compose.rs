//! Label page layout.
//!
//! One A4 page per box, split into two stacked halves:
//!
//! ```text
//! ┌──────────────────────────┐
//! │ Number of items: …       │
//! │      ┌──────────┐        │
//! │      │ QR code  │        │  upper half
//! │      └──────────┘        │
//! │ Box Number: …            │
//! │ Contents: …              │
//! ├──────────────────────────┤
//! │ Gender: …                │
//! │      ┌──────────┐        │
//! │      │   logo   │        │  lower half
//! │      └──────────┘        │
//! │ Size: …                  │
//! └──────────────────────────┘
//! ```
//!
//! Composition is pure: positions are computed in PDF points (origin bottom
//! left) and handed to the assembler as [`PageElement`]s.

use crate::captions::PageCaptions;
use crate::identifier::Identifier;
use crate::pipeline::capture::{EncodedImage, RasterSnapshot};

/// A4 portrait, in points.
pub const PAGE_WIDTH: f32 = 595.28;
pub const PAGE_HEIGHT: f32 = 841.89;
pub const MARGIN: f32 = 20.0;
/// Edge of the printed code and logo, in points.
pub const IMAGE_SIZE: f32 = 250.0;
pub const FONT_SIZE: f32 = 14.0;
const GAP: f32 = 6.0;

/// Static artwork shared by every page.
#[derive(Debug, Clone, Default)]
pub struct StaticAssets {
    pub logo: Option<EncodedImage>,
}

/// Axis-aligned rectangle in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn top(&self) -> f32 {
        self.y + self.height
    }
}

/// Which image an element draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRef {
    /// The page's own code snapshot.
    Code,
    /// The shared logo.
    Logo,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageElement {
    Image { source: ImageRef, rect: Rect },
    /// Outline marking the logo slot when no logo is configured.
    Frame { rect: Rect },
    Text { text: String, x: f32, baseline: f32, size: f32 },
}

/// One page of the label document.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelPage {
    pub index: usize,
    pub identifier: Identifier,
    pub code: EncodedImage,
    pub elements: Vec<PageElement>,
}

impl LabelPage {
    /// Caption strings in top-to-bottom order.
    pub fn texts(&self) -> Vec<&str> {
        self.elements
            .iter()
            .filter_map(|e| match e {
                PageElement::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Lay out one label page.
pub fn compose(snapshot: RasterSnapshot, assets: &StaticAssets, captions: PageCaptions) -> LabelPage {
    let image_x = (PAGE_WIDTH - IMAGE_SIZE) / 2.0;
    let half_height = (PAGE_HEIGHT - 2.0 * MARGIN) / 2.0;
    let upper_top = PAGE_HEIGHT - MARGIN;
    let lower_top = upper_top - half_height;

    let mut elements = Vec::with_capacity(8);

    let code_rect = half(
        &mut elements,
        upper_top,
        image_x,
        captions.above_code,
        captions.below_code,
    );
    elements.insert(
        1,
        PageElement::Image {
            source: ImageRef::Code,
            rect: code_rect,
        },
    );
    // The contents heading sits under the code, still in the upper half.
    elements.push(text(
        captions.contents,
        image_x,
        code_rect.y - 2.0 * (FONT_SIZE + GAP) - GAP,
    ));

    let first_lower = elements.len();
    let logo_rect = half(
        &mut elements,
        lower_top,
        image_x,
        captions.above_logo,
        captions.below_logo,
    );
    let logo = if assets.logo.is_some() {
        PageElement::Image {
            source: ImageRef::Logo,
            rect: logo_rect,
        }
    } else {
        PageElement::Frame { rect: logo_rect }
    };
    elements.insert(first_lower + 1, logo);

    LabelPage {
        index: snapshot.index,
        identifier: snapshot.identifier,
        code: snapshot.image,
        elements,
    }
}

/// Push caption-above and caption-below for one half; return the image slot.
fn half(
    elements: &mut Vec<PageElement>,
    top: f32,
    x: f32,
    above: String,
    below: String,
) -> Rect {
    let image_top = top - FONT_SIZE - 2.0 * GAP;
    let rect = Rect {
        x,
        y: image_top - IMAGE_SIZE,
        width: IMAGE_SIZE,
        height: IMAGE_SIZE,
    };
    elements.push(text(above, x, top - FONT_SIZE));
    elements.push(text(below, x, rect.y - GAP - FONT_SIZE));
    rect
}

fn text(text: String, x: f32, baseline: f32) -> PageElement {
    PageElement::Text {
        text,
        x,
        baseline,
        size: FONT_SIZE,
    }
}
