//! Document assembly: ordered snapshots → label pages → PDF bytes.
//!
//! Assembly is all-or-nothing. It refuses an empty batch (so "nothing to
//! print" is distinguishable from "still generating") and refuses snapshots
//! whose indices are not exactly `0..n` in order, so a document can never be
//! built from a partial or shuffled capture set.
//!
//! ## PDF layout
//!
//! Written with `lopdf`: one Helvetica font resource, one image XObject per
//! code (8-bit DeviceGray) and a single logo XObject (DeviceRGB) shared by
//! every page. Streams are Flate-compressed and no timestamps are written,
//! so identical input produces byte-identical output.

use crate::captions::{clean_caption, CaptionSource};
use crate::error::LabelError;
use crate::pipeline::capture::{EncodedImage, RasterSnapshot};
use crate::pipeline::compose::{
    compose, ImageRef, LabelPage, PageElement, StaticAssets, PAGE_HEIGHT, PAGE_WIDTH,
};
use image::DynamicImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};
use std::time::Instant;
use tracing::{debug, info};

const PRODUCER: &str = concat!("qr-labels ", env!("CARGO_PKG_VERSION"));

/// The complete label document, before encoding.
#[derive(Debug, Clone)]
pub struct LabelDocument {
    pub pages: Vec<LabelPage>,
    pub logo: Option<EncodedImage>,
}

/// Compose one page per snapshot, preserving order.
pub fn assemble(
    snapshots: Vec<RasterSnapshot>,
    assets: &StaticAssets,
    captions: &dyn CaptionSource,
) -> Result<LabelDocument, LabelError> {
    if snapshots.is_empty() {
        return Err(LabelError::EmptyInput);
    }

    if let Some((pos, snap)) = snapshots
        .iter()
        .enumerate()
        .find(|(pos, snap)| snap.index != *pos)
    {
        return Err(LabelError::AssemblyFailed(format!(
            "snapshot for '{}' has index {} at position {}",
            snap.identifier, snap.index, pos
        )));
    }

    let pages = snapshots
        .into_iter()
        .map(|snap| {
            let caps = captions.captions_for(snap.index, &snap.identifier);
            compose(snap, assets, caps)
        })
        .collect();

    Ok(LabelDocument {
        pages,
        logo: assets.logo.clone(),
    })
}

impl LabelDocument {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Encode the document as PDF.
    pub fn to_pdf_bytes(&self, title: &str) -> Result<Vec<u8>, LabelError> {
        if self.pages.is_empty() {
            return Err(LabelError::EmptyInput);
        }
        let start = Instant::now();

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let logo_id = match self.logo {
            Some(ref logo) => Some(doc.add_object(image_xobject(logo)?)),
            None => None,
        };

        let mut kids: Vec<Object> = Vec::with_capacity(self.pages.len());
        for page in &self.pages {
            let code_id = doc.add_object(image_xobject(&page.code)?);
            let mut xobjects = Dictionary::new();
            xobjects.set("Code", code_id);
            if let Some(id) = logo_id {
                xobjects.set("Logo", id);
            }

            let content = page_content(page)
                .encode()
                .map_err(|e| LabelError::AssemblyFailed(format!("page {}: {e}", page.index + 1)))?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, content));

            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                    "XObject" => xobjects,
                },
            });
            kids.push(page_id.into());
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Count" => kids.len() as i64,
                "Kids" => kids,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal(win_ansi(&clean_caption(title))),
            "Producer" => Object::string_literal(PRODUCER),
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);
        doc.compress();

        let mut buf = Vec::new();
        doc.save_to(&mut buf)
            .map_err(|e| LabelError::AssemblyFailed(format!("PDF write failed: {e}")))?;

        debug!(
            "Encoded {} pages → {} bytes in {}ms",
            self.pages.len(),
            buf.len(),
            start.elapsed().as_millis()
        );
        Ok(buf)
    }
}

/// Encode on the blocking pool; image decoding and Flate are CPU-bound.
pub async fn encode_pdf(
    document: LabelDocument,
    title: String,
) -> Result<(LabelDocument, Vec<u8>), LabelError> {
    tokio::task::spawn_blocking(move || {
        let bytes = document.to_pdf_bytes(&title)?;
        info!("Assembled {} label pages", document.page_count());
        Ok((document, bytes))
    })
    .await
    .map_err(|e| LabelError::Internal(format!("Assembly task panicked: {e}")))?
}

fn page_content(page: &LabelPage) -> Content {
    let mut operations = Vec::new();
    for element in &page.elements {
        match element {
            PageElement::Image { source, rect } => {
                let name = match source {
                    ImageRef::Code => "Code",
                    ImageRef::Logo => "Logo",
                };
                operations.extend([
                    Operation::new("q", vec![]),
                    Operation::new(
                        "cm",
                        vec![
                            rect.width.into(),
                            0.into(),
                            0.into(),
                            rect.height.into(),
                            rect.x.into(),
                            rect.y.into(),
                        ],
                    ),
                    Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]),
                    Operation::new("Q", vec![]),
                ]);
            }
            PageElement::Frame { rect } => {
                operations.extend([
                    Operation::new("q", vec![]),
                    Operation::new("G", vec![0.6_f32.into()]),
                    Operation::new("w", vec![1.into()]),
                    Operation::new(
                        "re",
                        vec![
                            rect.x.into(),
                            rect.y.into(),
                            rect.width.into(),
                            rect.height.into(),
                        ],
                    ),
                    Operation::new("S", vec![]),
                    Operation::new("Q", vec![]),
                ]);
            }
            PageElement::Text {
                text,
                x,
                baseline,
                size,
            } => {
                operations.extend([
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), (*size).into()]),
                    Operation::new("Td", vec![(*x).into(), (*baseline).into()]),
                    Operation::new("Tj", vec![Object::string_literal(win_ansi(text))]),
                    Operation::new("ET", vec![]),
                ]);
            }
        }
    }
    Content { operations }
}

/// Build an image XObject, flattening any alpha channel onto white.
fn image_xobject(image: &EncodedImage) -> Result<Stream, LabelError> {
    let decoded = image.decode()?;
    let (width, height) = (decoded.width(), decoded.height());
    let (color_space, pixels) = flatten_on_white(&decoded);

    Ok(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => color_space,
            "BitsPerComponent" => 8,
        },
        pixels,
    ))
}

fn flatten_on_white(image: &DynamicImage) -> (&'static str, Vec<u8>) {
    fn over_white(value: u8, alpha: u8) -> u8 {
        let a = alpha as u16;
        ((value as u16 * a + 255 * (255 - a)) / 255) as u8
    }

    if image.color().has_color() {
        let rgba = image.to_rgba8();
        let mut out = Vec::with_capacity(rgba.len() / 4 * 3);
        for px in rgba.pixels() {
            let [r, g, b, a] = px.0;
            out.extend([over_white(r, a), over_white(g, a), over_white(b, a)]);
        }
        ("DeviceRGB", out)
    } else {
        let la = image.to_luma_alpha8();
        let out = la.pixels().map(|px| over_white(px.0[0], px.0[1])).collect();
        ("DeviceGray", out)
    }
}

/// WinAnsi bytes 0x80..=0x9F; `None` marks the five undefined slots.
const WIN_ANSI_HIGH: [Option<char>; 32] = [
    Some('\u{20AC}'), None, Some('\u{201A}'), Some('\u{0192}'),
    Some('\u{201E}'), Some('\u{2026}'), Some('\u{2020}'), Some('\u{2021}'),
    Some('\u{02C6}'), Some('\u{2030}'), Some('\u{0160}'), Some('\u{2039}'),
    Some('\u{0152}'), None, Some('\u{017D}'), None,
    None, Some('\u{2018}'), Some('\u{2019}'), Some('\u{201C}'),
    Some('\u{201D}'), Some('\u{2022}'), Some('\u{2013}'), Some('\u{2014}'),
    Some('\u{02DC}'), Some('\u{2122}'), Some('\u{0161}'), Some('\u{203A}'),
    Some('\u{0153}'), None, Some('\u{017E}'), Some('\u{0178}'),
];

/// Helvetica uses WinAnsi. Printable Latin-1 maps to itself, the typographic
/// characters of the 0x80 block map to their slots, everything else
/// (controls included) prints as `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars().map(win_ansi_byte).collect()
}

fn win_ansi_byte(c: char) -> u8 {
    match u32::from(c) {
        code @ (0x20..=0x7E | 0xA0..=0xFF) => code as u8,
        _ => WIN_ANSI_HIGH
            .iter()
            .position(|&slot| slot == Some(c))
            .map_or(b'?', |i| 0x80 + i as u8),
    }
}
