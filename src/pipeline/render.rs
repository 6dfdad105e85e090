//! Code rendering: draw each identifier as a QR matrix on a square surface.
//!
//! ## Why spawn_blocking?
//!
//! Building the matrix (Reed–Solomon coding, mask scoring) and filling a
//! 300 × 300 surface is CPU-bound. Each code is painted on the blocking pool
//! so the runtime keeps serving status observers while a large batch renders.
//!
//! ## The paint gate
//!
//! Every spawned paint is its own future. [`RenderSurface::mount`] joins all
//! of them before returning, so nothing downstream can observe a surface that
//! is still being painted. Results are correlated by index, never by the
//! order in which paints finish.

use crate::config::ErrorCorrection;
use crate::error::LabelError;
use crate::identifier::Identifier;
use crate::progress::ProgressCallback;
use futures::future::join_all;
use image::{GrayImage, Luma};
use qrcode::{Color, QrCode};
use std::time::Instant;
use tracing::debug;

const LIGHT: Luma<u8> = Luma([255]);
const DARK: Luma<u8> = Luma([0]);

/// Renderer settings, derived from [`crate::config::LabelConfig::render_options`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    pub size_px: u32,
    pub quiet_zone: u32,
    pub error_correction: ErrorCorrection,
    pub payload_prefix: Option<String>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            size_px: 300,
            quiet_zone: 4,
            error_correction: ErrorCorrection::default(),
            payload_prefix: None,
        }
    }
}

/// One identifier's code on the render surface.
#[derive(Debug, Clone)]
pub struct RenderedCode {
    /// 0-based position in the input batch.
    pub index: usize,
    pub identifier: Identifier,
    surface: Option<GrayImage>,
}

impl RenderedCode {
    /// A code whose surface has finished painting.
    pub fn painted(index: usize, identifier: Identifier, surface: GrayImage) -> Self {
        Self {
            index,
            identifier,
            surface: Some(surface),
        }
    }

    /// A code that has been requested but not painted yet.
    pub fn unpainted(index: usize, identifier: Identifier) -> Self {
        Self {
            index,
            identifier,
            surface: None,
        }
    }

    pub fn surface(&self) -> Option<&GrayImage> {
        self.surface.as_ref()
    }

    pub fn is_painted(&self) -> bool {
        self.surface
            .as_ref()
            .is_some_and(|s| s.width() > 0 && s.height() > 0)
    }
}

/// Draw the matrix code for one identifier.
///
/// Modules are whole pixels: `scale = size / (matrix + 2 × quiet_zone)`,
/// and the code is centred, so the output is identical for identical input.
/// An empty identifier is refused even when a payload prefix is set.
pub fn render_code(identifier: &Identifier, opts: &RenderOptions) -> Result<GrayImage, LabelError> {
    if identifier.is_empty() {
        return Err(LabelError::RenderFailed {
            identifier: String::new(),
            detail: "identifier is empty".into(),
        });
    }
    let payload = identifier.payload(opts.payload_prefix.as_deref());
    let code = QrCode::with_error_correction_level(payload.as_bytes(), opts.error_correction.into())
        .map_err(|e| LabelError::RenderFailed {
            identifier: identifier.to_string(),
            detail: e.to_string(),
        })?;

    let width = code.width() as u32;
    let modules = width + 2 * opts.quiet_zone;
    let scale = opts.size_px / modules;
    if scale == 0 {
        return Err(LabelError::RenderFailed {
            identifier: identifier.to_string(),
            detail: format!(
                "a {}-module code needs at least {} px, surface is {} px",
                width, modules, opts.size_px
            ),
        });
    }

    let origin = (opts.size_px - modules * scale) / 2 + opts.quiet_zone * scale;
    let mut surface = GrayImage::from_pixel(opts.size_px, opts.size_px, LIGHT);

    for (i, color) in code.to_colors().iter().enumerate() {
        if *color != Color::Dark {
            continue;
        }
        let mx = i as u32 % width;
        let my = i as u32 / width;
        let x0 = origin + mx * scale;
        let y0 = origin + my * scale;
        for y in y0..y0 + scale {
            for x in x0..x0 + scale {
                surface.put_pixel(x, y, DARK);
            }
        }
    }

    Ok(surface)
}

/// The surface codes are painted on before capture.
///
/// A pipeline owns exactly one; it is cleared and repopulated per cycle.
#[derive(Debug, Default)]
pub struct RenderSurface {
    codes: Vec<RenderedCode>,
}

impl RenderSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Codes currently on the surface, in input order.
    pub fn codes(&self) -> &[RenderedCode] {
        &self.codes
    }

    pub fn clear(&mut self) {
        self.codes.clear();
    }

    /// Paint every identifier and wait until all paints have completed.
    ///
    /// Returns once the surface holds one painted code per identifier, in
    /// input order. The first render error in input order is returned and
    /// the surface is left empty.
    pub async fn mount(
        &mut self,
        identifiers: &[Identifier],
        opts: &RenderOptions,
        progress: Option<&ProgressCallback>,
    ) -> Result<(), LabelError> {
        self.clear();
        let start = Instant::now();
        let total = identifiers.len();

        // Placeholders first: the surface has N slots before any paint lands.
        self.codes = identifiers
            .iter()
            .enumerate()
            .map(|(i, id)| RenderedCode::unpainted(i, id.clone()))
            .collect();

        let paints = identifiers.iter().enumerate().map(|(index, id)| {
            let id = id.clone();
            let opts = opts.clone();
            let handle = tokio::task::spawn_blocking(move || {
                if id.is_empty() {
                    return Err(LabelError::InvalidIdentifier { index });
                }
                render_code(&id, &opts)
            });
            async move {
                let result = handle
                    .await
                    .map_err(|e| LabelError::Internal(format!("Render task panicked: {e}")))
                    .and_then(|r| r);
                if let (Ok(_), Some(cb)) = (&result, progress) {
                    cb.on_code_painted(index, total);
                }
                result
            }
        });

        let painted = join_all(paints).await;

        for (slot, result) in self.codes.iter_mut().zip(painted) {
            match result {
                Ok(surface) => slot.surface = Some(surface),
                Err(e) => {
                    self.clear();
                    return Err(e);
                }
            }
        }

        debug!(
            "Painted {} codes in {}ms",
            total,
            start.elapsed().as_millis()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> RenderOptions {
        RenderOptions::default()
    }

    #[test]
    fn renders_fixed_size_surface() {
        let img = render_code(&Identifier::from("BOX-001"), &opts()).unwrap();
        assert_eq!(img.dimensions(), (300, 300));
        // Quiet zone: the outer border stays light.
        assert!((0..300).all(|x| img.get_pixel(x, 0) == &LIGHT));
        assert!(img.pixels().any(|p| p == &DARK));
    }

    #[test]
    fn rendering_is_deterministic() {
        let a = render_code(&Identifier::from("BOX-001"), &opts()).unwrap();
        let b = render_code(&Identifier::from("BOX-001"), &opts()).unwrap();
        let c = render_code(&Identifier::from("BOX-002"), &opts()).unwrap();
        assert_eq!(a.as_raw(), b.as_raw());
        assert_ne!(a.as_raw(), c.as_raw());
    }

    #[test]
    fn prefix_changes_the_code() {
        let bare = render_code(&Identifier::from("42"), &opts()).unwrap();
        let prefixed = render_code(
            &Identifier::from("42"),
            &RenderOptions {
                payload_prefix: Some("https://example.org/qr/".into()),
                ..opts()
            },
        )
        .unwrap();
        assert_ne!(bare.as_raw(), prefixed.as_raw());
    }

    #[test]
    fn surface_too_small_is_an_error() {
        let long = Identifier::new("x".repeat(800));
        let err = render_code(
            &long,
            &RenderOptions {
                size_px: 64,
                ..opts()
            },
        )
        .unwrap_err();
        assert!(matches!(err, LabelError::RenderFailed { .. }), "got: {err}");
    }

    #[test]
    fn payload_too_long_is_an_error() {
        let huge = Identifier::new("x".repeat(5000));
        assert!(matches!(
            render_code(&huge, &opts()),
            Err(LabelError::RenderFailed { .. })
        ));
    }

    #[test]
    fn unpainted_code_reports_not_painted() {
        let code = RenderedCode::unpainted(0, Identifier::from("a"));
        assert!(!code.is_painted());
        let code = RenderedCode::painted(0, Identifier::from("a"), GrayImage::new(0, 0));
        assert!(!code.is_painted());
    }

    #[tokio::test]
    async fn mount_keeps_input_order() {
        let ids: Vec<Identifier> = ["c", "a", "b"].into_iter().map(Identifier::from).collect();
        let mut surface = RenderSurface::new();
        surface.mount(&ids, &opts(), None).await.unwrap();

        let codes = surface.codes();
        assert_eq!(codes.len(), 3);
        for (i, code) in codes.iter().enumerate() {
            assert_eq!(code.index, i);
            assert_eq!(code.identifier, ids[i]);
            assert!(code.is_painted());
            let expected = render_code(&ids[i], &opts()).unwrap();
            assert_eq!(code.surface().unwrap().as_raw(), expected.as_raw());
        }
    }

    #[test]
    fn empty_identifier_is_never_drawn() {
        let err = render_code(&Identifier::from(""), &opts()).unwrap_err();
        assert!(matches!(err, LabelError::RenderFailed { ref detail, .. } if detail == "identifier is empty"));

        let prefixed = RenderOptions {
            payload_prefix: Some("https://example.org/box/".into()),
            ..opts()
        };
        assert!(render_code(&Identifier::from(""), &prefixed).is_err());
    }

    #[tokio::test]
    async fn mount_rejects_empty_identifier() {
        let ids = vec![Identifier::from("a"), Identifier::from("")];
        let mut surface = RenderSurface::new();
        let err = surface.mount(&ids, &opts(), None).await.unwrap_err();
        assert!(matches!(err, LabelError::InvalidIdentifier { index: 1 }));
        assert!(surface.codes().is_empty());
    }
}
