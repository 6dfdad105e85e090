//! Configuration types for label generation.
//!
//! All generation behaviour is controlled through [`LabelConfig`], built via
//! its [`LabelConfigBuilder`]. One struct holds every knob so a config can be
//! shared between the one-shot API and a long-lived
//! [`crate::controller::LabelPipeline`], and so two runs can be diffed.

use crate::captions::{CaptionSource, PlaceholderCaptions};
use crate::error::LabelError;
use crate::identifier::Identifier;
use crate::pipeline::capture::{EncodedImage, Rasterizer};
use crate::pipeline::render::RenderOptions;
use crate::progress::ProgressCallback;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Configuration for label generation.
///
/// Built via [`LabelConfig::builder()`] or using [`LabelConfig::default()`].
///
/// # Example
/// ```rust
/// use qr_labels::{ArtifactName, ErrorCorrection, LabelConfig};
///
/// let config = LabelConfig::builder()
///     .code_size(300)
///     .error_correction(ErrorCorrection::Quartile)
///     .payload_prefix("https://app.example.org/qr/")
///     .file_name(ArtifactName::Fixed("labels.pdf".into()))
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct LabelConfig {
    /// Edge length of the rendered code surface in pixels. Range: 64–2000. Default: 300.
    ///
    /// The code is drawn with whole-pixel modules, so the matrix plus quiet
    /// zone must fit at least once; long payloads need larger surfaces.
    pub code_size: u32,

    /// Light border around the matrix, in modules. Range: 0–16. Default: 4.
    ///
    /// The QR standard asks for 4; scanners struggle below 2 when the label
    /// is printed next to other artwork.
    pub quiet_zone: u32,

    /// Error-correction level of the matrix code. Default: [`ErrorCorrection::Medium`].
    pub error_correction: ErrorCorrection,

    /// Prefix prepended to each identifier before encoding, e.g. a URL.
    pub payload_prefix: Option<String>,

    /// Logo printed on the lower half of every page. When `None` an empty
    /// frame marks the logo slot.
    pub logo: Option<EncodedImage>,

    /// Caption text for each page. Default: [`PlaceholderCaptions`].
    pub captions: Arc<dyn CaptionSource>,

    /// Suggested file name of the generated document. Default: [`ArtifactName::FromBatch`].
    pub file_name: ArtifactName,

    /// Title stored in the PDF metadata. Default: "Box labels".
    pub document_title: String,

    /// Rasterizer override. Default: PNG data-URI rasterizer.
    pub rasterizer: Option<Arc<dyn Rasterizer>>,

    /// Optional progress callback, invoked as each cycle advances.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            code_size: 300,
            quiet_zone: 4,
            error_correction: ErrorCorrection::default(),
            payload_prefix: None,
            logo: None,
            captions: Arc::new(PlaceholderCaptions),
            file_name: ArtifactName::default(),
            document_title: "Box labels".to_string(),
            rasterizer: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for LabelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabelConfig")
            .field("code_size", &self.code_size)
            .field("quiet_zone", &self.quiet_zone)
            .field("error_correction", &self.error_correction)
            .field("payload_prefix", &self.payload_prefix)
            .field("logo", &self.logo.as_ref().map(|l| l.mime_type().to_string()))
            .field("captions", &"<dyn CaptionSource>")
            .field("file_name", &self.file_name)
            .field("document_title", &self.document_title)
            .field("rasterizer", &self.rasterizer.as_ref().map(|_| "<dyn Rasterizer>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn GenerationProgressCallback>"),
            )
            .finish()
    }
}

impl LabelConfig {
    /// Create a new builder for `LabelConfig`.
    pub fn builder() -> LabelConfigBuilder {
        LabelConfigBuilder {
            config: Self::default(),
        }
    }

    /// Renderer settings derived from this config.
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            size_px: self.code_size,
            quiet_zone: self.quiet_zone,
            error_correction: self.error_correction,
            payload_prefix: self.payload_prefix.clone(),
        }
    }
}

/// Builder for [`LabelConfig`].
pub struct LabelConfigBuilder {
    config: LabelConfig,
}

impl fmt::Debug for LabelConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabelConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl LabelConfigBuilder {
    pub fn code_size(mut self, px: u32) -> Self {
        self.config.code_size = px;
        self
    }

    pub fn quiet_zone(mut self, modules: u32) -> Self {
        self.config.quiet_zone = modules;
        self
    }

    pub fn error_correction(mut self, level: ErrorCorrection) -> Self {
        self.config.error_correction = level;
        self
    }

    pub fn payload_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.payload_prefix = Some(prefix.into());
        self
    }

    pub fn logo(mut self, logo: EncodedImage) -> Self {
        self.config.logo = Some(logo);
        self
    }

    pub fn captions(mut self, source: Arc<dyn CaptionSource>) -> Self {
        self.config.captions = source;
        self
    }

    pub fn file_name(mut self, name: ArtifactName) -> Self {
        self.config.file_name = name;
        self
    }

    pub fn document_title(mut self, title: impl Into<String>) -> Self {
        self.config.document_title = title.into();
        self
    }

    pub fn rasterizer(mut self, rasterizer: Arc<dyn Rasterizer>) -> Self {
        self.config.rasterizer = Some(rasterizer);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<LabelConfig, LabelError> {
        let c = &self.config;
        if !(64..=2000).contains(&c.code_size) {
            return Err(LabelError::InvalidConfig(format!(
                "Code size must be 64–2000 px, got {}",
                c.code_size
            )));
        }
        if c.quiet_zone > 16 {
            return Err(LabelError::InvalidConfig(format!(
                "Quiet zone must be 0–16 modules, got {}",
                c.quiet_zone
            )));
        }
        if let ArtifactName::Fixed(ref name) = c.file_name {
            if sanitize_file_name(name).is_empty() {
                return Err(LabelError::InvalidConfig(format!(
                    "File name '{name}' has no usable characters"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Error-correction level of the matrix code.
///
/// Higher levels survive more damage (torn or dirty labels) at the cost of a
/// denser matrix. Box labels live in warehouses, so anything below Medium
/// is rarely worth it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ErrorCorrection {
    /// ~7 % recovery.
    Low,
    /// ~15 % recovery (default).
    #[default]
    Medium,
    /// ~25 % recovery.
    Quartile,
    /// ~30 % recovery.
    High,
}

impl From<ErrorCorrection> for qrcode::EcLevel {
    fn from(level: ErrorCorrection) -> Self {
        match level {
            ErrorCorrection::Low => qrcode::EcLevel::L,
            ErrorCorrection::Medium => qrcode::EcLevel::M,
            ErrorCorrection::Quartile => qrcode::EcLevel::Q,
            ErrorCorrection::High => qrcode::EcLevel::H,
        }
    }
}

/// How the generated document's suggested file name is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArtifactName {
    /// Always use this name (sanitised; `.pdf` appended when missing).
    Fixed(String),
    /// Derive from the batch: `labels-<first>[-to-<last>]-<count>.pdf`. (default)
    #[default]
    FromBatch,
}

impl ArtifactName {
    /// Resolve the file name for a batch of identifiers.
    pub fn resolve(&self, identifiers: &[Identifier]) -> String {
        let stem = match self {
            ArtifactName::Fixed(name) => {
                let clean = sanitize_file_name(name);
                return if clean.to_ascii_lowercase().ends_with(".pdf") {
                    clean
                } else {
                    format!("{clean}.pdf")
                };
            }
            ArtifactName::FromBatch => match identifiers {
                [] => "labels-empty".to_string(),
                [only] => format!("labels-{}-1", sanitize_file_name(only.as_str())),
                [first, .., last] => format!(
                    "labels-{}-to-{}-{}",
                    sanitize_file_name(first.as_str()),
                    sanitize_file_name(last.as_str()),
                    identifiers.len()
                ),
            },
        };
        format!("{stem}.pdf")
    }
}

static UNSAFE_FILE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").unwrap());

/// Replace every run of characters outside `[A-Za-z0-9._-]` with `-`.
pub fn sanitize_file_name(name: &str) -> String {
    UNSAFE_FILE_CHARS
        .replace_all(name, "-")
        .trim_matches(|c| c == '-' || c == '.')
        .to_string()
}
