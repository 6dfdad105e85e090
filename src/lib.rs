//! # qr-labels
//!
//! Turn a list of box identifiers into a printable, multi-page PDF of QR
//! labels: one A4 page per box, with its QR code, a logo and caption fields.
//!
//! ## Pipeline Overview
//!
//! ```text
//! identifiers
//!  │
//!  ├─ 1. Render    paint one QR code per identifier (spawn_blocking, joined)
//!  ├─ 2. Capture   PNG → base64 data URI, strictly in input order
//!  ├─ 3. Compose   A4 layout: captions, code, logo
//!  ├─ 4. Assemble  one page per snapshot → PDF bytes
//!  └─ 5. Publish   Pending → Ready(artifact) | Error(reason)
//! ```
//!
//! Steps 1–4 are stateless and available as a one-shot call
//! ([`generate_labels`]). Step 5 belongs to the long-lived
//! [`LabelPipeline`], which reruns the cycle whenever the identifier list
//! changes and guarantees that a slow, superseded cycle never overwrites the
//! status of a newer one.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use qr_labels::{generate_to_file, identifiers, LabelConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = LabelConfig::default();
//!     let ids = identifiers(["BOX-001", "BOX-002"]);
//!     let (path, stats) = generate_to_file(&ids, "labels.pdf", &config).await?;
//!     eprintln!("{} pages → {}", stats.page_count, path.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `qrlabels` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! qr-labels = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod artifact;
pub mod captions;
pub mod config;
pub mod controller;
pub mod error;
pub mod generate;
pub mod identifier;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use artifact::ArtifactRef;
pub use captions::{BoxCaptions, BoxLabelData, CaptionSource, PageCaptions, PlaceholderCaptions};
pub use config::{ArtifactName, ErrorCorrection, LabelConfig, LabelConfigBuilder};
pub use controller::{LabelPipeline, PipelineStatus};
pub use error::{FailureKind, FailureReason, LabelError};
pub use generate::{generate_labels, generate_sync, generate_to_file};
pub use identifier::{identifiers, Identifier};
pub use output::{GenerationStats, LabelOutput, PageSummary};
pub use pipeline::capture::{EncodedImage, PngRasterizer, RasterSnapshot, Rasterizer};
pub use pipeline::render::RenderedCode;
pub use progress::{GenerationProgressCallback, NoopProgressCallback, ProgressCallback};
