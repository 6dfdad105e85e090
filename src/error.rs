//! Error types for the qr-labels library.
//!
//! Two shapes reflect two audiences:
//!
//! * [`LabelError`]: returned as `Err(LabelError)` from library calls
//!   (`generate_labels`, the pipeline stages, artifact access). Carries the
//!   full context, including `std::io::Error` sources.
//!
//! * [`FailureReason`]: the cloneable, serialisable summary published by
//!   [`crate::controller::LabelPipeline`] in `PipelineStatus::Error`. A view
//!   only needs the kind (to pick a message style) and the text.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the qr-labels library.
#[derive(Debug, Error)]
pub enum LabelError {
    // ── Render errors ─────────────────────────────────────────────────────
    /// An identifier was empty; a blank code cannot label a box.
    #[error("Identifier #{index} is empty")]
    InvalidIdentifier { index: usize },

    /// The matrix code could not be drawn (payload too long, surface too small).
    #[error("Rendering the code for '{identifier}' failed: {detail}")]
    RenderFailed { identifier: String, detail: String },

    // ── Capture errors ────────────────────────────────────────────────────
    /// Capture was attempted on a surface that never finished painting.
    #[error("Capture failed for code #{index} ('{identifier}'): {detail}")]
    CaptureFailed {
        index: usize,
        identifier: String,
        detail: String,
    },

    // ── Assembly errors ───────────────────────────────────────────────────
    /// Assembly was asked to build a document with no labels.
    #[error("No identifiers supplied; nothing to print")]
    EmptyInput,

    /// Composing pages or encoding the PDF failed.
    #[error("Document assembly failed: {0}")]
    AssemblyFailed(String),

    // ── Artifact errors ───────────────────────────────────────────────────
    /// The artifact handle refers to a document that has been superseded.
    #[error("Artifact #{id} has been released")]
    ArtifactReleased { id: u64 },

    /// Could not write the generated document.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// The logo image could not be read or decoded.
    #[error("Failed to load logo '{path}': {detail}")]
    LogoLoadFailed { path: PathBuf, detail: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (panicked task, runtime failure).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LabelError {
    /// Classify this error for the status surface.
    pub fn kind(&self) -> FailureKind {
        match self {
            LabelError::InvalidIdentifier { .. } | LabelError::RenderFailed { .. } => {
                FailureKind::Render
            }
            LabelError::CaptureFailed { .. } => FailureKind::Capture,
            LabelError::EmptyInput => FailureKind::EmptyInput,
            LabelError::AssemblyFailed(_)
            | LabelError::ArtifactReleased { .. }
            | LabelError::OutputWriteFailed { .. } => FailureKind::Assembly,
            LabelError::LogoLoadFailed { .. } | LabelError::InvalidConfig(_) => FailureKind::Config,
            LabelError::Internal(_) => FailureKind::Internal,
        }
    }
}

/// Coarse failure category shown next to the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Render,
    Capture,
    EmptyInput,
    Assembly,
    Config,
    Internal,
}

/// Human-readable failure published by the pipeline controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&LabelError> for FailureReason {
    fn from(e: &LabelError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}
