//! One-shot generation entry points.
//!
//! [`generate_labels`] runs a single cycle (paint, capture, assemble) and
//! returns the document. Use [`crate::controller::LabelPipeline`] instead
//! when the identifier list changes over time and observers need a status.

use crate::artifact::resolve_destination;
use crate::config::LabelConfig;
use crate::error::LabelError;
use crate::identifier::Identifier;
use crate::output::{GenerationStats, LabelOutput, PageSummary};
use crate::pipeline::assemble::{assemble, encode_pdf, LabelDocument};
use crate::pipeline::capture::{capture_all, PngRasterizer};
use crate::pipeline::compose::StaticAssets;
use crate::pipeline::render::RenderSurface;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Generate the label document for a batch of identifiers.
///
/// # Errors
/// - [`LabelError::EmptyInput`] for an empty batch
/// - [`LabelError::InvalidIdentifier`] / [`LabelError::RenderFailed`] when a
///   code cannot be drawn
/// - [`LabelError::CaptureFailed`] when a surface cannot be captured
/// - [`LabelError::AssemblyFailed`] when the PDF cannot be built
pub async fn generate_labels(
    identifiers: &[Identifier],
    config: &LabelConfig,
) -> Result<LabelOutput, LabelError> {
    let surface = Mutex::new(RenderSurface::new());
    let result = run_cycle(0, identifiers, config, &surface, || true)
        .await
        .and_then(|done| {
            done.ok_or_else(|| LabelError::Internal("one-shot cycle was superseded".into()))
        });

    if let Some(ref cb) = config.progress_callback {
        match &result {
            Ok(done) => cb.on_cycle_complete(0, done.document.page_count(), done.pdf.len()),
            Err(e) => cb.on_cycle_error(0, &e.to_string()),
        }
    }

    let done = result?;
    Ok(LabelOutput {
        pages: page_summaries(&done.document),
        file_name: config.file_name.resolve(identifiers),
        pdf: done.pdf,
        stats: done.stats,
    })
}

/// Generate the document and write it to `output_path`.
///
/// When `output_path` is an existing directory or ends with a path separator
/// the suggested file name is appended. Uses atomic write (temp file + rename). Returns the final path.
pub async fn generate_to_file(
    identifiers: &[Identifier],
    output_path: impl AsRef<Path>,
    config: &LabelConfig,
) -> Result<(PathBuf, GenerationStats), LabelError> {
    let output = generate_labels(identifiers, config).await?;
    let path = resolve_destination(output_path.as_ref(), &output.file_name).await;
    crate::artifact::write_atomic(&path, &output.pdf).await?;
    info!("Wrote {} pages to {}", output.stats.page_count, path.display());
    Ok((path, output.stats))
}

/// Synchronous wrapper around [`generate_labels`].
///
/// Creates a temporary tokio runtime internally.
pub fn generate_sync(
    identifiers: &[Identifier],
    config: &LabelConfig,
) -> Result<LabelOutput, LabelError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| LabelError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(generate_labels(identifiers, config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

pub(crate) struct CycleOutput {
    pub document: LabelDocument,
    pub pdf: Vec<u8>,
    pub stats: GenerationStats,
}

/// Run one full cycle against a shared render surface.
///
/// The surface lock is held from mounting until the last capture, so a
/// concurrent cycle can never repaint codes that are still being captured.
///
/// `is_current` is polled once the surface is acquired and again before
/// encoding. When it reports `false` the cycle stops and returns `Ok(None)`
/// without painting or encoding anything further.
pub(crate) async fn run_cycle<F>(
    cycle: u64,
    identifiers: &[Identifier],
    config: &LabelConfig,
    surface: &Mutex<RenderSurface>,
    is_current: F,
) -> Result<Option<CycleOutput>, LabelError>
where
    F: Fn() -> bool,
{
    let total_start = Instant::now();
    if identifiers.is_empty() {
        return Err(LabelError::EmptyInput);
    }

    // ── Step 1: Paint all codes ──────────────────────────────────────────
    let mut surface = surface.lock().await;
    if !is_current() {
        debug!("Cycle {}: superseded while waiting for the surface", cycle);
        return Ok(None);
    }
    info!("Cycle {}: generating {} labels", cycle, identifiers.len());
    if let Some(ref cb) = config.progress_callback {
        cb.on_cycle_start(cycle, identifiers.len());
    }
    let render_start = Instant::now();
    surface
        .mount(
            identifiers,
            &config.render_options(),
            config.progress_callback.as_ref(),
        )
        .await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;

    // ── Step 2: Capture in input order ───────────────────────────────────
    let capture_start = Instant::now();
    let snapshots = match config.rasterizer {
        Some(ref r) => capture_all(r.as_ref(), surface.codes()),
        None => capture_all(&PngRasterizer, surface.codes()),
    };
    surface.clear();
    drop(surface);
    let snapshots = snapshots?;
    let capture_duration_ms = capture_start.elapsed().as_millis() as u64;
    debug!("Cycle {}: captured {} snapshots", cycle, snapshots.len());
    if let Some(ref cb) = config.progress_callback {
        cb.on_captured(cycle, snapshots.len());
    }

    if snapshots.len() != identifiers.len() {
        return Err(LabelError::AssemblyFailed(format!(
            "captured {} snapshots for {} identifiers",
            snapshots.len(),
            identifiers.len()
        )));
    }

    // ── Step 3: Assemble and encode ──────────────────────────────────────
    let assemble_start = Instant::now();
    let assets = StaticAssets {
        logo: config.logo.clone(),
    };
    let document = assemble(snapshots, &assets, config.captions.as_ref())?;
    if !is_current() {
        debug!("Cycle {}: superseded before encoding", cycle);
        return Ok(None);
    }
    let (document, pdf) = encode_pdf(document, config.document_title.clone()).await?;
    let assemble_duration_ms = assemble_start.elapsed().as_millis() as u64;

    let stats = GenerationStats {
        page_count: document.page_count(),
        byte_len: pdf.len(),
        render_duration_ms,
        capture_duration_ms,
        assemble_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };
    info!(
        "Cycle {}: {} pages, {} bytes, {}ms total",
        cycle, stats.page_count, stats.byte_len, stats.total_duration_ms
    );

    Ok(Some(CycleOutput {
        document,
        pdf,
        stats,
    }))
}

fn page_summaries(document: &LabelDocument) -> Vec<PageSummary> {
    document
        .pages
        .iter()
        .map(|page| PageSummary {
            page_num: page.index + 1,
            identifier: page.identifier.clone(),
            captions: page.texts().into_iter().map(str::to_string).collect(),
        })
        .collect()
}
