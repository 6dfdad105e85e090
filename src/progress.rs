//! Progress-callback trait for generation-cycle events.
//!
//! Inject an [`Arc<dyn GenerationProgressCallback>`] via
//! [`crate::config::LabelConfigBuilder::progress_callback`] to receive events
//! as each cycle paints, captures and assembles its labels.
//!
//! Callbacks are the least-invasive integration point: a host can forward
//! events to a channel, a log, or a terminal spinner without the library
//! knowing how it communicates. Stale cycles (superseded by a newer
//! identifier list) report [`GenerationProgressCallback::on_cycle_discarded`]
//! instead of completing.
//!
//! # Example
//!
//! ```rust
//! use qr_labels::{GenerationProgressCallback, LabelConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     painted: AtomicUsize,
//! }
//!
//! impl GenerationProgressCallback for CountingCallback {
//!     fn on_code_painted(&self, index: usize, total: usize) {
//!         let done = self.painted.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("code {} painted ({}/{})", index + 1, done, total);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { painted: AtomicUsize::new(0) });
//!
//! let config = LabelConfig::builder()
//!     .progress_callback(counter as Arc<dyn GenerationProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as a cycle advances.
///
/// Implementations must be `Send + Sync`: paint notifications arrive from
/// blocking-pool threads in completion order. All methods default to no-ops.
pub trait GenerationProgressCallback: Send + Sync {
    /// Called once when a cycle starts.
    ///
    /// # Arguments
    /// * `cycle`: generation number of the cycle (1 for the first)
    /// * `total`: number of identifiers in the batch
    fn on_cycle_start(&self, cycle: u64, total: usize) {
        let _ = (cycle, total);
    }

    /// Called when one code surface has finished painting.
    ///
    /// `index` is 0-based in input order; arrival order is not guaranteed.
    fn on_code_painted(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// Called after every code of the batch has been captured.
    fn on_captured(&self, cycle: u64, total: usize) {
        let _ = (cycle, total);
    }

    /// Called when the cycle's document is ready.
    ///
    /// # Arguments
    /// * `pages`   : number of label pages
    /// * `byte_len`: size of the encoded document
    fn on_cycle_complete(&self, cycle: u64, pages: usize, byte_len: usize) {
        let _ = (cycle, pages, byte_len);
    }

    /// Called when the cycle failed; `error` is human-readable.
    fn on_cycle_error(&self, cycle: u64, error: &str) {
        let _ = (cycle, error);
    }

    /// Called when a newer cycle superseded this one before it could publish.
    fn on_cycle_discarded(&self, cycle: u64) {
        let _ = cycle;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl GenerationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::LabelConfig`].
pub type ProgressCallback = Arc<dyn GenerationProgressCallback>;
