//! Long-lived pipeline controller with an observable status.
//!
//! [`LabelPipeline`] is the stateful half of the crate. A view hands it the
//! current identifier list whenever that list changes. The pipeline runs one
//! generation cycle per change and publishes a [`PipelineStatus`] that the
//! view renders as a spinner, a download link, or an error message.
//!
//! ## State machine
//!
//! ```text
//!            set_identifiers
//!   Idle ─────────────────────▶ Pending ──┬──▶ Ready(artifact)
//!                                 ▲       └──▶ Error(reason)
//!                                 │                 │
//!                                 └── list changed ─┘
//! ```
//!
//! ## Late arrivals
//!
//! Every cycle carries the generation number it was started with. A cycle
//! may only publish while that number is still current, and the check happens
//! inside the status channel's write lock, so a slow cycle finishing after a
//! newer list was supplied can never overwrite the newer outcome. Whatever
//! artifact the stale cycle produced is released on the spot.
//!
//! ## Resources
//!
//! The render surface is shared by all cycles of one pipeline and guarded by
//! an async mutex held from mounting until the last capture. Generated
//! documents are owned by the pipeline's [`ArtifactStore`]; the previous
//! artifact is released whenever a new cycle starts, and everything is
//! released when the pipeline is dropped.

use crate::artifact::{resolve_destination, write_atomic, ArtifactRef, ArtifactStore};
use crate::config::LabelConfig;
use crate::error::{FailureReason, LabelError};
use crate::generate::run_cycle;
use crate::identifier::Identifier;
use crate::pipeline::render::RenderSurface;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, MutexGuard};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

/// Externally observable state of a [`LabelPipeline`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineStatus {
    /// No identifier list has been supplied yet.
    Idle,
    /// A cycle is running.
    Pending { cycle: u64 },
    /// The latest cycle produced a document.
    Ready(ArtifactRef),
    /// The latest cycle failed; no artifact is exposed.
    Error(FailureReason),
}

impl PipelineStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, PipelineStatus::Pending { .. })
    }

    pub fn artifact(&self) -> Option<&ArtifactRef> {
        match self {
            PipelineStatus::Ready(a) => Some(a),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            PipelineStatus::Error(reason) => Some(reason),
            _ => None,
        }
    }
}

struct Shared {
    config: LabelConfig,
    generation: AtomicU64,
    status: watch::Sender<PipelineStatus>,
    surface: Mutex<RenderSurface>,
    artifacts: std::sync::Mutex<ArtifactStore>,
}

impl Shared {
    fn is_current(&self, cycle: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == cycle
    }

    fn artifacts(&self) -> MutexGuard<'_, ArtifactStore> {
        self.artifacts.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn discard(&self, cycle: u64) {
        warn!("Cycle {} superseded; result discarded", cycle);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_cycle_discarded(cycle);
        }
    }

    /// Publish a cycle's outcome if the cycle is still the current one.
    fn publish(&self, cycle: u64, outcome: PipelineStatus) {
        let artifact_id = outcome.artifact().map(|a| a.id);
        let event = outcome.clone();

        let published = self.status.send_if_modified(|status| {
            if !self.is_current(cycle) {
                return false;
            }
            *status = outcome;
            true
        });

        if !published {
            if let Some(id) = artifact_id {
                self.artifacts().release(id);
            }
            return self.discard(cycle);
        }

        let cb = self.config.progress_callback.as_ref();

        match event {
            PipelineStatus::Ready(a) => {
                info!("Cycle {} ready: {} ({} pages)", cycle, a.file_name, a.page_count);
                if let Some(cb) = cb {
                    cb.on_cycle_complete(cycle, a.page_count, a.byte_len);
                }
            }
            PipelineStatus::Error(reason) => {
                warn!("Cycle {} failed: {}", cycle, reason);
                if let Some(cb) = cb {
                    cb.on_cycle_error(cycle, &reason.message);
                }
            }
            PipelineStatus::Idle | PipelineStatus::Pending { .. } => {}
        }
    }
}

/// Stateful label generator driven by a changing identifier list.
///
/// Must be used from within a Tokio runtime: every cycle is a spawned task.
///
/// # Example
/// ```rust,no_run
/// use qr_labels::{identifiers, LabelConfig, LabelPipeline, PipelineStatus};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut pipeline = LabelPipeline::new(LabelConfig::default())?;
/// pipeline.set_identifiers(identifiers(["BOX-001", "BOX-002"]));
///
/// match pipeline.wait_settled().await {
///     PipelineStatus::Ready(artifact) => println!("download {}", artifact.file_name),
///     PipelineStatus::Error(reason) => eprintln!("{reason}"),
///     _ => unreachable!(),
/// }
/// # Ok(())
/// # }
/// ```
pub struct LabelPipeline {
    shared: Arc<Shared>,
    identifiers: Vec<Identifier>,
    cycles: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for LabelPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelPipeline")
            .field("identifiers", &self.identifiers)
            .field("cycle", &self.current_cycle())
            .field("status", &*self.shared.status.borrow())
            .field("in_flight", &self.cycles.len())
            .finish()
    }
}

impl LabelPipeline {
    pub fn new(config: LabelConfig) -> Result<Self, LabelError> {
        let (status, _) = watch::channel(PipelineStatus::Idle);
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                generation: AtomicU64::new(0),
                status,
                surface: Mutex::new(RenderSurface::new()),
                artifacts: std::sync::Mutex::new(ArtifactStore::new()?),
            }),
            identifiers: Vec::new(),
            cycles: Vec::new(),
        })
    }

    /// Snapshot of the current status.
    pub fn status(&self) -> PipelineStatus {
        self.shared.status.borrow().clone()
    }

    /// Receiver that observes every status change.
    pub fn subscribe(&self) -> watch::Receiver<PipelineStatus> {
        self.shared.status.subscribe()
    }

    /// Status changes as a `Stream`, starting with the current value.
    pub fn status_stream(&self) -> WatchStream<PipelineStatus> {
        WatchStream::new(self.subscribe())
    }

    pub fn identifiers(&self) -> &[Identifier] {
        &self.identifiers
    }

    /// Generation number of the most recently started cycle (0 before any).
    pub fn current_cycle(&self) -> u64 {
        self.shared.generation.load(Ordering::SeqCst)
    }

    /// Supply a new identifier list.
    ///
    /// Starts a new cycle and returns `true`, unless the list equals the
    /// current one and a cycle has already run for it.
    pub fn set_identifiers(&mut self, identifiers: Vec<Identifier>) -> bool {
        let started = self.current_cycle() > 0;
        if started && identifiers == self.identifiers {
            debug!("Identifier list unchanged; keeping current status");
            return false;
        }
        self.identifiers = identifiers;
        self.start_cycle();
        true
    }

    /// Start a new cycle for the current list. Returns its generation number.
    pub fn regenerate(&mut self) -> u64 {
        self.start_cycle()
    }

    fn start_cycle(&mut self) -> u64 {
        self.cycles.retain(|h| !h.is_finished());

        let shared = Arc::clone(&self.shared);
        let mut cycle = 0;
        // Held under the status lock: no older cycle can publish in between.
        shared.status.send_modify(|status| {
            cycle = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
            shared.artifacts().release_all();
            *status = PipelineStatus::Pending { cycle };
        });
        debug!("Cycle {} started for {} identifiers", cycle, self.identifiers.len());

        let identifiers = self.identifiers.clone();
        let handle = tokio::spawn(async move {
            let current = || shared.is_current(cycle);
            let outcome = match run_cycle(cycle, &identifiers, &shared.config, &shared.surface, current).await {
                Ok(Some(out)) => {
                    let file_name = shared.config.file_name.resolve(&identifiers);
                    let store = Arc::clone(&shared);
                    let stored = tokio::task::spawn_blocking(move || {
                        if !store.is_current(cycle) {
                            return Ok(None);
                        }
                        store
                            .artifacts()
                            .store(cycle, &file_name, out.stats.page_count, &out.pdf)
                            .map(Some)
                    })
                    .await
                    .map_err(|e| LabelError::Internal(format!("Artifact task panicked: {e}")))
                    .and_then(|r| r);

                    match stored {
                        Ok(Some(artifact)) => PipelineStatus::Ready(artifact),
                        Ok(None) => return shared.discard(cycle),
                        Err(e) => PipelineStatus::Error(FailureReason::from(&e)),
                    }
                }
                Ok(None) => return shared.discard(cycle),
                Err(e) => PipelineStatus::Error(FailureReason::from(&e)),
            };
            shared.publish(cycle, outcome);
        });
        self.cycles.push(handle);
        cycle
    }

    /// Wait for the next status that is not `Pending`.
    pub async fn wait_settled(&self) -> PipelineStatus {
        let mut rx = self.subscribe();
        let settled = match rx.wait_for(|s| !s.is_pending()).await {
            Ok(status) => status.clone(),
            Err(_) => self.status(),
        };
        settled
    }

    /// Wait until every cycle started so far, stale ones included, has ended.
    pub async fn idle(&mut self) {
        for handle in self.cycles.drain(..) {
            if let Err(e) = handle.await {
                warn!("Cycle task ended abnormally: {}", e);
            }
        }
    }

    /// Number of artifacts currently held.
    pub fn live_artifacts(&self) -> usize {
        self.shared.artifacts().live_count()
    }

    /// Read the bytes of a live artifact.
    pub fn read_artifact(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, LabelError> {
        self.shared.artifacts().read(artifact)
    }

    /// Copy a live artifact to `dest` (a file path, or a directory to place
    /// it in under its suggested name). Returns the written path.
    pub async fn save_artifact(
        &self,
        artifact: &ArtifactRef,
        dest: impl AsRef<Path>,
    ) -> Result<PathBuf, LabelError> {
        let bytes = self.read_artifact(artifact)?;
        let path = resolve_destination(dest.as_ref(), &artifact.file_name).await;
        write_atomic(&path, &bytes).await?;
        Ok(path)
    }

    /// Tear down: cancel in-flight cycles and release every artifact.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for LabelPipeline {
    fn drop(&mut self) {
        self.shared.status.send_modify(|status| {
            self.shared.generation.fetch_add(1, Ordering::SeqCst);
            *status = PipelineStatus::Idle;
        });
        for handle in self.cycles.drain(..) {
            handle.abort();
        }
        self.shared.artifacts().release_all();
        debug!("Pipeline torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::identifier::identifiers;

    #[tokio::test]
    async fn starts_idle() {
        let pipeline = LabelPipeline::new(LabelConfig::default()).unwrap();
        assert_eq!(pipeline.status(), PipelineStatus::Idle);
        assert_eq!(pipeline.current_cycle(), 0);
        assert_eq!(pipeline.wait_settled().await, PipelineStatus::Idle);
    }

    #[tokio::test]
    async fn pending_then_ready() {
        let mut pipeline = LabelPipeline::new(LabelConfig::default()).unwrap();
        assert!(pipeline.set_identifiers(identifiers(["a", "b"])));
        assert_eq!(pipeline.status(), PipelineStatus::Pending { cycle: 1 });

        let status = pipeline.wait_settled().await;
        let artifact = status.artifact().expect("ready").clone();
        assert_eq!(artifact.cycle, 1);
        assert_eq!(artifact.page_count, 2);
        assert!(artifact.path.exists());
        assert!(pipeline.read_artifact(&artifact).unwrap().starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn unchanged_list_is_a_no_op() {
        let mut pipeline = LabelPipeline::new(LabelConfig::default()).unwrap();
        pipeline.set_identifiers(identifiers(["a"]));
        pipeline.wait_settled().await;
        assert!(!pipeline.set_identifiers(identifiers(["a"])));
        assert_eq!(pipeline.current_cycle(), 1);
        assert!(pipeline.status().artifact().is_some());
    }

    #[tokio::test]
    async fn regenerate_releases_previous_artifact() {
        let mut pipeline = LabelPipeline::new(LabelConfig::default()).unwrap();
        pipeline.set_identifiers(identifiers(["a"]));
        let first = pipeline.wait_settled().await.artifact().cloned().unwrap();

        assert_eq!(pipeline.regenerate(), 2);
        assert!(!first.path.exists());
        assert!(matches!(
            pipeline.read_artifact(&first),
            Err(LabelError::ArtifactReleased { .. })
        ));

        let second = pipeline.wait_settled().await.artifact().cloned().unwrap();
        assert_eq!(second.cycle, 2);
        assert_eq!(pipeline.live_artifacts(), 1);
    }

    #[tokio::test]
    async fn render_failure_becomes_error_status() {
        let mut pipeline = LabelPipeline::new(LabelConfig::default()).unwrap();
        pipeline.set_identifiers(identifiers(["a", ""]));
        let status = pipeline.wait_settled().await;
        assert_eq!(status.failure().unwrap().kind, FailureKind::Render);
        assert_eq!(pipeline.live_artifacts(), 0);
    }

    #[tokio::test]
    async fn drop_releases_everything() {
        let mut pipeline = LabelPipeline::new(LabelConfig::default()).unwrap();
        let rx = pipeline.subscribe();
        pipeline.set_identifiers(identifiers(["a"]));
        let artifact = pipeline.wait_settled().await.artifact().cloned().unwrap();

        pipeline.shutdown();
        assert!(!artifact.path.exists());
        assert_eq!(*rx.borrow(), PipelineStatus::Idle);
    }

    #[test]
    fn status_serialises_with_state_tag() {
        let json = serde_json::to_string(&PipelineStatus::Pending { cycle: 3 }).unwrap();
        assert_eq!(json, r#"{"state":"pending","cycle":3}"#);
    }
}
