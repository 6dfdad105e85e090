//! Integration tests for qr-labels.
//!
//! Everything here runs offline against the public API: generated PDFs are
//! re-opened with `lopdf` and compared against freshly rendered codes.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture

use flate2::read::ZlibDecoder;
use lopdf::{Document, Object};
use qr_labels::pipeline::render::{render_code, RenderOptions};
use qr_labels::{
    generate_labels, identifiers, BoxCaptions, BoxLabelData, CaptionSource, FailureKind,
    GenerationProgressCallback, Identifier, LabelConfig, LabelError, LabelPipeline, PageCaptions,
    PipelineStatus, PlaceholderCaptions, PngRasterizer, RasterSnapshot, Rasterizer, RenderedCode,
};
use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_stream::StreamExt;
use tokio_test::{assert_err, assert_ok};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Records every callback as a short string.
#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
    painted: AtomicUsize,
}

impl Recorder {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

impl GenerationProgressCallback for Recorder {
    fn on_cycle_start(&self, cycle: u64, total: usize) {
        self.events.lock().unwrap().push(format!("start {cycle} {total}"));
    }

    fn on_code_painted(&self, _index: usize, _total: usize) {
        self.painted.fetch_add(1, Ordering::SeqCst);
    }

    fn on_cycle_complete(&self, cycle: u64, pages: usize, _byte_len: usize) {
        self.events.lock().unwrap().push(format!("complete {cycle} {pages}"));
    }

    fn on_cycle_error(&self, cycle: u64, _error: &str) {
        self.events.lock().unwrap().push(format!("error {cycle}"));
    }

    fn on_cycle_discarded(&self, cycle: u64) {
        self.events.lock().unwrap().push(format!("discarded {cycle}"));
    }
}

/// Fails to capture the code at one position.
struct FailAt(usize);

impl Rasterizer for FailAt {
    fn capture(&self, code: &RenderedCode) -> Result<RasterSnapshot, LabelError> {
        if code.index == self.0 {
            return Err(LabelError::CaptureFailed {
                index: code.index,
                identifier: code.identifier.to_string(),
                detail: "simulated capture fault".into(),
            });
        }
        PngRasterizer.capture(code)
    }
}

/// Blocks while composing the page for `SLOW` until the test opens the gate.
struct GatedCaptions {
    entered: Arc<Notify>,
    gate: Mutex<mpsc::Receiver<()>>,
}

impl CaptionSource for GatedCaptions {
    fn captions_for(&self, index: usize, identifier: &Identifier) -> PageCaptions {
        if identifier.as_str() == "SLOW" {
            self.entered.notify_one();
            let _ = self.gate.lock().unwrap().recv_timeout(Duration::from_secs(10));
        }
        PlaceholderCaptions.captions_for(index, identifier)
    }
}

/// Blocks while capturing `SLOW`, holding the render surface, until the test
/// opens the gate.
struct GatedRasterizer {
    entered: Arc<Notify>,
    gate: Mutex<mpsc::Receiver<()>>,
}

impl Rasterizer for GatedRasterizer {
    fn capture(&self, code: &RenderedCode) -> Result<RasterSnapshot, LabelError> {
        if code.identifier.as_str() == "SLOW" {
            self.entered.notify_one();
            let _ = self.gate.lock().unwrap().recv_timeout(Duration::from_secs(10));
        }
        PngRasterizer.capture(code)
    }
}

/// Route library logs to the test harness; `RUST_LOG=qr_labels=debug` shows them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config_with(recorder: &Arc<Recorder>) -> LabelConfig {
    LabelConfig::builder()
        .progress_callback(recorder.clone() as Arc<dyn GenerationProgressCallback>)
        .build()
        .unwrap()
}

/// Raw gray pixels of the `Code` image on every page, in page order.
fn code_images(pdf: &[u8]) -> Vec<Vec<u8>> {
    let doc = Document::load_mem(pdf).expect("valid PDF");
    doc.get_pages()
        .values()
        .map(|&page_id| {
            let page = doc.get_dictionary(page_id).unwrap();
            let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
            let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
            let code_id = xobjects.get(b"Code").unwrap().as_reference().unwrap();
            match doc.get_object(code_id).unwrap() {
                // lopdf refuses to decompress image streams, so inflate by hand.
                Object::Stream(stream) => match stream.dict.get(b"Filter") {
                    Ok(filter) => {
                        assert_eq!(filter.as_name().unwrap(), b"FlateDecode");
                        let mut pixels = Vec::new();
                        ZlibDecoder::new(stream.content.as_slice())
                            .read_to_end(&mut pixels)
                            .expect("code image inflates");
                        pixels
                    }
                    Err(_) => stream.content.clone(),
                },
                other => panic!("Code is not a stream: {other:?}"),
            }
        })
        .collect()
}

/// Decoded content stream of every page, in page order.
fn page_texts(pdf: &[u8]) -> Vec<String> {
    let doc = Document::load_mem(pdf).expect("valid PDF");
    doc.get_pages()
        .values()
        .map(|&page_id| String::from_utf8_lossy(&doc.get_page_content(page_id).unwrap()).into_owned())
        .collect()
}

fn expected_pixels(id: &str) -> Vec<u8> {
    render_code(&Identifier::from(id), &RenderOptions::default())
        .unwrap()
        .into_raw()
}

// ── Scenario A: two identifiers ──────────────────────────────────────────────

#[tokio::test]
async fn two_boxes_produce_two_pages_in_order() {
    init_tracing();
    let recorder = Arc::new(Recorder::default());
    let mut pipeline = LabelPipeline::new(config_with(&recorder)).unwrap();
    assert!(pipeline.set_identifiers(identifiers(["BOX-001", "BOX-002"])));
    assert!(pipeline.status().is_pending());

    let status = pipeline.wait_settled().await;
    let artifact = status.artifact().expect("ready").clone();
    assert_eq!(artifact.page_count, 2);
    assert_eq!(artifact.file_name, "labels-BOX-001-to-BOX-002-2.pdf");

    let pdf = assert_ok!(pipeline.read_artifact(&artifact));
    let texts = page_texts(&pdf);
    assert_eq!(texts.len(), 2);
    assert!(texts[0].contains("Box Number: BOX-001"));
    assert!(texts[1].contains("Box Number: BOX-002"));
    assert!(texts[0].contains("Number of items:"));
    assert!(texts[0].contains("Contents:"));
    assert!(texts[0].contains("Gender:"));
    assert!(texts[0].contains("Size:"));

    pipeline.idle().await;
    assert_eq!(recorder.painted.load(Ordering::SeqCst), 2);
    assert_eq!(recorder.events(), vec!["start 1 2", "complete 1 2"]);
}

// ── Scenario B: empty list ───────────────────────────────────────────────────

#[tokio::test]
async fn empty_list_is_an_error_without_rendering() {
    let recorder = Arc::new(Recorder::default());
    let mut pipeline = LabelPipeline::new(config_with(&recorder)).unwrap();
    pipeline.set_identifiers(vec![]);

    let status = pipeline.wait_settled().await;
    let reason = status.failure().expect("error status");
    assert_eq!(reason.kind, FailureKind::EmptyInput);
    assert!(status.artifact().is_none());
    assert_eq!(recorder.painted.load(Ordering::SeqCst), 0);
    assert_eq!(pipeline.live_artifacts(), 0);
}

// ── Scenario C: capture failure on the second code ───────────────────────────

#[tokio::test]
async fn capture_failure_exposes_no_artifact() {
    let config = LabelConfig::builder()
        .rasterizer(Arc::new(FailAt(1)))
        .build()
        .unwrap();
    let mut pipeline = LabelPipeline::new(config).unwrap();

    // A single-box batch never reaches the faulty position.
    pipeline.set_identifiers(identifiers(["A"]));
    let first = pipeline.wait_settled().await.artifact().cloned().unwrap();

    pipeline.set_identifiers(identifiers(["A", "B"]));
    let status = pipeline.wait_settled().await;
    let reason = status.failure().expect("error status").clone();
    assert_eq!(reason.kind, FailureKind::Capture);
    assert!(reason.message.contains("'B'"), "got: {reason}");

    // No stale Ready survives the error.
    assert!(status.artifact().is_none());
    assert!(!first.path.exists());
    assert_err!(pipeline.read_artifact(&first));
    assert_eq!(pipeline.live_artifacts(), 0);
}

// ── Order preservation ───────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn page_k_carries_the_code_of_identifier_k() {
    let ids = ["zeta", "A", "m-42", "BOX-0001", "0"];
    let out = assert_ok!(generate_labels(&identifiers(ids), &LabelConfig::default()).await);

    let images = code_images(&out.pdf);
    assert_eq!(images.len(), ids.len());
    for (k, id) in ids.iter().enumerate() {
        assert_eq!(images[k], expected_pixels(id), "page {} is not '{}'", k + 1, id);
    }
}

// ── Idempotence ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn identical_input_gives_identical_bytes() {
    let ids = identifiers(["BOX-001", "BOX-002", "BOX-003"]);
    let a = generate_labels(&ids, &LabelConfig::default()).await.unwrap();
    let b = generate_labels(&ids, &LabelConfig::default()).await.unwrap();
    assert_eq!(a.pdf, b.pdf);

    let mut pipeline = LabelPipeline::new(LabelConfig::default()).unwrap();
    pipeline.set_identifiers(ids.clone());
    let first = pipeline.wait_settled().await.artifact().cloned().unwrap();
    let first_bytes = pipeline.read_artifact(&first).unwrap();

    pipeline.regenerate();
    let second = pipeline.wait_settled().await.artifact().cloned().unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(pipeline.read_artifact(&second).unwrap(), first_bytes);
    assert_eq!(first_bytes, a.pdf);
}

// ── Stale-result suppression ─────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn late_cycle_never_overwrites_newer_status() {
    init_tracing();
    let recorder = Arc::new(Recorder::default());
    let entered = Arc::new(Notify::new());
    let (open_gate, gate) = mpsc::channel();
    let config = LabelConfig::builder()
        .captions(Arc::new(GatedCaptions {
            entered: entered.clone(),
            gate: Mutex::new(gate),
        }))
        .progress_callback(recorder.clone() as Arc<dyn GenerationProgressCallback>)
        .build()
        .unwrap();

    let mut pipeline = LabelPipeline::new(config).unwrap();
    let mut observed = pipeline.status_stream();

    pipeline.set_identifiers(identifiers(["SLOW"]));
    // Cycle 1 has captured and is now stuck composing its page.
    entered.notified().await;

    pipeline.set_identifiers(identifiers(["FAST-1", "FAST-2"]));
    let status = pipeline.wait_settled().await;
    let ready = status.artifact().expect("newer cycle ready").clone();
    assert_eq!(ready.cycle, 2);
    assert_eq!(ready.page_count, 2);

    open_gate.send(()).unwrap();
    pipeline.idle().await;

    assert_eq!(pipeline.status(), PipelineStatus::Ready(ready.clone()));
    assert_eq!(pipeline.live_artifacts(), 1);
    assert_eq!(recorder.count("discarded 1"), 1);
    assert_eq!(recorder.count("complete 1"), 0);
    assert_eq!(recorder.count("complete 2"), 1);

    // Nothing produced by cycle 1 was ever published.
    pipeline.shutdown();
    while let Some(seen) = observed.next().await {
        if let PipelineStatus::Ready(a) = seen {
            assert_eq!(a.cycle, 2);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn queued_stale_cycles_never_render() {
    init_tracing();
    let recorder = Arc::new(Recorder::default());
    let entered = Arc::new(Notify::new());
    let (open_gate, gate) = mpsc::channel();
    let config = LabelConfig::builder()
        .rasterizer(Arc::new(GatedRasterizer {
            entered: entered.clone(),
            gate: Mutex::new(gate),
        }))
        .progress_callback(recorder.clone() as Arc<dyn GenerationProgressCallback>)
        .build()
        .unwrap();

    let mut pipeline = LabelPipeline::new(config).unwrap();
    pipeline.set_identifiers(identifiers(["SLOW"]));
    // Cycle 1 holds the surface while its capture is stuck.
    entered.notified().await;

    // Cycles 2 to 4 queue behind it and are superseded before they get the surface.
    pipeline.set_identifiers(identifiers(["A1"]));
    pipeline.set_identifiers(identifiers(["A2"]));
    pipeline.set_identifiers(identifiers(["A3"]));
    pipeline.set_identifiers(identifiers(["B1", "B2", "B3"]));
    assert_eq!(pipeline.current_cycle(), 5);

    open_gate.send(()).unwrap();
    let status = pipeline.wait_settled().await;
    let ready = status.artifact().expect("last cycle ready").clone();
    assert_eq!(ready.cycle, 5);
    assert_eq!(ready.page_count, 3);
    pipeline.idle().await;

    assert_eq!(recorder.count("start"), 2);
    assert_eq!(recorder.count("start 1 1"), 1);
    assert_eq!(recorder.count("start 5 3"), 1);
    assert_eq!(recorder.painted.load(Ordering::SeqCst), 1 + 3);
    for cycle in 1..=4 {
        assert_eq!(recorder.count(&format!("discarded {cycle}")), 1, "cycle {cycle}");
    }
    assert_eq!(recorder.count("complete"), 1);
    assert_eq!(pipeline.live_artifacts(), 1);
}

#[tokio::test]
async fn unchanged_list_keeps_the_artifact() {
    let recorder = Arc::new(Recorder::default());
    let mut pipeline = LabelPipeline::new(config_with(&recorder)).unwrap();
    pipeline.set_identifiers(identifiers(["A", "B"]));
    let artifact = pipeline.wait_settled().await.artifact().cloned().unwrap();

    assert!(!pipeline.set_identifiers(identifiers(["A", "B"])));
    assert!(artifact.path.exists());
    assert_eq!(recorder.count("start"), 1);

    // Order is part of the list.
    assert!(pipeline.set_identifiers(identifiers(["B", "A"])));
    assert!(!artifact.path.exists());
    let reordered = pipeline.wait_settled().await.artifact().cloned().unwrap();
    assert_eq!(reordered.file_name, "labels-B-to-A-2.pdf");
}

// ── Teardown ─────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_mid_cycle_publishes_nothing() {
    let recorder = Arc::new(Recorder::default());
    let entered = Arc::new(Notify::new());
    let (open_gate, gate) = mpsc::channel();
    let config = LabelConfig::builder()
        .captions(Arc::new(GatedCaptions {
            entered: entered.clone(),
            gate: Mutex::new(gate),
        }))
        .progress_callback(recorder.clone() as Arc<dyn GenerationProgressCallback>)
        .build()
        .unwrap();

    let mut pipeline = LabelPipeline::new(config).unwrap();
    let rx = pipeline.subscribe();
    pipeline.set_identifiers(identifiers(["SLOW"]));
    entered.notified().await;

    pipeline.shutdown();
    assert_eq!(*rx.borrow(), PipelineStatus::Idle);

    open_gate.send(()).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(recorder.count("complete"), 0);
    assert_eq!(*rx.borrow(), PipelineStatus::Idle);
}

#[tokio::test]
async fn saved_copy_outlives_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let mut captions = BoxCaptions::default();
    captions.insert(
        "BOX-007",
        BoxLabelData {
            number_of_items: Some(12),
            contents: Some("Winter jackets".into()),
            gender: Some("Women".into()),
            size: Some("M".into()),
        },
    );
    let config = LabelConfig::builder()
        .captions(Arc::new(captions))
        .build()
        .unwrap();

    let mut pipeline = LabelPipeline::new(config).unwrap();
    pipeline.set_identifiers(identifiers(["BOX-007"]));
    let artifact = pipeline.wait_settled().await.artifact().cloned().unwrap();
    let saved = assert_ok!(pipeline.save_artifact(&artifact, dir.path()).await);
    assert_eq!(saved, dir.path().join("labels-BOX-007-1.pdf"));

    pipeline.shutdown();
    assert!(!artifact.path.exists());

    let pdf = std::fs::read(&saved).unwrap();
    let text = &page_texts(&pdf)[0];
    assert!(text.contains("Number of items: 12"));
    assert!(text.contains("Contents: Winter jackets"));
    assert!(text.contains("Gender: Women"));
    assert!(text.contains("Size: M"));
}
