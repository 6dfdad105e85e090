//! CLI binary for qr-labels.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `LabelConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use qr_labels::artifact::{resolve_destination, write_atomic};
use qr_labels::{
    generate_labels, generate_to_file, ArtifactName, BoxCaptions, EncodedImage, ErrorCorrection,
    GenerationProgressCallback, Identifier, LabelConfig, LabelPipeline, PipelineStatus,
    ProgressCallback,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

/// Terminal progress bar for a single generation run.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} codes  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        bar.set_style(style);
        bar.set_prefix("Painting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl GenerationProgressCallback for CliProgressCallback {
    fn on_cycle_start(&self, _cycle: u64, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.reset_eta();
    }

    fn on_code_painted(&self, _index: usize, _total: usize) {
        self.bar.inc(1);
    }

    fn on_captured(&self, _cycle: u64, total: usize) {
        self.bar.set_prefix("Assembling");
        self.bar.set_message(format!("{total} pages"));
    }

    fn on_cycle_complete(&self, _cycle: u64, _pages: usize, _byte_len: usize) {
        self.bar.finish_and_clear();
    }

    fn on_cycle_error(&self, _cycle: u64, error: &str) {
        self.bar.abandon_with_message(red(error));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Two labels, written to the current directory
  qrlabels BOX-001 BOX-002

  # Identifiers from a file (one per line, # comments allowed)
  qrlabels --from-file boxes.txt -o labels.pdf

  # Encode a URL instead of the bare identifier
  qrlabels --payload-prefix https://app.example.org/qr/ BOX-001

  # Real logo and caption data
  qrlabels --logo logo.png --captions boxes.json BOX-001 BOX-002

  # Keep running; every stdin line is a new batch
  printf 'A,B\nA,B,C\n' | qrlabels --watch --json -o out/

CAPTIONS FILE:
  {"BOX-001": {"number_of_items": 12, "contents": "Winter jackets",
               "gender": "Women", "size": "M"}}

ENVIRONMENT VARIABLES:
  Every flag has a QRLABELS_* fallback, e.g. QRLABELS_LOGO=logo.png.
  RUST_LOG overrides the log filter.
"#;

/// Generate printable QR box labels as a PDF.
#[derive(Parser, Debug)]
#[command(
    name = "qrlabels",
    version,
    about = "Generate printable QR box labels as a PDF",
    long_about = "Generate one A4 label page per box identifier: QR code, logo and \
caption fields. In --watch mode every stdin line is treated as a new identifier list \
and the status of the latest list is reported.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Box identifiers, one page each, in print order.
    identifiers: Vec<String>,

    /// Read additional identifiers from this file (one per line).
    #[arg(long, env = "QRLABELS_FROM_FILE")]
    from_file: Option<PathBuf>,

    /// Output file or directory. Default: current directory.
    #[arg(short, long, env = "QRLABELS_OUTPUT")]
    output: Option<PathBuf>,

    /// Fixed file name for the document instead of one derived from the batch.
    #[arg(long, env = "QRLABELS_FILE_NAME")]
    file_name: Option<String>,

    /// Edge length of each rendered code in pixels (64–2000).
    #[arg(long, env = "QRLABELS_SIZE", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(64..=2000))]
    size: u32,

    /// Quiet zone around the code in modules (0–16).
    #[arg(long, env = "QRLABELS_QUIET_ZONE", default_value_t = 4,
          value_parser = clap::value_parser!(u32).range(0..=16))]
    quiet_zone: u32,

    /// Error-correction level: l, m, q, h.
    #[arg(long, env = "QRLABELS_EC_LEVEL", value_enum, default_value = "m")]
    ec_level: EcArg,

    /// Prefix prepended to every identifier before encoding.
    #[arg(long, env = "QRLABELS_PAYLOAD_PREFIX")]
    payload_prefix: Option<String>,

    /// PNG or JPEG logo printed on every page.
    #[arg(long, env = "QRLABELS_LOGO")]
    logo: Option<PathBuf>,

    /// JSON file with per-box caption data.
    #[arg(long, env = "QRLABELS_CAPTIONS")]
    captions: Option<PathBuf>,

    /// Print structured JSON on stdout.
    #[arg(long, env = "QRLABELS_JSON")]
    json: bool,

    /// Read identifier batches from stdin, one per line, and report each status.
    #[arg(long, env = "QRLABELS_WATCH")]
    watch: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "QRLABELS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "QRLABELS_QUIET")]
    quiet: bool,

    /// Disable progress bar.
    #[arg(long, env = "QRLABELS_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum EcArg {
    L,
    M,
    Q,
    H,
}

impl From<EcArg> for ErrorCorrection {
    fn from(v: EcArg) -> Self {
        match v {
            EcArg::L => ErrorCorrection::Low,
            EcArg::M => ErrorCorrection::Medium,
            EcArg::Q => ErrorCorrection::Quartile,
            EcArg::H => ErrorCorrection::High,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless -v asks for them.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.watch;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn GenerationProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    if cli.watch {
        return watch(&cli, config).await;
    }

    let mut ids: Vec<Identifier> = cli.identifiers.iter().cloned().map(Identifier::from).collect();
    if let Some(ref path) = cli.from_file {
        ids.extend(read_identifier_file(path).await?);
    }
    let output_path = cli.output.clone().unwrap_or_else(|| PathBuf::from("."));

    if cli.json {
        let output = generate_labels(&ids, &config)
            .await
            .context("Label generation failed")?;
        let path = resolve_destination(&output_path, &output.file_name).await;
        write_atomic(&path, &output.pdf)
            .await
            .context("Failed to write document")?;
        let report = serde_json::json!({ "path": path, "output": output });
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise output")?
        );
        return Ok(());
    }

    let (path, stats) = generate_to_file(&ids, &output_path, &config)
        .await
        .context("Label generation failed")?;

    if !cli.quiet {
        eprintln!(
            "{}  {} pages  {}  {}ms  →  {}",
            green("✔"),
            stats.page_count,
            dim(&format!("{} bytes", stats.byte_len)),
            stats.total_duration_ms,
            bold(&path.display().to_string()),
        );
    }
    Ok(())
}

/// Feed stdin batches into a pipeline until EOF and report every status.
async fn watch(cli: &Cli, config: LabelConfig) -> Result<()> {
    let mut pipeline = LabelPipeline::new(config).context("Failed to start pipeline")?;
    let mut status_rx = pipeline.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut eof = false;

    loop {
        tokio::select! {
            line = lines.next_line(), if !eof => {
                match line.context("Failed to read stdin")? {
                    Some(line) => {
                        if !pipeline.set_identifiers(parse_batch(&line)) && !cli.quiet {
                            eprintln!("{}", dim("unchanged batch ignored"));
                        }
                    }
                    None => {
                        eof = true;
                        if !pipeline.status().is_pending() {
                            break;
                        }
                    }
                }
            }
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = status_rx.borrow_and_update().clone();
                report_status(cli, &pipeline, &status).await?;
                if eof && !status.is_pending() {
                    break;
                }
            }
        }
    }

    pipeline.idle().await;
    pipeline.shutdown();
    Ok(())
}

async fn report_status(cli: &Cli, pipeline: &LabelPipeline, status: &PipelineStatus) -> Result<()> {
    let mut saved = None;
    if let (PipelineStatus::Ready(artifact), Some(dest)) = (status, cli.output.as_ref()) {
        match pipeline.save_artifact(artifact, dest).await {
            Ok(path) => saved = Some(path),
            // A newer batch may have released it already.
            Err(e) => warn!("Could not save cycle {}: {}", artifact.cycle, e),
        }
    }

    if cli.json {
        let line = serde_json::json!({ "status": status, "saved": saved });
        println!("{}", serde_json::to_string(&line).context("Failed to serialise status")?);
        return Ok(());
    }
    if cli.quiet {
        return Ok(());
    }
    match status {
        PipelineStatus::Idle => {}
        PipelineStatus::Pending { cycle } => eprintln!("{} cycle {}", dim("…"), cycle),
        PipelineStatus::Ready(a) => eprintln!(
            "{}  cycle {}  {} pages  →  {}",
            green("✔"),
            a.cycle,
            a.page_count,
            bold(
                &saved
                    .as_deref()
                    .unwrap_or(a.path.as_path())
                    .display()
                    .to_string()
            ),
        ),
        PipelineStatus::Error(reason) => eprintln!("{}  {}", red("✘"), red(&reason.to_string())),
    }
    Ok(())
}

/// Map CLI args to `LabelConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<LabelConfig> {
    let mut builder = LabelConfig::builder()
        .code_size(cli.size)
        .quiet_zone(cli.quiet_zone)
        .error_correction(cli.ec_level.clone().into());

    if let Some(ref prefix) = cli.payload_prefix {
        builder = builder.payload_prefix(prefix.clone());
    }
    if let Some(ref name) = cli.file_name {
        builder = builder.file_name(ArtifactName::Fixed(name.clone()));
    }
    if let Some(ref path) = cli.logo {
        let logo = EncodedImage::from_file(path)
            .with_context(|| format!("Failed to load logo from {:?}", path))?;
        builder = builder.logo(logo);
    }
    if let Some(ref path) = cli.captions {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read captions from {:?}", path))?;
        let captions = BoxCaptions::from_json(&json)
            .with_context(|| format!("Invalid captions file {:?}", path))?;
        builder = builder.captions(Arc::new(captions));
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn read_identifier_file(path: &Path) -> Result<Vec<Identifier>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read identifiers from {:?}", path))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(Identifier::from)
        .collect())
}

/// Split one stdin line into identifiers on commas and whitespace.
fn parse_batch(line: &str) -> Vec<Identifier> {
    line.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(Identifier::from)
        .collect()
}
