//! CLI binary for edgequake-pdfocr.
//!
//! A thin shim over the library crate that maps CLI flags to a
//! `RecognitionConfig`, runs the batch stream and writes each document with
//! the export module.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdfocr::{
    load_inputs, recognize_stream, write_document, MistralConfig, PageSeparator, ProgressCallback,
    ProviderRegistry, RecognitionConfig, RecognitionOptions, RecognitionProgressCallback,
    Recognizer, ReductoConfig,
};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── Terminal styling ─────────────────────────────────────────────────────────

/// SGR styles used on stderr.
#[derive(Clone, Copy)]
enum Tone {
    Ok,
    Fail,
    Muted,
    Strong,
    Note,
}

impl Tone {
    fn paint(self, s: impl std::fmt::Display) -> String {
        let code = match self {
            Tone::Ok => "32",
            Tone::Fail => "31",
            Tone::Muted => "2",
            Tone::Strong => "1",
            Tone::Note => "33",
        };
        format!("\x1b[{code}m{s}\x1b[0m")
    }
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar over the batch, one log line per
/// finished document or scheduled retry.
struct CliProgressCallback {
    bar: ProgressBar,
    retries: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.blue} {msg:.bold} {wide_bar:.blue/white} {pos}/{len} docs  eta {eta}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");

        let bar = ProgressBar::new(0);
        bar.set_style(style);
        bar.set_message("ocr");
        bar.enable_steady_tick(Duration::from_millis(120));

        Arc::new(Self {
            bar,
            retries: AtomicUsize::new(0),
        })
    }
}

impl RecognitionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_documents: usize) {
        self.bar.set_length(total_documents as u64);
        self.bar.println(Tone::Strong.paint(format!(
            "{total_documents} document(s) queued"
        )));
    }

    fn on_retry_scheduled(&self, provider_id: &str, retry: u32, delay_ms: u64, error: String) {
        self.retries.fetch_add(1, Ordering::SeqCst);
        let msg = if error.chars().count() > 80 {
            format!("{}…", error.chars().take(79).collect::<String>())
        } else {
            error
        };
        self.bar.println(Tone::Muted.paint(format!(
            "  {provider_id} retry #{retry} after {delay_ms}ms: {msg}"
        )));
    }

    fn on_document_finished(&self, name: &str, success: bool) {
        let mark = if success {
            Tone::Ok.paint("ok  ")
        } else {
            Tone::Fail.paint("FAIL")
        };
        self.bar.println(format!("  {mark} {name}"));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_documents: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = total_documents.saturating_sub(success_count);
        let retries = self.retries.load(Ordering::SeqCst);
        let tone = match failed {
            0 => Tone::Ok,
            n if n == total_documents => Tone::Fail,
            _ => Tone::Note,
        };
        eprintln!(
            "{} of {} document(s) recognised, {} failed, {} retries",
            tone.paint(success_count),
            total_documents,
            failed,
            retries
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One file with Mistral OCR (default provider)
  pdfocr report.pdf

  # A whole folder with Reducto, 8 documents at a time
  pdfocr --provider reducto --concurrency 8 papers/ -o results

  # Text only, horizontal rules between pages
  pdfocr --no-images --separator hr scan.pdf

  # Machine-readable summary
  pdfocr --json a.pdf b.pdf > summary.json

OUTPUT LAYOUT:
  <output>/<provider>/<document>/<document>.txt
  <output>/<provider>/<document>/page{N}_img{M}.<ext>
  <output>/<provider>/<document>/metadata.json

ENVIRONMENT VARIABLES:
  MISTRAL_API_KEY     Mistral API key (provider "mistral")
  REDUCTO_API_KEY     Reducto API key (provider "reducto")
  PDFOCR_PROVIDER     Default provider
  RUST_LOG            Log filter, e.g. RUST_LOG=edgequake_pdfocr=debug
"#;

/// Extract text and images from PDFs with Mistral OCR or Reducto.
#[derive(Parser, Debug)]
#[command(
    name = "pdfocr",
    version,
    about = "Extract text and images from PDFs with interchangeable OCR backends",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF files and/or folders containing PDFs.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// OCR backend: mistral or reducto.
    #[arg(long, env = "PDFOCR_PROVIDER", default_value = "mistral")]
    provider: String,

    /// Mistral API key.
    #[arg(long, env = "MISTRAL_API_KEY", hide_env_values = true)]
    mistral_api_key: Option<String>,

    /// Reducto API key.
    #[arg(long, env = "REDUCTO_API_KEY", hide_env_values = true)]
    reducto_api_key: Option<String>,

    /// Output directory.
    #[arg(short, long, env = "PDFOCR_OUTPUT", default_value = "output")]
    output: PathBuf,

    /// Do not request or save embedded images.
    #[arg(long)]
    no_images: bool,

    /// Retries after the first attempt on transient backend failures.
    #[arg(long, env = "PDFOCR_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Overall per-document deadline in seconds (default: 60s per 20 pages).
    #[arg(long, env = "PDFOCR_TIMEOUT")]
    timeout: Option<u64>,

    /// Documents recognised concurrently.
    #[arg(short, long, env = "PDFOCR_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Page separator: comment, hr, or a custom string.
    #[arg(long, env = "PDFOCR_SEPARATOR", default_value = "comment")]
    separator: String,

    /// Print a JSON summary of every document to stdout.
    #[arg(long)]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFOCR_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let start = Instant::now();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar carries the user-facing feedback; library INFO logs
    // only show up in verbose mode or when RUST_LOG asks for them.
    let show_progress = !cli.json && !cli.verbose;
    let filter = if cli.verbose {
        "debug"
    } else if show_progress {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Registry ─────────────────────────────────────────────────────────
    let registry = ProviderRegistry::with_builtin(
        cli.mistral_api_key.clone().map(MistralConfig::new),
        cli.reducto_api_key.clone().map(ReductoConfig::new),
    )
    .context("Failed to configure OCR providers")?;
    if !registry.contains(&cli.provider) {
        anyhow::bail!(
            "Provider '{}' is not configured (configured: [{}])\n\
             Set MISTRAL_API_KEY / REDUCTO_API_KEY or pass --mistral-api-key / --reducto-api-key",
            cli.provider,
            registry.ids().join(", ")
        );
    }
    let registry = registry
        .install_global()
        .context("Failed to install provider registry")?;

    // ── Config ───────────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn RecognitionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;
    let recognizer = Recognizer::new(registry, config);

    let mut options = RecognitionOptions::default().with_max_retries(cli.max_retries);
    if let Some(secs) = cli.timeout {
        options = options.with_timeout(Duration::from_secs(secs));
    }
    if cli.no_images {
        options = options.without_images();
    }

    // ── Inputs ───────────────────────────────────────────────────────────
    let documents = load_inputs(&cli.inputs)
        .await
        .context("Failed to load input PDFs")?;
    if documents.is_empty() {
        anyhow::bail!("No PDF files found in the given inputs");
    }

    // ── Recognise and write ──────────────────────────────────────────────
    let mut results = recognize_stream(&recognizer, documents, &cli.provider, &options);
    let mut summaries = Vec::new();
    let mut failures: Vec<(String, String)> = Vec::new();

    while let Some((name, result)) = results.next().await {
        match result {
            Ok(doc) => {
                let written = write_document(&doc, &name, &cli.output)
                    .await
                    .with_context(|| format!("Failed to write results for '{name}'"))?;
                if cli.json {
                    summaries.push(serde_json::json!({
                        "name": name,
                        "ok": true,
                        "output_dir": written.dir,
                        "metadata": doc.metadata(),
                    }));
                } else if !show_progress {
                    eprintln!(
                        "{} {}  {} pages  {}ms  ->  {}",
                        Tone::Ok.paint("ok"),
                        name,
                        doc.page_count,
                        doc.stats.total_duration_ms,
                        written.dir.display()
                    );
                }
                for warning in &doc.warnings {
                    tracing::warn!("{}: {}", name, warning);
                }
            }
            Err(e) => {
                if cli.json {
                    summaries.push(serde_json::json!({
                        "name": name,
                        "ok": false,
                        "error": e.to_string(),
                    }));
                }
                failures.push((name, e.to_string()));
            }
        }
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summaries).context("Failed to serialise summary")?
        );
    } else {
        for (name, error) in &failures {
            eprintln!("{} {}: {}", Tone::Fail.paint("FAIL"), name, error);
        }
        eprintln!(
            "{}  ->  {}",
            Tone::Muted.paint(format!("{}ms total", start.elapsed().as_millis())),
            Tone::Strong.paint(cli.output.display())
        );
    }

    if !failures.is_empty() {
        anyhow::bail!("{} document(s) failed", failures.len());
    }
    Ok(())
}

/// Map CLI args to `RecognitionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<RecognitionConfig> {
    let mut builder = RecognitionConfig::builder()
        .max_retries(cli.max_retries)
        .concurrency(cli.concurrency)
        .page_separator(parse_separator(&cli.separator));
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

/// Parse `--separator` string into `PageSeparator`.
fn parse_separator(s: &str) -> PageSeparator {
    match s.to_lowercase().as_str() {
        "comment" => PageSeparator::Comment,
        "hr" | "---" => PageSeparator::HorizontalRule,
        _ => PageSeparator::Custom(s.to_string()),
    }
}
