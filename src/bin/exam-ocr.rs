//! CLI binary for pdf-exam-ocr.
//!
//! A thin shim over the library crate: maps flags onto `ExtractionConfig`
//! and `ServerConfig`, then runs the server or a one-off extraction.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdf_exam_ocr::server;
use pdf_exam_ocr::{
    render_page, segment, ExamPipeline, ExtractionConfig, ExtractionOutput,
    ExtractionProgressCallback, OcrJobStatus, PdfSource, ProgressCallback, ServerConfig,
    StructuredExam,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner that follows the extraction from upload to structuring.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_upload_start(&self, file_name: &str, size_bytes: usize) {
        self.bar.set_prefix("Uploading");
        self.bar
            .set_message(format!("{file_name} ({} KiB)", size_bytes / 1024));
    }

    fn on_job_submitted(&self, job_id: &str) {
        self.bar
            .println(format!("  {} OCR job {}", green("✓"), dim(job_id)));
        self.bar.set_prefix("OCR");
        self.bar.set_message("waiting for job");
    }

    fn on_poll(&self, _job_id: &str, attempt: u32, status: &OcrJobStatus) {
        self.bar.set_message(format!(
            "{} ({}/{} pages, poll {})",
            status.status,
            status.num_pages_completed.unwrap_or(0),
            status.num_pages.unwrap_or(0),
            attempt
        ));
    }

    fn on_ocr_complete(&self, _job_id: &str, payload_bytes: usize) {
        self.bar.println(format!(
            "  {} OCR complete  {}",
            green("✓"),
            dim(&format!("{payload_bytes} bytes"))
        ));
    }

    fn on_structuring_start(&self) {
        self.bar.set_prefix("Structuring");
        self.bar.set_message("asking the model");
    }

    fn on_extraction_complete(&self, question_count: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} questions extracted",
            green("✔"),
            bold(&question_count.to_string())
        );
    }
}

// ── CLI definition ───────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "exam-ocr", version, about = "Exam-paper PDFs to structured questions via OCR + LLM")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "EXAM_OCR_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "EXAM_OCR_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP server.
    Serve(ServeArgs),
    /// Run one PDF through OCR and structuring.
    Extract(ExtractArgs),
    /// Render a saved StructuredExam JSON file as HTML.
    Render {
        /// Path to the exam JSON.
        input: PathBuf,
        /// Write HTML here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the segments of a text as JSON.
    Segment {
        /// Text mixing prose, $inline$ and \[block\] math.
        text: String,
    },
}

#[derive(Args, Debug)]
struct ExtractionArgs {
    /// Mathpix application id.
    #[arg(long, env = "MATHPIX_APP_ID", hide_env_values = true)]
    mathpix_app_id: Option<String>,

    /// Mathpix application key.
    #[arg(long, env = "MATHPIX_APP_KEY", hide_env_values = true)]
    mathpix_app_key: Option<String>,

    /// OCR API origin.
    #[arg(long, env = "EXAM_OCR_BASE_URL", default_value = pdf_exam_ocr::DEFAULT_OCR_BASE_URL)]
    ocr_base_url: String,

    /// Delay before each OCR status poll, in milliseconds.
    #[arg(long, env = "EXAM_OCR_POLL_INTERVAL_MS", default_value_t = 2000)]
    poll_interval_ms: u64,

    /// Give up after this many status polls.
    #[arg(long, env = "EXAM_OCR_MAX_POLLS", default_value_t = 150)]
    max_polls: u32,

    /// LLM provider: gemini, openai, anthropic, ollama, …
    #[arg(long, env = "EXAM_OCR_LLM_PROVIDER")]
    provider: Option<String>,

    /// LLM model for structuring.
    #[arg(short, long, env = "EXAM_OCR_MODEL")]
    model: Option<String>,

    /// Path to a text file replacing the built-in structuring instructions.
    #[arg(long, env = "EXAM_OCR_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens.
    #[arg(long, env = "EXAM_OCR_MAX_TOKENS", default_value_t = 16384)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "EXAM_OCR_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Structuring call timeout in seconds.
    #[arg(long, env = "EXAM_OCR_API_TIMEOUT", default_value_t = 180)]
    api_timeout: u64,
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[command(flatten)]
    extraction: ExtractionArgs,

    /// Interface to bind.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// TCP port.
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Allowed CORS origin; pass an empty string to disable CORS.
    #[arg(long, env = "EXAM_OCR_CORS_ORIGIN", default_value = "http://localhost:5173")]
    cors_origin: String,

    /// Upload size limit in MiB.
    #[arg(long, env = "EXAM_OCR_MAX_UPLOAD_MB", default_value_t = 50)]
    max_upload_mb: usize,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Exam paper PDF.
    input: PathBuf,

    #[command(flatten)]
    extraction: ExtractionArgs,

    /// Write the exam JSON here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also write the rendered HTML view to this file.
    #[arg(long)]
    html: Option<PathBuf>,

    /// Print the full output (job id and stats) instead of the exam alone.
    #[arg(long)]
    full: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "EXAM_OCR_NO_PROGRESS")]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner replaces INFO logs during a one-off extraction.
    let spinner_active = matches!(
        &cli.command,
        Command::Extract(args) if !args.no_progress && !cli.quiet
    );
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || spinner_active {
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

    match cli.command {
        Command::Serve(args) => run_serve(args).await,
        Command::Extract(args) => run_extract(args, spinner_active, cli.quiet).await,
        Command::Render { input, output } => run_render(input, output).await,
        Command::Segment { text } => {
            let json = serde_json::to_string_pretty(&segment(text.as_str()))
                .context("Failed to serialise segments")?;
            println!("{json}");
            Ok(())
        }
    }
}

/// Map the shared extraction flags onto `ExtractionConfig`.
async fn build_config(
    args: &ExtractionArgs,
    progress: Option<ProgressCallback>,
) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .ocr_base_url(&args.ocr_base_url)
        .poll_interval_ms(args.poll_interval_ms)
        .max_poll_attempts(args.max_polls)
        .max_tokens(args.max_tokens)
        .temperature(args.temperature)
        .api_timeout_secs(args.api_timeout);

    if let (Some(id), Some(key)) = (&args.mathpix_app_id, &args.mathpix_app_key) {
        builder = builder.mathpix_credentials(id, key);
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref model) = args.model {
        builder = builder.model(model);
    }
    if let Some(ref path) = args.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {}", path.display()))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let config = build_config(&args.extraction, None).await?;
    let pipeline = ExamPipeline::from_config(&config)
        .await
        .context("Failed to initialise the extraction pipeline")?;

    let cors_origin = Some(args.cors_origin).filter(|o| !o.is_empty());
    let server_config = ServerConfig {
        host: args.host,
        port: args.port,
        cors_origin,
        max_upload_bytes: args.max_upload_mb.saturating_mul(1024 * 1024),
    };

    server::serve(Arc::new(pipeline), &server_config)
        .await
        .context("Server failed")
}

async fn run_extract(args: ExtractArgs, show_progress: bool, quiet: bool) -> Result<()> {
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&args.extraction, progress).await?;
    let pdf = PdfSource::from_path(&args.input).context("Cannot read input PDF")?;
    let pipeline = ExamPipeline::from_config(&config)
        .await
        .context("Failed to initialise the extraction pipeline")?;

    // Ctrl-C cancels a pending OCR wait.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });

    let output: ExtractionOutput = pipeline
        .run(&pdf, Some(cancel_rx))
        .await
        .context("Extraction failed")?;

    let json = if args.full {
        serde_json::to_string_pretty(&output)
    } else {
        serde_json::to_string_pretty(&output.exam)
    }
    .context("Failed to serialise output")?;

    match args.output {
        Some(ref path) => {
            tokio::fs::write(path, format!("{json}\n"))
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        None => println!("{json}"),
    }

    if let Some(ref path) = args.html {
        tokio::fs::write(path, render_page(&output.exam))
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    if !quiet {
        eprintln!(
            "   {} pages  {} polls  {} tokens in / {} tokens out  {}ms total",
            output.stats.pages,
            output.stats.poll_attempts,
            dim(&output.stats.input_tokens.to_string()),
            dim(&output.stats.output_tokens.to_string()),
            output.stats.total_duration_ms,
        );
    }
    Ok(())
}

async fn run_render(input: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let raw = tokio::fs::read_to_string(&input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let exam: StructuredExam = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a StructuredExam JSON file", input.display()))?;
    let html = render_page(&exam);

    match output {
        Some(path) => tokio::fs::write(&path, html)
            .await
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            print!("{html}");
            Ok(())
        }
    }
}
