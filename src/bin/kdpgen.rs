//! CLI binary for kdp-bookgen.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `BookConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use kdp_bookgen::{
    check_local_backend, generate_book, generate_to_files, write_book, BookConfig, BookType,
    DiffusionParams, GenerationProgressCallback, PageReviewHook, ProgressCallback, SeedImage,
};
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max - 1).collect();
        format!("{head}\u{2026}")
    } else {
        s.to_string()
    }
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live progress bar plus one log line per page.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-page wall-clock start times for elapsed reporting.
    start_times: Mutex<HashMap<usize, Instant>>,
    warnings: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Resolving backends…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            warnings: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Generating");
        self.bar.reset_eta();
    }

    fn elapsed(&self, index: usize) -> String {
        let ms = self
            .start_times
            .lock()
            .map(|mut t| t.remove(&index))
            .ok()
            .flatten()
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);
        dim(&format!("{:.1}s", ms as f64 / 1000.0))
    }
}

impl GenerationProgressCallback for CliProgressCallback {
    fn on_generation_start(&self, total_pages: usize, local_backend_available: bool) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}  {}",
            cyan("◆"),
            bold(&format!("Generating {total_pages} pages…")),
            dim(if local_backend_available {
                "local diffusion: available"
            } else {
                "local diffusion: off"
            })
        ));
    }

    fn on_page_start(&self, index: usize, _total: usize) {
        if let Ok(mut times) = self.start_times.lock() {
            times.insert(index, Instant::now());
        }
        self.bar.set_message(format!("page {index}"));
    }

    fn on_page_complete(&self, index: usize, total: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            green("✓"),
            index,
            total,
            self.elapsed(index),
        ));
        self.bar.inc(1);
    }

    fn on_page_warning(&self, index: usize, total: usize, warning: &str) {
        self.warnings.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            yellow("!"),
            index,
            total,
            yellow(&truncate(warning, 80)),
        ));
    }

    fn on_page_error(&self, index: usize, total: usize, error: &str) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            index,
            total,
            red(&truncate(error, 80)),
            self.elapsed(index),
        ));
        self.bar.inc(1);
    }

    fn on_cover_error(&self, error: &str) {
        self.bar.println(format!(
            "  {} Cover skipped  {}",
            yellow("!"),
            yellow(&truncate(error, 80))
        ));
    }

    fn on_generation_complete(&self, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        let degraded = self.warnings.load(Ordering::SeqCst);
        self.bar.finish_and_clear();

        if failed == 0 && degraded == 0 {
            eprintln!(
                "{} {} pages generated successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages generated  ({} failed, {} kept their seed image)",
                if failed == total_pages {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
                yellow(&degraded.to_string()),
            );
        }
    }
}

// ── Interactive review ───────────────────────────────────────────────────────

/// Shows each generated text page on stderr and reads an optional
/// replacement from stdin. An empty first line accepts the proposal;
/// otherwise lines are read until an empty line.
struct StdinReviewer;

impl StdinReviewer {
    fn read_replacement() -> io::Result<Option<String>> {
        let stdin = io::stdin();
        let mut lines = Vec::new();
        for line in stdin.lock().lines() {
            let line = line?;
            if line.trim().is_empty() {
                break;
            }
            lines.push(line);
        }
        Ok((!lines.is_empty()).then(|| lines.join("\n")))
    }
}

impl PageReviewHook for StdinReviewer {
    fn review(&self, index: usize, proposed: &str) -> String {
        eprintln!("\n{} {}", cyan("◆"), bold(&format!("Page {index}")));
        eprintln!("{proposed}");
        eprint!(
            "{} ",
            dim("Enter to accept, or type a replacement (finish with an empty line):")
        );
        io::stderr().flush().ok();

        match tokio::task::block_in_place(Self::read_replacement) {
            Ok(Some(text)) => text,
            Ok(None) => proposed.to_string(),
            Err(e) => {
                eprintln!("{} {}", red("stdin:"), e);
                proposed.to_string()
            }
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # A 10-page bedtime storybook with a cover
  kdpgen --type storybook --pages 10 -o story.pdf

  # Quote book, custom prompt, no cover
  kdpgen -t quote -n 20 --prompt "Quotes about courage" --no-cover -o courage.pdf

  # Coloring book from sketches, redrawn by a local Stable Diffusion WebUI
  kdpgen -t coloring -n 5 --seed a.png --seed b.png --seed c.png -o coloring.pdf

  # Review and edit every page before it goes into the book
  kdpgen -t journal -n 7 --review -o journal.pdf

  # Is the local diffusion endpoint up?
  kdpgen --check-local

  # Show the prompt a book type would use
  kdpgen -t planner --show-prompt

BOOK TYPES:
  coloring    Coloring Book   image pages (seeded: local img2img, else remote)
  planner     Planner         text pages
  storybook   Storybook       text pages (default)
  journal     Journal         text pages
  quote       Quote Book      text pages

OUTPUTS:
  -o book.pdf               the PDF (A4, optional cover, one page per generated page)
  --metadata-csv book.csv   Title,Prompt,Type per page (default: next to the PDF)

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key (images, and text by default)
  ANTHROPIC_API_KEY       Anthropic API key (text)
  GEMINI_API_KEY          Google Gemini API key (text)
  EDGEQUAKE_LLM_PROVIDER  Override text provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override text model ID
  KDPGEN_LOCAL_ENDPOINT   Stable Diffusion WebUI base URL (default http://127.0.0.1:7860)
  KDPGEN_FONT             TrueType font for the PDF (default: bundled DejaVu Sans)
"#;

/// Generate print-ready books with text and image models.
#[derive(Parser, Debug)]
#[command(
    name = "kdpgen",
    version,
    about = "Generate coloring books, planners, storybooks, journals and quote books as PDF",
    long_about = "Generate print-ready books from a prompt. Text pages come from an LLM \
(OpenAI, Anthropic, Gemini, Ollama, ...); coloring pages come from an OpenAI-compatible \
images API or a local Stable Diffusion WebUI. Writes a PDF and a metadata CSV.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Book type.
    #[arg(short = 't', long = "type", env = "KDPGEN_TYPE", value_enum, default_value = "storybook")]
    book_type: BookTypeArg,

    /// Number of pages (5–50).
    #[arg(short = 'n', long, env = "KDPGEN_PAGES", default_value_t = 10,
          value_parser = clap::value_parser!(u32).range(5..=50))]
    pages: u32,

    /// Prompt override (default: the book type's template).
    #[arg(short, long, env = "KDPGEN_PROMPT")]
    prompt: Option<String>,

    /// Read the prompt override from a file.
    #[arg(long, conflicts_with = "prompt")]
    prompt_file: Option<PathBuf>,

    /// Skip the cover page.
    #[arg(long, env = "KDPGEN_NO_COVER")]
    no_cover: bool,

    /// Title printed beneath the cover image.
    #[arg(long, env = "KDPGEN_COVER_TITLE", default_value = "A Bedtime Story")]
    cover_title: String,

    /// Seed image for a coloring page; repeat in page order.
    #[arg(short, long = "seed")]
    seeds: Vec<PathBuf>,

    /// Never use the local diffusion endpoint.
    #[arg(long, env = "KDPGEN_NO_LOCAL")]
    no_local: bool,

    /// Local Stable Diffusion WebUI base URL (probe and img2img).
    #[arg(long, env = "KDPGEN_LOCAL_ENDPOINT", default_value = "http://127.0.0.1:7860")]
    local_endpoint: String,

    /// img2img denoising strength (0.0–1.0).
    #[arg(long, env = "KDPGEN_DENOISE", default_value_t = 0.6)]
    denoise: f32,

    /// img2img sampling steps.
    #[arg(long, env = "KDPGEN_STEPS", default_value_t = 30)]
    steps: u32,

    /// Text model ID.
    #[arg(long, env = "EDGEQUAKE_MODEL", default_value = "gpt-4o")]
    model: String,

    /// Text provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider for text pages. Auto-detected from API key env vars if not set."
    )]
    provider: Option<String>,

    /// Image model ID for the remote images API.
    #[arg(long, env = "KDPGEN_IMAGE_MODEL", default_value = "dall-e-3")]
    image_model: String,

    /// Base URL of the OpenAI-compatible images API.
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    openai_base_url: String,

    /// TrueType font for the PDF.
    #[arg(long, env = "KDPGEN_FONT")]
    font: Option<PathBuf>,

    /// Write the PDF here.
    #[arg(short, long, env = "KDPGEN_OUTPUT", default_value = "book.pdf")]
    output: PathBuf,

    /// Write the metadata CSV here (default: the PDF path with .csv).
    #[arg(long, env = "KDPGEN_METADATA_CSV")]
    metadata_csv: Option<PathBuf>,

    /// Review and optionally replace each text page on the terminal.
    #[arg(long)]
    review: bool,

    /// Max LLM output tokens per page.
    #[arg(long, env = "KDPGEN_MAX_TOKENS", default_value_t = 1024)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "KDPGEN_TEMPERATURE", default_value_t = 0.8)]
    temperature: f32,

    /// Timeout for text and remote image calls, in seconds.
    #[arg(long, env = "KDPGEN_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Timeout for one local diffusion call, in seconds.
    #[arg(long, env = "KDPGEN_LOCAL_TIMEOUT", default_value_t = 300)]
    local_timeout: u64,

    /// Print the run summary (pages, metadata, stats) as JSON on stdout.
    #[arg(long, env = "KDPGEN_JSON")]
    json: bool,

    /// Print the effective prompt and exit.
    #[arg(long)]
    show_prompt: bool,

    /// Probe the local diffusion endpoint and exit.
    #[arg(long)]
    check_local: bool,

    /// Disable progress bar.
    #[arg(long, env = "KDPGEN_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "KDPGEN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "KDPGEN_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum BookTypeArg {
    Coloring,
    Planner,
    Storybook,
    Journal,
    Quote,
}

impl From<BookTypeArg> for BookType {
    fn from(v: BookTypeArg) -> Self {
        match v {
            BookTypeArg::Coloring => BookType::Coloring,
            BookTypeArg::Planner => BookType::Planner,
            BookTypeArg::Storybook => BookType::Storybook,
            BookTypeArg::Journal => BookType::Journal,
            BookTypeArg::Quote => BookType::Quote,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level logs; the reviewer needs a clean terminal.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.review;
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
        let cb = CliProgressCallback::new();
        Some(cb as Arc<dyn GenerationProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Informational modes ──────────────────────────────────────────────
    if cli.show_prompt {
        println!("{}", config.effective_prompt());
        return Ok(());
    }

    if cli.check_local {
        let available = check_local_backend(&config)
            .await
            .context("Failed to probe the local backend")?;
        if available {
            println!("{} {} is available", green("✔"), config.local_endpoint);
        } else {
            println!("{} {} is not reachable", red("✘"), config.local_endpoint);
            std::process::exit(1);
        }
        return Ok(());
    }

    // ── Run generation ───────────────────────────────────────────────────
    let csv_path = cli
        .metadata_csv
        .clone()
        .unwrap_or_else(|| cli.output.with_extension("csv"));

    if cli.json {
        let output = generate_book(&config).await.context("Generation failed")?;
        write_book(&output, &cli.output, &csv_path)
            .await
            .context("Failed to write outputs")?;
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
        return Ok(());
    }

    let stats = generate_to_files(&config, &cli.output, &csv_path)
        .await
        .context("Generation failed")?;

    if !cli.quiet {
        eprintln!(
            "{}  {}/{} pages  {} PDF pages  {}ms  →  {}  {}",
            if stats.failed_pages == 0 {
                green("✔")
            } else {
                cyan("⚠")
            },
            stats.total_pages - stats.failed_pages,
            stats.total_pages,
            stats.document_pages,
            stats.total_duration_ms,
            bold(&cli.output.display().to_string()),
            dim(&csv_path.display().to_string()),
        );
        if config.generate_cover && !stats.cover_generated {
            eprintln!("   {}", yellow("cover could not be generated"));
        }
    }

    Ok(())
}

/// Map CLI args to `BookConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<BookConfig> {
    let prompt = match (&cli.prompt, &cli.prompt_file) {
        (Some(p), _) => Some(p.clone()),
        (None, Some(path)) => Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read prompt from {:?}", path))?,
        ),
        (None, None) => None,
    };

    let mut builder = BookConfig::builder()
        .book_type(cli.book_type.into())
        .page_count(cli.pages as usize)
        .generate_cover(!cli.no_cover)
        .cover_title(&cli.cover_title)
        .use_local_image_backend(!cli.no_local)
        .seed_images(cli.seeds.iter().cloned().map(SeedImage::File))
        .text_model(&cli.model)
        .image_model(&cli.image_model)
        .openai_base_url(&cli.openai_base_url)
        .local_endpoint(&cli.local_endpoint)
        .diffusion(DiffusionParams {
            denoising_strength: cli.denoise,
            steps: cli.steps,
            ..Default::default()
        })
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .api_timeout_secs(cli.api_timeout)
        .local_timeout_secs(cli.local_timeout);

    if let Some(p) = prompt {
        builder = builder.prompt(p);
    }
    if let Some(ref name) = cli.provider {
        builder = builder.provider_name(name);
    }
    if let Some(ref font) = cli.font {
        builder = builder.font_path(font);
    }
    if cli.review {
        builder = builder.review_hook(Arc::new(StdinReviewer));
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
