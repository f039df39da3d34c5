//! CLI binary for tabex.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, runs one extraction (or an interactive session) and
//! prints the tables.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tabex::pipeline::input::resolve_input;
use tabex::{
    export_tables, inspect, CachePolicy, ExtractionConfig, ExtractionOutput,
    ExtractionProgressCallback, ExtractionResult, Presentation, ProgressCallback,
    RecognizerBackend, Session, TableExtractor,
};
use tokio::io::{AsyncBufReadExt, BufReader};
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner while the model runs, one log line
/// per skipped region. A fresh spinner is created per extraction so the
/// interactive session can run many.
struct CliProgressCallback {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            bar: Mutex::new(None),
        })
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Some(bar) = self.bar.lock().unwrap().as_ref() {
            f(bar);
        }
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, name: &str, byte_len: usize) {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Preparing");
        bar.set_message(format!("{name} ({} KiB)", byte_len / 1024));
        bar.enable_steady_tick(Duration::from_millis(80));
        *self.bar.lock().unwrap() = Some(bar);
    }

    fn on_cache_hit(&self, name: &str) {
        self.with_bar(|bar| {
            bar.println(format!("  {} {}", cyan("↺"), dim(&format!("{name}: cached result"))));
        });
    }

    fn on_inference_start(&self, backend: &str) {
        self.with_bar(|bar| {
            bar.set_prefix("Analyzing");
            bar.set_message(format!("the table with {backend}… Please wait."));
        });
    }

    fn on_inference_complete(&self, regions: usize, duration_ms: u64) {
        self.with_bar(|bar| {
            bar.println(format!(
                "  {} {} region(s)  {}",
                green("✓"),
                regions,
                dim(&format!("{:.1}s", duration_ms as f64 / 1000.0)),
            ));
        });
    }

    fn on_region_skipped(&self, region: usize, error: &str) {
        // Truncate very long error messages to keep output tidy.
        let msg = if error.chars().count() > 100 {
            format!("{}\u{2026}", error.chars().take(99).collect::<String>())
        } else {
            error.to_string()
        };
        self.with_bar(|bar| {
            bar.println(format!("  {} region {:>2}  {}", yellow("⚠"), region, yellow(&msg)));
        });
    }

    fn on_extraction_complete(&self, _tables: usize) {
        if let Some(bar) = self.bar.lock().unwrap().take() {
            bar.finish_and_clear();
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract the tables of an image and print them
  tabex invoice.png

  # Run on the bundled sample image
  tabex --sample

  # Write extracted_table_{n}.csv (and the raw HTML) into a directory
  tabex scan.jpg --out-dir tables/ --markup

  # Show the raw HTML the model produced
  tabex scan.jpg --show-markup

  # Use a PP-Structure style service instead of a vision LLM
  tabex --backend structure-service --service-url http://127.0.0.1:8871/predict/structure_system scan.png

  # Interactive session (upload / sample / save ...)
  tabex --interactive

  # JSON output with image metadata and timings
  tabex --json scan.png > tables.json

INTERACTIVE COMMANDS:
  type 'help' inside `tabex --interactive`

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  TABEX_SERVICE_URL       Structure-service endpoint
  RUST_LOG                Log filter (overrides -v / -q)
"#;

const INTERACTIVE_HELP: &str = "\
  upload <path|url>   select an image (clears the sample) and extract
  sample              select the bundled sample (clears the upload) and extract
  show                show the current tables again (answered from the cache)
  markup <n>          print the raw HTML of table n
  save [dir]          write extracted_table_{n}.csv into dir (default: .)
  clear               drop the current selection
  stats               cache hits / misses
  quit                leave
";

/// Extract tables from document images into CSV.
#[derive(Parser, Debug)]
#[command(
    name = "tabex",
    version,
    about = "Extract tables from images (PNG/JPEG) into CSV using a table-recognition model",
    long_about = "Upload an image containing a table and tabex runs a table-structure recognition \
model over it, converts the recognised markup into rows and writes one CSV file per table. \
Supports vision LLMs through OpenAI, Anthropic, Google Gemini, Ollama and any OpenAI-compatible \
endpoint, or a PP-Structure style HTTP service.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PNG/JPEG file path or HTTP/HTTPS URL.
    input: Option<String>,

    /// Use the bundled sample image instead of INPUT.
    #[arg(long, conflicts_with = "input")]
    sample: bool,

    /// Start an interactive session.
    #[arg(short, long, conflicts_with_all = ["json", "inspect_only"])]
    interactive: bool,

    /// Write extracted_table_{n}.csv files into this directory.
    #[arg(short, long, env = "TABEX_OUT_DIR")]
    out_dir: Option<PathBuf>,

    /// Also write extracted_table_{n}.html with the raw markup.
    #[arg(long)]
    markup: bool,

    /// Print the raw HTML of every table.
    #[arg(long, env = "TABEX_SHOW_MARKUP")]
    show_markup: bool,

    /// Recognition backend.
    #[arg(long, env = "TABEX_BACKEND", value_enum, default_value = "vision")]
    backend: BackendArg,

    /// Structure-service URL (for --backend structure-service).
    #[arg(long, env = "TABEX_SERVICE_URL")]
    service_url: Option<String>,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// OCR language hint passed to the model.
    #[arg(long, env = "TABEX_LANG", default_value = "en")]
    lang: String,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "TABEX_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens per image.
    #[arg(long, env = "TABEX_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "TABEX_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Retries on a transient recognizer failure (default: none).
    #[arg(long, env = "TABEX_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Longest image edge sent to a remote model, in pixels.
    #[arg(long, env = "TABEX_MAX_PIXELS", default_value_t = 2000)]
    max_pixels: u32,

    /// Recognition timeout in seconds (default: wait as long as it takes).
    #[arg(long, env = "TABEX_TIMEOUT")]
    timeout: Option<u64>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "TABEX_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Keep at most N results in the cache (default: unbounded).
    #[arg(long, env = "TABEX_CACHE_SIZE")]
    cache_size: Option<usize>,

    /// Path of the sample image.
    #[arg(long, env = "TABEX_SAMPLE_PATH", default_value = tabex::config::DEFAULT_SAMPLE_PATH)]
    sample_path: PathBuf,

    /// Output structured JSON (ExtractionOutput) instead of text.
    #[arg(long, env = "TABEX_JSON")]
    json: bool,

    /// Print image metadata only, no extraction.
    #[arg(long)]
    inspect_only: bool,

    /// Disable the spinner.
    #[arg(long, env = "TABEX_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "TABEX_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "TABEX_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    Vision,
    StructureService,
}

impl From<BackendArg> for RecognizerBackend {
    fn from(v: BackendArg) -> Self {
        match v {
            BackendArg::Vision => RecognizerBackend::Vision,
            BackendArg::StructureService => RecognizerBackend::StructureService,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback that matters; keep INFO logs off
    // while it is shown.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let target = cli
            .input
            .clone()
            .unwrap_or_else(|| cli.sample_path.display().to_string());
        let info = inspect(&target).await.context("Failed to inspect image")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialize metadata")?
            );
        } else {
            println!("File:     {}", info.name);
            println!("Format:   {}", info.kind.mime_type());
            println!("Size:     {}x{} px", info.width, info.height);
            println!("Bytes:    {}", info.byte_len);
            println!("BLAKE3:   {}", info.digest);
        }
        return Ok(());
    }

    // ── Build extractor ──────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;
    let extractor = TableExtractor::new(config).context("Could not set up the table recognizer")?;

    if cli.interactive {
        return run_interactive(&extractor, &cli).await;
    }

    // ── One-shot mode ────────────────────────────────────────────────────
    let mut session = extractor.new_session();
    if cli.sample {
        session
            .choose_sample()
            .await
            .with_context(|| format!("Failed to load sample image {:?}", cli.sample_path))?;
    } else if let Some(ref input) = cli.input {
        let image = resolve_input(input, cli.download_timeout)
            .await
            .with_context(|| format!("Failed to read {input}"))?;
        session.upload(image);
    }

    if !session.has_image() {
        println!("{}", Presentation::from_state(None).headline());
        return Ok(());
    }

    let output = extractor
        .extract_session(&session)
        .await
        .context("Extraction failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else {
        print_output(&output, cli.show_markup, cli.quiet);
    }

    if let Some(ref dir) = cli.out_dir {
        save_tables(&output.result, dir, cli.markup, cli.quiet).await?;
    }

    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let system_prompt = if let Some(ref path) = cli.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let cache_policy = match cli.cache_size {
        Some(n) => CachePolicy::Bounded(n),
        None => CachePolicy::Unbounded,
    };

    let mut builder = ExtractionConfig::builder()
        .lang(cli.lang.clone())
        .backend(cli.backend.into())
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .max_image_pixels(cli.max_pixels)
        .download_timeout_secs(cli.download_timeout)
        .cache_policy(cache_policy)
        .sample_path(cli.sample_path.clone());

    if let Some(secs) = cli.timeout {
        builder = builder.inference_timeout_secs(secs);
    }
    if let Some(ref url) = cli.service_url {
        builder = builder.service_url(url.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_output(output: &ExtractionOutput, show_markup: bool, quiet: bool) {
    let presentation = Presentation::from_state(Some(&output.result));
    if !quiet {
        let mark = match presentation {
            Presentation::Tables(_) => green("✔"),
            _ => yellow("⚠"),
        };
        eprintln!("{} {}", mark, bold(&presentation.headline()));
        for warning in output.result.warnings() {
            eprintln!("  {} {}", yellow("⚠"), warning);
        }
        eprintln!(
            "   {}",
            dim(&format!(
                "{} ({}x{})  {}  {}ms",
                output.image.name,
                output.image.width,
                output.image.height,
                if output.stats.cache_hit { "cached" } else { "recognised" },
                output.stats.total_ms
            ))
        );
    }
    if let Presentation::Tables(views) = &presentation {
        for view in views {
            println!();
            print!("{}", view.render(show_markup));
        }
    }
}

async fn save_tables(result: &ExtractionResult, dir: &Path, markup: bool, quiet: bool) -> Result<()> {
    let paths = export_tables(result, dir, markup)
        .await
        .with_context(|| format!("Failed to write tables to {}", dir.display()))?;
    if !quiet {
        for path in &paths {
            eprintln!("  {} {}", green("→"), path.display());
        }
    }
    Ok(())
}

// ── Interactive session ──────────────────────────────────────────────────────

async fn run_interactive(extractor: &TableExtractor, cli: &Cli) -> Result<()> {
    let mut session: Session = extractor.new_session();
    let mut current: Option<Arc<ExtractionResult>> = None;

    eprintln!("{}", bold("tabex — Data Table Extractor"));
    eprintln!(
        "{}",
        dim(&format!("recognizer: {}  •  type 'help' for commands", extractor.recognizer_name()))
    );
    eprintln!("{}", cyan(&Presentation::from_state(None).headline()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("{} ", cyan("tabex>"));
        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let line = line.trim();
        let (cmd, arg) = match line.split_once(char::is_whitespace) {
            Some((c, a)) => (c, a.trim()),
            None => (line, ""),
        };

        match cmd {
            "" => continue,
            "quit" | "exit" | "q" => break,
            "help" | "?" => eprint!("{INTERACTIVE_HELP}"),
            "upload" => {
                if arg.is_empty() {
                    eprintln!("{} usage: upload <path|url>", yellow("⚠"));
                    continue;
                }
                match resolve_input(arg, cli.download_timeout).await {
                    Ok(image) => {
                        session.upload(image);
                        current = run_session(extractor, &session, cli.show_markup).await;
                    }
                    Err(e) => eprintln!("{} {}", red("✘"), e),
                }
            }
            "sample" => match session.choose_sample().await {
                Ok(_) => current = run_session(extractor, &session, cli.show_markup).await,
                Err(e) => eprintln!("{} {}", red("✘"), e),
            },
            "show" => {
                if session.has_image() {
                    current = run_session(extractor, &session, cli.show_markup).await;
                } else {
                    eprintln!("{}", cyan(&Presentation::from_state(None).headline()));
                }
            }
            "markup" => {
                let Some(result) = current.as_ref() else {
                    eprintln!("{} nothing extracted yet", yellow("⚠"));
                    continue;
                };
                let markup = arg
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| result.markup(i));
                match markup {
                    Some(markup) => println!("{markup}"),
                    None => eprintln!("{} no table '{}' (1–{})", yellow("⚠"), arg, result.len()),
                }
            }
            "save" => {
                let Some(result) = current.as_ref() else {
                    eprintln!("{} nothing extracted yet", yellow("⚠"));
                    continue;
                };
                let dir = if arg.is_empty() { Path::new(".") } else { Path::new(arg) };
                if let Err(e) = save_tables(result, dir, cli.markup, false).await {
                    eprintln!("{} {:#}", red("✘"), e);
                }
            }
            "clear" => {
                session.clear();
                current = None;
                eprintln!("{}", cyan(&Presentation::from_state(None).headline()));
            }
            "stats" => {
                let stats = extractor.cache_stats();
                eprintln!(
                    "cache: {} entr{}, {} hit(s), {} miss(es), hit rate {:.0}%",
                    stats.entries,
                    if stats.entries == 1 { "y" } else { "ies" },
                    stats.hits,
                    stats.misses,
                    stats.hit_rate() * 100.0
                );
            }
            other => eprintln!("{} unknown command '{}' (try 'help')", yellow("⚠"), other),
        }
    }

    Ok(())
}

/// Extract the session's active image and print it. Errors are printed,
/// not returned, so the session keeps going.
async fn run_session(
    extractor: &TableExtractor,
    session: &Session,
    show_markup: bool,
) -> Option<Arc<ExtractionResult>> {
    match extractor.extract_session(session).await {
        Ok(output) => {
            print_output(&output, show_markup, false);
            Some(output.result)
        }
        Err(e) => {
            eprintln!("{} {}", red("✘"), e);
            None
        }
    }
}
