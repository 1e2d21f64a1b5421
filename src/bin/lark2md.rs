//! CLI binary for lark2md.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConversionConfig`, picks the single-document or batch path based on the
//! input, and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use lark2md::{
    convert, discover_jobs, run_batch, BatchJob, BatchReport, ConversionConfig,
    ConversionProgressCallback, FsAssetSource, FsDocumentSource, JobState, ProgressCallback,
    Sources,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per finished document. Documents
/// finish out of order, so start times are kept per id.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<String, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_batch_start` tells us how many documents there are.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(SPINNER);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Scanning input…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} docs  \
             ⏱ {elapsed_precise}  ETA {eta_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Converting");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, doc_id: &str) -> f64 {
        self.start_times
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(doc_id)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_jobs: usize) {
        self.activate_bar(total_jobs);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total_jobs} documents…"))
        ));
    }

    fn on_job_start(&self, doc_id: &str) {
        self.start_times
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(doc_id.to_string(), Instant::now());
    }

    fn on_job_state(&self, doc_id: &str, state: JobState) {
        if !state.is_terminal() {
            self.bar.set_message(format!("{doc_id}: {state}"));
        }
    }

    fn on_job_complete(&self, doc_id: &str, markdown_len: usize) {
        let secs = self.elapsed_secs(doc_id);
        self.bar.println(format!(
            "  {} {:<40}  {}  {}",
            green("✓"),
            doc_id,
            dim(&format!("{markdown_len:>7} bytes")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_job_error(&self, doc_id: &str, error: &str) {
        let secs = self.elapsed_secs(doc_id);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:<40}  {}  {}",
            red("✗"),
            doc_id,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_jobs: usize, success_count: usize) {
        let failed = total_jobs.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} documents converted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} documents converted  ({} failed)",
                if failed == total_jobs {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_jobs,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One dump to stdout (image placeholders left as tokens)
  lark2md dumps/doxcnABC.json

  # One dump to a directory, images under out/static/
  lark2md dumps/doxcnABC.json -o out

  # A whole tree of dumps, mirrored under out/
  lark2md dumps/ -o out --concurrency 8 --rps 5

  # Name files after document titles, inline styles as HTML
  lark2md dumps/ -o out --title-as-filename --html-tags

  # Machine-readable batch report
  lark2md dumps/ -o out --json > report.json

INPUT LAYOUT:
  A dump is {"document": {...}, "blocks": [...]} as returned by the docx
  API. Images are looked up by token in the assets directory, matching any
  file whose name without extension equals the token (boxcnXYZ.png).

ENVIRONMENT VARIABLES:
  LARK2MD_OUTPUT          Output directory
  LARK2MD_ASSETS          Directory holding downloaded images
  LARK2MD_CONCURRENCY     Documents processed at once
  LARK2MD_RPS             Shared request budget per second
  RUST_LOG                Overrides the log filter (e.g. lark2md=debug)
"#;

/// Convert Lark/Feishu docx block dumps to Markdown.
#[derive(Parser, Debug)]
#[command(
    name = "lark2md",
    version,
    about = "Convert Lark/Feishu docx block dumps to Markdown",
    long_about = "Convert Lark/Feishu documents, stored as JSON dumps of their block lists, \
into Markdown. A single dump file is converted on its own; a directory is walked recursively \
and converted as a batch with bounded concurrency and a shared request rate limit.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// A dump file (`<doc id>.json`) or a directory of dumps.
    input: PathBuf,

    /// Output directory. A single file without `-o` goes to stdout.
    #[arg(short, long, env = "LARK2MD_OUTPUT")]
    output: Option<PathBuf>,

    /// Directory holding images named `<token>.<ext>`. Default: the dump directory.
    #[arg(long, env = "LARK2MD_ASSETS")]
    assets: Option<PathBuf>,

    /// Render inline styles as <strong>/<em>/<del> instead of Markdown.
    #[arg(long, env = "LARK2MD_HTML_TAGS")]
    html_tags: bool,

    /// Documents processed at once in batch mode.
    #[arg(short, long, env = "LARK2MD_CONCURRENCY", default_value_t = 5,
          value_parser = clap::value_parser!(u64).range(1..=256))]
    concurrency: u64,

    /// Requests per second shared by all workers.
    #[arg(long, env = "LARK2MD_RPS", default_value_t = 5,
          value_parser = clap::value_parser!(u32).range(1..=1000))]
    rps: u32,

    /// Image directory, relative to each Markdown file.
    #[arg(long, env = "LARK2MD_IMAGE_DIR", default_value = "static")]
    image_dir: String,

    /// Leave image tokens in place and fetch no assets.
    #[arg(long, env = "LARK2MD_SKIP_IMAGES")]
    skip_images: bool,

    /// Name output files after document titles instead of ids.
    #[arg(long, env = "LARK2MD_TITLE_AS_FILENAME")]
    title_as_filename: bool,

    /// Write the renderer's output without the cleanup pass.
    #[arg(long, env = "LARK2MD_NO_FORMAT")]
    no_format: bool,

    /// Print the batch report (or conversion output) as JSON on stdout.
    #[arg(long, env = "LARK2MD_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "LARK2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "LARK2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "LARK2MD_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; per-document failures are still
    // printed by the callback.
    let to_stdout = cli.output.is_none() && cli.input.is_file();
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !to_stdout;
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

    // ── Resolve input ────────────────────────────────────────────────────
    let (dump_root, jobs) = resolve_input(&cli.input)?;
    let asset_dir = cli.assets.clone().unwrap_or_else(|| dump_root.clone());
    let sources = Sources::new(
        Arc::new(FsDocumentSource::new(&dump_root)),
        Arc::new(FsAssetSource::new(asset_dir)),
    );

    // ── Single document to stdout ────────────────────────────────────────
    if to_stdout {
        // Nowhere to put images, so placeholders stay as tokens.
        let config = build_config(&cli, None, true)?;
        let doc_id = jobs
            .first()
            .map(|j| j.doc_id.clone())
            .context("No document to convert")?;
        let output = convert(&doc_id, &sources, &config)
            .await
            .context("Conversion failed")?;

        if cli.json {
            let json =
                serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
            println!("{json}");
        } else {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(output.markdown.as_bytes())
                .context("Failed to write to stdout")?;
        }
        if !cli.quiet && !cli.json {
            eprintln!(
                "Converted {} in {}ms  ({} blocks, {} images)",
                doc_id,
                output.stats.total_duration_ms,
                output.stats.block_count,
                output.stats.image_count,
            );
        }
        return Ok(());
    }

    // ── Batch (one or many documents) to a directory ─────────────────────
    let output_dir = cli.output.clone().unwrap_or_else(|| PathBuf::from("."));
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb, cli.skip_images)?;

    let report = run_batch(jobs, &output_dir, &sources, &config).await;

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet && !show_progress {
        print_summary(&report, &output_dir);
    } else if !cli.quiet {
        eprintln!(
            "   {}ms total  →  {}",
            report.duration_ms,
            bold(&output_dir.display().to_string())
        );
    }

    if !report.is_success() {
        anyhow::bail!(
            "{} of {} documents failed",
            report.failures.len(),
            report.total
        );
    }
    Ok(())
}

/// A file becomes a one-job batch rooted at its directory; a directory is
/// walked for every dump it contains.
fn resolve_input(input: &Path) -> Result<(PathBuf, Vec<BatchJob>)> {
    if input.is_dir() {
        let jobs = discover_jobs(input)
            .with_context(|| format!("Failed to scan {}", input.display()))?;
        if jobs.is_empty() {
            anyhow::bail!("No *.json dumps found under {}", input.display());
        }
        return Ok((input.to_path_buf(), jobs));
    }

    if !input.is_file() {
        anyhow::bail!("Input not found: {}", input.display());
    }
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("Input file name is not valid UTF-8: {}", input.display()))?;
    let root = match input.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((root, vec![BatchJob::new(stem)]))
}

/// Map CLI args to `ConversionConfig`.
fn build_config(
    cli: &Cli,
    progress: Option<ProgressCallback>,
    skip_images: bool,
) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .use_html_tags(cli.html_tags)
        .max_concurrency(cli.concurrency as usize)
        .requests_per_second(cli.rps)
        .image_dir(cli.image_dir.clone())
        .skip_image_download(skip_images)
        .title_as_filename(cli.title_as_filename)
        .format_output(!cli.no_format);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Plain-text report for runs without the progress bar.
fn print_summary(report: &BatchReport, output_dir: &Path) {
    for outcome in &report.succeeded {
        eprintln!(
            "  {} {}  →  {}",
            green("✓"),
            outcome.doc_id,
            dim(&outcome.output_path.display().to_string())
        );
    }
    for failure in &report.failures {
        eprintln!("  {} {}", red("✗"), failure);
    }
    eprintln!(
        "Converted {}/{} documents in {}ms  →  {}",
        report.succeeded.len(),
        report.total,
        report.duration_ms,
        output_dir.display()
    );
}
