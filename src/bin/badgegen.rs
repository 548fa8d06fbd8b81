//! CLI binary for badgeforge.
//!
//! A thin shim over the library crate that maps CLI flags and a JSON job
//! manifest to `GenerationConfig` and prints results.

use anyhow::{Context, Result};
use badgeforge::{
    inspect_template, preview, qr, run_job, GenerationConfig, GenerationProgressCallback, JobManifest,
    JobStore, ProgressCallback, QrSourceKind, RecordError, RecordOutcome, Rgb, Role, StyleConfig,
};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::PathBuf;
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
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar for a batch. Records finish out of order, so
/// per-record timings are keyed by trimmed id, oldest start first when an id
/// repeats. Only failures get their own line.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl CliProgressCallback {
    /// Spinner until `on_job_start` reports the record count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Loading templates…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} badges  \
             ⏱ {elapsed_precise}  ETA {eta_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Generating");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, id: &str) -> f64 {
        let mut starts = self.start_times.lock().unwrap();
        let key = id.trim();
        let started = starts.get_mut(key).and_then(VecDeque::pop_front);
        if starts.get(key).is_some_and(VecDeque::is_empty) {
            starts.remove(key);
        }
        started.map(|t| t.elapsed().as_secs_f64()).unwrap_or(0.0)
    }
}

impl GenerationProgressCallback for CliProgressCallback {
    fn on_job_start(&self, job_id: &str, total_records: usize) {
        self.activate_bar(total_records);
        self.bar.println(format!(
            "{} {} {}",
            cyan("◆"),
            bold(&format!("Generating {total_records} badges…")),
            dim(&format!("job {job_id}"))
        ));
    }

    fn on_record_start(&self, id: &str) {
        self.start_times
            .lock()
            .unwrap()
            .entry(id.trim().to_string())
            .or_default()
            .push_back(Instant::now());
        self.bar.set_message(id.to_string());
    }

    fn on_record_complete(&self, id: &str, role: Role, outcome: RecordOutcome) {
        let secs = self.elapsed_secs(id);
        if outcome == RecordOutcome::Generated {
            self.bar.set_message(format!("{id} ({role}, {secs:.1}s)"));
        }
        self.bar.inc(1);
    }

    fn on_record_error(&self, error: &RecordError) {
        let secs = self.elapsed_secs(error.id());
        let msg = error.to_string();
        let msg = if msg.chars().count() > 100 {
            format!("{}\u{2026}", msg.chars().take(99).collect::<String>())
        } else {
            msg
        };
        self.bar.println(format!("  {} {}  {}", red("✗"), red(&msg), dim(&format!("{secs:.1}s"))));
        self.bar.inc(1);
    }

    fn on_job_complete(&self, generated: usize, skipped: usize, failed: usize) {
        self.bar.finish_and_clear();
        let mark = if failed == 0 {
            green("✔")
        } else if generated + skipped == 0 {
            red("✘")
        } else {
            cyan("⚠")
        };
        eprintln!(
            "{} {} generated, {} skipped, {} failed",
            mark,
            bold(&generated.to_string()),
            dim(&skipped.to_string()),
            if failed == 0 { failed.to_string() } else { red(&failed.to_string()) },
        );
    }
}

const AFTER_HELP: &str = r##"EXAMPLES:
  # Generate every badge described by a manifest
  badgegen generate event.json

  # Full regeneration into another directory, 8 at a time
  badgegen generate event.json -o out/badges -c 8 --no-incremental

  # Vector QR codes (sharp at any print size), JSON summary on stdout
  badgegen generate event.json --qr-source vector --json > summary.json

  # A single styled QR (writes ticket.png and ticket.svg)
  badgegen qr "99000000001" -o ticket --logo logo.png

  # Check a template and placement with a sample attendee
  badgegen preview event.json --role speaker -o speaker-preview.pdf

  # Page count and size of a template
  badgegen inspect templates/attendee.pdf

MANIFEST:
  {
    "templates":  { "attendee": "attendee.pdf", "staff": "staff.pdf" },
    "placements": { "attendee": { "x": 89, "y": 60, "size": 120 } },
    "records_file": "attendees.json",
    "staff_ticket_types": ["Helpers"],
    "speaker_ticket_types": ["Speakers"],
    "style": { "foreground": "#000000", "roundness": 0.85, "logo": "logo.png" }
  }
  Relative paths are resolved against the manifest's directory.

ENVIRONMENT VARIABLES:
  BADGEGEN_OUTPUT_DIR     Output directory for badges and the archive
  BADGEGEN_CONCURRENCY    Badges composed at the same time
  BADGEGEN_QR_SOURCE      raster or vector
  RUST_LOG                Overrides the log filter (e.g. badgeforge=debug)
"##;

/// Generate styled QR codes and personalised PDF event badges.
#[derive(Parser, Debug)]
#[command(
    name = "badgegen",
    version,
    about = "Generate styled QR codes and personalised PDF event badges",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "BADGEGEN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "BADGEGEN_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate one badge per record of a job manifest.
    Generate(GenerateArgs),
    /// Render a single styled QR code to PNG and SVG.
    Qr(QrArgs),
    /// Compose a sample badge to check a template and placement.
    Preview(PreviewArgs),
    /// Print page count and page size of a template PDF.
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Job manifest (JSON).
    manifest: PathBuf,

    /// Output directory; overrides the manifest.
    #[arg(short, long, env = "BADGEGEN_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Badges composed at the same time.
    #[arg(short, long, env = "BADGEGEN_CONCURRENCY",
          value_parser = clap::value_parser!(u16).range(1..=256))]
    concurrency: Option<u16>,

    /// Regenerate badges that already exist.
    #[arg(long, env = "BADGEGEN_NO_INCREMENTAL")]
    no_incremental: bool,

    /// How the QR is drawn into the PDF; overrides the manifest.
    #[arg(long, env = "BADGEGEN_QR_SOURCE", value_enum)]
    qr_source: Option<QrSourceArg>,

    /// Print the generation summary as JSON on stdout.
    #[arg(long, env = "BADGEGEN_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "BADGEGEN_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct QrArgs {
    /// Text to encode.
    data: String,

    /// Output stem; `.png` and `.svg` are appended.
    #[arg(short, long)]
    output: PathBuf,

    /// Module roundness, 0 (square) to 1 (round).
    #[arg(long, default_value_t = 0.8)]
    roundness: f64,

    #[arg(long, default_value = "#000000")]
    foreground: Rgb,

    #[arg(long, default_value = "#FFFFFF")]
    background: Rgb,

    /// Finder pattern colour; defaults to the foreground.
    #[arg(long)]
    eye: Option<Rgb>,

    /// Logo image placed at the centre.
    #[arg(long)]
    logo: Option<PathBuf>,

    /// Logo side relative to the code; capped at 0.28 of the image.
    #[arg(long, default_value_t = 0.22)]
    logo_scale: f64,

    /// Pixels per module.
    #[arg(long, default_value_t = 40)]
    cell_px: u32,

    /// Resolution stored in the PNG.
    #[arg(long, default_value_t = 300)]
    dpi: u32,
}

#[derive(Args, Debug)]
struct PreviewArgs {
    /// Job manifest (JSON).
    manifest: PathBuf,

    /// Role whose template and placement to use.
    #[arg(long, default_value = "attendee")]
    role: Role,

    /// Output PDF.
    #[arg(short, long)]
    output: PathBuf,

    #[arg(long, value_enum)]
    qr_source: Option<QrSourceArg>,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Template PDF.
    template: PathBuf,

    /// Print as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum QrSourceArg {
    Raster,
    Vector,
}

impl From<QrSourceArg> for QrSourceKind {
    fn from(v: QrSourceArg) -> Self {
        match v {
            QrSourceArg::Raster => QrSourceKind::Raster,
            QrSourceArg::Vector => QrSourceKind::Vector,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = match cli.command {
        Command::Generate(ref args) => !cli.quiet && !args.no_progress && !args.json,
        _ => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Generate(ref args) => run_generate(args, cli.quiet, show_progress).await,
        Command::Qr(ref args) => run_qr(args, cli.quiet),
        Command::Preview(ref args) => run_preview(args, cli.quiet),
        Command::Inspect(ref args) => run_inspect(args),
    }
}

async fn run_generate(args: &GenerateArgs, quiet: bool, show_progress: bool) -> Result<()> {
    let manifest = JobManifest::load(&args.manifest).context("Failed to load manifest")?;
    let request = manifest.request().context("Failed to load attendee records")?;

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new_dynamic() as Arc<dyn GenerationProgressCallback>)
    } else {
        None
    };
    let config = build_config(args, &manifest, progress_cb)?;

    let store = JobStore::new();
    let handle = store.create_job(request.records.len());
    let summary = run_job(&handle, request, &config)
        .await
        .with_context(|| format!("Badge generation failed (job {})", handle.id()))?;

    if args.json {
        let json = serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?;
        println!("{json}");
        return Ok(());
    }
    if quiet {
        return Ok(());
    }

    let job = &summary.job;
    if !show_progress {
        eprintln!(
            "Generated {} / skipped {} / failed {} of {} badges in {}ms",
            job.generated, job.skipped, job.failed, job.total_records, summary.total_duration_ms
        );
        for failure in summary.failures() {
            if let Some(ref e) = failure.error {
                eprintln!("  {} {}", red("✗"), e);
            }
        }
    }
    let per_role: Vec<String> = job
        .role_counts
        .iter()
        .map(|(role, n)| format!("{role} {n}"))
        .collect();
    if !per_role.is_empty() {
        eprintln!("   {}", dim(&per_role.join("  ·  ")));
    }
    if let Some(archive) = summary.archive() {
        eprintln!("   archive  →  {}", bold(&archive.display().to_string()));
    }
    Ok(())
}

/// Manifest first, then CLI overrides.
fn build_config(
    args: &GenerateArgs,
    manifest: &JobManifest,
    progress: Option<ProgressCallback>,
) -> Result<GenerationConfig> {
    let mut builder = manifest
        .configure(GenerationConfig::builder())
        .context("Invalid style in manifest")?;
    if let Some(ref dir) = args.output_dir {
        builder = builder.output_dir(dir);
    }
    if let Some(n) = args.concurrency {
        builder = builder.concurrency(n as usize);
    }
    if args.no_incremental {
        builder = builder.incremental(false);
    }
    if let Some(kind) = args.qr_source {
        builder = builder.qr_source(kind.into());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

fn run_qr(args: &QrArgs, quiet: bool) -> Result<()> {
    let mut style = StyleConfig::builder()
        .roundness(args.roundness)
        .foreground(args.foreground)
        .background(args.background)
        .cell_px(args.cell_px)
        .dpi(args.dpi);
    if let Some(eye) = args.eye {
        style = style.eye(eye);
    }
    if let Some(ref logo) = args.logo {
        style = style.logo_path(logo, args.logo_scale);
    }
    let style = style.build().context("Invalid QR style")?;

    let rendered = qr::render(&args.data, &style).context("QR rendering failed")?;
    let (png, svg) = rendered.save(&args.output).context("Failed to write QR files")?;
    if !quiet {
        eprintln!(
            "{} {}×{} modules  →  {}  {}",
            green("✔"),
            rendered.modules,
            rendered.modules,
            bold(&png.display().to_string()),
            bold(&svg.display().to_string()),
        );
    }
    Ok(())
}

fn run_preview(args: &PreviewArgs, quiet: bool) -> Result<()> {
    let manifest = JobManifest::load(&args.manifest).context("Failed to load manifest")?;
    let (template, placement) = manifest
        .template_for(args.role)
        .context("Nothing to preview")?;
    let style = manifest.style().context("Invalid style in manifest")?;
    let kind = args
        .qr_source
        .map(QrSourceKind::from)
        .or(manifest.qr_source)
        .unwrap_or_default();
    let text = manifest.text.clone().unwrap_or_default();

    let bytes = preview(template, placement, &style, kind, &text)
        .with_context(|| format!("Failed to compose preview on {}", template.display()))?;
    std::fs::write(&args.output, bytes)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    if !quiet {
        eprintln!(
            "{} {} preview ({}, {} QR)  →  {}",
            green("✔"),
            args.role,
            template.display(),
            kind,
            bold(&args.output.display().to_string())
        );
    }
    Ok(())
}

fn run_inspect(args: &InspectArgs) -> Result<()> {
    let info = inspect_template(&args.template).context("Failed to inspect template")?;
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&info).context("Failed to serialise template info")?
        );
    } else {
        println!("File:         {}", info.path.display());
        println!("Pages:        {}", info.page_count);
        println!("PDF Version:  {}", info.pdf_version);
        println!(
            "Page size:    {:.1} × {:.1} pt  ({:.1} × {:.1} mm)",
            info.width,
            info.height,
            info.width * 25.4 / 72.0,
            info.height * 25.4 / 72.0
        );
    }
    Ok(())
}
