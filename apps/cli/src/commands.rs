//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use markbatch_core::decompress::gunzip;
use markbatch_core::{
    BatchProgress, BatchRunner, BatchSummary, ExitStatus, FileProcessor, FsObjectStore, Outcome,
    PathResolver,
};
use markbatch_markdown::{ContentFilter, MarkdownConverter, ParseMode};
use markbatch_shared::{
    AppConfig, FileRecord, FileStatus, MarkbatchError, ProcessorConfig, init_config,
    init_config_at, load_config, load_config_from,
};
use markbatch_storage::Storage;
use tracing::{error, info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// markbatch: turn stored HTML documents into clean Markdown.
#[derive(Parser)]
#[command(
    name = "markbatch",
    version,
    about = "Convert HTML documents tracked in a files table into Markdown.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.markbatch/markbatch.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file, overriding `database.path`.
    #[arg(long, env = "MARKBATCH_DATABASE", global = true)]
    pub database: Option<PathBuf>,

    /// Object store root directory, overriding `object_store.root`.
    #[arg(long, env = "MARKBATCH_STORE_ROOT", global = true)]
    pub store_root: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Convert every `ingested` record and record the outcome.
    Run,

    /// Convert a single local HTML file (optionally gzipped).
    Convert {
        /// `.html`, `.htm`, or `.gz` file to convert.
        file: PathBuf,

        /// Write Markdown here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Register source locations as `ingested` records.
    Enqueue {
        /// Locations such as `gs://bucket/docs/page.html.gz`.
        #[arg(required = true)]
        locations: Vec<String>,
    },

    /// List file records.
    List {
        /// Only show records in this status.
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Config resolution
// ---------------------------------------------------------------------------

/// Load the config file (or defaults), then apply flag and env overrides.
pub(crate) fn resolve_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) if path.exists() => load_config_from(path)?,
        Some(_) => AppConfig::default(),
        None => load_config()?,
    };

    if let Some(path) = &cli.database {
        config.database.path = path.display().to_string();
    }
    if let Some(root) = &cli.store_root {
        config.object_store.root = root.display().to_string();
    }

    config.validate()?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing. `RUST_LOG` wins, then `-v`, then `logging.level`.
pub(crate) fn init_tracing(cli: &Cli, config: &AppConfig) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => format!("markbatch={}", config.logging.level),
        1 => "markbatch=debug".to_string(),
        _ => "markbatch=trace".to_string(),
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli, config: AppConfig) -> Result<ExitCode> {
    match cli.command {
        Command::Run => cmd_run(&config).await,
        Command::Convert { file, out } => cmd_convert(&file, out.as_deref(), &config),
        Command::Enqueue { locations } => cmd_enqueue(&locations, &config).await,
        Command::List { status } => cmd_list(status.as_deref(), &config).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(cli.config.as_deref()),
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(config: &AppConfig) -> Result<ExitCode> {
    let storage = Storage::open(Path::new(&config.database.path)).await?;
    let store = FsObjectStore::new(&config.object_store.root);
    let processor = FileProcessor::new(store, &ProcessorConfig::from(config));

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping after the current record");
                cancel.store(true, Ordering::SeqCst);
            }
        });
    }

    info!(
        database = %config.database.path,
        store_root = %config.object_store.root,
        "starting batch run"
    );

    let runner = BatchRunner::new(storage, processor).with_cancel_flag(cancel);
    let progress = CliProgress::new();

    let summary = match runner.run_batch(&progress).await {
        Ok(summary) => summary,
        Err(e) => {
            progress.bar.abandon();
            error!(error = %e, "batch aborted, no records processed");
            eprintln!("Batch aborted: {e}");
            return Ok(ExitStatus::Failure.into());
        }
    };

    println!();
    println!("  Run:        {}", summary.run_id);
    println!("  Eligible:   {}", summary.total);
    println!("  Converted:  {}", summary.converted);
    println!("  Failed:     {}", summary.failed);
    if summary.skipped > 0 {
        println!("  Skipped:    {}", summary.skipped);
    }
    if summary.status_update_failures > 0 {
        println!("  Unrecorded: {}", summary.status_update_failures);
    }
    println!("  Time:       {:.1}s", summary.elapsed.as_secs_f64());
    println!();

    Ok(summary.exit_status().into())
}

fn cmd_convert(file: &Path, out: Option<&Path>, config: &AppConfig) -> Result<ExitCode> {
    let bytes = std::fs::read(file).map_err(|e| MarkbatchError::io(file, e))?;

    let compressed = file
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));
    let html = if compressed { gunzip(&bytes)? } else { bytes };

    let mode = if config.filter.strict_parsing {
        ParseMode::Strict
    } else {
        ParseMode::Tolerant
    };
    let doc = ContentFilter::new(mode).clean_bytes(&html)?;
    let markdown = MarkdownConverter::new().convert(doc)?;

    match out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| MarkbatchError::io(parent, e))?;
            }
            std::fs::write(path, &markdown).map_err(|e| MarkbatchError::io(path, e))?;
            info!(input = %file.display(), output = %path.display(), "converted file");
            println!("Wrote {}", path.display());
        }
        None => print!("{markdown}"),
    }

    Ok(ExitCode::SUCCESS)
}

async fn cmd_enqueue(locations: &[String], config: &AppConfig) -> Result<ExitCode> {
    let resolver = PathResolver::new(config.object_store.scheme.clone());
    for location in locations {
        resolver.parse(location)?;
    }

    let storage = Storage::open(Path::new(&config.database.path)).await?;
    for location in locations {
        let id = storage.insert_file(location, &FileStatus::Ingested).await?;
        info!(id, %location, "enqueued");
        println!("  #{id:<6} {location}");
    }

    Ok(ExitCode::SUCCESS)
}

async fn cmd_list(status: Option<&str>, config: &AppConfig) -> Result<ExitCode> {
    let path = Path::new(&config.database.path);
    if !path.exists() {
        return Err(eyre!(
            "no database at '{}'; run `markbatch enqueue` first",
            path.display()
        ));
    }

    let storage = Storage::open_readonly(path).await?;
    let records = match status {
        Some(s) => storage.list_files_by_status(&FileStatus::from(s)).await?,
        None => storage.list_files().await?,
    };

    for record in &records {
        println!(
            "{:>6}  {:<10}  {}  {}",
            record.id,
            record.status,
            record.updated_at.format("%Y-%m-%d %H:%M:%S"),
            record.source_location
        );
    }

    let counts = storage.count_by_status().await?;
    if !counts.is_empty() {
        let parts: Vec<String> = counts
            .iter()
            .map(|(status, count)| format!("{status}: {count}"))
            .collect();
        println!();
        println!("  {}", parts.join(", "));
    }

    Ok(ExitCode::SUCCESS)
}

fn cmd_config_init(path: Option<&Path>) -> Result<ExitCode> {
    let path = match path {
        Some(path) => {
            init_config_at(path)?;
            path.to_path_buf()
        }
        None => init_config()?,
    };
    println!("Config initialized at: {}", path.display());
    Ok(ExitCode::SUCCESS)
}

fn cmd_config_show(config: &AppConfig) -> Result<ExitCode> {
    println!("{}", config.to_toml()?);
    Ok(ExitCode::SUCCESS)
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Batch progress bar using indicatif.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { bar }
    }
}

impl BatchProgress for CliProgress {
    fn started(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_message("Converting");
    }

    fn record_finished(&self, record: &FileRecord, outcome: &Outcome) {
        if let Outcome::Failed(failure) = outcome {
            self.bar
                .println(format!("  failed #{} {}: {failure}", record.id, record.source_location));
        }
        self.bar.set_message(record.source_location.clone());
        self.bar.inc(1);
    }

    fn done(&self, _summary: &BatchSummary) {
        self.bar.finish_and_clear();
    }
}
