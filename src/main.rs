//! filedeck - run long file operations in the background with progress.
//!
//! Usage:
//!   filedeck search ROOT PATTERN      Find entries by name (wildcards)
//!   filedeck zip ARCHIVE INPUT...     Pack inputs into a ZIP archive
//!   filedeck unzip ARCHIVE DEST       Extract a ZIP archive
//!   filedeck copy DEST INPUT...       Copy inputs into a directory
//!   filedeck move DEST INPUT...       Move inputs into a directory
//!   filedeck --help                   Show help
//!
//! Press Ctrl-C to cancel the running operation.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result};
use tracing_subscriber::EnvFilter;

use filedeck_core::{ArchiveCompression, CollisionPolicy, Task, WorkerConfig};
use filedeck_tasks::{
    start_paste, Clipboard, ClipboardMode, ProgressEvent, TabId, TaskDispatcher, TaskEvent,
    TaskHandle, TaskOutput, TransferSummary, POLL_INTERVAL_MS,
};

#[derive(Parser)]
#[command(
    name = "filedeck",
    version,
    about = "Background file operations with progress and cancellation",
    long_about = "filedeck runs searches, archive creation and extraction, and bulk \
                  copy/move on a background worker, reporting progress as it goes.\n\n\
                  Press Ctrl-C to cancel the running operation."
)]
struct Cli {
    /// Worker configuration file (defaults to <config dir>/filedeck/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// What to do when a destination name is taken
    #[arg(long, global = true, value_enum)]
    on_collision: Option<CollisionArg>,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Do not show progress
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Find files and directories whose name matches a wildcard pattern
    Search {
        /// Directory to search
        root: PathBuf,

        /// Case-insensitive pattern with `*` and `?`
        pattern: String,

        /// Stop after this many matches
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Create a ZIP archive
    Zip {
        /// Archive file to create
        archive: PathBuf,

        /// Files and directories to add
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Store entries without compression
        #[arg(long)]
        store: bool,
    },

    /// Extract a ZIP archive
    Unzip {
        /// Archive to extract
        archive: PathBuf,

        /// Directory to extract into
        destination: PathBuf,
    },

    /// Copy files and directories into a directory
    Copy {
        /// Target directory
        destination: PathBuf,

        /// Items to copy
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Move files and directories into a directory
    Move {
        /// Target directory
        destination: PathBuf,

        /// Items to move
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CollisionArg {
    /// Write to "name (1).ext", "name (2).ext", ...
    Rename,
    /// Leave the existing item and record an error
    Skip,
    /// Replace the existing item
    Overwrite,
}

impl From<CollisionArg> for CollisionPolicy {
    fn from(arg: CollisionArg) -> Self {
        match arg {
            CollisionArg::Rename => Self::AutoRename,
            CollisionArg::Skip => Self::Skip,
            CollisionArg::Overwrite => Self::Overwrite,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    init_tracing();

    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(policy) = cli.on_collision {
        config.collision_policy = policy.into();
    }
    match &cli.command {
        Command::Search {
            limit: Some(limit), ..
        } => config.max_search_results = (*limit).max(1),
        Command::Zip { store: true, .. } => config.compression = ArchiveCompression::Stored,
        _ => {}
    }

    let dispatcher = TaskDispatcher::new(config);
    let show_progress = !cli.quiet && std::io::stderr().is_terminal();

    let terminal = match cli.command {
        Command::Search { root, pattern, .. } => {
            let task = Task::search(absolute(&root)?, pattern);
            let mut handle = dispatcher.submit(task).context("Search rejected")?;
            drive(&mut handle, show_progress).await?
        }
        Command::Zip {
            archive, inputs, ..
        } => {
            let task = Task::zip_create(absolute_all(&inputs)?, absolute(&archive)?);
            let mut handle = dispatcher.submit(task).context("Archive creation rejected")?;
            drive(&mut handle, show_progress).await?
        }
        Command::Unzip {
            archive,
            destination,
        } => {
            let task = Task::zip_extract(absolute(&archive)?, absolute(&destination)?);
            let mut handle = dispatcher.submit(task).context("Extraction rejected")?;
            drive(&mut handle, show_progress).await?
        }
        Command::Copy {
            destination,
            inputs,
        } => paste(&dispatcher, ClipboardMode::Copy, &destination, &inputs, show_progress).await?,
        Command::Move {
            destination,
            inputs,
        } => paste(&dispatcher, ClipboardMode::Cut, &destination, &inputs, show_progress).await?,
    };

    report(&terminal, cli.format)
}

/// Log to stderr, filtered by `RUST_LOG` (warnings and up by default).
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Load the worker configuration.
///
/// An explicit `--config` file must exist; the default location is optional.
fn load_config(explicit: Option<&Path>) -> Result<WorkerConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match dirs::config_dir().map(|d| d.join("filedeck").join("config.toml")) {
            Some(path) if path.exists() => path,
            _ => return Ok(WorkerConfig::default()),
        },
    };

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config: WorkerConfig = toml::from_str(&content)
        .with_context(|| format!("Invalid config {}", path.display()))?;
    tracing::debug!(path = %path.display(), "loaded worker config");
    Ok(config.sanitized())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("Invalid path {}", path.display()))
}

fn absolute_all(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    paths.iter().map(|p| absolute(p)).collect()
}

/// Copy or cut `inputs` through the shared clipboard and paste them.
async fn paste(
    dispatcher: &TaskDispatcher,
    mode: ClipboardMode,
    destination: &Path,
    inputs: &[PathBuf],
    show_progress: bool,
) -> Result<TaskEvent> {
    let clipboard = Clipboard::global();
    clipboard.set(absolute_all(inputs)?, mode, TabId::default());

    let (mut handle, pending) =
        start_paste(dispatcher, clipboard, &absolute(destination)?).context("Paste rejected")?;
    let terminal = drive(&mut handle, show_progress).await?;
    if pending.settle(clipboard, &terminal) {
        tracing::debug!("clipboard cleared after move");
    }
    Ok(terminal)
}

/// Poll `handle` every tick until its terminal event, cancelling on Ctrl-C.
async fn drive(handle: &mut TaskHandle, show_progress: bool) -> Result<TaskEvent> {
    let mut ticker = tokio::time::interval(Duration::from_millis(POLL_INTERVAL_MS));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancel_sent = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let mut latest = None;
                for event in handle.poll() {
                    if event.is_terminal() {
                        if show_progress {
                            eprint!("\r\x1b[2K");
                        }
                        return Ok(event);
                    }
                    latest = Some(event);
                }
                if let (true, Some(event)) = (show_progress, latest) {
                    eprint!("\r\x1b[2K{}", progress_line(event.snapshot()));
                }
            }
            signal = &mut ctrl_c, if !cancel_sent => {
                signal.context("Failed to listen for Ctrl-C")?;
                cancel_sent = true;
                if handle.cancel() {
                    eprintln!("\nCancelling...");
                }
            }
        }
    }
}

fn progress_line(event: &ProgressEvent) -> String {
    let count = match (event.total_estimate, event.percentage()) {
        (Some(total), Some(pct)) => format!("[{}/{} {:>3.0}%]", event.processed_count, total, pct),
        _ => format!("[{}]", event.processed_count),
    };
    let path = event
        .current_path
        .as_deref()
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    truncate(&format!("{} {} {}", count, event.message, path), 100)
}

/// Print the outcome and pick the exit code.
fn report(terminal: &TaskEvent, format: OutputFormat) -> Result<ExitCode> {
    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(terminal)?);
    }

    match terminal {
        TaskEvent::Completed { output, .. } => {
            if let OutputFormat::Text = format {
                match output {
                    TaskOutput::Search(result) => {
                        for path in &result.paths {
                            println!("{}", path.display());
                        }
                        eprintln!("{}", result.summary());
                    }
                    TaskOutput::Transfer(summary) => print_transfer(summary),
                }
            }
            let clean = match output {
                TaskOutput::Search(_) => true,
                TaskOutput::Transfer(summary) => summary.is_success(),
            };
            Ok(if clean { ExitCode::SUCCESS } else { ExitCode::from(2) })
        }
        TaskEvent::Cancelled { snapshot } => {
            eprintln!("Cancelled after {} items", snapshot.processed_count);
            Ok(ExitCode::from(130))
        }
        TaskEvent::Failed { failure, .. } => {
            eprintln!("Failed: {failure}");
            eprintln!("  {}", failure.message);
            Ok(ExitCode::FAILURE)
        }
        TaskEvent::Progress(_) => Ok(ExitCode::FAILURE),
    }
}

fn print_transfer(summary: &TransferSummary) {
    println!(
        "{} ({})",
        summary.summary(),
        format_size(summary.bytes_processed)
    );
    for (intended, actual) in &summary.renamed {
        println!("  renamed {} -> {}", intended.display(), actual.display());
    }
    for name in &summary.duplicates_skipped {
        println!("  duplicate skipped {name}");
    }
    for error in &summary.errors {
        eprintln!("  {}: {}", error.kind, error);
    }
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Truncate a string to max length.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max_len - 1).collect();
        out.push('…');
        out
    }
}
