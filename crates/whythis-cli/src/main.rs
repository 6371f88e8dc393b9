//! whythis CLI
//!
//! Command-line interface for whythis - human explanations attached to files.

use std::fmt;
use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use whythis_core::{Config, Store};

mod commands;
mod output;

use output::{Output, OutputFormat};

/// Exit status after Ctrl-C
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(name = "whythis")]
#[command(about = "whythis - Add human explanations to files")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use a specific config file
    #[arg(long = "config", global = true)]
    config_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add explanation for a file
    Add {
        /// File to explain
        file: PathBuf,
        /// Human explanation
        explanation: String,
        /// Author name (defaults to $USER, then $USERNAME)
        #[arg(long)]
        author: Option<String>,
        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,
    },
    /// Show explanation for a file
    Why {
        /// File to query
        file: PathBuf,
    },
    /// List all explained files
    #[command(alias = "ls")]
    List {
        /// Filter by comma-separated tags (any match)
        #[arg(long)]
        tags: Option<String>,
    },
    /// Search in explanations, paths and tags
    Search {
        /// Search query
        query: String,
    },
    /// Edit explanation
    Edit {
        /// File to edit
        file: PathBuf,
        /// New explanation
        #[arg(long)]
        explanation: Option<String>,
        /// New comma-separated tags (replaces existing)
        #[arg(long, conflicts_with = "clear_tags")]
        tags: Option<String>,
        /// Remove all tags
        #[arg(long)]
        clear_tags: bool,
    },
    /// Remove explanation
    #[command(alias = "remove")]
    Rm {
        /// File to remove
        file: PathBuf,
    },
    /// List all tags
    Tags,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, lock_timeout_ms, lock_poll_interval_ms, log_file)
        key: String,
        /// Configuration value
        value: String,
    },
}

/// Marker error for a run cut short by Ctrl-C
#[derive(Debug)]
struct Interrupted {
    /// A second Ctrl-C arrived before the in-flight operation finished
    forced: bool,
}

impl fmt::Display for Interrupted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.forced {
            f.write_str("Interrupted; exited without waiting, the store lock may need removing")
        } else {
            f.write_str("Interrupted")
        }
    }
}

impl std::error::Error for Interrupted {}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    match run(cli, output).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<Interrupted>().map(|i| i.forced) {
            Some(forced) => {
                output.error(&e);
                if forced {
                    // Dropping the runtime would wait for the blocking task
                    std::process::exit(i32::from(EXIT_INTERRUPTED));
                }
                ExitCode::from(EXIT_INTERRUPTED)
            }
            None => {
                output.error(&e);
                ExitCode::FAILURE
            }
        },
    }
}

async fn run(cli: Cli, output: Output) -> Result<()> {
    let config_path = cli.config_file;

    // Commands that don't need the store
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), config_path.as_ref(), &output);
    }

    let config = Config::load_with_cli_override(config_path.as_ref())
        .context("Failed to load configuration")?;
    init_logging(&config);

    let mut interrupts = interrupt_channel();
    let command = cli.command;

    // Opening the store may write it on first use, so it happens inside the
    // blocking task along with the command, where Ctrl-C is observed.
    let task = tokio::task::spawn_blocking(move || execute(command, config, &output));

    supervise(task, &mut interrupts).await
}

/// Forward every Ctrl-C into a channel
fn interrupt_channel() -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(()).await.is_err() {
                break;
            }
        }
    });
    rx
}

/// Wait for `task`, handling interrupts.
///
/// The first interrupt lets the task finish so any held lock is released;
/// a second one gives up waiting.
async fn supervise(
    mut task: JoinHandle<Result<()>>,
    interrupts: &mut mpsc::Receiver<()>,
) -> Result<()> {
    tokio::select! {
        joined = &mut task => return joined.context("Command task failed")?,
        Some(()) = interrupts.recv() => {}
    }

    debug!("Interrupt received; waiting for in-flight operation");
    tokio::select! {
        _ = &mut task => Err(Interrupted { forced: false }.into()),
        Some(()) = interrupts.recv() => {
            warn!("Second interrupt; not waiting for in-flight operation");
            Err(Interrupted { forced: true }.into())
        }
    }
}

fn execute(command: Commands, config: Config, output: &Output) -> Result<()> {
    let store = Store::open_with_config(config).context("Failed to open store")?;
    dispatch(command, &store, output)
}

fn dispatch(command: Commands, store: &Store, output: &Output) -> Result<()> {
    match command {
        Commands::Add {
            file,
            explanation,
            author,
            tags,
        } => commands::record::add(store, file, explanation, author, tags, output),
        Commands::Why { file } => commands::record::why(store, file, output),
        Commands::List { tags } => commands::record::list(store, tags, output),
        Commands::Search { query } => commands::record::search(store, query, output),
        Commands::Edit {
            file,
            explanation,
            tags,
            clear_tags,
        } => commands::record::edit(store, file, explanation, tags, clear_tags, output),
        Commands::Rm { file } => commands::record::remove(store, file, output),
        Commands::Tags => commands::tag::list(store, output),
        Commands::Config { .. } => unreachable!(), // Handled in run()
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
}

/// Initialize logging
///
/// Only initializes if WHYTHIS_LOG environment variable is set.
/// Logs to config.log_file if configured, otherwise stderr.
fn init_logging(config: &Config) {
    // Only log if WHYTHIS_LOG is set
    let Ok(log_level) = std::env::var("WHYTHIS_LOG") else {
        return;
    };

    let env_filter = EnvFilter::new(format!(
        "whythis_core={},whythis_cli={}",
        log_level, log_level
    ));

    match &config.log_file {
        Some(log_path) => {
            let log_file = match File::create(log_path) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("Warning: Could not create log file {:?}: {}", log_path, e);
                    return;
                }
            };

            // Ignore error if already initialized
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(log_file)
                .try_init();

            info!("Logging initialized to {:?}", log_path);
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_add_with_tags() {
        let cli = Cli::try_parse_from([
            "whythis",
            "add",
            "report.csv",
            "generated nightly",
            "--tags",
            "nightly,csv",
        ])
        .unwrap();

        match cli.command {
            Commands::Add {
                file,
                explanation,
                author,
                tags,
            } => {
                assert_eq!(file, PathBuf::from("report.csv"));
                assert_eq!(explanation, "generated nightly");
                assert!(author.is_none());
                assert_eq!(tags.as_deref(), Some("nightly,csv"));
            }
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn test_edit_tags_conflict_with_clear() {
        let result = Cli::try_parse_from([
            "whythis",
            "edit",
            "f",
            "--tags",
            "a",
            "--clear-tags",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["whythis", "list", "--json"]).unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::List { tags: None }));
    }

    #[test]
    fn test_interrupted_is_detectable() {
        let err: anyhow::Error = Interrupted { forced: false }.into();
        assert!(err.is::<Interrupted>());
    }

    #[tokio::test]
    async fn test_supervise_returns_task_result() {
        let (_tx, mut rx) = mpsc::channel(1);
        let task = tokio::task::spawn_blocking(|| Ok(()));
        assert!(supervise(task, &mut rx).await.is_ok());

        let task = tokio::task::spawn_blocking(|| Err(anyhow::anyhow!("boom")));
        let err = supervise(task, &mut rx).await.unwrap_err();
        assert!(!err.is::<Interrupted>());
    }

    #[tokio::test]
    async fn test_interrupt_waits_for_task() {
        let (tx, mut rx) = mpsc::channel(4);
        let (release, gate) = std::sync::mpsc::channel::<()>();
        let finished = Arc::new(AtomicBool::new(false));

        let done = Arc::clone(&finished);
        let task = tokio::task::spawn_blocking(move || {
            let _ = gate.recv_timeout(Duration::from_secs(5));
            done.store(true, Ordering::SeqCst);
            Ok(())
        });

        tx.send(()).await.unwrap();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            let _ = release.send(());
        });

        let err = supervise(task, &mut rx).await.unwrap_err();
        assert!(!err.downcast_ref::<Interrupted>().unwrap().forced);
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_second_interrupt_stops_waiting() {
        let (tx, mut rx) = mpsc::channel(4);
        let (release, gate) = std::sync::mpsc::channel::<()>();
        let task = tokio::task::spawn_blocking(move || {
            let _ = gate.recv_timeout(Duration::from_secs(5));
            Ok(())
        });

        tx.send(()).await.unwrap();
        tx.send(()).await.unwrap();

        let err = supervise(task, &mut rx).await.unwrap_err();
        assert!(err.downcast_ref::<Interrupted>().unwrap().forced);
        release.send(()).unwrap();
    }

    #[test]
    fn test_execute_opens_store_on_first_use() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = Config::with_data_dir(temp_dir.path().join("data"));
        let db = config.db_path();
        let output = Output::new(OutputFormat::Quiet);

        execute(Commands::Tags, config, &output).unwrap();
        assert!(db.exists());
    }
}
