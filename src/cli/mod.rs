//! # CLI Module
//!
//! Command-line interface for the photo archivist.
//!
//! ## Usage
//! ```bash
//! # Write a config.toml pointing at a source and an archive destination
//! photo-archivist init --source ~/Photos --dest ~/PhotoArchive
//!
//! # Run the archive pipeline against that config
//! photo-archivist run
//!
//! # Preview without touching the filesystem
//! photo-archivist run --dry-run
//!
//! # Rebuild the index directly from an existing archive
//! photo-archivist build-index
//!
//! # Show the most recent run and current index size
//! photo-archivist status
//! ```

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use photo_archivist::config::{Config, ConfigFile};
use photo_archivist::core::index::SqliteIndex;
use photo_archivist::core::pipeline::Pipeline;
use photo_archivist::error::{ArchivistError, ConfigError, Result};
use photo_archivist::events::{Event, EventChannel, EventReceiver, GroupEvent, HashEvent, OrganizeEvent, PipelineEvent};
use photo_archivist::model::RunRecord;
use std::path::PathBuf;
use std::thread;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_FILE: &str = "photox.toml";

#[derive(Parser, Debug)]
#[command(name = "photo-archivist")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a config.toml pointing at a source tree and an archive destination
    Init {
        /// Directory to scan for photos and videos
        #[arg(long)]
        source: PathBuf,
        /// Directory the archive is organized into
        #[arg(long)]
        dest: PathBuf,
        /// Where to write the config file (default: ./photox.toml)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Group, time-sort, fingerprint, and place every file under the source tree
    Run {
        #[arg(long)]
        source: Option<PathBuf>,
        #[arg(long)]
        dest: Option<PathBuf>,
        #[arg(long)]
        config: Option<PathBuf>,
        /// Report what would happen without touching the filesystem or index
        #[arg(long)]
        dry_run: bool,
    },
    /// Rebuild the index by scanning the archive directly, quarantining any
    /// within-archive duplicate it finds
    BuildIndex {
        #[arg(long)]
        dest: Option<PathBuf>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the most recent run and the current index size
    Status {
        #[arg(long)]
        dest: Option<PathBuf>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

/// Run the CLI.
pub fn run() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { source, dest, config } => cmd_init(source, dest, config),
        Commands::Run { source, dest, config, dry_run } => cmd_run(source, dest, config, dry_run),
        Commands::BuildIndex { dest, config, dry_run } => cmd_build_index(dest, config, dry_run),
        Commands::Status { dest, config } => cmd_status(dest, config),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

fn default_config_path() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_FILE)
}

fn resolve_config(
    source: Option<PathBuf>,
    dest: Option<PathBuf>,
    config_path: Option<PathBuf>,
    dry_run: bool,
) -> Result<Config> {
    let explicit = config_path.is_some();
    let path = config_path.unwrap_or_else(default_config_path);
    let file = Config::load_file(&path, explicit)?;
    Ok(Config::resolve(file, source, dest, dry_run)?)
}

fn cmd_init(source: PathBuf, dest: PathBuf, config_path: Option<PathBuf>) -> Result<()> {
    let path = config_path.unwrap_or_else(default_config_path);
    Config::write_default_file(&path, &source, &dest)?;

    let config = resolve_config(Some(source), Some(dest), Some(path.clone()), false)?;
    for dir in [
        &config.data_dir,
        &config.dup_dir,
        &config.orphan_aae_dir,
        &config.second_check_dir,
    ] {
        std::fs::create_dir_all(dir).map_err(|e| {
            ArchivistError::Config(ConfigError::WriteFailed {
                path: dir.clone(),
                reason: e.to_string(),
            })
        })?;
    }

    println!(
        "{} wrote {} ({} -> {})",
        style("✓").green().bold(),
        path.display(),
        config.source.display(),
        config.dest.display()
    );
    Ok(())
}

fn cmd_run(source: Option<PathBuf>, dest: Option<PathBuf>, config_path: Option<PathBuf>, dry_run: bool) -> Result<()> {
    let config = resolve_config(source, dest, config_path, dry_run)?;
    let pipeline = Pipeline::new(config);

    let (sender, receiver) = EventChannel::new();
    let progress = build_progress_bar();
    let event_thread = spawn_event_thread(receiver, progress.clone());

    let record = pipeline.run(&sender)?;
    drop(sender);
    let _ = event_thread.join();
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    print_summary(&record);
    Ok(())
}

fn cmd_build_index(dest: Option<PathBuf>, config_path: Option<PathBuf>, dry_run: bool) -> Result<()> {
    let config = resolve_config(None, dest, config_path, dry_run)?;
    let pipeline = Pipeline::new(config);

    let (sender, receiver) = EventChannel::new();
    let progress = build_progress_bar();
    let event_thread = spawn_event_thread(receiver, progress.clone());

    let record = pipeline.build_index(&sender)?;
    drop(sender);
    let _ = event_thread.join();
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    print_summary(&record);
    Ok(())
}

fn cmd_status(dest: Option<PathBuf>, config_path: Option<PathBuf>) -> Result<()> {
    let config = resolve_config(None, dest, config_path, false)?;

    let history_path = config.run_history_path();
    let history: Vec<RunRecord> = match std::fs::read_to_string(&history_path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
        Err(_) => Vec::new(),
    };

    println!("{}", style("Photo Archivist").bold().cyan());
    println!("  source: {}", config.source.display());
    println!("  dest:   {}", config.dest.display());

    match history.last() {
        Some(last) => {
            println!();
            println!("{}", style("Last run:").bold());
            println!("  run_id:     {}", last.run_id);
            println!("  finished:   {}", last.finished_at.to_rfc3339());
            println!("  dry_run:    {}", last.dry_run);
            print_counts(&last.counts);
        }
        None => println!("\n  no runs recorded yet"),
    }

    let index = SqliteIndex::open(&config.index_db_path())?;
    let stats = index.stats()?;
    println!();
    println!("{}", style("Index:").bold());
    println!("  entries: {}", stats.total_entries);

    Ok(())
}

fn build_progress_bar() -> Option<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("█▓░"),
    );
    Some(pb)
}

fn spawn_event_thread(receiver: EventReceiver, progress: Option<ProgressBar>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for event in receiver.iter() {
            let Some(pb) = &progress else { continue };
            match event {
                Event::Pipeline(PipelineEvent::PhaseChanged { phase }) => {
                    pb.set_message(format!("{phase}"));
                }
                Event::Group(GroupEvent::Completed { total_groups }) => {
                    pb.set_length(total_groups as u64);
                }
                Event::Hash(HashEvent::Progress(p)) => {
                    pb.set_position(p.completed as u64);
                    pb.set_message(p.current_path.file_name().unwrap_or_default().to_string_lossy().into_owned());
                }
                Event::Organize(OrganizeEvent::Progress(p)) => {
                    pb.set_length(p.total as u64);
                    pb.set_position(p.completed as u64);
                }
                _ => {}
            }
        }
    })
}

fn print_summary(record: &RunRecord) {
    println!();
    println!(
        "{} run {} complete{}",
        style("✓").green().bold(),
        record.run_id,
        if record.dry_run { style(" (dry run)").yellow().to_string() } else { String::new() }
    );
    print_counts(&record.counts);
}

fn print_counts(counts: &photo_archivist::model::RunCounts) {
    println!("  {} moved", style(counts.moved).cyan());
    println!("  {} duplicate", style(counts.duplicate).cyan());
    println!("  {} dest_duplicate", style(counts.dest_duplicate).cyan());
    println!("  {} orphan_sidecar", style(counts.orphan_sidecar).cyan());
    println!("  {} unrecognized", style(counts.unrecognized).cyan());
    println!("  {} error", style(counts.error).cyan());
}
