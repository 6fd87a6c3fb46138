use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use meshstore_core::config::Config;
use meshstore_core::core_data::payloads::{builtin_registry, register_builtin_decoders};
use meshstore_core::core_data::{
    Clock, FileSnapshotPersistence, PayloadCodec, SnapshotPersistence, SnapshotSaver, StorageService, SystemClock,
    TtlReaper,
};
use meshstore_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use meshstore_core::shutdown::{install_signal_handlers, ShutdownCoordinator};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "meshstore")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a standalone node until interrupted
    Run {
        /// TOML config file; defaults plus MESHSTORE_* overrides otherwise
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Summarize the snapshots in a data directory
    Inspect {
        #[arg(long)]
        data_dir: PathBuf,

        /// Print one JSON object per type instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Write the default configuration to a file
    InitConfig {
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}

fn codec() -> PayloadCodec {
    let mut codec = PayloadCodec::new(builtin_registry());
    register_builtin_decoders(&mut codec);
    codec
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            let path = expand_path(path);
            Config::from_file(&path).with_context(|| format!("loading {}", path.display()))?
        }
        None => Config::from_env().context("reading MESHSTORE_* environment")?,
    };
    Ok(config)
}

fn init_logging(args: &Args, config: Option<&Config>) -> Result<()> {
    let mut log_config = match config {
        Some(config) => LogConfig::from_config(&config.logging)?,
        None => LogConfig::default(),
    };

    if let Some(level) = &args.log_level {
        log_config.level = LogLevel::from_str(level).unwrap_or_else(|| {
            eprintln!("Invalid log level '{}', using 'info'", level);
            LogLevel::Info
        });
    }
    if args.json_logs {
        log_config.json_format = true;
    }

    init_logging_with_config(log_config)?;
    Ok(())
}

async fn run(config: Config) -> Result<()> {
    if config.metrics.enabled {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(config.metrics.bind_address)
            .install()
            .context("installing Prometheus exporter")?;
        info!(address = %config.metrics.bind_address, "Prometheus exporter listening");
    }
    meshstore_core::metrics::init_metrics();

    let mut builder = StorageService::builder(builtin_registry()).with_max_map_size(config.store.max_map_size);
    for (type_name, keys) in config.privileged_keys()? {
        builder = builder.with_privileged_keys(type_name, keys);
    }
    let service = Arc::new(builder.build());

    let persistence: Arc<dyn SnapshotPersistence> =
        Arc::new(FileSnapshotPersistence::new(&config.store.data_dir, Arc::new(codec()))?);
    let restored = service.load_from(persistence.as_ref()).await?;
    info!(
        data_dir = %config.store.data_dir.display(),
        restored,
        types = service.registry().len(),
        "Node started"
    );

    let coordinator = Arc::new(ShutdownCoordinator::new(Duration::from_secs(30)));

    if config.reaper.enabled {
        let reaper = TtlReaper::new(Arc::clone(&service), config.reaper.interval);
        coordinator.register("ttl-reaper", reaper.spawn(coordinator.subscribe())).await;
    } else {
        warn!("TTL reaper disabled, expired entries stay until restart");
    }

    let saver = SnapshotSaver::new(Arc::clone(&service), persistence, config.store.snapshot_interval);
    coordinator.register("snapshot-saver", saver.spawn(coordinator.subscribe())).await;

    install_signal_handlers(Arc::clone(&coordinator));
    coordinator.wait_until_complete().await;

    info!(entries = service.len(), "Node stopped");
    Ok(())
}

#[derive(Debug, Serialize)]
struct TypeSummary {
    type_name: String,
    live: usize,
    removed: usize,
    expired: usize,
}

async fn inspect(data_dir: PathBuf, json: bool) -> Result<()> {
    let persistence = FileSnapshotPersistence::new(&data_dir, Arc::new(codec()))?;
    let now = SystemClock.now_millis();

    let mut summaries = Vec::new();
    for type_name in persistence.list_snapshots()? {
        let entries = persistence.load_snapshot(&type_name).await?;
        let expired = entries.iter().filter(|e| e.is_expired(now)).count();
        let removed = entries.iter().filter(|e| e.is_tombstone() && !e.is_expired(now)).count();
        let live = entries.len() - expired - removed;
        summaries.push(TypeSummary { type_name, live, removed, expired });
    }

    if json {
        for summary in &summaries {
            println!("{}", serde_json::to_string(summary)?);
        }
        return Ok(());
    }

    if summaries.is_empty() {
        println!("No snapshots in {}", data_dir.display());
        return Ok(());
    }

    println!("{:<20} {:>8} {:>8} {:>8}", "type", "live", "removed", "expired");
    for s in summaries {
        println!("{:<20} {:>8} {:>8} {:>8}", s.type_name, s.live, s.removed, s.expired);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match &args.command {
        Command::Run { config, data_dir } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(dir) = data_dir {
                config.store.data_dir = expand_path(dir);
            }
            init_logging(&args, Some(&config))?;
            run(config).await
        }
        Command::Inspect { data_dir, json } => {
            init_logging(&args, None)?;
            inspect(expand_path(data_dir), *json).await
        }
        Command::InitConfig { output } => {
            init_logging(&args, None)?;
            Config::default().save_to_file(output)?;
            info!(path = %output.display(), "Wrote default configuration");
            Ok(())
        }
    }
}
