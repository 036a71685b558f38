//! moments-worker: drains the Cloudflare Images upload queue.
//!
//! Items added to an album are queued for a copy into Cloudflare Images.
//! This daemon polls the queue in the shared SQLite database, uploads each
//! image, and rewrites the item to the new `cf:` reference.
//!
//! ## Usage
//!
//! ```bash
//! moments-worker              # Poll until Ctrl-C
//! moments-worker --once       # Process due jobs once and exit
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use moments_admin::backends::Backends;
use moments_admin::config::Config;
use moments_admin::db::Database;
use moments_admin::logging;
use moments_admin::queue::{Worker, WorkerStats};

#[derive(Default)]
struct Args {
    once: bool,
    interval: Option<u64>,
    config_path: Option<PathBuf>,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--once" | "-1" => {
                parsed.once = true;
            }
            "--interval" | "-i" => {
                if i + 1 < args.len() {
                    match args[i + 1].parse() {
                        Ok(secs) => parsed.interval = Some(secs),
                        Err(_) => {
                            eprintln!("Error: --interval expects seconds, got {}", args[i + 1]);
                            std::process::exit(1);
                        }
                    }
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    parsed.config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--version" | "-V" => {
                println!("moments-worker {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    parsed
}

fn print_help() {
    println!(
        r#"moments-worker - Cloudflare Images upload worker for moments-admin

USAGE:
    moments-worker [OPTIONS]

OPTIONS:
    --once, -1          Process due jobs once and exit
    --interval, -i N    Poll interval in seconds (default: from config, 10)
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    MOMENTS_CONFIG      Path to config file (overrides default location)
    MOMENTS_LOG         Log filter (trace, debug, info, warn, error)
    MOMENTS_DB_PATH     SQLite database path
    WEBDAV_*, PHOTOPRISM_*, CF_IMAGES_*
                        Backend settings, overriding the config file
"#
    );
}

/// One cycle on a fresh connection.
fn run_cycle(worker: &Worker, db_path: &Path) -> Result<WorkerStats> {
    let db = Database::open(db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    db.initialize().context("Failed to initialize database")?;
    let stats = worker.run_once(&db).context("Failed to process upload jobs")?;
    Ok(stats)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();

    if args.once {
        logging::init_stderr()?;
    } else {
        logging::init(None)?;
    }

    let config = match &args.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if !config.cf_images.is_configured() {
        info!("Cloudflare Images is not configured; queued jobs will be acknowledged without upload");
    }

    let poll_secs = args.interval.unwrap_or(config.worker.poll_interval_secs).max(1);
    let db_path = Arc::new(config.db_path.clone());
    let worker = Arc::new(Worker::new(
        Backends::from_config(&config),
        config.worker.clone(),
    ));

    info!(db = %db_path.display(), "moments-worker starting");

    if args.once {
        let stats = tokio::task::spawn_blocking(move || run_cycle(&worker, &db_path))
            .await
            .context("Worker task panicked")??;
        info!(?stats, "Single run complete");
        return Ok(());
    }

    info!(poll_secs, "Polling upload queue");
    let mut ticker = tokio::time::interval(Duration::from_secs(poll_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let worker = Arc::clone(&worker);
                let db_path = Arc::clone(&db_path);
                match tokio::task::spawn_blocking(move || run_cycle(&worker, &db_path)).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => error!(error = %format!("{:#}", e), "Polling cycle failed"),
                    Err(e) => error!(error = %e, "Polling cycle panicked"),
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    info!("moments-worker stopped");
    Ok(())
}
