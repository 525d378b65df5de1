

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use labvault::toolkit::lifecycle::SweepReport;
use labvault::{InMemoryStore, LifecycleConfig, LifecycleManager};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,labvault=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let args: Vec<String> = env::args().collect();

    let mut snapshot: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut daemon = false;
    let mut dry_run = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--snapshot" | "-s" => {
                if i + 1 < args.len() {
                    snapshot = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--daemon" => daemon = true,
            "--dry-run" => dry_run = true,
            "--help" => {
                print_help();
                return Ok(());
            }
            other => warn!("Ignoring unknown argument: {}", other),
        }
        i += 1;
    }

    let Some(snapshot) = snapshot else {
        print_help();
        bail!("--snapshot is required");
    };

    let config = LifecycleConfig::load(config_path.as_deref())
        .context("failed to load lifecycle config")?;
    let store = InMemoryStore::load_json(&snapshot)
        .with_context(|| format!("failed to load snapshot {}", snapshot.display()))?;
    let manager = LifecycleManager::new(Arc::new(store.clone()), config);

    if !daemon {
        let report = manager.sweep_expired(dry_run).await;
        finish_run(&store, &snapshot, &report)?;
        if !report.is_clean() {
            bail!("{} entity types failed to sweep", report.failed.len());
        }
        return Ok(());
    }

    let interval = manager.config().sweep_interval();
    info!("Sweeping {} every {:?}", snapshot.display(), interval);
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = manager.sweep_expired(dry_run).await;
                finish_run(&store, &snapshot, &report)?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping");
                break;
            }
        }
    }

    Ok(())
}

fn finish_run(store: &InMemoryStore, snapshot: &Path, report: &SweepReport) -> anyhow::Result<()> {
    if !report.dry_run && report.total_deleted() > 0 {
        store
            .save_json(snapshot)
            .with_context(|| format!("failed to save snapshot {}", snapshot.display()))?;
    }
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

fn print_help() {
    println!(
        r#"labvault-sweep - permanently delete records whose trash retention has run out

USAGE:
    labvault-sweep --snapshot <file.json> [OPTIONS]

OPTIONS:
    -s, --snapshot <FILE>    Store snapshot to sweep (read and rewritten in place)
    -c, --config <FILE>      TOML lifecycle config (LABVAULT_* variables also apply)
        --daemon             Keep running and sweep every sweep_interval_secs
        --dry-run            Report what is expired without deleting anything
        --help               Print this help

ENVIRONMENT:
    RUST_LOG                 Log filter (default: warn,labvault=info)
"#
    );
}
