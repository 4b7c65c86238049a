use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::Parser;
use round_accounting_sv2::{
    backends::memory::MemoryStore,
    config::AccountingConfig,
    stats::StatsReader,
    utils::now_millis,
    AccountingResult, MiningMode, ShareEvent, ShareProcessor, StateStore, Track,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "round-accounting")]
#[command(about = "Replays pool share events through the round accounting engine")]
pub struct Args {
    /// Configuration file path
    #[arg(short, long)]
    pub config: PathBuf,

    /// File of share events, one JSON object per line
    #[arg(short, long)]
    pub events: PathBuf,

    /// Log level filter, overrides the configured one
    #[arg(short, long)]
    pub log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = AccountingConfig::from_file(&args.config)?;

    let level = args
        .log_level
        .clone()
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .init();

    info!("Starting round accounting for pool {}", config.pool);

    let store = Arc::new(MemoryStore::new());
    store.initialize().await?;
    let processor = ShareProcessor::new(store, config);

    let (accounted, failed) = replay(&processor, &args.events).await?;
    info!("Replayed {} events, {} failed", accounted + failed, failed);

    let config = processor.config();
    let store = processor.store();
    let stats = StatsReader::new(store.clone(), config);
    let now_secs = now_millis() / 1000;
    for track in Track::ALL {
        if track == Track::Auxiliary && !config.auxiliary_enabled {
            continue;
        }
        for mode in [MiningMode::Shared, MiningMode::Solo] {
            let summary = stats.round_summary(track, mode).await?;
            let hashrate = stats.hashrate(track, mode, now_secs).await?;
            let heights = processor.heights(track).await;
            println!(
                "{} {}: height {} (closed {}), valid {}, invalid {}, stale {}, effort {:.2}%, {} workers, {} miners, {:.0} H/s",
                track.as_str(),
                mode.as_str(),
                heights.current,
                heights.minimum,
                summary.counts.valid,
                summary.counts.invalid,
                summary.counts.stale,
                summary.effort,
                summary.workers,
                summary.miners,
                hashrate,
            );
        }
    }

    let health = store.health_check().await?;
    info!("Store health: {:?}", health);

    store.close().await?;
    info!("Round accounting shutdown complete");

    Ok(())
}

async fn replay(
    processor: &ShareProcessor<MemoryStore>,
    path: &Path,
) -> AccountingResult<(usize, usize)> {
    let reader = BufReader::new(File::open(path)?);
    let (mut accounted, mut failed) = (0, 0);

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event = match ShareEvent::from_json(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!("Skipping malformed event on line {}: {}", index + 1, e);
                failed += 1;
                continue;
            }
        };
        match processor.handle_event(&event).await {
            Ok(_) => accounted += 1,
            Err(e) => {
                error!("Event on line {} was not accounted: {}", index + 1, e);
                failed += 1;
            }
        }
    }
    Ok((accounted, failed))
}
