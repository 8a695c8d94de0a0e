use std::sync::Arc;

use clap::Parser;
use healthwatch::{
    config::read_config_file,
    queue::MemoryQueue,
    registry::Registry,
    rollup,
    scheduler::HealthCheckScheduler,
};
use tracing::{error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("healthwatch", LevelFilter::DEBUG),
        ("healthwatch_hub", LevelFilter::TRACE),
        ("tower_http", LevelFilter::INFO),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;

    let store = config.storage.clone().unwrap_or_default().open().await?;
    let registry = Arc::new(Registry::with_builtins());
    info!(?registry, "strategy registry ready");

    config.seed_store(store.as_ref(), &registry).await?;

    let queue = Arc::new(MemoryQueue::new());
    let scheduler = Arc::new(HealthCheckScheduler::new(
        store.clone(),
        registry.clone(),
        queue.clone(),
        config.catalog()?,
    ));

    scheduler.start_consumer().await?;
    let report = scheduler.bootstrap().await?;
    info!(
        scheduled = report.scheduled,
        orphans_cancelled = report.orphans_cancelled,
        "health checks scheduled"
    );

    let rollup_worker = rollup::spawn(store.clone(), registry.clone(), config.rollup.clone());

    #[cfg(feature = "api")]
    if let Some(api_config) = config.api.clone() {
        let state = healthwatch::api::ApiState::new(store.clone(), registry.clone());
        healthwatch::api::spawn_api_server(api_config, state).await?;
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    rollup_worker.abort();
    queue.shutdown().await;
    if let Err(e) = store.close().await {
        error!("failed to close store: {e}");
    }

    Ok(())
}
