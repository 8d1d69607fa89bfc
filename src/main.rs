use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

mod cache;
mod config;
mod dashboard;
mod db;
mod error;
mod espn;
mod harvest;
mod leagues;
mod news;
mod store;

use cache::ReadThrough;
use config::{Command, Config, HarvestArgs, ServeArgs};
use dashboard::AppState;
use db::Database;
use espn::{EspnClient, StatsProvider};
use harvest::{spawn_schedule, Harvester};
use news::{EspnNews, NewsSource, OpenAiRewriter, Passthrough, Rewriter};
use store::{NoMirror, SnapshotMirror, SnapshotStore};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    // Initialise tracing / logging
    let default_level = if config.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    config.validate()?;

    // Storage: JSON snapshots, optionally mirrored into SQLite
    std::fs::create_dir_all(&config.data_dir)?;
    let db = if config.sqlite {
        let db = Database::open(config.mirror_path())?;
        info!("SQLite mirror enabled: {}", config.mirror_path().display());
        Some(db)
    } else {
        None
    };
    let mirror: Arc<dyn SnapshotMirror> = match &db {
        Some(db) => Arc::new(db.clone()),
        None => Arc::new(NoMirror),
    };
    let store = SnapshotStore::open(&config.data_dir, mirror)?;
    info!("Snapshot store: {}", store.data_dir().display());

    // Providers are built once and shared by every harvest and request
    let provider: Arc<dyn StatsProvider> = Arc::new(EspnClient::new(config.espn())?);
    let rewriter: Arc<dyn Rewriter> = match &config.openai_api_key {
        Some(key) => Arc::new(OpenAiRewriter::new(
            &config.openai_base_url,
            key.clone(),
            &config.openai_model,
            config.request_timeout(),
        )?),
        None => Arc::new(Passthrough),
    };
    let news: Arc<dyn NewsSource> = Arc::new(EspnNews::new(
        &config.rss_base_url,
        config.request_timeout(),
        rewriter,
    )?);

    let harvester = Arc::new(Harvester::new(provider.clone(), news.clone(), store.clone()));

    match &config.command {
        Command::Harvest(args) => run_harvest(&harvester, args).await,
        Command::Serve(args) => {
            let cache = ReadThrough::new(
                store,
                provider,
                news,
                Duration::from_secs(args.live_timeout_secs),
            );
            serve(harvester, cache, db, args).await
        }
    }
}

async fn run_harvest(harvester: &Harvester, args: &HarvestArgs) -> Result<()> {
    if args.event.is_some() && !args.types.contains(&leagues::DataType::GameSummary) {
        warn!("--event only applies with --types game_summary");
    }

    let report = harvester.run(&args.request()).await;

    if report.is_partial() {
        for failure in report.failures() {
            warn!("  Failed: {}/{} {:?}", failure.league, failure.data_type, failure.status);
        }
    }
    info!(
        "Done. Saved {} record(s) under {}",
        report.saved,
        harvester.store().data_dir().display()
    );
    Ok(())
}

async fn serve(
    harvester: Arc<Harvester>,
    cache: ReadThrough,
    mirror: Option<Database>,
    args: &ServeArgs,
) -> Result<()> {
    let schedule = spawn_schedule(
        harvester.clone(),
        args.request(),
        args.interval(),
        !args.no_startup_harvest,
    );

    let state = AppState {
        cache,
        harvester,
        harvest_request: args.request(),
        mirror,
    };
    let app = dashboard::router(state);
    let addr: SocketAddr = args.addr.parse()?;
    info!("Stats API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Run the API server (blocks until Ctrl-C)
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutting down");
        })
        .await?;

    schedule.abort();
    Ok(())
}
