use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

use super::{HarvestReport, HarvestRequest, Harvester};

/// Run `request` every `interval` on its own task.
///
/// With `run_at_startup` the first run starts immediately, otherwise after one
/// interval. A run that overruns the interval makes the missed ticks collapse
/// into one; runs never overlap with themselves but may overlap with
/// on-demand runs.
pub fn spawn_schedule(
    harvester: Arc<Harvester>,
    request: HarvestRequest,
    interval: Duration,
    run_at_startup: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Harvest schedule started (interval={:?}, types={:?})",
            interval, request.data_types
        );

        let start = if run_at_startup {
            tokio::time::Instant::now()
        } else {
            tokio::time::Instant::now() + interval
        };
        let mut ticker = tokio::time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let report = harvester.run(&request).await;
            info!(
                "Scheduled harvest saved {} record(s), {} failure(s)",
                report.saved,
                report.failures().len()
            );
        }
    })
}

/// Start a one-off harvest on its own task and wait for it.
///
/// The run is detached from the caller: if the caller goes away (e.g. an HTTP
/// client disconnects) the harvest still runs to completion.
pub async fn run_detached(
    harvester: Arc<Harvester>,
    request: HarvestRequest,
) -> Result<HarvestReport, tokio::task::JoinError> {
    tokio::spawn(async move { harvester.run(&request).await }).await
}
