//! Harvest orchestration: turns a [`HarvestRequest`] into provider calls and
//! snapshot writes.
//!
//! Leagues × data types are processed as an independent cross product. A
//! missing payload or a failed write for one pair is recorded in the
//! [`HarvestReport`] and the run moves on to the next pair.

pub mod scheduler;

pub use scheduler::{run_detached, spawn_schedule};

use chrono::{DateTime, Days, Local, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::HarvestError;
use crate::espn::{fetch_scoreboard_range, fetch_summaries_from_scoreboard, StatsProvider};
use crate::leagues::{DataType, League, Slot};
use crate::news::{NewsSource, NEWS_LIMIT};
use crate::store::SnapshotStore;

/// What to harvest. Ephemeral; built per run by the CLI, the timer or the
/// HTTP trigger.
#[derive(Debug, Clone)]
pub struct HarvestRequest {
    pub leagues: Vec<League>,
    pub data_types: Vec<DataType>,
    /// Target date for scoreboards and summary discovery (default: today)
    pub date: Option<NaiveDate>,
    /// Explicit season; resolved per league when absent
    pub season: Option<i32>,
    /// Extra days after `date` to fetch scoreboards for (0 = single day)
    pub days: u32,
    /// Harvest exactly this game instead of discovering games
    pub event_id: Option<String>,
    /// Bound on discovered game summaries per league
    pub max_items: usize,
    pub rewrite: bool,
}

impl Default for HarvestRequest {
    fn default() -> Self {
        HarvestRequest {
            leagues: League::ALL.to_vec(),
            data_types: vec![DataType::Teams, DataType::Standings, DataType::Scoreboard],
            date: None,
            season: None,
            days: 0,
            event_id: None,
            max_items: 10,
            rewrite: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Number of current records written
    Saved(usize),
    /// Nothing to write, and that is not a failure (e.g. a quiet news feed)
    Empty,
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct HarvestOutcome {
    pub league: League,
    pub data_type: DataType,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

/// Aggregate result of one run.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub saved: usize,
    pub outcomes: Vec<HarvestOutcome>,
}

impl HarvestReport {
    pub fn failures(&self) -> Vec<&HarvestOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, OutcomeStatus::Failed(_)))
            .collect()
    }

    /// Some pairs failed. Other pairs may still have been saved.
    pub fn is_partial(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| matches!(o.status, OutcomeStatus::Failed(_)))
    }
}

/// Shared harvest entry point for the CLI, the timer and the HTTP trigger.
///
/// Holds no lock across a run: two concurrent runs interleave freely and the
/// store's per-key atomic writes decide the final state.
pub struct Harvester {
    provider: Arc<dyn StatsProvider>,
    news: Arc<dyn NewsSource>,
    store: SnapshotStore,
}

impl Harvester {
    pub fn new(
        provider: Arc<dyn StatsProvider>,
        news: Arc<dyn NewsSource>,
        store: SnapshotStore,
    ) -> Self {
        Harvester {
            provider,
            news,
            store,
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub async fn run(&self, req: &HarvestRequest) -> HarvestReport {
        self.run_at(req, Local::now().date_naive()).await
    }

    /// Run with an explicit "today", which drives season resolution and the
    /// default scoreboard date.
    pub async fn run_at(&self, req: &HarvestRequest, today: NaiveDate) -> HarvestReport {
        let started_at = Utc::now();
        info!(
            "Harvest started via {}: leagues={:?} types={:?}",
            self.provider.name(),
            req.leagues,
            req.data_types
        );

        let mut outcomes = Vec::new();
        let mut saved = 0;

        for &league in &req.leagues {
            for data_type in DataType::ORDERED
                .into_iter()
                .filter(|t| req.data_types.contains(t))
            {
                let status = match self.harvest_pair(league, data_type, req, today).await {
                    Ok(status) => status,
                    Err(e) => {
                        error!("{}/{}: {}", league, data_type, e);
                        OutcomeStatus::Failed(e.to_string())
                    }
                };
                match &status {
                    OutcomeStatus::Saved(n) => saved += n,
                    OutcomeStatus::Empty => info!("{}/{}: nothing to save", league, data_type),
                    OutcomeStatus::Failed(reason) => {
                        warn!("{}/{} failed: {}", league, data_type, reason)
                    }
                }
                outcomes.push(HarvestOutcome {
                    league,
                    data_type,
                    status,
                });
            }
        }

        let report = HarvestReport {
            started_at,
            finished_at: Utc::now(),
            saved,
            outcomes,
        };
        info!(
            "Harvest finished: {} record(s) saved, {} failure(s) in {}ms",
            report.saved,
            report.failures().len(),
            (report.finished_at - report.started_at).num_milliseconds()
        );
        report
    }

    async fn harvest_pair(
        &self,
        league: League,
        data_type: DataType,
        req: &HarvestRequest,
        today: NaiveDate,
    ) -> Result<OutcomeStatus, HarvestError> {
        let season = req.season.unwrap_or_else(|| league.season_year(today));
        let date = req.date.unwrap_or(today);

        match data_type {
            DataType::Teams => {
                let data = self.provider.teams(league).await;
                self.save_single(league, Slot::Teams, data).await
            }
            DataType::Standings => {
                let data = self.provider.standings(league, Some(season)).await;
                self.save_single(league, Slot::Standings, data).await
            }
            DataType::Schedule => {
                let data = self.provider.schedule(league, Some(season)).await;
                self.save_single(league, Slot::Schedule, data).await
            }
            DataType::Scoreboard if req.days == 0 => {
                let Some(data) = self.provider.scoreboard(league, Some(date)).await else {
                    return Ok(self.no_data());
                };
                self.store
                    .save(league, Slot::DatedScoreboard(date), data.clone())
                    .await?;
                self.store.save(league, Slot::Scoreboard, data).await?;
                Ok(OutcomeStatus::Saved(2))
            }
            DataType::Scoreboard => {
                let end = date
                    .checked_add_days(Days::new(u64::from(req.days)))
                    .unwrap_or(date);
                let days = fetch_scoreboard_range(self.provider.as_ref(), league, date, end).await;
                let Some((latest_day, latest)) = days.last() else {
                    return Ok(OutcomeStatus::Failed(format!(
                        "no scoreboard for any day {date}..={end}"
                    )));
                };
                for (day, data) in &days {
                    self.store
                        .save(league, Slot::DatedScoreboard(*day), data.clone())
                        .await?;
                }
                self.store.save(league, Slot::Scoreboard, latest.clone()).await?;
                info!(
                    "{}: {} day(s) of scoreboards, current = {}",
                    league,
                    days.len(),
                    latest_day
                );
                Ok(OutcomeStatus::Saved(days.len() + 1))
            }
            DataType::GameSummary => match &req.event_id {
                Some(event_id) => {
                    let data = self.provider.game_summary(league, event_id).await;
                    self.save_single(league, Slot::GameSummary(event_id.clone()), data)
                        .await
                }
                None => self.harvest_summaries(league, date, req.max_items).await,
            },
            DataType::News => {
                let items = self.news.league_news(league, NEWS_LIMIT, req.rewrite).await;
                if items.is_empty() {
                    return Ok(OutcomeStatus::Empty);
                }
                self.store
                    .save(league, Slot::News, serde_json::to_value(&items)?)
                    .await?;
                Ok(OutcomeStatus::Saved(1))
            }
        }
    }

    async fn harvest_summaries(
        &self,
        league: League,
        date: NaiveDate,
        max_items: usize,
    ) -> Result<OutcomeStatus, HarvestError> {
        let Some(fan_out) =
            fetch_summaries_from_scoreboard(self.provider.as_ref(), league, Some(date), max_items)
                .await
        else {
            return Ok(OutcomeStatus::Failed(
                "no scoreboard to discover games from".to_string(),
            ));
        };

        let mut event_ids = Vec::with_capacity(fan_out.summaries.len());
        for (event_id, summary) in fan_out.summaries {
            self.store
                .save(league, Slot::GameSummary(event_id.clone()), summary)
                .await?;
            event_ids.push(event_id);
        }
        if event_ids.is_empty() {
            return Ok(OutcomeStatus::Empty);
        }

        let index = serde_json::json!({ "event_ids": event_ids });
        self.store.save(league, Slot::SummaryIndex, index).await?;
        Ok(OutcomeStatus::Saved(event_ids.len() + 1))
    }

    async fn save_single(
        &self,
        league: League,
        slot: Slot,
        data: Option<serde_json::Value>,
    ) -> Result<OutcomeStatus, HarvestError> {
        match data {
            Some(data) => {
                self.store.save(league, slot, data).await?;
                Ok(OutcomeStatus::Saved(1))
            }
            None => Ok(self.no_data()),
        }
    }

    fn no_data(&self) -> OutcomeStatus {
        OutcomeStatus::Failed(format!("no data from {}", self.provider.name()))
    }
}
