//! Read-through facade over the snapshot store.
//!
//! A current snapshot is returned as is; freshness is the harvest schedule's
//! job. Cache misses fall through to one live provider call, bounded by a
//! timeout and never persisted. When both are empty the caller gets an
//! empty-shaped default instead of a null.

use chrono::{Local, NaiveDate};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::espn::StatsProvider;
use crate::leagues::{League, Slot};
use crate::news::{NewsItem, NewsSource, NEWS_LIMIT};
use crate::store::SnapshotStore;

/// One readable key.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Teams,
    Standings,
    /// Current scoreboard, or the one for a specific day
    Scoreboard(Option<NaiveDate>),
    Schedule,
    Summary(String),
    SummaryIndex,
    News,
}

impl Query {
    pub fn slot(&self) -> Slot {
        match self {
            Query::Teams => Slot::Teams,
            Query::Standings => Slot::Standings,
            Query::Scoreboard(None) => Slot::Scoreboard,
            Query::Scoreboard(Some(date)) => Slot::DatedScoreboard(*date),
            Query::Schedule => Slot::Schedule,
            Query::Summary(event_id) => Slot::GameSummary(event_id.clone()),
            Query::SummaryIndex => Slot::SummaryIndex,
            Query::News => Slot::News,
        }
    }

    /// Value served when neither the store nor the provider has anything.
    pub fn empty(&self) -> Value {
        match self {
            Query::Teams => json!({ "sports": [] }),
            Query::Standings | Query::Summary(_) => json!({}),
            Query::Scoreboard(_) | Query::Schedule => json!({ "events": [] }),
            Query::SummaryIndex => json!({ "event_ids": [] }),
            Query::News => json!([]),
        }
    }
}

#[derive(Clone)]
pub struct ReadThrough {
    store: SnapshotStore,
    provider: Arc<dyn StatsProvider>,
    news: Arc<dyn NewsSource>,
    live_timeout: Duration,
}

impl ReadThrough {
    pub fn new(
        store: SnapshotStore,
        provider: Arc<dyn StatsProvider>,
        news: Arc<dyn NewsSource>,
        live_timeout: Duration,
    ) -> Self {
        ReadThrough {
            store,
            provider,
            news,
            live_timeout,
        }
    }

    /// Snapshot, else live fetch, else the empty default for `query`.
    pub async fn get(&self, league: League, query: &Query) -> Value {
        if let Some(data) = self.cached(league, &query.slot()) {
            return data;
        }
        debug!("{}/{} not harvested yet, fetching live", league, query.slot());
        match self.live(league, query).await {
            Some(data) => data,
            None => query.empty(),
        }
    }

    fn cached(&self, league: League, slot: &Slot) -> Option<Value> {
        match self.store.read_data(league, slot) {
            Ok(data) => data,
            Err(e) => {
                warn!("Ignoring unreadable snapshot {}/{}: {}", league, slot, e);
                None
            }
        }
    }

    async fn live(&self, league: League, query: &Query) -> Option<Value> {
        let season = Some(league.season_year(Local::now().date_naive()));
        let fetch = async {
            match query {
                Query::Teams => self.provider.teams(league).await,
                Query::Standings => self.provider.standings(league, season).await,
                Query::Scoreboard(date) => self.provider.scoreboard(league, *date).await,
                Query::Schedule => self.provider.schedule(league, season).await,
                Query::Summary(event_id) => self.provider.game_summary(league, event_id).await,
                // the index only exists as a harvest by-product
                Query::SummaryIndex => None,
                Query::News => {
                    let items = self.news.league_news(league, NEWS_LIMIT, false).await;
                    if items.is_empty() {
                        None
                    } else {
                        serde_json::to_value(items).ok()
                    }
                }
            }
        };
        match tokio::time::timeout(self.live_timeout, fetch).await {
            Ok(data) => data,
            Err(_) => {
                warn!(
                    "Live fetch for {}/{} timed out after {:?}",
                    league,
                    query.slot(),
                    self.live_timeout
                );
                None
            }
        }
    }

    /// Flattened team objects (`sports[].leagues[].teams[].team`).
    pub async fn teams(&self, league: League) -> Vec<Value> {
        let data = self.get(league, &Query::Teams).await;
        flatten_teams(&data)
    }

    pub async fn news(&self, league: League) -> Vec<NewsItem> {
        let data = self.get(league, &Query::News).await;
        match serde_json::from_value(data) {
            Ok(items) => items,
            Err(e) => {
                warn!("Stored news for {} is not an item list: {}", league, e);
                Vec::new()
            }
        }
    }

    /// Event ids of the games summarised by the latest harvest.
    pub async fn summary_ids(&self, league: League) -> Vec<String> {
        let data = self.get(league, &Query::SummaryIndex).await;
        data["event_ids"]
            .as_array()
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| id.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Harvested payload of `slot` for every league that has one, keyed by
    /// league id. Cached data only.
    pub fn all_leagues(&self, slot: &Slot) -> Map<String, Value> {
        self.store
            .read_all_leagues(slot)
            .into_iter()
            .map(|(league, snapshot)| (league.id().to_string(), snapshot.data))
            .collect()
    }

    /// Team record, roster and statistics. Always live.
    pub async fn team_profile(
        &self,
        league: League,
        team_id: &str,
        season: Option<i32>,
    ) -> Option<Value> {
        let fetch = async {
            let detail = self.provider.team_detail(league, team_id, season).await?;
            let stats = self.provider.team_statistics(league, team_id, season).await;
            Some(json!({
                "team": detail.get("team").cloned().unwrap_or(Value::Null),
                "statistics": stats.unwrap_or(Value::Null),
            }))
        };
        tokio::time::timeout(self.live_timeout, fetch)
            .await
            .ok()
            .flatten()
    }

    /// Athlete info and season statistics. Always live; `None` only when both
    /// calls come back empty.
    pub async fn player_profile(
        &self,
        league: League,
        player_id: &str,
        season: Option<i32>,
    ) -> Option<Value> {
        let fetch = async {
            let info = self.provider.athlete_info(league, player_id, season).await;
            let stats = self
                .provider
                .player_statistics(league, player_id, season)
                .await;
            if info.is_none() && stats.is_none() {
                return None;
            }
            Some(json!({
                "athlete": info.unwrap_or_else(|| json!({ "id": player_id })),
                "statistics": stats.unwrap_or(Value::Null),
            }))
        };
        tokio::time::timeout(self.live_timeout, fetch)
            .await
            .ok()
            .flatten()
    }
}

fn flatten_teams(data: &Value) -> Vec<Value> {
    let mut teams = Vec::new();
    for sport in data["sports"].as_array().into_iter().flatten() {
        for league in sport["leagues"].as_array().into_iter().flatten() {
            for item in league["teams"].as_array().into_iter().flatten() {
                if let Some(team) = item.get("team") {
                    teams.push(team.clone());
                }
            }
        }
    }
    teams
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::espn::testing::FakeProvider;
    use crate::news::FakeNews;
    use crate::store::NoMirror;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> SnapshotStore {
        SnapshotStore::open(dir.path(), Arc::new(NoMirror)).unwrap()
    }

    fn facade(store: SnapshotStore, provider: FakeProvider) -> ReadThrough {
        ReadThrough::new(
            store,
            Arc::new(provider),
            Arc::new(FakeNews::default()),
            Duration::from_millis(500),
        )
    }

    #[tokio::test]
    async fn test_snapshot_wins_over_live() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .write(League::Nba, &Slot::Scoreboard, &json!({"events": ["cached"]}))
            .unwrap();
        let provider = FakeProvider::new().with("scoreboard:nba:today", json!({"events": ["live"]}));
        let rt = facade(store, provider);

        let data = rt.get(League::Nba, &Query::Scoreboard(None)).await;

        assert_eq!(data, json!({"events": ["cached"]}));
    }

    #[tokio::test]
    async fn test_miss_fetches_live_without_persisting() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let provider = FakeProvider::new().with("teams:nhl", json!({"sports": [1]}));
        let rt = facade(store.clone(), provider);

        assert_eq!(rt.get(League::Nhl, &Query::Teams).await, json!({"sports": [1]}));
        assert!(store.read(League::Nhl, &Slot::Teams).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dead_provider_gives_empty_event_list() {
        let dir = TempDir::new().unwrap();
        let rt = facade(store(&dir), FakeProvider::new());

        assert_eq!(
            rt.get(League::Mlb, &Query::Scoreboard(None)).await,
            json!({"events": []})
        );
        assert_eq!(rt.get(League::Mlb, &Query::Standings).await, json!({}));
        assert_eq!(rt.get(League::Mlb, &Query::News).await, json!([]));
        assert!(rt.summary_ids(League::Mlb).await.is_empty());
    }

    #[tokio::test]
    async fn test_slow_live_fetch_times_out_to_default() {
        let dir = TempDir::new().unwrap();
        let provider = FakeProvider::new()
            .with("schedule:nfl", json!({"events": [1]}))
            .delayed("schedule:nfl", Duration::from_secs(5));
        let rt = facade(store(&dir), provider);

        assert_eq!(rt.get(League::Nfl, &Query::Schedule).await, json!({"events": []}));
    }

    #[tokio::test]
    async fn test_dated_scoreboard_reads_dated_slot_first() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let day = NaiveDate::from_ymd_opt(2024, 10, 19).unwrap();
        store
            .write(League::Nba, &Slot::DatedScoreboard(day), &json!({"d": 19}))
            .unwrap();
        let provider = FakeProvider::new().with("scoreboard:nba:20241020", json!({"d": 20}));
        let rt = facade(store, provider);

        assert_eq!(rt.get(League::Nba, &Query::Scoreboard(Some(day))).await, json!({"d": 19}));
        let next = day.succ_opt().unwrap();
        assert_eq!(rt.get(League::Nba, &Query::Scoreboard(Some(next))).await, json!({"d": 20}));
    }

    #[tokio::test]
    async fn test_teams_are_flattened() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let teams = json!({"sports": [{"leagues": [{"teams": [
            {"team": {"id": "1", "abbreviation": "BOS"}},
            {"team": {"id": "2", "abbreviation": "NYK"}},
            {"other": true}
        ]}]}]});
        store.write(League::Nba, &Slot::Teams, &teams).unwrap();
        let rt = facade(store, FakeProvider::new());

        let list = rt.teams(League::Nba).await;
        assert_eq!(list.len(), 2);
        assert_eq!(list[1]["abbreviation"], "NYK");
    }

    #[tokio::test]
    async fn test_live_news_never_rewrites() {
        let dir = TempDir::new().unwrap();
        let news = Arc::new(FakeNews::default().with(League::Nhl, vec![FakeNews::item("x")]));
        let rt = ReadThrough::new(
            store(&dir),
            Arc::new(FakeProvider::new()),
            news.clone(),
            Duration::from_millis(500),
        );

        let items = rt.news(League::Nhl).await;

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "x");
        assert_eq!(*news.rewrite_flags.lock().unwrap(), vec![false]);
    }

    #[tokio::test]
    async fn test_summary_ids_and_all_leagues() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .write(League::Nfl, &Slot::SummaryIndex, &json!({"event_ids": ["7", "8"]}))
            .unwrap();
        store.write(League::Nba, &Slot::Standings, &json!({"s": "nba"})).unwrap();
        store.write(League::Mlb, &Slot::Standings, &json!({"s": "mlb"})).unwrap();
        let rt = facade(store, FakeProvider::new());

        assert_eq!(rt.summary_ids(League::Nfl).await, vec!["7", "8"]);
        let all = rt.all_leagues(&Slot::Standings);
        assert_eq!(all.len(), 2);
        assert_eq!(all["mlb"], json!({"s": "mlb"}));
    }

    #[tokio::test]
    async fn test_profiles_combine_live_calls() {
        let dir = TempDir::new().unwrap();
        let provider = FakeProvider::new()
            .with("team_detail:nba:2", json!({"team": {"id": "2"}}))
            .with("player_statistics:nba:99", json!({"splits": {}}));
        let rt = facade(store(&dir), provider);

        let team = rt.team_profile(League::Nba, "2", None).await.unwrap();
        assert_eq!(team["team"]["id"], "2");
        assert_eq!(team["statistics"], Value::Null);

        let player = rt.player_profile(League::Nba, "99", None).await.unwrap();
        assert_eq!(player["athlete"]["id"], "99");
        assert!(rt.player_profile(League::Nba, "1", None).await.is_none());
        assert!(rt.team_profile(League::Nba, "3", None).await.is_none());
    }
}
