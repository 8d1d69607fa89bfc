use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

use crate::leagues::League;

/// Trait every stats data provider must implement.
///
/// Each method performs exactly one external call. Expected failures
/// (transport, timeout, non-2xx, malformed body) come back as `None`; the
/// caller decides whether absence matters.
#[async_trait]
pub trait StatsProvider: Send + Sync {
    async fn teams(&self, league: League) -> Option<Value>;

    async fn standings(&self, league: League, season: Option<i32>) -> Option<Value>;

    /// Scoreboard for `date`, or the provider's "today" when `None`.
    async fn scoreboard(&self, league: League, date: Option<NaiveDate>) -> Option<Value>;

    async fn schedule(&self, league: League, season: Option<i32>) -> Option<Value>;

    async fn game_summary(&self, league: League, event_id: &str) -> Option<Value>;

    /// Team record and roster. Live only, never harvested.
    async fn team_detail(&self, league: League, team_id: &str, season: Option<i32>)
        -> Option<Value>;

    async fn team_statistics(
        &self,
        league: League,
        team_id: &str,
        season: Option<i32>,
    ) -> Option<Value>;

    async fn athlete_info(&self, league: League, player_id: &str, season: Option<i32>)
        -> Option<Value>;

    async fn player_statistics(
        &self,
        league: League,
        player_id: &str,
        season: Option<i32>,
    ) -> Option<Value>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}
