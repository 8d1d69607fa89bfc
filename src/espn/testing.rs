//! Scripted provider for tests.
//!
//! Responses are keyed by call signature, e.g. `teams:nba`,
//! `scoreboard:nhl:20241019`, `scoreboard:nhl:today`, `summary:nfl:401`.
//! Unscripted calls return `None`, which is how a dead provider is simulated.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::leagues::{format_date, League};

use super::provider::StatsProvider;

#[derive(Default)]
pub struct FakeProvider {
    responses: HashMap<String, Value>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.responses.insert(key.to_string(), value);
        self
    }

    /// Delay the answer to `key`, to model a slow provider.
    pub fn delayed(mut self, key: &str, delay: Duration) -> Self {
        self.delays.insert(key.to_string(), delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn respond(&self, key: String) -> Option<Value> {
        self.calls.lock().unwrap().push(key.clone());
        if let Some(delay) = self.delays.get(&key) {
            tokio::time::sleep(*delay).await;
        }
        self.responses.get(&key).cloned()
    }
}

fn season_key(season: Option<i32>) -> String {
    season.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string())
}

#[async_trait]
impl StatsProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn teams(&self, league: League) -> Option<Value> {
        self.respond(format!("teams:{league}")).await
    }

    async fn standings(&self, league: League, season: Option<i32>) -> Option<Value> {
        self.respond(format!("standings:{league}:{}", season_key(season)))
            .await
    }

    async fn scoreboard(&self, league: League, date: Option<NaiveDate>) -> Option<Value> {
        let day = date.map(format_date).unwrap_or_else(|| "today".to_string());
        self.respond(format!("scoreboard:{league}:{day}")).await
    }

    async fn schedule(&self, league: League, _season: Option<i32>) -> Option<Value> {
        self.respond(format!("schedule:{league}")).await
    }

    async fn game_summary(&self, league: League, event_id: &str) -> Option<Value> {
        self.respond(format!("summary:{league}:{event_id}")).await
    }

    async fn team_detail(
        &self,
        league: League,
        team_id: &str,
        _season: Option<i32>,
    ) -> Option<Value> {
        self.respond(format!("team_detail:{league}:{team_id}")).await
    }

    async fn team_statistics(
        &self,
        league: League,
        team_id: &str,
        _season: Option<i32>,
    ) -> Option<Value> {
        self.respond(format!("team_statistics:{league}:{team_id}"))
            .await
    }

    async fn athlete_info(
        &self,
        league: League,
        player_id: &str,
        _season: Option<i32>,
    ) -> Option<Value> {
        self.respond(format!("athlete:{league}:{player_id}")).await
    }

    async fn player_statistics(
        &self,
        league: League,
        player_id: &str,
        _season: Option<i32>,
    ) -> Option<Value> {
        self.respond(format!("player_statistics:{league}:{player_id}"))
            .await
    }
}
