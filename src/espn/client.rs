use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Datelike, Local, NaiveDate};
use rand::Rng;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::leagues::{format_date, League};

use super::provider::StatsProvider;

/// Rows requested from the scoreboard listing when it stands in for a schedule.
const SCHEDULE_LIMIT: &str = "100";
/// ESPN season type for the regular season.
const REGULAR_SEASON_TYPE: u32 = 2;

/// Why a single provider call produced no data. Never leaves the adapter:
/// it is logged and turned into `None`.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("transport error for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("malformed JSON from {url}: {source}")]
    Malformed {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Transport { .. } => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Malformed { .. } => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EspnClientConfig {
    /// Site API root, e.g. `https://site.api.espn.com/apis/site/v2/sports`
    pub base_url: String,
    /// Core API root, e.g. `https://sports.core.api.espn.com/v2/sports`
    pub core_url: String,
    /// Per-call timeout
    pub timeout: Duration,
    /// Pause paid after every call
    pub request_delay: Duration,
    /// Extra attempts for transient failures (0 = single attempt)
    pub max_retries: u32,
}

impl Default for EspnClientConfig {
    fn default() -> Self {
        EspnClientConfig {
            base_url: "https://site.api.espn.com/apis/site/v2/sports".to_string(),
            core_url: "https://sports.core.api.espn.com/v2/sports".to_string(),
            timeout: Duration::from_secs(30),
            request_delay: Duration::from_millis(500),
            max_retries: 0,
        }
    }
}

/// Stats provider backed by ESPN's public site and core APIs (no key needed).
///
/// Created once at startup and shared; the underlying `reqwest::Client`
/// pools connections across harvests and request handlers.
#[derive(Clone)]
pub struct EspnClient {
    http: Client,
    config: EspnClientConfig,
}

impl EspnClient {
    pub fn new(config: EspnClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("stats-harvester/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(EspnClient { http, config })
    }

    fn site_url(&self, league: League, tail: &str, query: &[(&str, String)]) -> Option<Url> {
        let raw = format!(
            "{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            league.espn_path(),
            tail
        );
        build_url(&raw, query)
    }

    fn core_url(&self, league: League, tail: &str) -> Option<Url> {
        let raw = format!(
            "{}/{}/leagues/{}/{}",
            self.config.core_url.trim_end_matches('/'),
            league.sport(),
            league.id(),
            tail
        );
        build_url(&raw, &[])
    }

    /// One paced call: the configured delay is paid after every request,
    /// whether it succeeded or not.
    async fn fetch_json(&self, url: Option<Url>) -> Option<Value> {
        let url = url?;
        let result = self.fetch_with_retries(&url).await;
        if !self.config.request_delay.is_zero() {
            tokio::time::sleep(self.config.request_delay).await;
        }
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("ESPN fetch failed: {}", e);
                None
            }
        }
    }

    async fn fetch_with_retries(&self, url: &Url) -> Result<Value, FetchError> {
        let mut attempt = 0u32;
        let mut backoff = Duration::from_millis(250);
        loop {
            match self.fetch_once(url).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=100));
                    let wait = backoff + jitter;
                    warn!(
                        "{}. Retrying in {:?} (attempt {}/{})",
                        e,
                        wait,
                        attempt + 1,
                        self.config.max_retries
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                    backoff = backoff.saturating_mul(2);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, url: &Url) -> Result<Value, FetchError> {
        debug!("GET {}", url);
        let url_str = url.to_string();

        let resp = self.http.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url_str.clone(),
                }
            } else {
                FetchError::Transport {
                    url: url_str.clone(),
                    source: e,
                }
            }
        })?;

        if !resp.status().is_success() {
            return Err(FetchError::Status {
                status: resp.status().as_u16(),
                url: url_str,
            });
        }

        resp.json::<Value>().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url_str.clone(),
                }
            } else {
                FetchError::Malformed {
                    url: url_str.clone(),
                    source: e,
                }
            }
        })
    }
}

fn build_url(raw: &str, query: &[(&str, String)]) -> Option<Url> {
    let mut url = match Url::parse(raw) {
        Ok(url) => url,
        Err(e) => {
            warn!("Invalid provider URL {}: {}", raw, e);
            return None;
        }
    };
    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in query {
            pairs.append_pair(key, value);
        }
    }
    Some(url)
}

fn season_query(season: Option<i32>) -> Vec<(&'static str, String)> {
    season
        .map(|s| vec![("season", s.to_string())])
        .unwrap_or_default()
}

#[async_trait]
impl StatsProvider for EspnClient {
    fn name(&self) -> &str {
        "ESPN"
    }

    async fn teams(&self, league: League) -> Option<Value> {
        debug!("Harvesting teams for {}", league.display_name());
        self.fetch_json(self.site_url(league, "teams", &[])).await
    }

    async fn standings(&self, league: League, season: Option<i32>) -> Option<Value> {
        debug!("Harvesting standings for {} (season={:?})", league.display_name(), season);
        self.fetch_json(self.site_url(league, "standings", &season_query(season)))
            .await
    }

    async fn scoreboard(&self, league: League, date: Option<NaiveDate>) -> Option<Value> {
        debug!("Harvesting scoreboard for {} (date={:?})", league.display_name(), date);
        let query: Vec<(&str, String)> = date
            .map(|d| vec![("dates", format_date(d))])
            .unwrap_or_default();
        self.fetch_json(self.site_url(league, "scoreboard", &query)).await
    }

    async fn schedule(&self, league: League, season: Option<i32>) -> Option<Value> {
        // The scoreboard listing answers 500 when given a season, so the
        // season is only logged.
        debug!("Harvesting schedule for {} (season={:?})", league.display_name(), season);
        self.fetch_json(self.site_url(
            league,
            "scoreboard",
            &[("limit", SCHEDULE_LIMIT.to_string())],
        ))
        .await
    }

    async fn game_summary(&self, league: League, event_id: &str) -> Option<Value> {
        debug!("Harvesting game summary for {} event {}", league.display_name(), event_id);
        self.fetch_json(self.site_url(league, "summary", &[("event", event_id.to_string())]))
            .await
    }

    async fn team_detail(
        &self,
        league: League,
        team_id: &str,
        season: Option<i32>,
    ) -> Option<Value> {
        let mut query = vec![("enable", "roster,stats".to_string())];
        query.extend(season_query(season));
        self.fetch_json(self.site_url(league, &format!("teams/{team_id}"), &query))
            .await
    }

    async fn team_statistics(
        &self,
        league: League,
        team_id: &str,
        season: Option<i32>,
    ) -> Option<Value> {
        self.fetch_json(self.site_url(
            league,
            &format!("teams/{team_id}/statistics"),
            &season_query(season),
        ))
        .await
    }

    async fn athlete_info(
        &self,
        league: League,
        player_id: &str,
        season: Option<i32>,
    ) -> Option<Value> {
        let season = season.unwrap_or_else(|| Local::now().year());
        self.fetch_json(self.core_url(league, &format!("seasons/{season}/athletes/{player_id}")))
            .await
    }

    async fn player_statistics(
        &self,
        league: League,
        player_id: &str,
        season: Option<i32>,
    ) -> Option<Value> {
        let season = season.unwrap_or_else(|| Local::now().year());
        self.fetch_json(self.core_url(
            league,
            &format!(
                "seasons/{season}/types/{REGULAR_SEASON_TYPE}/athletes/{player_id}/statistics"
            ),
        ))
        .await
    }
}
