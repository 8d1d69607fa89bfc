pub mod client;
pub mod provider;
#[cfg(test)]
pub mod testing;

pub use client::{EspnClient, EspnClientConfig};
pub use provider::StatsProvider;

use chrono::NaiveDate;
use serde_json::Value;
use tracing::{debug, info};

use crate::leagues::League;

/// Fetch one scoreboard per day from `start` to `end` inclusive.
///
/// Days whose fetch fails are skipped; every returned payload keeps the date
/// it was requested for.
pub async fn fetch_scoreboard_range(
    provider: &dyn StatsProvider,
    league: League,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<(NaiveDate, Value)> {
    let mut results = Vec::new();
    for day in start.iter_days().take_while(|d| *d <= end) {
        match provider.scoreboard(league, Some(day)).await {
            Some(data) => results.push((day, data)),
            None => debug!("No scoreboard for {} on {}, skipping day", league, day),
        }
    }
    results
}

/// Result of a bounded summary fan-out.
#[derive(Debug, Clone, Default)]
pub struct SummaryFanOut {
    /// Event ids whose summary was requested, in feed order
    pub attempted: Vec<String>,
    /// Successfully fetched summaries, in feed order
    pub summaries: Vec<(String, Value)>,
}

/// Fetch the scoreboard for `date`, then the summaries of at most
/// `max_games` of its events in feed order.
///
/// Returns `None` only when the scoreboard itself is unavailable; failed
/// summaries are simply left out.
pub async fn fetch_summaries_from_scoreboard(
    provider: &dyn StatsProvider,
    league: League,
    date: Option<NaiveDate>,
    max_games: usize,
) -> Option<SummaryFanOut> {
    let scoreboard = provider.scoreboard(league, date).await?;
    let mut fan_out = SummaryFanOut::default();

    for event_id in scoreboard_event_ids(&scoreboard).into_iter().take(max_games) {
        fan_out.attempted.push(event_id.clone());
        if let Some(summary) = provider.game_summary(league, &event_id).await {
            fan_out.summaries.push((event_id, summary));
        }
    }

    info!(
        "{}: {}/{} game summaries fetched",
        league,
        fan_out.summaries.len(),
        fan_out.attempted.len()
    );
    Some(fan_out)
}

/// Event ids of a scoreboard feed, in feed order. ESPN sends them as strings
/// but numeric ids are accepted too.
pub fn scoreboard_event_ids(scoreboard: &Value) -> Vec<String> {
    scoreboard["events"]
        .as_array()
        .map(|events| {
            events
                .iter()
                .filter_map(|ev| match &ev["id"] {
                    Value::String(s) if !s.is_empty() => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::testing::FakeProvider;
    use super::*;
    use serde_json::json;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 10, d).unwrap()
    }

    #[tokio::test]
    async fn test_range_is_inclusive_and_skips_failed_days() {
        let provider = FakeProvider::new()
            .with("scoreboard:nba:20241020", json!({"day": 20}))
            .with("scoreboard:nba:20241022", json!({"day": 22}));

        let results = fetch_scoreboard_range(&provider, League::Nba, day(20), day(22)).await;

        assert_eq!(
            provider.calls(),
            vec![
                "scoreboard:nba:20241020",
                "scoreboard:nba:20241021",
                "scoreboard:nba:20241022"
            ]
        );
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], (day(20), json!({"day": 20})));
        // the skipped 21st must not shift the 22nd
        assert_eq!(results[1], (day(22), json!({"day": 22})));
    }

    #[tokio::test]
    async fn test_fan_out_is_bounded_and_in_feed_order() {
        let provider = FakeProvider::new()
            .with(
                "scoreboard:nhl:today",
                json!({"events": [{"id": "5"}, {"id": "3"}, {"id": "9"}, {"id": "1"}]}),
            )
            .with("summary:nhl:5", json!({"g": 5}))
            .with("summary:nhl:9", json!({"g": 9}))
            .with("summary:nhl:1", json!({"g": 1}));

        let fan_out = fetch_summaries_from_scoreboard(&provider, League::Nhl, None, 3)
            .await
            .unwrap();

        assert_eq!(fan_out.attempted, vec!["5", "3", "9"]);
        let fetched: Vec<&str> = fan_out.summaries.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(fetched, vec!["5", "9"]);
        assert!(!provider.calls().contains(&"summary:nhl:1".to_string()));
    }

    #[tokio::test]
    async fn test_fan_out_without_scoreboard_is_none() {
        let provider = FakeProvider::new();
        assert!(fetch_summaries_from_scoreboard(&provider, League::Nfl, None, 10)
            .await
            .is_none());
    }

    #[test]
    fn test_event_ids_accept_strings_and_numbers() {
        let sb = json!({"events": [{"id": "401"}, {"id": 402}, {"name": "no id"}, {"id": ""}]});
        assert_eq!(scoreboard_event_ids(&sb), vec!["401", "402"]);
        assert!(scoreboard_event_ids(&json!({})).is_empty());
    }
}
