pub mod rewrite;
pub mod rss;

pub use rewrite::{OpenAiRewriter, Passthrough, Rewriter};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::leagues::League;

/// Items kept per league feed.
pub const NEWS_LIMIT: usize = 15;

/// One news item as persisted in the `news` snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub rewritten_title: Option<String>,
    pub rewritten_body: Option<String>,
    /// ISO-8601 publication time, when the feed carries one
    pub published: Option<String>,
}

/// Source of per-league news. An unreachable or unparsable feed yields an
/// empty list.
#[async_trait]
pub trait NewsSource: Send + Sync {
    async fn league_news(&self, league: League, limit: usize, rewrite: bool) -> Vec<NewsItem>;
}

/// ESPN RSS feeds, optionally passed through a [`Rewriter`].
pub struct EspnNews {
    http: Client,
    rss_base_url: String,
    rewriter: Arc<dyn Rewriter>,
}

impl EspnNews {
    pub fn new(rss_base_url: &str, timeout: Duration, rewriter: Arc<dyn Rewriter>) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(EspnNews {
            http,
            rss_base_url: rss_base_url.trim_end_matches('/').to_string(),
            rewriter,
        })
    }

    pub fn feed_url(&self, league: League) -> String {
        format!("{}/{}/news", self.rss_base_url, league.id())
    }

    async fn fetch_feed(&self, url: &str) -> Result<Vec<rss::RssItem>> {
        debug!("GET {}", url);
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .context("RSS request failed")?;
        if !resp.status().is_success() {
            anyhow::bail!("RSS feed error {}", resp.status());
        }
        let body = resp.text().await.context("Failed to read RSS body")?;
        rss::parse_feed(&body).context("Failed to parse RSS feed")
    }
}

#[async_trait]
impl NewsSource for EspnNews {
    async fn league_news(&self, league: League, limit: usize, rewrite: bool) -> Vec<NewsItem> {
        let url = self.feed_url(league);
        let entries = match self.fetch_feed(&url).await {
            Ok(entries) => entries,
            Err(e) => {
                error!("RSS fetch failed for {}: {:#}", league, e);
                return Vec::new();
            }
        };

        let mut items = Vec::new();
        for entry in entries.into_iter().take(limit) {
            let title = rss::unescape(entry.title.as_deref().unwrap_or_default());
            let link = entry.link.unwrap_or_default();
            let summary = entry
                .description
                .as_deref()
                .map(rss::plain_text)
                .unwrap_or_default();

            let rewritten = if rewrite && !(title.is_empty() && summary.is_empty()) {
                self.rewriter.rewrite(&title, &summary).await
            } else {
                None
            };
            let (rewritten_title, rewritten_body) = rewritten.unzip();

            items.push(NewsItem {
                id: rss::item_id(league, &link, &title),
                published: entry.pub_date.as_deref().and_then(rss::iso_published),
                title,
                summary,
                rewritten_title,
                rewritten_body,
            });
        }

        info!("{}: {} news item(s) from RSS", league, items.len());
        items
    }
}

/// News source with canned items per league, for tests.
#[cfg(test)]
#[derive(Default)]
pub struct FakeNews {
    items: std::collections::HashMap<League, Vec<NewsItem>>,
    pub rewrite_flags: std::sync::Mutex<Vec<bool>>,
}

#[cfg(test)]
impl FakeNews {
    pub fn with(mut self, league: League, items: Vec<NewsItem>) -> Self {
        self.items.insert(league, items);
        self
    }

    pub fn item(id: &str) -> NewsItem {
        NewsItem {
            id: id.to_string(),
            title: format!("title {id}"),
            summary: format!("summary {id}"),
            rewritten_title: None,
            rewritten_body: None,
            published: None,
        }
    }
}

#[cfg(test)]
#[async_trait]
impl NewsSource for FakeNews {
    async fn league_news(&self, league: League, limit: usize, rewrite: bool) -> Vec<NewsItem> {
        self.rewrite_flags.lock().unwrap().push(rewrite);
        self.items
            .get(&league)
            .map(|items| items.iter().take(limit).cloned().collect())
            .unwrap_or_default()
    }
}
