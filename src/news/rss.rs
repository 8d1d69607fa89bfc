//! Minimal RSS 2.0 reader for the ESPN league feeds.

use chrono::DateTime;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::leagues::League;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

/// One `<item>` of a feed, fields as published.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RssItem {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "pubDate", default)]
    pub pub_date: Option<String>,
}

/// Parse a feed document into its items, in feed order.
pub fn parse_feed(xml: &str) -> Result<Vec<RssItem>, quick_xml::DeError> {
    let rss: Rss = quick_xml::de::from_str(xml)?;
    Ok(rss.channel.items)
}

/// Resolve XML/HTML character entities left in feed text. Text with an
/// entity quick-xml does not know (`&nbsp;` and friends) is kept as is.
pub fn unescape(text: &str) -> String {
    quick_xml::escape::unescape(text)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| text.to_string())
}

/// Strip HTML tags and collapse whitespace.
pub fn plain_text(html: &str) -> String {
    let html = unescape(html);
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => {
                in_tag = true;
                out.push(' ');
            }
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Stable 16-hex-char id for de-duplication, derived from league, link and title.
pub fn item_id(league: League, link: &str, title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}:{}", league.id(), link, title).as_bytes());
    let mut id = format!("{:x}", hasher.finalize());
    id.truncate(16);
    id
}

/// RFC 2822 `pubDate` to naive ISO-8601 (`2024-10-19T14:05:00`).
pub fn iso_published(pub_date: &str) -> Option<String> {
    DateTime::parse_from_rfc2822(pub_date.trim())
        .ok()
        .map(|dt| dt.naive_utc().format("%Y-%m-%dT%H:%M:%S").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <title>www.espn.com - NBA</title>
    <link>https://www.espn.com</link>
    <description>Latest NBA news from www.espn.com</description>
    <item>
      <title><![CDATA[Celtics & Knicks open the season]]></title>
      <description><![CDATA[<p>Boston raised its <b>banner</b>   on opening night.</p>]]></description>
      <link>https://www.espn.com/nba/story/_/id/1</link>
      <pubDate>Tue, 22 Oct 2024 23:30:00 GMT</pubDate>
    </item>
    <item>
      <title>Lakers sign rookie</title>
      <link>https://www.espn.com/nba/story/_/id/2</link>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_feed_items_in_order() {
        let items = parse_feed(FEED).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title.as_deref(), Some("Celtics & Knicks open the season"));
        assert_eq!(items[1].title.as_deref(), Some("Lakers sign rookie"));
        assert!(items[1].description.is_none());
        assert!(items[1].pub_date.is_none());
    }

    #[test]
    fn test_empty_channel() {
        let items = parse_feed("<rss><channel><title>x</title></channel></rss>").unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_plain_text_strips_tags() {
        assert_eq!(
            plain_text("<p>Boston raised its <b>banner</b>   on\n opening night.</p>"),
            "Boston raised its banner on opening night."
        );
    }

    #[test]
    fn test_plain_text_handles_escaped_markup() {
        assert_eq!(plain_text("&lt;p&gt;Game 7 &amp; more&lt;/p&gt;"), "Game 7 & more");
    }

    #[test]
    fn test_item_id_is_stable_and_distinct() {
        let a = item_id(League::Nba, "https://x/1", "Title");
        assert_eq!(a.len(), 16);
        assert_eq!(a, item_id(League::Nba, "https://x/1", "Title"));
        assert_ne!(a, item_id(League::Nhl, "https://x/1", "Title"));
    }

    #[test]
    fn test_item_id_is_sha256_prefix() {
        // First 16 hex chars of sha256("nba:https://x/1:Title")
        assert_eq!(item_id(League::Nba, "https://x/1", "Title"), "83b7f0b3e701bdb4");
    }

    #[test]
    fn test_iso_published() {
        assert_eq!(
            iso_published("Tue, 22 Oct 2024 23:30:00 GMT").as_deref(),
            Some("2024-10-22T23:30:00")
        );
        assert!(iso_published("yesterday").is_none());
    }
}
