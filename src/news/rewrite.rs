use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

/// Longest source text handed to the model, in characters.
const MAX_INPUT_CHARS: usize = 2000;
const MAX_TOKENS: u32 = 350;

const SYSTEM_PROMPT: &str = "You are a sports journalist. Rewrite the following news into a \
standalone article. Write a substantive paragraph of 3-5 sentences that covers the key facts. \
Do not be brief.\nOutput EXACTLY in this format:\nHEADLINE:\n[your new headline]\n\nBODY:\n\
[One full paragraph, 3-5 sentences, fully rewritten in your own words. Use all facts from the \
source. No links, no attribution.]";

/// Best-effort text transform applied to news items.
///
/// `None` means "keep the original title and summary". Implementations never
/// surface their failures.
#[async_trait]
pub trait Rewriter: Send + Sync {
    async fn rewrite(&self, title: &str, summary: &str) -> Option<(String, String)>;
}

/// Rewriter used when no model is configured.
pub struct Passthrough;

#[async_trait]
impl Rewriter for Passthrough {
    async fn rewrite(&self, _title: &str, _summary: &str) -> Option<(String, String)> {
        None
    }
}

/// Rewriter backed by an OpenAI-compatible chat completions endpoint.
pub struct OpenAiRewriter {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiRewriter {
    pub fn new(base_url: &str, api_key: String, model: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(OpenAiRewriter {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
        })
    }

    async fn complete(&self, input: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": input},
            ],
            "max_tokens": MAX_TOKENS,
        });

        debug!("POST {}", url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Rewrite request failed")?;

        if !resp.status().is_success() {
            anyhow::bail!("Rewrite API error {}", resp.status());
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .context("Failed to parse rewrite response")?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl Rewriter for OpenAiRewriter {
    async fn rewrite(&self, title: &str, summary: &str) -> Option<(String, String)> {
        let combined = format!("Headline: {title}\n\nSummary: {summary}");
        let input: String = combined.chars().take(MAX_INPUT_CHARS).collect();
        match self.complete(&input).await {
            Ok(raw) => parse_rewrite(&raw, title, summary),
            Err(e) => {
                warn!("News rewrite failed, keeping original text: {:#}", e);
                None
            }
        }
    }
}

/// Split model output into `(headline, body)`.
///
/// Expects `HEADLINE:`/`BODY:` markers but tolerates either one missing; in
/// the worst case the first line is the headline. Empty parts fall back to
/// the original title or summary.
pub fn parse_rewrite(raw: &str, title: &str, summary: &str) -> Option<(String, String)> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let (new_title, new_body) = if let Some((head, body)) = raw.split_once("BODY:") {
        let head = head.replace("HEADLINE:", "");
        let first = head.trim().lines().next().unwrap_or("").trim().to_string();
        (first, body.trim().to_string())
    } else if let Some((_, rest)) = raw.split_once("HEADLINE:") {
        let rest = rest.trim();
        let mut lines = rest.split('\n');
        let first = lines.next().unwrap_or("").trim().to_string();
        let body = if rest.contains('\n') {
            lines.collect::<Vec<_>>().join("\n\n").trim().to_string()
        } else {
            summary.to_string()
        };
        (first, body)
    } else {
        let lines: Vec<&str> = raw.split('\n').collect();
        let first = lines[0].trim().to_string();
        let body = if lines.len() > 1 {
            lines[1..].join("\n\n").trim().to_string()
        } else {
            lines[0].to_string()
        };
        (first, body)
    };

    let new_title = if new_title.is_empty() { title.to_string() } else { new_title };
    let new_body = if new_body.is_empty() { summary.to_string() } else { new_body };
    Some((new_title, new_body))
}
