use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::espn::EspnClientConfig;
use crate::harvest::HarvestRequest;
use crate::leagues::{parse_date, DataType, League};

/// Longest scoreboard range a single harvest may request.
const MAX_RANGE_DAYS: u32 = 366;

/// Harvests NBA/NHL/NFL/MLB stats and news into JSON snapshots
#[derive(Parser, Debug, Clone)]
#[command(name = "stats-harvester", version, about)]
pub struct Config {
    /// Root directory of the snapshot files
    #[arg(long, env = "DATA_DIR", default_value = "data", global = true)]
    pub data_dir: PathBuf,

    /// Mirror current snapshots into SQLite at {data_dir}/stats.db
    #[arg(long, env = "SQLITE_MIRROR", global = true)]
    pub sqlite: bool,

    /// ESPN site API root
    #[arg(
        long,
        env = "ESPN_BASE_URL",
        default_value = "https://site.api.espn.com/apis/site/v2/sports",
        global = true
    )]
    pub espn_base_url: String,

    /// ESPN core API root (athletes, player statistics)
    #[arg(
        long,
        env = "ESPN_CORE_URL",
        default_value = "https://sports.core.api.espn.com/v2/sports",
        global = true
    )]
    pub espn_core_url: String,

    /// ESPN RSS root; feeds live at {root}/{league}/news
    #[arg(
        long,
        env = "ESPN_RSS_BASE_URL",
        default_value = "https://www.espn.com/espn/rss",
        global = true
    )]
    pub rss_base_url: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "30", global = true)]
    pub request_timeout_secs: u64,

    /// Pause after every provider request, in milliseconds
    #[arg(long, env = "REQUEST_DELAY_MS", default_value = "500", global = true)]
    pub request_delay_ms: u64,

    /// Extra attempts for timeouts, 429 and 5xx responses
    #[arg(long, env = "FETCH_RETRIES", default_value = "0", global = true)]
    pub fetch_retries: u32,

    /// OpenAI API key; enables the news rewrite
    #[arg(long, env = "OPENAI_API_KEY", global = true, hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// OpenAI-compatible API root
    #[arg(
        long,
        env = "OPENAI_BASE_URL",
        default_value = "https://api.openai.com/v1",
        global = true
    )]
    pub openai_base_url: String,

    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o-mini", global = true)]
    pub openai_model: String,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Harvest once and exit
    Harvest(HarvestArgs),
    /// Serve the stats API and harvest on a timer
    Serve(ServeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct HarvestArgs {
    /// Leagues to harvest (default: all)
    #[arg(long, value_delimiter = ',', default_value = "nba,nhl,nfl,mlb")]
    pub leagues: Vec<League>,

    /// Data types: teams, standings, scoreboard, schedule, game_summary, news
    #[arg(long, value_delimiter = ',', default_value = "teams,standings,scoreboard")]
    pub types: Vec<DataType>,

    /// Scoreboard date, YYYYMMDD (default: today)
    #[arg(long, value_parser = parse_date)]
    pub date: Option<NaiveDate>,

    /// Season year (default: resolved per league)
    #[arg(long)]
    pub season: Option<i32>,

    /// Also harvest scoreboards for N days after --date
    #[arg(long, default_value = "0")]
    pub days: u32,

    /// Harvest one game summary by event id (with --types game_summary)
    #[arg(long)]
    pub event: Option<String>,

    /// Max game summaries per league
    #[arg(long, default_value = "10")]
    pub max_summaries: usize,

    /// Keep news text as published
    #[arg(long)]
    pub no_rewrite: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Listen address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:5000")]
    pub addr: String,

    /// Minutes between scheduled harvests
    #[arg(long, env = "HARVEST_INTERVAL_MINS", default_value = "15")]
    pub harvest_interval_mins: u64,

    /// Data types harvested on the timer and by /api/harvest
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "teams,standings,scoreboard,schedule"
    )]
    pub harvest_types: Vec<DataType>,

    /// Do not harvest right after startup
    #[arg(long)]
    pub no_startup_harvest: bool,

    /// Upper bound for a live fallback fetch, in seconds
    #[arg(long, env = "LIVE_TIMEOUT_SECS", default_value = "15")]
    pub live_timeout_secs: u64,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be positive");
        }
        match &self.command {
            Command::Harvest(args) => {
                if args.days > MAX_RANGE_DAYS {
                    anyhow::bail!("--days must be at most {}", MAX_RANGE_DAYS);
                }
                if args.leagues.is_empty() || args.types.is_empty() {
                    anyhow::bail!("at least one league and one data type are required");
                }
            }
            Command::Serve(args) => {
                if args.harvest_interval_mins == 0 {
                    anyhow::bail!("harvest_interval_mins must be positive");
                }
                if args.live_timeout_secs == 0 {
                    anyhow::bail!("live_timeout_secs must be positive");
                }
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn espn(&self) -> EspnClientConfig {
        EspnClientConfig {
            base_url: self.espn_base_url.clone(),
            core_url: self.espn_core_url.clone(),
            timeout: self.request_timeout(),
            request_delay: Duration::from_millis(self.request_delay_ms),
            max_retries: self.fetch_retries,
        }
    }

    pub fn mirror_path(&self) -> PathBuf {
        self.data_dir.join("stats.db")
    }
}

impl HarvestArgs {
    pub fn request(&self) -> HarvestRequest {
        HarvestRequest {
            leagues: self.leagues.clone(),
            data_types: self.types.clone(),
            date: self.date,
            season: self.season,
            days: self.days,
            event_id: self.event.clone(),
            max_items: self.max_summaries,
            rewrite: !self.no_rewrite,
        }
    }
}

impl ServeArgs {
    /// Request used by the timer and the on-demand trigger.
    pub fn request(&self) -> HarvestRequest {
        HarvestRequest {
            data_types: self.harvest_types.clone(),
            ..HarvestRequest::default()
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.harvest_interval_mins * 60)
    }
}
