//! Supported leagues, harvestable data types and snapshot slot naming.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::HarvestError;

/// A supported league. Each maps to an ESPN `{sport}/{league}` path and has
/// its own season-start month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum League {
    Nba,
    Nhl,
    Nfl,
    Mlb,
}

impl League {
    pub const ALL: [League; 4] = [League::Nba, League::Nhl, League::Nfl, League::Mlb];

    pub fn id(self) -> &'static str {
        match self {
            League::Nba => "nba",
            League::Nhl => "nhl",
            League::Nfl => "nfl",
            League::Mlb => "mlb",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            League::Nba => "NBA",
            League::Nhl => "NHL",
            League::Nfl => "NFL",
            League::Mlb => "MLB",
        }
    }

    pub fn sport(self) -> &'static str {
        match self {
            League::Nba => "basketball",
            League::Nhl => "hockey",
            League::Nfl => "football",
            League::Mlb => "baseball",
        }
    }

    /// `{sport}/{league}` path segment used by the ESPN site API.
    pub fn espn_path(self) -> String {
        format!("{}/{}", self.sport(), self.id())
    }

    /// Calendar month in which a new season begins.
    pub fn season_start_month(self) -> u32 {
        match self {
            League::Nba | League::Nhl => 10,
            League::Nfl => 9,
            League::Mlb => 4,
        }
    }

    /// ESPN labels a season by the year it starts in, so before the start
    /// month the running season is the previous year's.
    pub fn season_year(self, today: NaiveDate) -> i32 {
        if today.month() >= self.season_start_month() {
            today.year()
        } else {
            today.year() - 1
        }
    }
}

impl fmt::Display for League {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for League {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "nba" => Ok(League::Nba),
            "nhl" => Ok(League::Nhl),
            "nfl" => Ok(League::Nfl),
            "mlb" => Ok(League::Mlb),
            _ => Err(HarvestError::UnknownLeague(s.to_string())),
        }
    }
}

/// Kinds of data a harvest can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Teams,
    Standings,
    Scoreboard,
    Schedule,
    GameSummary,
    News,
}

impl DataType {
    /// Order in which a harvest processes the types of one league.
    pub const ORDERED: [DataType; 6] = [
        DataType::Teams,
        DataType::Standings,
        DataType::Schedule,
        DataType::Scoreboard,
        DataType::GameSummary,
        DataType::News,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Teams => "teams",
            DataType::Standings => "standings",
            DataType::Scoreboard => "scoreboard",
            DataType::Schedule => "schedule",
            DataType::GameSummary => "game_summary",
            DataType::News => "news",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "teams" => Ok(DataType::Teams),
            "standings" => Ok(DataType::Standings),
            "scoreboard" => Ok(DataType::Scoreboard),
            "schedule" => Ok(DataType::Schedule),
            "game_summary" | "summary" => Ok(DataType::GameSummary),
            "news" => Ok(DataType::News),
            _ => Err(HarvestError::UnknownDataType(s.to_string())),
        }
    }
}

/// Name of one persisted record under a league directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Slot {
    Teams,
    Standings,
    Scoreboard,
    Schedule,
    DatedScoreboard(NaiveDate),
    GameSummary(String),
    SummaryIndex,
    News,
}

impl Slot {
    /// File stem, e.g. `teams`, `scoreboard_20241019`, `summary_401584793`.
    pub fn name(&self) -> String {
        match self {
            Slot::Teams => "teams".to_string(),
            Slot::Standings => "standings".to_string(),
            Slot::Scoreboard => "scoreboard".to_string(),
            Slot::Schedule => "schedule".to_string(),
            Slot::DatedScoreboard(date) => format!("scoreboard_{}", format_date(*date)),
            Slot::GameSummary(event_id) => format!("summary_{event_id}"),
            Slot::SummaryIndex => "summaries_today".to_string(),
            Slot::News => "news".to_string(),
        }
    }

    /// Only the four base slots keep timestamped archive copies.
    pub fn is_archived(&self) -> bool {
        matches!(
            self,
            Slot::Teams | Slot::Standings | Slot::Scoreboard | Slot::Schedule
        )
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Parse a `YYYYMMDD` date as used on the command line and in query strings.
pub fn parse_date(s: &str) -> Result<NaiveDate, HarvestError> {
    NaiveDate::parse_from_str(s.trim(), "%Y%m%d")
        .map_err(|_| HarvestError::InvalidDate(s.to_string()))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}
