//! FIS alpine race results ingestion
//!
//! Discovers races on the FIS results site, parses race pages into typed
//! headers and result rows, and stores them idempotently in SQLite, linked to
//! athletes loaded from FIS points lists.

pub mod data;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Internal row id of a stored race
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RaceId(pub i64);

/// Internal row id of a stored athlete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AthleteId(pub i64);

/// Internal row id of a stored points list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PointsListId(pub i64);

impl fmt::Display for RaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Race({})", self.0)
    }
}

/// Alpine discipline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Discipline {
    SL,
    GS,
    SG,
    DH,
    AC,
}

impl Discipline {
    pub fn code(&self) -> &'static str {
        match self {
            Discipline::SL => "SL",
            Discipline::GS => "GS",
            Discipline::SG => "SG",
            Discipline::DH => "DH",
            Discipline::AC => "AC",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "SL" => Some(Discipline::SL),
            "GS" => Some(Discipline::GS),
            "SG" => Some(Discipline::SG),
            "DH" => Some(Discipline::DH),
            "AC" => Some(Discipline::AC),
            _ => None,
        }
    }
}

impl fmt::Display for Discipline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Discipline::SL => "Slalom",
            Discipline::GS => "Giant Slalom",
            Discipline::SG => "Super-G",
            Discipline::DH => "Downhill",
            Discipline::AC => "Alpine Combined",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Mixed,
}

impl Gender {
    pub fn code(&self) -> &'static str {
        match self {
            Gender::Male => "M",
            Gender::Female => "F",
            Gender::Mixed => "A",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_uppercase().as_str() {
            "M" => Some(Gender::Male),
            "F" | "W" | "L" => Some(Gender::Female),
            "A" | "X" => Some(Gender::Mixed),
            _ => None,
        }
    }
}

/// Non-finish outcome kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NonFinish {
    /// Disqualified
    Dsq,
    /// Did not finish
    Dnf,
    /// Did not start
    Dns,
    /// Did not qualify
    Dnq,
    /// Not permitted to start
    Nps,
}

impl NonFinish {
    pub fn code(&self) -> &'static str {
        match self {
            NonFinish::Dsq => "DSQ",
            NonFinish::Dnf => "DNF",
            NonFinish::Dns => "DNS",
            NonFinish::Dnq => "DNQ",
            NonFinish::Nps => "NPS",
        }
    }
}

/// Result status of a non-finisher, e.g. `DNF2` or single-run `DSQ`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultStatus {
    pub kind: NonFinish,
    /// Run the outcome applies to, absent for single-run outcomes
    pub run: Option<u8>,
}

impl ResultStatus {
    pub fn new(kind: NonFinish, run: Option<u8>) -> Self {
        ResultStatus { kind, run }
    }

    /// Status code as stored, e.g. "DNS1"
    pub fn code(&self) -> String {
        match self.run {
            Some(run) => format!("{}{}", self.kind.code(), run),
            None => self.kind.code().to_string(),
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim().to_uppercase();
        if code.len() < 3 || !code.is_char_boundary(3) {
            return None;
        }
        let (kind, run) = code.split_at(3);
        let kind = match kind {
            "DSQ" => NonFinish::Dsq,
            "DNF" => NonFinish::Dnf,
            "DNS" => NonFinish::Dns,
            "DNQ" => NonFinish::Dnq,
            "NPS" => NonFinish::Nps,
            _ => return None,
        };
        let run = match run {
            "" => None,
            "1" => Some(1),
            "2" => Some(2),
            _ => return None,
        };
        Some(ResultStatus { kind, run })
    }

    /// The athlete never began the race (did not start before run 1)
    pub fn never_started(&self) -> bool {
        self.kind == NonFinish::Dns && self.run == Some(1)
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Optional course metrics published with a race
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourseDetails {
    pub start_altitude: Option<u32>,
    pub finish_altitude: Option<u32>,
    pub length: Option<u32>,
    pub gates1: Option<u32>,
    pub turning_gates1: Option<u32>,
    pub gates2: Option<u32>,
    pub turning_gates2: Option<u32>,
    pub homologation: Option<String>,
}

/// Race identity and metadata parsed from a race page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RaceHeader {
    /// The results site's internal race id (`raceid` query parameter)
    pub external_race_id: i64,
    pub codex: Option<u32>,
    pub name: Option<String>,
    pub date: Option<NaiveDate>,
    pub discipline: Option<Discipline>,
    pub gender: Option<Gender>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub nation: Option<String>,
    pub course: CourseDetails,
    pub win_time: Option<f64>,
    pub penalty: Option<f64>,
    pub total_starters: Option<u32>,
    pub total_finishers: Option<u32>,
}

impl RaceHeader {
    pub fn new(external_race_id: i64) -> Self {
        RaceHeader {
            external_race_id,
            ..Default::default()
        }
    }

    /// The (external_race_id, date, discipline) identity key, if complete
    pub fn key(&self) -> Option<RaceKey> {
        if self.external_race_id <= 0 {
            return None;
        }
        Some(RaceKey {
            external_race_id: self.external_race_id,
            date: self.date?,
            discipline: self.discipline?,
        })
    }
}

/// Unique identity of a race in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RaceKey {
    pub external_race_id: i64,
    pub date: NaiveDate,
    pub discipline: Discipline,
}

/// Exactly one of a rank or a non-finish status
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Placing {
    Rank(u32),
    Status(ResultStatus),
}

/// One athlete's line on a race page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedResultRow {
    pub placing: Placing,
    /// External athlete id (`competitorid` query parameter)
    pub athlete_id: i64,
    pub athlete_name: Option<String>,
    pub nation: Option<String>,
    pub run1_time: Option<f64>,
    pub run2_time: Option<f64>,
    pub total_time: Option<f64>,
    pub points: Option<f64>,
}

impl ParsedResultRow {
    pub fn rank(&self) -> Option<u32> {
        match self.placing {
            Placing::Rank(rank) => Some(rank),
            Placing::Status(_) => None,
        }
    }

    pub fn status(&self) -> Option<ResultStatus> {
        match self.placing {
            Placing::Rank(_) => None,
            Placing::Status(status) => Some(status),
        }
    }
}

/// A stored race
#[derive(Debug, Clone, PartialEq)]
pub struct Race {
    pub id: RaceId,
    pub external_race_id: i64,
    pub date: NaiveDate,
    pub discipline: Discipline,
    pub codex: Option<u32>,
    pub name: Option<String>,
    pub gender: Option<Gender>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub nation: Option<String>,
    pub course: CourseDetails,
    pub win_time: Option<f64>,
    pub penalty: Option<f64>,
    pub total_starters: Option<u32>,
    pub total_finishers: Option<u32>,
}

/// A stored race result
#[derive(Debug, Clone, PartialEq)]
pub struct RaceResult {
    pub race_id: RaceId,
    pub athlete_id: AthleteId,
    pub rank: Option<u32>,
    pub status: Option<ResultStatus>,
    pub run1_time: Option<f64>,
    pub run2_time: Option<f64>,
    pub total_time: Option<f64>,
    pub points: Option<f64>,
}

/// A stored points list validity window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointsList {
    pub id: PointsListId,
    pub list_id: Option<String>,
    pub name: Option<String>,
    pub valid_from: NaiveDate,
    pub valid_to: NaiveDate,
}

impl PointsList {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.valid_from <= date && date <= self.valid_to
    }
}

/// FIS season containing `date`; a new season starts on 1 July
pub fn current_season(date: NaiveDate) -> i32 {
    if date.month() >= 7 {
        date.year() + 1
    } else {
        date.year()
    }
}

/// Application-wide errors
#[derive(Debug, Error)]
pub enum FisError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid race {race_id}: {reason}")]
    InvalidRace { race_id: i64, reason: String },

    #[error("No points list available for race {race_id} on {date}")]
    MissingPointsList { race_id: i64, date: NaiveDate },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, FisError>;

/// Application configuration loaded from config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub data: DataConfig,
    pub scraper: ScraperConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub database_path: String,
    /// Download folder for points list CSV exports
    pub points_list_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    pub base_url: String,
    pub data_url: String,
    pub calendar_url: String,
    pub points_lists_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Not applied to race fetches or persistence; failures are reported, not retried
    pub max_retries: u32,
    pub retry_delay_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data: DataConfig {
                database_path: "data/fis.db".to_string(),
                points_list_dir: "data/points_lists".to_string(),
            },
            scraper: ScraperConfig::default(),
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        ScraperConfig {
            base_url: "https://www.fis-ski.com".to_string(),
            data_url: "https://data.fis-ski.com".to_string(),
            calendar_url: "https://www.fis-ski.com/DB/alpine-skiing/calendar-results.html"
                .to_string(),
            points_lists_url: "https://www.fis-ski.com/DB/alpine-skiing/fis-points-lists.html"
                .to_string(),
            user_agent: "fis-results/0.1".to_string(),
            timeout_secs: 30,
            max_retries: 3,
            retry_delay_secs: 5,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FisError::Config(format!("Failed to read config file {}: {}", path, e))
        })?;
        toml::from_str(&content)
            .map_err(|e| FisError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| FisError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
