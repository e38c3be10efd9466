//! Text-to-value parsers for race page fields
//!
//! None of these fail: unrecognized input becomes `None`. Vocabulary lookups
//! (discipline, status) log a warning on a miss since the source site may
//! introduce new labels at any time.

use crate::{Discipline, Gender, NonFinish, ResultStatus};
use regex::Regex;

/// Parse a race time ("M:SS.ss" or "SS.ss") into seconds
pub fn parse_time(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() || text == "-" {
        return None;
    }

    let seconds = match text.split_once(':') {
        Some((minutes, seconds)) => {
            let minutes: f64 = minutes.trim().parse().ok()?;
            let seconds: f64 = seconds.trim().parse().ok()?;
            minutes * 60.0 + seconds
        }
        None => text.parse().ok()?,
    };

    seconds.is_finite().then_some(seconds)
}

/// Parse a decimal such as a points value
pub fn parse_decimal(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// First run of digits in `text`, e.g. 918 from "918m"
pub fn first_integer(text: &str) -> Option<u32> {
    let re = Regex::new(r"(\d+)").unwrap();
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

/// Parse the gender part of a header phrase ("Men's", "Women's", "Mixed")
pub fn parse_gender(text: &str) -> Option<Gender> {
    let text = text.to_lowercase();
    // "women" contains "men", so test it first
    if text.contains("women") || text.contains("ladies") {
        Some(Gender::Female)
    } else if text.contains("men") {
        Some(Gender::Male)
    } else if text.contains("mixed") {
        Some(Gender::Mixed)
    } else {
        None
    }
}

/// Discipline parsed from a header phrase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedDiscipline {
    pub discipline: Discipline,
    /// The phrase named a training run of the discipline
    pub training: bool,
}

/// Parse a discipline name or code, e.g. "Giant Slalom", "GS", "Downhill Training"
pub fn parse_discipline(text: &str) -> Option<ParsedDiscipline> {
    let normalized = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase();
    if normalized.is_empty() {
        return None;
    }

    let (base, training) = match normalized.strip_suffix("TRAINING") {
        Some(base) => (base.trim_end(), true),
        None => (normalized.as_str(), false),
    };

    let discipline = match base {
        "SL" | "SLALOM" => Discipline::SL,
        "GS" | "GIANT SLALOM" => Discipline::GS,
        "SG" | "SUPER-G" | "SUPER G" => Discipline::SG,
        "DH" | "DOWNHILL" => Discipline::DH,
        "AC" | "ALPINE COMBINED" => Discipline::AC,
        _ => {
            log::warn!("Discipline {:?} not found in discipline table", text);
            return None;
        }
    };

    Some(ParsedDiscipline {
        discipline,
        training,
    })
}

/// Split a header phrase like "Men's Giant Slalom" into gender and discipline text
pub fn split_gender_discipline(text: &str) -> Option<(&str, &str)> {
    let re = Regex::new(r"(?i)((?:wo)?men['’]s|ladies['’]?|mixed)\s+(.+)").unwrap();
    let caps = re.captures(text)?;
    Some((caps.get(1)?.as_str().trim(), caps.get(2)?.as_str().trim()))
}

/// Classify a non-finisher table heading, e.g. "Disqualified 2nd Run" -> DSQ2
pub fn parse_status_heading(text: &str) -> Option<ResultStatus> {
    let text = text.to_lowercase();

    let run = if text.contains("2nd run") {
        Some(2)
    } else if text.contains("1st run") {
        Some(1)
    } else {
        None
    };

    let kind = if text.contains("disqualified") {
        NonFinish::Dsq
    } else if text.contains("did not finish") {
        NonFinish::Dnf
    } else if text.contains("did not start") {
        NonFinish::Dns
    } else if text.contains("did not qualify") {
        NonFinish::Dnq
    } else if text.contains("not permitted to start") {
        NonFinish::Nps
    } else {
        if !text.trim().is_empty() {
            log::warn!("Unrecognized result status heading {:?}", text);
        }
        return None;
    };

    Some(ResultStatus::new(kind, run))
}

/// Race id from a results link (`raceid=` query parameter)
pub fn race_id_from_link(link: &str) -> Option<i64> {
    let re = Regex::new(r"raceid=(\d+)").unwrap();
    re.captures(link)?.get(1)?.as_str().parse().ok()
}

/// Athlete id from a biography link (`competitorid=` query parameter)
pub fn athlete_id_from_link(link: &str) -> Option<i64> {
    let re = Regex::new(r"competitorid=(\d+)").unwrap();
    re.captures(link)?.get(1)?.as_str().parse().ok()
}
