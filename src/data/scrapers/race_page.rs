//! Race results page parser
//!
//! A race page carries a header (identity, category, venue), "more info"
//! sections with course metrics, one table of finishers and a series of
//! non-finisher tables, each introduced by an outcome heading such as
//! "Did Not Finish 2nd Run".

use super::parse::{
    athlete_id_from_link, first_integer, parse_decimal, parse_discipline, parse_gender,
    parse_status_heading, parse_time, split_gender_discipline,
};
use super::{element_text, has_classes, selector};
use crate::{CourseDetails, ParsedResultRow, Placing, RaceHeader, ResultStatus};
use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html};

const RESULTS_TABLE: &str = "div.table__body#events-info-results";
const TRAINING_CATEGORY: &str = "Training";

/// A fetched race page
pub struct RacePage {
    race_id: i64,
    document: Html,
}

impl RacePage {
    pub fn parse(race_id: i64, html: &str) -> Self {
        RacePage {
            race_id,
            document: Html::parse_document(html),
        }
    }

    pub fn race_id(&self) -> i64 {
        self.race_id
    }

    // ==================== Header ====================

    /// Race identity and metadata; `discipline` is `None` when the page's
    /// discipline phrase cannot be resolved, which invalidates the race
    pub fn header(&self) -> RaceHeader {
        let mut header = RaceHeader::new(self.race_id);
        header.name = self.race_name();
        header.codex = self.codex();
        header.date = self.race_date();
        header.category = self.first_text("div.event-header__subtitle");

        match self.first_text("div.event-header__kind") {
            Some(kind) => match split_gender_discipline(&kind) {
                Some((gender, discipline)) => {
                    header.gender = parse_gender(gender);
                    if let Some(parsed) = parse_discipline(discipline) {
                        header.discipline = Some(parsed.discipline);
                        if parsed.training {
                            header.category = Some(TRAINING_CATEGORY.to_string());
                        }
                    }
                }
                None => log::warn!("Race {}: unrecognized header phrase {:?}", self.race_id, kind),
            },
            None => log::warn!("Race {}: no discipline header found", self.race_id),
        }

        if let Some((location, nation)) = self.location() {
            header.location = Some(location);
            header.nation = Some(nation);
        }

        header.course = self.course_details();
        header
    }

    fn first_text(&self, css: &str) -> Option<String> {
        self.document
            .select(&selector(css))
            .next()
            .map(|e| element_text(&e))
            .filter(|t| !t.is_empty())
    }

    fn race_name(&self) -> Option<String> {
        let title = self.first_text("title")?;
        let (_, name) = title.split_once("Results -")?;
        let name = name.trim();
        (!name.is_empty()).then(|| name.to_string())
    }

    /// Codex from the embedded page script, else from the "CODEX:" label
    fn codex(&self) -> Option<u32> {
        let script_re = Regex::new(r#"competitionCodex"?\s*:\s*"?(\d+)"#).unwrap();
        for script in self.document.select(&selector("script")) {
            let text: String = script.text().collect();
            if let Some(caps) = script_re.captures(&text) {
                if let Ok(codex) = caps[1].parse() {
                    return Some(codex);
                }
            }
        }

        let label_re = Regex::new(r"CODEX:\s*(\d{4})").unwrap();
        self.document
            .select(&selector("span"))
            .map(|span| element_text(&span))
            .filter(|text| text.contains("CODEX:"))
            .find_map(|text| {
                let caps = label_re.captures(&text)?;
                caps[1].parse().ok()
            })
    }

    fn race_date(&self) -> Option<NaiveDate> {
        let element = self
            .document
            .select(&selector("div.timezone-date[data-date]"))
            .next()?;
        let value = element.value().attr("data-date")?;
        match NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(e) => {
                log::warn!("Race {}: bad race date {:?}: {}", self.race_id, value, e);
                None
            }
        }
    }

    /// Place and nation code from a heading like "Aspen / Highlands (USA)"
    fn location(&self) -> Option<(String, String)> {
        let text = self.first_text("h1.heading")?;
        let re = Regex::new(r"(.+?)\s*\(([A-Z]{3})\)").unwrap();
        let caps = re.captures(&text)?;
        Some((caps[1].trim().to_string(), caps[2].to_string()))
    }

    // ==================== Course details ====================

    /// Course metrics from the "more info" sections; anything missing stays `None`
    pub fn course_details(&self) -> CourseDetails {
        let mut course = CourseDetails::default();
        let heading_sel = selector("h3.heading_l3");
        let row_sel = selector("div.table-row, a.table-row");

        for section in self.document.select(&selector("section.section_more-info")) {
            let Some(heading) = section.select(&heading_sel).next() else {
                continue;
            };
            let heading = element_text(&heading);

            if heading == "Technical data" {
                for row in section.select(&row_sel) {
                    if let Some((label, value)) = technical_label_value(&row) {
                        match label.as_str() {
                            "Start Altitude" => course.start_altitude = first_integer(&value),
                            "Finish Altitude" => course.finish_altitude = first_integer(&value),
                            "Length" => course.length = first_integer(&value),
                            "Homologation Number" => {
                                course.homologation = Some(value).filter(|v| !v.is_empty())
                            }
                            _ => {}
                        }
                    }
                }
            } else if heading.contains("1st Run") || heading.contains("Course") {
                for row in section.select(&row_sel) {
                    apply_run_gates(&row, &mut course.gates1, &mut course.turning_gates1);
                }
            } else if heading.contains("2nd Run") {
                for row in section.select(&row_sel) {
                    apply_run_gates(&row, &mut course.gates2, &mut course.turning_gates2);
                }
            }
        }

        course
    }

    // ==================== Result rows ====================

    /// False for races without published results (e.g. not yet held)
    pub fn has_results_table(&self) -> bool {
        self.results_table().is_some()
    }

    fn results_table(&self) -> Option<ElementRef<'_>> {
        self.document.select(&selector(RESULTS_TABLE)).next()
    }

    /// Rows of the finisher table, in page order
    pub fn finishers(&self) -> Vec<ParsedResultRow> {
        let Some(table) = self.results_table() else {
            return Vec::new();
        };
        table
            .select(&selector("a.table-row"))
            .filter_map(|row| self.parse_row(&row, None))
            .collect()
    }

    /// Rows of every non-finisher table, classified by each table's heading
    pub fn non_finishers(&self) -> Vec<ParsedResultRow> {
        let Some(container) = self
            .results_table()
            .and_then(|table| table.parent())
            .and_then(ElementRef::wrap)
        else {
            return Vec::new();
        };

        let row_sel = selector("a.table-row");
        let mut rows = Vec::new();

        for table in container.select(&selector("div.table__body")) {
            if table.value().id() == Some("events-info-results") {
                continue;
            }

            let heading = table
                .prev_siblings()
                .find_map(ElementRef::wrap)
                .map(|e| element_text(&e))
                .unwrap_or_default();

            let Some(status) = parse_status_heading(&heading) else {
                log::warn!(
                    "Race {}: dropping {} rows under unclassified heading {:?}",
                    self.race_id,
                    table.select(&row_sel).count(),
                    heading
                );
                continue;
            };

            rows.extend(
                table
                    .select(&row_sel)
                    .filter_map(|row| self.parse_row(&row, Some(status))),
            );
        }

        rows
    }

    /// Finishers followed by non-finishers
    pub fn results(&self) -> Vec<ParsedResultRow> {
        let mut results = self.finishers();
        results.extend(self.non_finishers());
        results
    }

    /// Parse one `a.table-row`. Rows lacking an athlete id, or lacking both a
    /// rank and a status, are dropped.
    fn parse_row(&self, row: &ElementRef, status: Option<ResultStatus>) -> Option<ParsedResultRow> {
        let href = row.value().attr("href").unwrap_or_default();
        let Some(athlete_id) = athlete_id_from_link(href) else {
            log::warn!("Race {}: result row without athlete id ({:?})", self.race_id, href);
            return None;
        };

        let Some(first_field) = row
            .select(&selector("div.g-row.container > div.g-row.justify-sb > div"))
            .next()
        else {
            log::warn!("Race {}: malformed result row for athlete {}", self.race_id, athlete_id);
            return None;
        };
        let rank: Option<u32> = element_text(&first_field).parse().ok();

        let placing = match (status, rank) {
            (Some(status), _) => Placing::Status(status),
            (None, Some(rank)) => Placing::Rank(rank),
            (None, None) => {
                log::warn!("Race {}: athlete {} has neither rank nor status", self.race_id, athlete_id);
                return None;
            }
        };

        let athlete_name = row
            .select(&selector("div.justify-left.bold"))
            .next()
            .map(|e| element_text(&e))
            .filter(|t| !t.is_empty());
        let nation = row
            .select(&selector("span.country__name-short"))
            .next()
            .map(|e| element_text(&e))
            .filter(|t| !t.is_empty());

        // Run times then total; speed events show a single time
        let times: Vec<String> = row
            .select(&selector("div.justify-right.bold.hidden-xs"))
            .map(|e| element_text(&e))
            .collect();
        let run1_time = times.first().and_then(|t| parse_time(t));
        let run2_time = if times.len() > 2 {
            parse_time(&times[1])
        } else {
            None
        };
        let total_time = times.last().and_then(|t| parse_time(t));

        // Non-finisher rows reuse the points slot for status text
        let points = match status {
            None => row
                .select(&selector("div.g-lg-2.g-md-2.g-sm-2.g-xs-3.justify-right"))
                .find_map(|e| parse_decimal(&element_text(&e))),
            Some(_) => None,
        };

        Some(ParsedResultRow {
            placing,
            athlete_id,
            athlete_name,
            nation,
            run1_time,
            run2_time,
            total_time,
            points,
        })
    }
}

/// Label/value pair of a "Technical data" row: bold left label, right-aligned value
fn technical_label_value(row: &ElementRef) -> Option<(String, String)> {
    let mut label = None;
    let mut value = None;
    for div in row.select(&selector("div")) {
        if has_classes(&div, &["justify-left", "bold"]) {
            label = Some(div);
        }
        if has_classes(&div, &["justify-right"]) {
            value = Some(div);
        }
    }
    Some((element_text(&label?), element_text(&value?)))
}

/// Fill per-run gate counts from a run section row; the first value per slot wins
fn apply_run_gates(row: &ElementRef, gates: &mut Option<u32>, turning_gates: &mut Option<u32>) {
    let mut label = None;
    let mut value = None;
    for div in row.select(&selector("div")) {
        if !has_classes(&div, &["justify-left"]) {
            continue;
        }
        if has_classes(&div, &["bold"]) {
            label = Some(div);
        } else if value.is_none() {
            value = Some(div);
        }
    }

    let (Some(label), Some(value)) = (label, value) else {
        return;
    };
    let value = element_text(&value);
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
        return;
    }
    let Ok(count) = value.parse::<u32>() else {
        return;
    };

    let slot = match element_text(&label).as_str() {
        "Number of Gates" => gates,
        "Turning Gates" => turning_gates,
        _ => return,
    };
    if slot.is_none() {
        *slot = Some(count);
    }
}
