//! Per-race ingestion pipeline
//!
//! Fetch, parse, check the points list dependency, derive statistics, then
//! persist. Races are processed one at a time; a failing race is reported
//! and the batch moves on.

use super::points::{ensure_points_list, PointsListSource};
use super::scrapers::discovery::{race_url, Discovery};
use super::scrapers::race_page::RacePage;
use super::scrapers::Fetcher;
use super::stats::RaceStatistics;
use super::{Database, RaceRecorder, RecordOutcome};
use crate::{FisError, ParsedResultRow, RaceHeader, Result, ScraperConfig};
use serde::Serialize;
use std::fmt;

/// A parsed race page with statistics applied to the header
#[derive(Debug, Clone, Serialize)]
pub struct ScrapedRace {
    pub header: RaceHeader,
    pub results: Vec<ParsedResultRow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStatus {
    Created,
    Skipped,
    Conflict,
    Error,
}

impl fmt::Display for IngestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IngestStatus::Created => "created",
            IngestStatus::Skipped => "skipped",
            IngestStatus::Conflict => "conflict",
            IngestStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Result of ingesting one race
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub race_id: i64,
    pub status: IngestStatus,
    /// Result rows newly stored
    pub count: usize,
}

impl IngestReport {
    fn new(race_id: i64, status: IngestStatus, count: usize) -> Self {
        IngestReport {
            race_id,
            status,
            count,
        }
    }
}

/// Aggregate counts of a sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub recorded: usize,
    pub no_new_results: usize,
    pub errors: usize,
}

/// Fetch and parse a race without touching the store. Fails if the page
/// lacks a race date or a known discipline.
pub fn scrape_race(
    fetcher: &dyn Fetcher,
    config: &ScraperConfig,
    race_id: i64,
) -> Result<ScrapedRace> {
    let html = fetcher.get(&race_url(&config.base_url, race_id))?;
    let page = RacePage::parse(race_id, &html);

    let mut header = page.header();
    if header.discipline.is_none() {
        return Err(FisError::InvalidRace {
            race_id,
            reason: "discipline could not be parsed".to_string(),
        });
    }
    if header.date.is_none() {
        return Err(FisError::InvalidRace {
            race_id,
            reason: "race date could not be parsed".to_string(),
        });
    }

    if !page.has_results_table() {
        log::warn!("No results table found for race {}", race_id);
    }
    let results = page.results();
    RaceStatistics::from_rows(&results).apply_to(&mut header);

    log::debug!("Scraped {} results for race {}", results.len(), race_id);
    Ok(ScrapedRace { header, results })
}

pub struct RaceIngester<'a> {
    fetcher: &'a dyn Fetcher,
    points: &'a dyn PointsListSource,
    db: &'a Database,
    config: &'a ScraperConfig,
    recorder: RaceRecorder<'a>,
}

impl<'a> RaceIngester<'a> {
    pub fn new(
        fetcher: &'a dyn Fetcher,
        points: &'a dyn PointsListSource,
        db: &'a Database,
        config: &'a ScraperConfig,
    ) -> Self {
        RaceIngester {
            fetcher,
            points,
            db,
            config,
            recorder: RaceRecorder::new(db),
        }
    }

    pub fn scrape(&self, race_id: i64) -> Result<ScrapedRace> {
        scrape_race(self.fetcher, self.config, race_id)
    }

    /// Ingest one race. Failures are logged and reported as `Error`.
    pub fn ingest(&mut self, race_id: i64) -> IngestReport {
        match self.try_ingest(race_id) {
            Ok(report) => report,
            Err(e) => {
                log::error!(
                    "Race {} ({}): {}",
                    race_id,
                    race_url(&self.config.base_url, race_id),
                    e
                );
                IngestReport::new(race_id, IngestStatus::Error, 0)
            }
        }
    }

    fn try_ingest(&mut self, race_id: i64) -> Result<IngestReport> {
        let ScrapedRace { header, results } = self.scrape(race_id)?;

        let outcome = if results.is_empty() {
            self.recorder.record_race(&header, &results, None)?
        } else {
            let date = header.date.ok_or_else(|| FisError::InvalidRace {
                race_id,
                reason: "race date could not be parsed".to_string(),
            })?;
            let Some(points_list) = ensure_points_list(self.db, self.points, date)? else {
                return Err(FisError::MissingPointsList { race_id, date });
            };
            self.recorder
                .record_race(&header, &results, Some(&points_list))?
        };

        let report = match outcome {
            RecordOutcome::Saved(n) => IngestReport::new(race_id, IngestStatus::Created, n),
            RecordOutcome::AlreadyRecorded | RecordOutcome::NoResults => {
                IngestReport::new(race_id, IngestStatus::Skipped, 0)
            }
            RecordOutcome::Conflict { .. } => IngestReport::new(race_id, IngestStatus::Conflict, 0),
            RecordOutcome::Unresolvable => IngestReport::new(race_id, IngestStatus::Error, 0),
        };
        Ok(report)
    }

    /// Ingest every race of the given events. Races that already hold
    /// results are skipped without fetching.
    pub fn process_events(&mut self, events: &[String]) -> BatchSummary {
        let mut summary = BatchSummary::default();
        let discovery = Discovery::new(self.fetcher, self.config);

        for event in events {
            let race_ids = match discovery.find_races_by_event(event) {
                Ok(ids) => ids,
                Err(e) => {
                    log::error!("Event {}: {}", event, e);
                    summary.errors += 1;
                    continue;
                }
            };

            for race_id in race_ids {
                match self.already_recorded(race_id) {
                    Ok(true) => {
                        log::debug!("Race {} already recorded; skipping", race_id);
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        log::error!("Race {}: {}", race_id, e);
                        summary.errors += 1;
                        continue;
                    }
                }

                let report = self.ingest(race_id);
                match report.status {
                    IngestStatus::Created if report.count > 0 => summary.recorded += 1,
                    IngestStatus::Error => summary.errors += 1,
                    _ => summary.no_new_results += 1,
                }
            }
        }

        log::info!(
            "Recorded {} races, {} with no new results, {} errors",
            summary.recorded,
            summary.no_new_results,
            summary.errors
        );
        summary
    }

    fn already_recorded(&self, race_id: i64) -> Result<bool> {
        for race in self.db.find_races_by_external_id(race_id)? {
            if self.db.count_race_results(race.id)? > 0 {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::{self, PageLayout};
    use crate::data::points::testing::StubSource;
    use crate::data::scrapers::testing::MapFetcher;

    const EVENT: &str = "https://www.fis-ski.com/DB/general/event-details.html?sectorcode=AL&eventid=56543";

    fn page_url(race_id: i64) -> String {
        race_url(&ScraperConfig::default().base_url, race_id)
    }

    fn event_page(race_ids: &[i64]) -> String {
        let links: String = race_ids
            .iter()
            .map(|id| {
                format!(
                    r#"<a class="g-lg-2 g-md-3 g-sm-2 g-xs-4 px-md-1 px-lg-1 pl-xs-1 justify-left" href="{}">Race</a>"#,
                    page_url(*id)
                )
            })
            .collect();
        format!("<html><body>{}</body></html>", links)
    }

    #[test]
    fn test_ingest_end_to_end() {
        let db = Database::in_memory().unwrap();
        let layout = PageLayout::large_slalom();
        fixtures::seed_athletes(&db, &layout, &[]);
        let fetcher = MapFetcher::new().with_page(&page_url(124886), fixtures::race_page(&layout));
        let source = StubSource::march_2025();
        let config = ScraperConfig::default();
        let mut ingester = RaceIngester::new(&fetcher, &source, &db, &config);

        let first = ingester.ingest(124886);
        assert_eq!(first.status, IngestStatus::Created);
        assert_eq!(first.count, layout.total_rows());
        assert_eq!(first.count, 97);
        assert_eq!(source.ingest_calls.get(), 1);

        let second = ingester.ingest(124886);
        assert_eq!(second.status, IngestStatus::Skipped);
        assert_eq!(second.count, 0);
        assert_eq!(source.ingest_calls.get(), 1);

        let races = db.find_races_by_external_id(124886).unwrap();
        assert_eq!(races.len(), 1);
        assert_eq!(races[0].total_finishers, Some(45));
        assert_eq!(races[0].total_starters, Some(96));
        assert_eq!(db.count_race_results(races[0].id).unwrap(), 97);
    }

    #[test]
    fn test_missing_points_list_abandons_race() {
        let db = Database::in_memory().unwrap();
        let layout = PageLayout::slalom(3, &[]);
        fixtures::seed_athletes(&db, &layout, &[]);
        let fetcher = MapFetcher::new().with_page(&page_url(124886), fixtures::race_page(&layout));
        let source = StubSource::new(Vec::new());
        let config = ScraperConfig::default();
        let mut ingester = RaceIngester::new(&fetcher, &source, &db, &config);

        let report = ingester.ingest(124886);
        assert_eq!(report.status, IngestStatus::Error);
        assert_eq!(source.ingest_calls.get(), 0);
        assert_eq!(db.get_stats().unwrap().race_count, 0);
    }

    #[test]
    fn test_future_race_is_stored_without_results() {
        let db = Database::in_memory().unwrap();
        let fetcher =
            MapFetcher::new().with_page(&page_url(127132), fixtures::race_page(&PageLayout::future()));
        let source = StubSource::march_2025();
        let config = ScraperConfig::default();
        let mut ingester = RaceIngester::new(&fetcher, &source, &db, &config);

        let report = ingester.ingest(127132);
        assert_eq!(report.status, IngestStatus::Skipped);
        assert_eq!(source.ingest_calls.get(), 0);

        let races = db.find_races_by_external_id(127132).unwrap();
        assert_eq!(races.len(), 1);
        assert_eq!(races[0].total_starters, Some(0));
    }

    #[test]
    fn test_scrape_rejects_unknown_discipline() {
        let db = Database::in_memory().unwrap();
        let mut layout = PageLayout::slalom(1, &[]);
        layout.kind = "Men's Parallel Slalom";
        let fetcher = MapFetcher::new().with_page(&page_url(1), fixtures::race_page(&layout));
        let source = StubSource::march_2025();
        let config = ScraperConfig::default();
        let mut ingester = RaceIngester::new(&fetcher, &source, &db, &config);

        assert!(matches!(
            ingester.scrape(1),
            Err(FisError::InvalidRace { race_id: 1, .. })
        ));
        assert_eq!(ingester.ingest(1).status, IngestStatus::Error);
        assert_eq!(db.get_stats().unwrap().race_count, 0);
    }

    #[test]
    fn test_scrape_rejects_unparsable_date() {
        let db = Database::in_memory().unwrap();
        let mut layout = PageLayout::slalom(1, &[]);
        layout.date = "20.03.2025";
        fixtures::seed_athletes(&db, &layout, &[]);
        let fetcher = MapFetcher::new().with_page(&page_url(124886), fixtures::race_page(&layout));
        let source = StubSource::march_2025();
        let config = ScraperConfig::default();
        let mut ingester = RaceIngester::new(&fetcher, &source, &db, &config);

        assert!(matches!(
            scrape_race(&fetcher, &config, 124886),
            Err(FisError::InvalidRace { race_id: 124886, .. })
        ));
        let report = ingester.ingest(124886);
        assert_eq!(report.status, IngestStatus::Error);
        assert_eq!(report.count, 0);
        assert_eq!(source.ingest_calls.get(), 0);
        assert_eq!(db.get_stats().unwrap().race_count, 0);
        assert_eq!(db.get_stats().unwrap().result_count, 0);
    }

    #[test]
    fn test_scrape_returns_header_and_rows() {
        let db = Database::in_memory().unwrap();
        let layout = PageLayout::slalom(2, &[("Did Not Start 1st Run", 1)]);
        let fetcher = MapFetcher::new().with_page(&page_url(124886), fixtures::race_page(&layout));
        let source = StubSource::march_2025();
        let config = ScraperConfig::default();
        let ingester = RaceIngester::new(&fetcher, &source, &db, &config);

        let scraped = ingester.scrape(124886).unwrap();
        assert_eq!(scraped.results.len(), 3);
        assert_eq!(scraped.header.total_starters, Some(2));
        assert_eq!(scraped.header.total_finishers, Some(2));
        assert_eq!(db.get_stats().unwrap().race_count, 0);
    }

    #[test]
    fn test_process_events_counts() {
        let db = Database::in_memory().unwrap();
        let layout = PageLayout::slalom(3, &[("Did Not Finish 1st Run", 1)]);
        fixtures::seed_athletes(&db, &layout, &[]);
        let missing_event = "https://www.fis-ski.com/DB/general/event-details.html?eventid=1";
        let fetcher = MapFetcher::new()
            .with_page(EVENT, event_page(&[124886, 127132, 124888]))
            .with_page(&page_url(124886), fixtures::race_page(&layout))
            .with_page(&page_url(127132), fixtures::race_page(&PageLayout::future()));
        let source = StubSource::march_2025();
        let config = ScraperConfig::default();
        let mut ingester = RaceIngester::new(&fetcher, &source, &db, &config);
        let events = vec![EVENT.to_string(), missing_event.to_string()];

        let summary = ingester.process_events(&events);
        assert_eq!(
            summary,
            BatchSummary {
                recorded: 1,
                no_new_results: 1,
                errors: 2,
            }
        );

        // Recorded races are not fetched again
        fetcher.requests.borrow_mut().clear();
        let again = ingester.process_events(&events);
        assert_eq!(again.recorded, 0);
        assert_eq!(again.no_new_results, 1);
        assert_eq!(again.errors, 2);
        assert!(!fetcher.requests.borrow().contains(&page_url(124886)));
    }
}
