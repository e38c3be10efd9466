//! Data ingestion and storage
//!
//! Scrapers for the FIS results site, the SQLite store, and the pipeline that
//! ties them together per race.

pub mod cache;
pub mod database;
pub mod ingest;
pub mod points;
pub mod recorder;
pub mod scrapers;
pub mod stats;

#[cfg(test)]
pub(crate) mod fixtures;

pub use database::Database;
pub use ingest::{scrape_race, BatchSummary, IngestReport, IngestStatus, RaceIngester, ScrapedRace};
pub use recorder::{RaceRecorder, RecordOutcome};
