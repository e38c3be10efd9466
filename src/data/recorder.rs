//! Idempotent race persistence
//!
//! A race is identified by (external race id, date, discipline). Results are
//! written once per race in a single transaction; a later run that parses a
//! different number of rows is flagged for manual review, never reconciled.

use super::cache::AthleteCache;
use super::Database;
use crate::{ParsedResultRow, PointsList, Race, RaceHeader, Result};

/// Outcome of recording one race
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Results were written; the count excludes rows whose athlete was unknown
    Saved(usize),
    /// The race already holds exactly as many results as were parsed
    AlreadyRecorded,
    /// Stored and parsed result counts differ
    Conflict { existing: usize, parsed: usize },
    /// Race stored without results (e.g. not yet held)
    NoResults,
    /// The header lacks an identity field, so nothing was stored
    Unresolvable,
}

impl RecordOutcome {
    /// Number of result rows newly written
    pub fn saved(&self) -> usize {
        match self {
            RecordOutcome::Saved(n) => *n,
            _ => 0,
        }
    }
}

pub struct RaceRecorder<'a> {
    db: &'a Database,
    athletes: AthleteCache,
}

impl<'a> RaceRecorder<'a> {
    pub fn new(db: &'a Database) -> Self {
        RaceRecorder {
            db,
            athletes: AthleteCache::new(),
        }
    }

    /// Stored race for the header's identity key, creating it from the header
    /// if absent. Existing races are returned unmodified. `None` if the header
    /// lacks an identity field; the flag is true when the race was created.
    pub fn get_or_create_race(&self, header: &RaceHeader) -> Result<Option<(Race, bool)>> {
        let Some(key) = header.key() else {
            return Ok(None);
        };

        if let Some(race) = self.db.find_race(&key)? {
            return Ok(Some((race, false)));
        }

        let created = self.db.insert_race(&key, header)?;
        let race = self.db.find_race(&key)?;
        Ok(race.map(|race| (race, created)))
    }

    /// Store a race and its results, all or nothing. Athletes are resolved by
    /// external id only; a row whose athlete is unknown is skipped and logged.
    pub fn record_race(
        &mut self,
        header: &RaceHeader,
        results: &[ParsedResultRow],
        points_list: Option<&PointsList>,
    ) -> Result<RecordOutcome> {
        let db = self.db;
        let tx = db.begin()?;

        let Some((race, created)) = self.get_or_create_race(header)? else {
            log::error!(
                "Race {}: missing identity field, cannot store",
                header.external_race_id
            );
            return Ok(RecordOutcome::Unresolvable);
        };

        if !created {
            let existing = db.count_race_results(race.id)?;
            if existing > 0 {
                if existing == results.len() {
                    log::info!("{} already has {} results", race.id, existing);
                    return Ok(RecordOutcome::AlreadyRecorded);
                }
                log::error!(
                    "{} (external {}) conflict: {} stored results, {} parsed; needs manual review",
                    race.id,
                    race.external_race_id,
                    existing,
                    results.len()
                );
                return Ok(RecordOutcome::Conflict {
                    existing,
                    parsed: results.len(),
                });
            }
        }

        if results.is_empty() {
            tx.commit()?;
            log::info!("{} stored without results", race.id);
            return Ok(RecordOutcome::NoResults);
        }

        let mut saved = 0;
        for row in results {
            let Some(athlete) = self.athletes.resolve(db, points_list, row.athlete_id)? else {
                log::warn!(
                    "{}: athlete {} ({}) not found, skipping result",
                    race.id,
                    row.athlete_id,
                    row.athlete_name.as_deref().unwrap_or("unknown")
                );
                continue;
            };
            db.insert_race_result(race.id, athlete, row)?;
            saved += 1;
        }

        tx.commit()?;
        log::info!("{}: saved {} of {} results", race.id, saved, results.len());
        Ok(RecordOutcome::Saved(saved))
    }
}
