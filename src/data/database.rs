//! SQLite database management for race results

use crate::{
    AthleteId, CourseDetails, Discipline, Gender, ParsedResultRow, PointsList, PointsListId, Race,
    RaceHeader, RaceId, RaceKey, RaceResult, Result, ResultStatus,
};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::HashMap;
use std::path::Path;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Column order read by `row_to_race`
const RACE_COLUMNS: &str = "id, external_race_id, race_date, discipline, codex, name, gender, \
     category, location, nation, start_altitude, finish_altitude, length, gates1, \
     turning_gates1, gates2, turning_gates2, homologation, win_time, penalty, \
     total_starters, total_finishers";

/// Database connection and operations
pub struct Database {
    conn: Connection,
}

/// Athlete fields taken from a points list row
#[derive(Debug, Clone, PartialEq)]
pub struct NewAthlete {
    pub external_id: i64,
    pub fis_code: Option<i64>,
    pub name: String,
    pub nation_code: Option<String>,
    pub gender: Option<Gender>,
    pub birth_year: Option<i32>,
}

/// Per-discipline points of one athlete on one points list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisciplinePoints {
    pub sl: Option<f64>,
    pub gs: Option<f64>,
    pub sg: Option<f64>,
    pub dh: Option<f64>,
    pub ac: Option<f64>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS athletes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                external_id INTEGER NOT NULL UNIQUE,
                fis_code INTEGER,
                name TEXT NOT NULL,
                nation_code TEXT,
                gender TEXT,
                birth_year INTEGER
            );

            CREATE TABLE IF NOT EXISTS points_lists (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                list_id TEXT,
                season TEXT,
                name TEXT,
                valid_from TEXT NOT NULL,
                valid_to TEXT NOT NULL,
                UNIQUE(season, list_id)
            );

            CREATE TABLE IF NOT EXISTS points_list_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                points_list_id INTEGER NOT NULL REFERENCES points_lists(id),
                athlete_id INTEGER NOT NULL REFERENCES athletes(id),
                sl_points REAL,
                gs_points REAL,
                sg_points REAL,
                dh_points REAL,
                ac_points REAL,
                UNIQUE(points_list_id, athlete_id)
            );

            CREATE TABLE IF NOT EXISTS races (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                external_race_id INTEGER NOT NULL,
                race_date TEXT NOT NULL,
                discipline TEXT NOT NULL,
                codex INTEGER,
                name TEXT,
                gender TEXT,
                category TEXT,
                location TEXT,
                nation TEXT,
                start_altitude INTEGER,
                finish_altitude INTEGER,
                length INTEGER,
                gates1 INTEGER,
                turning_gates1 INTEGER,
                gates2 INTEGER,
                turning_gates2 INTEGER,
                homologation TEXT,
                win_time REAL,
                penalty REAL,
                total_starters INTEGER,
                total_finishers INTEGER,
                UNIQUE(external_race_id, race_date, discipline)
            );

            CREATE TABLE IF NOT EXISTS race_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                race_id INTEGER NOT NULL REFERENCES races(id),
                athlete_id INTEGER NOT NULL REFERENCES athletes(id),
                rank INTEGER,
                status TEXT,
                run1_time REAL,
                run2_time REAL,
                total_time REAL,
                points REAL,
                CHECK ((rank IS NULL) <> (status IS NULL))
            );

            CREATE INDEX IF NOT EXISTS idx_races_external ON races(external_race_id);
            CREATE INDEX IF NOT EXISTS idx_results_race ON race_results(race_id);
            CREATE INDEX IF NOT EXISTS idx_points_lists_window ON points_lists(valid_from, valid_to);
            "#,
        )?;
        Ok(())
    }

    /// Begin a transaction; statements issued through `self` until commit are
    /// part of it, and dropping it uncommitted rolls everything back
    pub fn begin(&self) -> Result<Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }

    // ==================== Athlete Operations ====================

    /// Find an athlete by external athlete id
    pub fn find_athlete_id(&self, external_id: i64) -> Result<Option<AthleteId>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM athletes WHERE external_id = ?1",
                params![external_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.map(AthleteId))
    }

    /// Get or create an athlete keyed by external athlete id
    pub fn get_or_create_athlete(&self, athlete: &NewAthlete) -> Result<AthleteId> {
        if let Some(id) = self.find_athlete_id(athlete.external_id)? {
            return Ok(id);
        }

        self.conn.execute(
            "INSERT INTO athletes (external_id, fis_code, name, nation_code, gender, birth_year)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                athlete.external_id,
                athlete.fis_code,
                athlete.name,
                athlete.nation_code,
                athlete.gender.map(|g| g.code()),
                athlete.birth_year,
            ],
        )?;
        Ok(AthleteId(self.conn.last_insert_rowid()))
    }

    /// External id to athlete id table for everyone on a points list
    pub fn athlete_ids_for_points_list(
        &self,
        points_list: PointsListId,
    ) -> Result<HashMap<i64, AthleteId>> {
        let mut stmt = self.conn.prepare(
            "SELECT a.external_id, a.id
             FROM points_list_entries e
             JOIN athletes a ON a.id = e.athlete_id
             WHERE e.points_list_id = ?1",
        )?;

        let table = stmt
            .query_map(params![points_list.0], |row| {
                Ok((row.get::<_, i64>(0)?, AthleteId(row.get(1)?)))
            })?
            .collect::<std::result::Result<HashMap<_, _>, _>>()?;

        Ok(table)
    }

    // ==================== Points List Operations ====================

    /// Points list whose validity window contains `date`
    pub fn points_list_for_date(&self, date: NaiveDate) -> Result<Option<PointsList>> {
        let date = date.format(DATE_FORMAT).to_string();
        let list = self
            .conn
            .query_row(
                "SELECT id, list_id, name, valid_from, valid_to FROM points_lists
                 WHERE valid_from <= ?1 AND valid_to >= ?1
                 ORDER BY valid_from DESC
                 LIMIT 1",
                params![date],
                Self::row_to_points_list,
            )
            .optional()?;
        Ok(list)
    }

    /// Find a points list by its season and list id
    pub fn find_points_list(&self, season: &str, list_id: &str) -> Result<Option<PointsList>> {
        let list = self
            .conn
            .query_row(
                "SELECT id, list_id, name, valid_from, valid_to FROM points_lists
                 WHERE season = ?1 AND list_id = ?2",
                params![season, list_id],
                Self::row_to_points_list,
            )
            .optional()?;
        Ok(list)
    }

    pub fn insert_points_list(
        &self,
        season: &str,
        list_id: &str,
        name: Option<&str>,
        valid_from: NaiveDate,
        valid_to: NaiveDate,
    ) -> Result<PointsListId> {
        self.conn.execute(
            "INSERT INTO points_lists (season, list_id, name, valid_from, valid_to)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                season,
                list_id,
                name,
                valid_from.format(DATE_FORMAT).to_string(),
                valid_to.format(DATE_FORMAT).to_string(),
            ],
        )?;
        Ok(PointsListId(self.conn.last_insert_rowid()))
    }

    pub fn upsert_points_list_entry(
        &self,
        points_list: PointsListId,
        athlete: AthleteId,
        points: &DisciplinePoints,
    ) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO points_list_entries (points_list_id, athlete_id,
                                             sl_points, gs_points, sg_points, dh_points, ac_points)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(points_list_id, athlete_id) DO UPDATE SET
                sl_points = excluded.sl_points,
                gs_points = excluded.gs_points,
                sg_points = excluded.sg_points,
                dh_points = excluded.dh_points,
                ac_points = excluded.ac_points
            "#,
            params![
                points_list.0,
                athlete.0,
                points.sl,
                points.gs,
                points.sg,
                points.dh,
                points.ac,
            ],
        )?;
        Ok(())
    }

    fn row_to_points_list(row: &rusqlite::Row) -> rusqlite::Result<PointsList> {
        Ok(PointsList {
            id: PointsListId(row.get(0)?),
            list_id: row.get(1)?,
            name: row.get(2)?,
            valid_from: Self::date_column(row, 3)?,
            valid_to: Self::date_column(row, 4)?,
        })
    }

    // ==================== Race Operations ====================

    /// Look up a race by its identity key
    pub fn find_race(&self, key: &RaceKey) -> Result<Option<Race>> {
        let race = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM races
                     WHERE external_race_id = ?1 AND race_date = ?2 AND discipline = ?3",
                    RACE_COLUMNS
                ),
                params![
                    key.external_race_id,
                    key.date.format(DATE_FORMAT).to_string(),
                    key.discipline.code(),
                ],
                Self::row_to_race,
            )
            .optional()?;
        Ok(race)
    }

    /// All stored races carrying the given external race id
    pub fn find_races_by_external_id(&self, external_race_id: i64) -> Result<Vec<Race>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM races WHERE external_race_id = ?1 ORDER BY race_date",
            RACE_COLUMNS
        ))?;

        let races = stmt
            .query_map(params![external_race_id], Self::row_to_race)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(races)
    }

    /// Insert a race row; returns false if the identity key already exists
    pub fn insert_race(&self, key: &RaceKey, header: &RaceHeader) -> Result<bool> {
        let course = &header.course;
        let inserted = self.conn.execute(
            r#"
            INSERT INTO races (external_race_id, race_date, discipline, codex, name, gender,
                               category, location, nation, start_altitude, finish_altitude,
                               length, gates1, turning_gates1, gates2, turning_gates2,
                               homologation, win_time, penalty, total_starters, total_finishers)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                    ?17, ?18, ?19, ?20, ?21)
            ON CONFLICT(external_race_id, race_date, discipline) DO NOTHING
            "#,
            params![
                key.external_race_id,
                key.date.format(DATE_FORMAT).to_string(),
                key.discipline.code(),
                header.codex,
                header.name,
                header.gender.map(|g| g.code()),
                header.category,
                header.location,
                header.nation,
                course.start_altitude,
                course.finish_altitude,
                course.length,
                course.gates1,
                course.turning_gates1,
                course.gates2,
                course.turning_gates2,
                course.homologation,
                header.win_time,
                header.penalty,
                header.total_starters,
                header.total_finishers,
            ],
        )?;
        Ok(inserted > 0)
    }

    pub fn count_race_results(&self, race: RaceId) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM race_results WHERE race_id = ?1",
            params![race.0],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn insert_race_result(
        &self,
        race: RaceId,
        athlete: AthleteId,
        row: &ParsedResultRow,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO race_results (race_id, athlete_id, rank, status, run1_time, run2_time,
                                       total_time, points)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                race.0,
                athlete.0,
                row.rank(),
                row.status().map(|s| s.code()),
                row.run1_time,
                row.run2_time,
                row.total_time,
                row.points,
            ],
        )?;
        Ok(())
    }

    /// Stored results of a race in insertion order
    pub fn get_race_results(&self, race: RaceId) -> Result<Vec<RaceResult>> {
        let mut stmt = self.conn.prepare(
            "SELECT race_id, athlete_id, rank, status, run1_time, run2_time, total_time, points
             FROM race_results
             WHERE race_id = ?1
             ORDER BY id",
        )?;

        let results = stmt
            .query_map(params![race.0], |row| {
                let status: Option<String> = row.get(3)?;
                let status = match status {
                    Some(code) => Some(ResultStatus::from_code(&code).ok_or_else(|| {
                        rusqlite::Error::InvalidColumnType(
                            3,
                            code.clone(),
                            rusqlite::types::Type::Text,
                        )
                    })?),
                    None => None,
                };
                Ok(RaceResult {
                    race_id: RaceId(row.get(0)?),
                    athlete_id: AthleteId(row.get(1)?),
                    rank: row.get(2)?,
                    status,
                    run1_time: row.get(4)?,
                    run2_time: row.get(5)?,
                    total_time: row.get(6)?,
                    points: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(results)
    }

    fn row_to_race(row: &rusqlite::Row) -> rusqlite::Result<Race> {
        let discipline: String = row.get(3)?;
        let discipline = Discipline::from_code(&discipline).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(3, discipline.clone(), rusqlite::types::Type::Text)
        })?;

        let gender: Option<String> = row.get(6)?;
        let gender = match gender {
            Some(code) => Some(Gender::from_code(&code).ok_or_else(|| {
                rusqlite::Error::InvalidColumnType(6, code.clone(), rusqlite::types::Type::Text)
            })?),
            None => None,
        };

        Ok(Race {
            id: RaceId(row.get(0)?),
            external_race_id: row.get(1)?,
            date: Self::date_column(row, 2)?,
            discipline,
            codex: row.get(4)?,
            name: row.get(5)?,
            gender,
            category: row.get(7)?,
            location: row.get(8)?,
            nation: row.get(9)?,
            course: CourseDetails {
                start_altitude: row.get(10)?,
                finish_altitude: row.get(11)?,
                length: row.get(12)?,
                gates1: row.get(13)?,
                turning_gates1: row.get(14)?,
                gates2: row.get(15)?,
                turning_gates2: row.get(16)?,
                homologation: row.get(17)?,
            },
            win_time: row.get(18)?,
            penalty: row.get(19)?,
            total_starters: row.get(20)?,
            total_finishers: row.get(21)?,
        })
    }

    fn date_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
        let text: String = row.get(idx)?;
        NaiveDate::parse_from_str(&text, DATE_FORMAT).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
    }

    // ==================== Statistics ====================

    /// Get database statistics
    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let count = |table: &str| -> Result<usize> {
            let n: i64 = self.conn.query_row(
                &format!("SELECT COUNT(*) FROM {}", table),
                [],
                |row| row.get(0),
            )?;
            Ok(n as usize)
        };

        let (min_date, max_date): (Option<String>, Option<String>) = self.conn.query_row(
            "SELECT MIN(race_date), MAX(race_date) FROM races",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(DatabaseStats {
            athlete_count: count("athletes")?,
            points_list_count: count("points_lists")?,
            race_count: count("races")?,
            result_count: count("race_results")?,
            earliest_race: min_date.and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok()),
            latest_race: max_date.and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok()),
        })
    }
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub athlete_count: usize,
    pub points_list_count: usize,
    pub race_count: usize,
    pub result_count: usize,
    pub earliest_race: Option<NaiveDate>,
    pub latest_race: Option<NaiveDate>,
}
