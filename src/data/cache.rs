//! Athlete id lookup cache
//!
//! Maps external athlete ids to stored athlete ids, one table per points
//! list, loaded on first use and kept for the life of the process.

use super::Database;
use crate::{AthleteId, PointsList, PointsListId, Result};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct AthleteCache {
    tables: HashMap<PointsListId, HashMap<i64, AthleteId>>,
}

impl AthleteCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve an external athlete id. The points list's table is consulted
    /// first; athletes missing from it are looked up directly by external id.
    /// Never creates athletes.
    pub fn resolve(
        &mut self,
        db: &Database,
        points_list: Option<&PointsList>,
        external_id: i64,
    ) -> Result<Option<AthleteId>> {
        if let Some(list) = points_list {
            let table = self.table(db, list.id)?;
            if let Some(&id) = table.get(&external_id) {
                return Ok(Some(id));
            }
        }
        db.find_athlete_id(external_id)
    }

    fn table(&mut self, db: &Database, list: PointsListId) -> Result<&HashMap<i64, AthleteId>> {
        if !self.tables.contains_key(&list) {
            let table = db.athlete_ids_for_points_list(list)?;
            log::debug!("Cached {} athletes for points list {}", table.len(), list.0);
            self.tables.insert(list, table);
        }
        Ok(&self.tables[&list])
    }

    /// Number of points lists loaded so far
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::database::{DisciplinePoints, NewAthlete};
    use chrono::NaiveDate;

    fn athlete(external_id: i64) -> NewAthlete {
        NewAthlete {
            external_id,
            fis_code: None,
            name: format!("ATHLETE {}", external_id),
            nation_code: None,
            gender: None,
            birth_year: None,
        }
    }

    #[test]
    fn test_resolves_from_points_list_table() {
        let db = Database::in_memory().unwrap();
        let date = |d| NaiveDate::from_ymd_opt(2025, 3, d).unwrap();
        let list_id = db.insert_points_list("2025", "83", None, date(1), date(31)).unwrap();
        let on_list = db.get_or_create_athlete(&athlete(10)).unwrap();
        db.upsert_points_list_entry(list_id, on_list, &DisciplinePoints::default())
            .unwrap();
        let off_list = db.get_or_create_athlete(&athlete(20)).unwrap();
        let list = db.points_list_for_date(date(15)).unwrap().unwrap();

        let mut cache = AthleteCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.resolve(&db, Some(&list), 10).unwrap(), Some(on_list));
        assert_eq!(cache.len(), 1);

        // Falls back to the athletes table
        assert_eq!(cache.resolve(&db, Some(&list), 20).unwrap(), Some(off_list));
        assert_eq!(cache.resolve(&db, None, 10).unwrap(), Some(on_list));
        assert_eq!(cache.resolve(&db, Some(&list), 99).unwrap(), None);
        assert_eq!(cache.len(), 1);
    }
}
