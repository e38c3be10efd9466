//! Points list dependency resolution
//!
//! Results can only be linked to athletes through a points list valid on the
//! race date. The resolver consults the store first and falls back to the
//! points list source's catalog, delegating ingestion entirely.

use super::Database;
use crate::{PointsList, Result};
use chrono::NaiveDate;

/// A points list offered by the source's catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointsListDescriptor {
    /// Sector code, e.g. "AL"
    pub sector: String,
    /// Season code, e.g. "2025"
    pub season: String,
    pub list_id: Option<String>,
    pub name: String,
    pub valid_from: NaiveDate,
    pub valid_to: NaiveDate,
}

impl PointsListDescriptor {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.valid_from <= date && date <= self.valid_to
    }
}

/// Catalog and loader for points lists
pub trait PointsListSource {
    /// Every list currently published
    fn list_available(&self) -> Result<Vec<PointsListDescriptor>>;

    /// Load a list into the store; `Ok(false)` when the list could not be loaded
    fn ingest(&self, db: &Database, descriptor: &PointsListDescriptor) -> Result<bool>;
}

/// Points list valid on `date`, ingesting the first covering catalog entry
/// when the store has none. `None` means the race cannot be linked to athletes.
pub fn ensure_points_list(
    db: &Database,
    source: &dyn PointsListSource,
    date: NaiveDate,
) -> Result<Option<PointsList>> {
    if let Some(list) = db.points_list_for_date(date)? {
        return Ok(Some(list));
    }

    let available = source.list_available()?;
    let Some(descriptor) = available.iter().find(|d| d.covers(date)) else {
        log::warn!("No published points list covers {}", date);
        return Ok(None);
    };

    log::info!("Ingesting points list {:?} for {}", descriptor.name, date);
    match source.ingest(db, descriptor) {
        Ok(true) => {}
        Ok(false) => log::error!("Points list {:?} was not loaded", descriptor.name),
        Err(e) => log::error!("Failed to ingest points list {:?}: {}", descriptor.name, e),
    }

    db.points_list_for_date(date)
}
