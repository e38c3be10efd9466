//! Race-level statistics derived from parsed result rows

use crate::{ParsedResultRow, RaceHeader};

/// Starter and finisher counts plus the winner's figures
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RaceStatistics {
    pub total_starters: u32,
    pub total_finishers: u32,
    /// Total time of the rank-1 row
    pub win_time: Option<f64>,
    /// Points of the rank-1 row, which equal the race penalty
    pub penalty: Option<f64>,
}

impl RaceStatistics {
    /// Compute statistics over finisher and non-finisher rows together
    pub fn from_rows(rows: &[ParsedResultRow]) -> Self {
        let total_finishers = rows.iter().filter(|r| r.total_time.is_some()).count();

        // Only a first-run DNS means the athlete never left the start
        let never_started = rows
            .iter()
            .filter(|r| r.status().is_some_and(|s| s.never_started()))
            .count();

        let winner = rows.iter().find(|r| r.rank() == Some(1));

        RaceStatistics {
            total_starters: (rows.len() - never_started) as u32,
            total_finishers: total_finishers as u32,
            win_time: winner.and_then(|r| r.total_time),
            penalty: winner.and_then(|r| r.points),
        }
    }

    /// Copy the statistics onto a race header
    pub fn apply_to(&self, header: &mut RaceHeader) {
        header.total_starters = Some(self.total_starters);
        header.total_finishers = Some(self.total_finishers);
        header.win_time = self.win_time;
        header.penalty = self.penalty;
    }
}
