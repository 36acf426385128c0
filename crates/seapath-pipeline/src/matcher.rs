//! Journey pattern matching over encoded port visits.
//!
//! A journey from origin `O` to destination `D` is an `O` visit followed
//! by a possibly empty run of other ports and then a `D` visit, with no
//! journey break, no second `O` and no earlier `D` in between. Matches
//! are found leftmost first and never overlap: scanning resumes right
//! after the previous match's destination.
//!
//! A match is admissible only if its intermediate ports are all
//! distinct. A revisited intermediate port means the vessel looped
//! rather than sailing the OD leg directly.

use std::collections::HashSet;
use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};

use crate::encode::{Symbol, VesselPortSequence, Visit, collapse_runs};
use crate::types::{PortCode, PositionRecord, VesselId};

/// Visit indices of one raw match: `start` is the origin visit and `end`
/// the destination visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JourneyMatch {
    /// Index of the origin visit.
    pub start: usize,
    /// Index of the destination visit.
    pub end: usize,
}

/// One accepted origin-to-destination transit of one vessel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JourneySlice {
    /// Vessel that made the transit.
    pub vessel_id: VesselId,
    /// Per-vessel ordinal, starting at 1.
    pub route_id: u32,
    /// Absolute rows in the position table, inclusive on both ends.
    pub rows: RangeInclusive<usize>,
    /// Time of the first row (departure from the origin).
    pub start_time: DateTime<Utc>,
    /// Time of the last row (arrival at the destination).
    pub end_time: DateTime<Utc>,
}

impl JourneySlice {
    /// Number of rows covered.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.end() - self.rows.start() + 1
    }
}

/// Raw matches of `origin` then `destination` in `visits`, without the
/// admissibility check.
#[must_use]
pub fn scan(visits: &[Visit], origin: Symbol, destination: Symbol) -> Vec<JourneyMatch> {
    let mut matches = Vec::new();
    let mut open: Option<usize> = None;
    for (i, visit) in visits.iter().enumerate() {
        match *visit {
            Visit::Port(s) if s == origin => open = Some(i),
            Visit::Port(s) if s == destination => {
                if let Some(start) = open.take() {
                    matches.push(JourneyMatch { start, end: i });
                }
            }
            Visit::Break => open = None,
            Visit::Port(_) => {}
        }
    }
    matches
}

/// Whether the visits strictly between a match's endpoints, after
/// collapsing runs, are pairwise distinct.
#[must_use]
pub fn is_admissible(visits: &[Visit], m: JourneyMatch) -> bool {
    if m.end <= m.start + 1 {
        return true;
    }
    let between = collapse_runs(&visits[m.start + 1..m.end]);
    let mut seen = HashSet::with_capacity(between.len());
    between.iter().all(|v| seen.insert(*v))
}

/// Admissible journey matches between two canonical ports.
///
/// Empty if the ports are equal or either was never visited.
#[must_use]
pub fn find_journeys(
    sequence: &VesselPortSequence,
    origin: &PortCode,
    destination: &PortCode,
) -> Vec<JourneyMatch> {
    if origin == destination {
        return Vec::new();
    }
    let (Some(o), Some(d)) = (sequence.symbol(origin), sequence.symbol(destination)) else {
        return Vec::new();
    };
    scan(sequence.visits(), o, d)
        .into_iter()
        .filter(|m| is_admissible(sequence.visits(), *m))
        .collect()
}

/// Accepted journeys of one vessel as absolute row ranges.
///
/// `records` is the vessel's slice of the position table and `offset`
/// the absolute row of its first element. Each range starts at the last
/// row of the origin run (departure) and ends at the first row of the
/// destination run (arrival). Route ordinals count from 1 in match
/// order.
#[must_use]
pub fn journey_slices(
    sequence: &VesselPortSequence,
    records: &[PositionRecord],
    offset: usize,
    origin: &PortCode,
    destination: &PortCode,
) -> Vec<JourneySlice> {
    find_journeys(sequence, origin, destination)
        .into_iter()
        .filter_map(|m| {
            let first = *sequence.departure_rows().get(m.start)?;
            let last = *sequence.row_positions().get(m.end)?;
            let start = records.get(first)?;
            let end = records.get(last)?;
            Some((first, last, start, end))
        })
        .zip(1_u32..)
        .map(|((first, last, start, end), route_id)| JourneySlice {
            vessel_id: start.vessel_id,
            route_id,
            rows: offset + first..=offset + last,
            start_time: start.timestamp,
            end_time: end.timestamp,
        })
        .collect()
}
