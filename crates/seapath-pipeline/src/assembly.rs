//! Route assembly: accepted journey slices to one combined, OD-tagged
//! observation table with timing labels.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::extract::JobFailure;
use crate::matcher::JourneySlice;
use crate::types::{OdJob, PortCode, PositionRecord};

/// Durations below this many days count as zero.
const ZERO_DURATION_DAYS: f64 = 1e-8;

/// One row of the combined per-OD table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JourneyObservation {
    /// The underlying position report.
    pub record: PositionRecord,
    /// OD label, `"{origin}-{destination}"`.
    pub od: String,
    /// Per-vessel route ordinal.
    pub route_id: u32,
    /// OD-wide route id after cleansing; `0` until assigned.
    pub unique_route_id: u32,
    /// Canonical port the row is attributed to, if it is a stop.
    pub port: Option<PortCode>,
    /// Days from this report until arrival.
    pub remaining_lead_time: f64,
    /// Fraction of the journey completed, in `[0, 1]`.
    pub percent_complete: f64,
    /// Days since departure.
    pub elapsed_time: f64,
    /// Total journey duration in days.
    pub journey_time: f64,
    /// ISO 8601 week number of the report.
    pub week: u32,
}

impl JourneyObservation {
    /// Whether the row belongs to the same journey as `other`.
    #[must_use]
    pub fn same_journey(&self, other: &Self) -> bool {
        self.record.vessel_id == other.record.vessel_id
            && self.route_id == other.route_id
            && self.od == other.od
    }
}

/// Days between two instants, negative if `to` precedes `from`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 86_400_000.0
}

/// Fraction of a journey completed after `elapsed` of `duration` days.
///
/// Zero-length journeys are 0 complete. The result is clamped to
/// `[0, 1]`.
#[must_use]
pub fn percent_complete(elapsed: f64, duration: f64) -> f64 {
    if duration.abs() < ZERO_DURATION_DAYS {
        return 0.0;
    }
    (elapsed / duration).clamp(0.0, 1.0)
}

/// Combine the accepted slices of one job into observation rows.
///
/// `records` is the whole position table and `labels` its per-row port
/// labels; slices index into both.
///
/// # Errors
///
/// Returns [`JobFailure::TooFewCandidates`] unless there are strictly
/// more than `min_candidates` slices.
pub fn assemble(
    job: &OdJob,
    slices: &[JourneySlice],
    records: &[PositionRecord],
    labels: &[Option<PortCode>],
    min_candidates: usize,
) -> Result<Vec<JourneyObservation>, JobFailure> {
    if slices.len() <= min_candidates {
        return Err(JobFailure::TooFewCandidates {
            found: slices.len(),
            required: min_candidates + 1,
        });
    }

    let od = job.od_label();
    let capacity = slices.iter().map(JourneySlice::row_count).sum();
    let mut rows = Vec::with_capacity(capacity);
    for slice in slices {
        let duration = days_between(slice.start_time, slice.end_time);
        for row in slice.rows.clone() {
            let Some(record) = records.get(row) else {
                continue;
            };
            let elapsed = days_between(slice.start_time, record.timestamp);
            rows.push(JourneyObservation {
                record: record.clone(),
                od: od.clone(),
                route_id: slice.route_id,
                unique_route_id: 0,
                port: labels.get(row).cloned().flatten(),
                remaining_lead_time: duration - elapsed,
                percent_complete: percent_complete(elapsed, duration),
                elapsed_time: elapsed,
                journey_time: duration,
                week: record.timestamp.iso_week().week(),
            });
        }
    }
    Ok(rows)
}
