//! Removal of implausible labeled journeys.
//!
//! Two symptoms are filtered. Rows claiming an arrival unrealistically
//! far in the future are dropped on their own. A journey whose remaining
//! ocean distance jumps by thousands of kilometres between reports only
//! hours apart was stitched from unrelated tracks, and is dropped whole.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::labeling::{LabelRow, LabelState};
use crate::types::{PipelineError, VesselId};

/// Parameters of the anomaly filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Rows with more remaining lead time than this (days) are dropped.
    pub max_lead_time_days: f64,

    /// Only consecutive rows at most this far apart (days) are compared.
    pub jump_window_days: f64,

    /// A larger change in remaining distance (km) between compared rows
    /// marks the journey as anomalous.
    pub max_distance_jump_km: f64,
}

impl AnomalyConfig {
    /// Default lead-time cutoff (days).
    pub const DEFAULT_MAX_LEAD_TIME_DAYS: f64 = 80.0;
    /// Default comparison window (days).
    pub const DEFAULT_JUMP_WINDOW_DAYS: f64 = 0.5;
    /// Default distance jump (km).
    pub const DEFAULT_MAX_DISTANCE_JUMP_KM: f64 = 2500.0;

    /// Check that all thresholds are usable.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        for (name, value) in [
            ("max_lead_time_days", self.max_lead_time_days),
            ("jump_window_days", self.jump_window_days),
            ("max_distance_jump_km", self.max_distance_jump_km),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(PipelineError::InvalidConfig(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            max_lead_time_days: Self::DEFAULT_MAX_LEAD_TIME_DAYS,
            jump_window_days: Self::DEFAULT_JUMP_WINDOW_DAYS,
            max_distance_jump_km: Self::DEFAULT_MAX_DISTANCE_JUMP_KM,
        }
    }
}

/// Rows kept by [`filter_anomalies`] and what was removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnomalyReport {
    /// Surviving labeled rows ordered by journey, then elapsed time.
    pub kept: Vec<LabelRow>,
    /// Rows without a label.
    pub unlabeled: usize,
    /// Rows beyond the lead-time cutoff.
    pub beyond_lead_time: usize,
    /// Journeys dropped for a distance jump.
    pub anomalous_journeys: usize,
    /// Rows of those journeys.
    pub anomalous_rows: usize,
}

type JourneyKey = (VesselId, String, u32);

/// Drop unlabeled rows, rows beyond the lead-time cutoff, and every row
/// of journeys with a distance jump.
#[must_use]
pub fn filter_anomalies(rows: Vec<LabelRow>, config: &AnomalyConfig) -> AnomalyReport {
    let mut report = AnomalyReport::default();
    let mut journeys: BTreeMap<JourneyKey, Vec<LabelRow>> = BTreeMap::new();

    for row in rows {
        if !matches!(row.state, LabelState::Labeled(_)) {
            report.unlabeled += 1;
            continue;
        }
        if row.observation.remaining_lead_time > config.max_lead_time_days {
            report.beyond_lead_time += 1;
            continue;
        }
        let o = &row.observation;
        journeys
            .entry((o.record.vessel_id, o.od.clone(), o.unique_route_id))
            .or_default()
            .push(row);
    }

    let mut anomalous: HashSet<JourneyKey> = HashSet::new();
    for (key, rows) in &mut journeys {
        rows.sort_by(|a, b| {
            a.observation
                .elapsed_time
                .total_cmp(&b.observation.elapsed_time)
        });
        if has_distance_jump(rows, config) {
            anomalous.insert(key.clone());
        }
    }

    for (key, rows) in journeys {
        if anomalous.contains(&key) {
            report.anomalous_journeys += 1;
            report.anomalous_rows += rows.len();
        } else {
            report.kept.extend(rows);
        }
    }

    info!(
        kept = report.kept.len(),
        unlabeled = report.unlabeled,
        beyond_lead_time = report.beyond_lead_time,
        anomalous_journeys = report.anomalous_journeys,
        "anomaly filter applied"
    );
    report
}

/// Whether two consecutive rows within the window differ in remaining
/// distance by more than the allowed jump. `rows` must be sorted by
/// elapsed time.
fn has_distance_jump(rows: &[LabelRow], config: &AnomalyConfig) -> bool {
    rows.windows(2).any(|w| {
        let (Some(a), Some(b)) = (w[0].state.result(), w[1].state.result()) else {
            return false;
        };
        let dt = w[1].observation.elapsed_time - w[0].observation.elapsed_time;
        dt <= config.jump_window_days
            && (b.distance_km - a.distance_km).abs() > config.max_distance_jump_km
    })
}
