//! Ocean-distance labeling of journey observations.
//!
//! Not every observation needs a label: consecutive reports a few hours
//! apart carry nearly the same remaining distance. [`select_label_rows`]
//! keeps moving reports spaced at least a label interval apart within
//! each journey, and [`BatchLabeler`] runs the shortest-path engine over
//! them in fixed-size batches.
//!
//! A batch is the unit of failure: if any row in it is invalid, or the
//! batch overruns its timeout, every row of the batch is marked failed
//! and labeling moves on. Failed rows are not retried in the same run.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::assembly::JourneyObservation;
use crate::encode::{PortRegistry, is_stopped};
use crate::ocean::{ShortestPathEngine, ShortestPathResult};
use crate::types::{ExtractionConfig, GeoPoint, OdJob, PipelineError};

/// Parameters of label selection and batch labeling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelingConfig {
    /// Rows per shortest-path batch.
    pub batch_size: usize,

    /// Minimum spacing between labeled rows of one journey (hours).
    pub label_interval_hours: f64,

    /// Give up on a batch after this many seconds. `None` waits forever.
    pub batch_timeout_secs: Option<f64>,
}

impl LabelingConfig {
    /// Default batch size.
    pub const DEFAULT_BATCH_SIZE: usize = 10_000;
    /// Default label interval (hours).
    pub const DEFAULT_LABEL_INTERVAL_HOURS: f64 = 5.0;

    /// Check that all parameters are usable.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.batch_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "batch_size must be at least 1".to_owned(),
            ));
        }
        if !(self.label_interval_hours.is_finite() && self.label_interval_hours >= 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "label_interval_hours must be a non-negative number, got {}",
                self.label_interval_hours
            )));
        }
        if let Some(secs) = self.batch_timeout_secs
            && Duration::try_from_secs_f64(secs).is_err()
        {
            return Err(PipelineError::InvalidConfig(format!(
                "batch_timeout_secs must be a non-negative number, got {secs}"
            )));
        }
        Ok(())
    }

    /// The batch timeout as a [`Duration`], if set and valid.
    #[must_use]
    pub fn batch_timeout(&self) -> Option<Duration> {
        self.batch_timeout_secs
            .and_then(|s| Duration::try_from_secs_f64(s).ok())
    }
}

impl Default for LabelingConfig {
    fn default() -> Self {
        Self {
            batch_size: Self::DEFAULT_BATCH_SIZE,
            label_interval_hours: Self::DEFAULT_LABEL_INTERVAL_HOURS,
            batch_timeout_secs: None,
        }
    }
}

/// Labeling progress of one row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LabelState {
    /// Not attempted yet.
    #[default]
    Pending,
    /// Labeled successfully.
    Labeled(ShortestPathResult),
    /// Its batch failed.
    Failed,
}

impl LabelState {
    /// Short name used in tabular output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Labeled(_) => "labeled",
            Self::Failed => "failed",
        }
    }

    /// The result, if labeled.
    #[must_use]
    pub const fn result(&self) -> Option<&ShortestPathResult> {
        match self {
            Self::Labeled(r) => Some(r),
            _ => None,
        }
    }
}

/// One observation selected for labeling.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelRow {
    /// The observation.
    pub observation: JourneyObservation,
    /// Destination port location.
    pub destination: GeoPoint,
    /// Progress.
    pub state: LabelState,
}

impl LabelRow {
    /// Where the remaining distance is measured from.
    #[must_use]
    pub const fn source(&self) -> GeoPoint {
        self.observation.record.position
    }
}

/// Destination port location of every job, keyed by OD label.
#[must_use]
pub fn destination_lookup(jobs: &[OdJob], registry: &PortRegistry) -> HashMap<String, GeoPoint> {
    jobs.iter()
        .filter_map(|job| {
            registry
                .position(&job.destination)
                .map(|p| (job.od_label(), p))
        })
        .collect()
}

/// Rows picked for labeling.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelSelection {
    /// Picked rows, all pending.
    pub rows: Vec<LabelRow>,
    /// Moving rows dropped because their OD has no known destination.
    pub unknown_destination: usize,
}

/// Pick the observations to label.
///
/// Moving rows only, ordered by (vessel, OD, unique route, time). The
/// first row of each journey is picked, then every row at least
/// `label_interval_hours` after the last picked one. Rows whose OD is
/// missing from `destinations` are dropped and counted.
#[must_use]
pub fn select_label_rows(
    observations: &[JourneyObservation],
    destinations: &HashMap<String, GeoPoint>,
    extraction: &ExtractionConfig,
    config: &LabelingConfig,
) -> LabelSelection {
    let mut unknown_destination = 0;
    let mut moving: Vec<(&JourneyObservation, GeoPoint)> = observations
        .iter()
        .filter(|o| !is_stopped(&o.record, extraction))
        .filter_map(|o| {
            let destination = destinations.get(&o.od).copied();
            if destination.is_none() {
                unknown_destination += 1;
            }
            destination.map(|d| (o, d))
        })
        .collect();
    moving.sort_by(|(a, _), (b, _)| {
        a.record
            .vessel_id
            .cmp(&b.record.vessel_id)
            .then_with(|| a.od.cmp(&b.od))
            .then(a.unique_route_id.cmp(&b.unique_route_id))
            .then(a.record.timestamp.cmp(&b.record.timestamp))
    });
    if unknown_destination > 0 {
        warn!(rows = unknown_destination, "skipping rows of ODs with no known destination");
    }

    let interval_days = config.label_interval_hours / 24.0;
    let mut rows = Vec::new();
    let mut last: Option<&JourneyObservation> = None;
    for (o, destination) in moving {
        let pick = match last {
            Some(prev) if prev.same_journey(o) => {
                o.elapsed_time - prev.elapsed_time >= interval_days
            }
            _ => true,
        };
        if pick {
            rows.push(LabelRow {
                observation: o.clone(),
                destination,
                state: LabelState::Pending,
            });
            last = Some(o);
        }
    }
    LabelSelection {
        rows,
        unknown_destination,
    }
}

/// Counts after a labeling run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelingSummary {
    /// Rows handed to the labeler.
    pub total: usize,
    /// Rows labeled, this run or before.
    pub labeled: usize,
    /// Rows whose batch failed, this run or before.
    pub failed: usize,
    /// Batches attempted this run.
    pub batches: usize,
    /// Batches that failed this run.
    pub failed_batches: usize,
}

/// Runs the shortest-path engine over label rows in batches.
#[derive(Debug, Clone)]
pub struct BatchLabeler<'n> {
    engine: ShortestPathEngine<'n>,
    config: LabelingConfig,
}

impl<'n> BatchLabeler<'n> {
    /// Create a labeler.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for an invalid `config`.
    pub fn new(
        engine: ShortestPathEngine<'n>,
        config: LabelingConfig,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self { engine, config })
    }

    /// Label every pending row in place.
    ///
    /// Rows already labeled or failed are left alone, so a later run
    /// over the same rows only picks up what is still pending.
    pub fn label(&self, rows: &mut [LabelRow]) -> LabelingSummary {
        let pending: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.state == LabelState::Pending)
            .map(|(i, _)| i)
            .collect();

        let mut summary = LabelingSummary {
            total: rows.len(),
            ..LabelingSummary::default()
        };
        let timeout = self.config.batch_timeout();

        for batch in pending.chunks(self.config.batch_size) {
            summary.batches += 1;
            let pairs: Vec<(GeoPoint, GeoPoint)> = batch
                .iter()
                .map(|&i| (rows[i].source(), rows[i].destination))
                .collect();
            let deadline = timeout.map(|t| Instant::now() + t);

            match self.engine.try_query_batch(&pairs, deadline) {
                Ok(results) => {
                    for (&i, result) in batch.iter().zip(results) {
                        rows[i].state = LabelState::Labeled(result);
                    }
                }
                Err(error) => {
                    warn!(
                        batch = summary.batches,
                        rows = batch.len(),
                        %error,
                        "labeling batch failed"
                    );
                    summary.failed_batches += 1;
                    for &i in batch {
                        rows[i].state = LabelState::Failed;
                    }
                }
            }
        }

        summary.labeled = rows
            .iter()
            .filter(|r| matches!(r.state, LabelState::Labeled(_)))
            .count();
        summary.failed = rows.iter().filter(|r| r.state == LabelState::Failed).count();
        info!(
            total = summary.total,
            labeled = summary.labeled,
            failed = summary.failed,
            batches = summary.batches,
            "labeling finished"
        );
        summary
    }
}
