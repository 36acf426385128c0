//! Journey extraction over a whole position table.
//!
//! [`Extractor::prepare`] does the per-row and per-vessel work once:
//! sort the table, attribute stops to ports, encode every vessel. Each
//! OD job then only scans the encoded sequences, assembles, cleanses and
//! applies the output gate. Jobs share the prepared state read-only and
//! run in parallel.

use std::ops::Range;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::assembly::{JourneyObservation, assemble};
use crate::cleanse::{
    CleanseOutcome, PortSequenceStatistic, RouteStatistic, SequenceStatus, cleanse,
};
use crate::diagnostics::{JobDiagnostics, PreparationDiagnostics, StageDiagnostics, StageMetrics};
use crate::encode::{PortRegistry, VesselPortSequence, encode_vessel, label_ports};
use crate::matcher::{JourneySlice, journey_slices};
use crate::types::{ExtractionConfig, OdJob, PipelineError, PortCode, PositionRecord, VesselId};

/// Rows of one vessel in a [`PositionTable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VesselRange {
    /// The vessel.
    pub vessel_id: VesselId,
    /// Its rows.
    pub rows: Range<usize>,
}

/// Position reports sorted by (vessel, time) with per-vessel ranges.
#[derive(Debug, Clone, Default)]
pub struct PositionTable {
    records: Vec<PositionRecord>,
    vessels: Vec<VesselRange>,
}

impl PositionTable {
    /// Sort `records` by vessel, then time, and index vessel ranges.
    ///
    /// The sort is stable, so reports with equal timestamps keep their
    /// input order.
    #[must_use]
    pub fn new(mut records: Vec<PositionRecord>) -> Self {
        records.sort_by(|a, b| {
            a.vessel_id
                .cmp(&b.vessel_id)
                .then(a.timestamp.cmp(&b.timestamp))
        });

        let mut vessels: Vec<VesselRange> = Vec::new();
        for (i, record) in records.iter().enumerate() {
            match vessels.last_mut() {
                Some(last) if last.vessel_id == record.vessel_id => last.rows.end = i + 1,
                _ => vessels.push(VesselRange {
                    vessel_id: record.vessel_id,
                    rows: i..i + 1,
                }),
            }
        }
        Self { records, vessels }
    }

    /// All reports.
    #[must_use]
    pub fn records(&self) -> &[PositionRecord] {
        &self.records
    }

    /// Per-vessel ranges in vessel order.
    #[must_use]
    pub fn vessels(&self) -> &[VesselRange] {
        &self.vessels
    }

    /// Number of reports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table has no reports.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Why an OD job produced no output. None of these abort the run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobFailure {
    /// A job port is missing from the port registry.
    #[error("port {0} is not in the port registry")]
    UnknownPort(PortCode),

    /// Origin and destination collapse to one canonical port.
    #[error("origin and destination share canonical port {0}")]
    SameCanonicalPort(PortCode),

    /// Not enough journeys were found to be worth cleansing.
    #[error("found {found} candidate journeys, need at least {required}")]
    TooFewCandidates {
        /// Journeys found.
        found: usize,
        /// Journeys needed.
        required: usize,
    },

    /// Not enough routes survived cleansing.
    #[error("{found} routes survived cleansing, need at least {required}")]
    TooFewRoutes {
        /// Routes left.
        found: usize,
        /// Routes needed.
        required: usize,
    },
}

/// Outputs of one successful OD job.
#[derive(Debug, Clone)]
pub struct JobOutput {
    /// The job.
    pub job: OdJob,
    /// Cleansed observations, routes and port sequences.
    pub outcome: CleanseOutcome,
    /// Stage timings and counts.
    pub diagnostics: JobDiagnostics,
}

impl JobOutput {
    /// Surviving observations.
    #[must_use]
    pub fn observations(&self) -> &[JourneyObservation] {
        &self.outcome.observations
    }

    /// Route statistics of surviving routes.
    pub fn kept_routes(&self) -> impl Iterator<Item = &RouteStatistic> {
        self.outcome.routes.iter().filter(|r| r.unique_route_id > 0)
    }

    /// Port-sequence statistics, dropped sequences included.
    #[must_use]
    pub fn sequences(&self) -> &[PortSequenceStatistic] {
        &self.outcome.sequences
    }
}

/// A job that produced no output, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedJob {
    /// The job.
    pub job: OdJob,
    /// The reason.
    pub failure: JobFailure,
}

/// Results of running a list of jobs, in job order.
#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    /// Jobs whose outputs passed the gate.
    pub succeeded: Vec<JobOutput>,
    /// Jobs that failed.
    pub failed: Vec<FailedJob>,
}

/// Prepared extraction state shared by every OD job.
#[derive(Debug)]
pub struct Extractor<'a> {
    registry: &'a PortRegistry,
    config: ExtractionConfig,
    table: PositionTable,
    labels: Vec<Option<PortCode>>,
    sequences: Vec<VesselPortSequence>,
    diagnostics: PreparationDiagnostics,
}

impl<'a> Extractor<'a> {
    /// Attribute every stop to a port and encode every vessel.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for an invalid `config`.
    /// Encoding errors cannot occur for a [`PositionTable`], which is
    /// always sorted, but are propagated if they do.
    pub fn prepare(
        table: PositionTable,
        registry: &'a PortRegistry,
        config: &ExtractionConfig,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let start = Instant::now();
        let labels = label_ports(table.records(), registry, config);
        let labeling = StageDiagnostics {
            duration: start.elapsed(),
            metrics: StageMetrics::PortLabeling {
                row_count: labels.len(),
                labeled_count: labels.iter().filter(|l| l.is_some()).count(),
            },
        };

        let start = Instant::now();
        let sequences = table
            .vessels()
            .par_iter()
            .map(|v| {
                encode_vessel(
                    &table.records()[v.rows.clone()],
                    &labels[v.rows.clone()],
                    config,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        let encoding = StageDiagnostics {
            duration: start.elapsed(),
            metrics: StageMetrics::Encoding {
                vessel_count: sequences.len(),
                empty_count: sequences.iter().filter(|s| s.is_empty()).count(),
                visit_count: sequences.iter().map(VesselPortSequence::len).sum(),
            },
        };

        info!(
            rows = table.len(),
            vessels = table.vessels().len(),
            "position table prepared"
        );

        Ok(Self {
            registry,
            config: config.clone(),
            table,
            labels,
            sequences,
            diagnostics: PreparationDiagnostics { labeling, encoding },
        })
    }

    /// The prepared table.
    #[must_use]
    pub const fn table(&self) -> &PositionTable {
        &self.table
    }

    /// Per-row port labels, aligned with [`table`](Self::table).
    #[must_use]
    pub fn labels(&self) -> &[Option<PortCode>] {
        &self.labels
    }

    /// Encoded sequences, aligned with the table's vessel ranges.
    #[must_use]
    pub fn sequences(&self) -> &[VesselPortSequence] {
        &self.sequences
    }

    /// Preparation timings and counts.
    #[must_use]
    pub const fn diagnostics(&self) -> &PreparationDiagnostics {
        &self.diagnostics
    }

    /// Accepted journeys of every vessel between two canonical ports.
    #[must_use]
    pub fn find_slices(&self, origin: &PortCode, destination: &PortCode) -> Vec<JourneySlice> {
        let records = self.table.records();
        self.table
            .vessels()
            .par_iter()
            .zip(self.sequences.par_iter())
            .flat_map_iter(|(v, seq)| {
                journey_slices(seq, &records[v.rows.clone()], v.rows.start, origin, destination)
            })
            .collect()
    }

    /// Run one OD job through matching, assembly, cleansing and the
    /// output gate.
    ///
    /// # Errors
    ///
    /// Returns a [`JobFailure`] describing why the job has no output.
    pub fn run_job(&self, job: &OdJob) -> Result<JobOutput, JobFailure> {
        let job_start = Instant::now();
        let origin = self.canonical(&job.origin)?;
        let destination = self.canonical(&job.destination)?;
        if origin == destination {
            return Err(JobFailure::SameCanonicalPort(origin.clone()));
        }

        let start = Instant::now();
        let slices = self.find_slices(origin, destination);
        let vessels_with_both_ports = self
            .sequences
            .iter()
            .filter(|s| s.symbol(origin).is_some() && s.symbol(destination).is_some())
            .count();
        let matching = stage(
            start.elapsed(),
            StageMetrics::Matching {
                vessels_with_both_ports,
                candidate_count: slices.len(),
            },
        );
        debug!(job = %job.name, candidates = slices.len(), "journeys matched");

        let start = Instant::now();
        let observations = assemble(
            job,
            &slices,
            self.table.records(),
            &self.labels,
            self.config.min_route_candidates,
        )?;
        let assembly = stage(
            start.elapsed(),
            StageMetrics::Assembly {
                row_count: observations.len(),
            },
        );

        let start = Instant::now();
        let outcome = cleanse(observations, &self.config.cleanse);
        let route_count = outcome.route_count();
        let cleansing = stage(
            start.elapsed(),
            StageMetrics::Cleansing {
                sequence_count: outcome.sequences.len(),
                salvaged_count: outcome
                    .sequences
                    .iter()
                    .filter(|s| matches!(s.status, SequenceStatus::Salvaged { .. }))
                    .count(),
                invalid_count: outcome
                    .sequences
                    .iter()
                    .filter(|s| !s.status.is_kept())
                    .count(),
                route_count,
                row_count: outcome.observations.len(),
            },
        );

        if route_count < self.config.min_cleansed_routes {
            return Err(JobFailure::TooFewRoutes {
                found: route_count,
                required: self.config.min_cleansed_routes,
            });
        }

        Ok(JobOutput {
            job: job.clone(),
            outcome,
            diagnostics: JobDiagnostics {
                od: job.od_label(),
                matching,
                assembly,
                cleansing,
                total_duration: job_start.elapsed(),
            },
        })
    }

    /// Run every job in parallel. Failures are logged and collected,
    /// never fatal.
    #[must_use]
    pub fn run_all(&self, jobs: &[OdJob]) -> ExtractionReport {
        let results: Vec<(&OdJob, Result<JobOutput, JobFailure>)> =
            jobs.par_iter().map(|job| (job, self.run_job(job))).collect();

        let mut report = ExtractionReport::default();
        for (job, result) in results {
            match result {
                Ok(output) => {
                    info!(
                        job = %job.name,
                        routes = output.outcome.route_count(),
                        rows = output.observations().len(),
                        "job succeeded"
                    );
                    report.succeeded.push(output);
                }
                Err(failure) => {
                    warn!(job = %job.name, %failure, "job failed");
                    report.failed.push(FailedJob {
                        job: job.clone(),
                        failure,
                    });
                }
            }
        }
        report
    }

    fn canonical(&self, code: &PortCode) -> Result<&'a PortCode, JobFailure> {
        self.registry
            .canonical(code)
            .ok_or_else(|| JobFailure::UnknownPort(code.clone()))
    }
}

const fn stage(duration: Duration, metrics: StageMetrics) -> StageDiagnostics {
    StageDiagnostics { duration, metrics }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::encode::tests::{registry, report};
    use crate::types::GeoPoint;

    const ROTTERDAM: GeoPoint = GeoPoint::new(51.95, 4.14);
    const HAMBURG: GeoPoint = GeoPoint::new(53.54, 9.97);
    const NORTH_SEA: GeoPoint = GeoPoint::new(54.0, 5.0);

    /// A vessel shuttling Rotterdam -> Hamburg `trips` times, 24 h per
    /// leg, starting at `offset` hours.
    fn shuttle(vessel: u64, trips: i64, offset: i64) -> Vec<PositionRecord> {
        let mut rows = Vec::new();
        for trip in 0..trips {
            let t = offset + trip * 100;
            rows.push(report(vessel, t, ROTTERDAM, true));
            rows.push(report(vessel, t + 1, ROTTERDAM, true));
            rows.push(report(vessel, t + 12, NORTH_SEA, false));
            rows.push(report(vessel, t + 25, HAMBURG, true));
            rows.push(report(vessel, t + 60, NORTH_SEA, false));
        }
        rows
    }

    #[test]
    fn table_sorts_and_indexes_vessels() {
        let mut rows = shuttle(2, 1, 0);
        rows.extend(shuttle(1, 1, 0));
        rows.reverse();
        let table = PositionTable::new(rows);
        assert_eq!(table.vessels().len(), 2);
        assert_eq!(table.vessels()[0].vessel_id, VesselId(1));
        assert_eq!(table.vessels()[0].rows, 0..5);
        assert_eq!(table.vessels()[1].rows, 5..10);
        assert!(
            table
                .records()
                .windows(2)
                .filter(|w| w[0].vessel_id == w[1].vessel_id)
                .all(|w| w[0].timestamp <= w[1].timestamp)
        );
    }

    #[test]
    fn successful_job_passes_gate() {
        let registry = registry();
        let mut rows = shuttle(1, 2, 0);
        rows.extend(shuttle(2, 2, 30));
        let table = PositionTable::new(rows);
        let extractor = Extractor::prepare(table, &registry, &ExtractionConfig::default()).unwrap();

        let output = extractor.run_job(&OdJob::new("NLRTM", "DEHAM")).unwrap();
        assert_eq!(output.outcome.route_count(), 4);
        assert_eq!(output.kept_routes().count(), 4);
        assert_eq!(output.sequences().len(), 1);
        assert_eq!(output.sequences()[0].port_sequence, "NLRTM-DEHAM");
        // Departure row, mid-sea row, arrival row per journey.
        assert_eq!(output.observations().len(), 4 * 3);
        assert!(output.observations().iter().all(|o| o.od == "NLRTM-DEHAM"));
        assert!(output.diagnostics.report().contains("Cleansing"));
    }

    #[test]
    fn anchorage_code_resolves_to_canonical_port() {
        let registry = registry();
        let mut rows = shuttle(1, 2, 0);
        rows.extend(shuttle(2, 2, 30));
        let extractor =
            Extractor::prepare(PositionTable::new(rows), &registry, &ExtractionConfig::default())
                .unwrap();
        assert!(extractor.run_job(&OdJob::new("NLRTA", "DEHAM")).is_ok());
    }

    #[test]
    fn two_candidates_fail_with_no_rows() {
        let registry = registry();
        let extractor = Extractor::prepare(
            PositionTable::new(shuttle(1, 2, 0)),
            &registry,
            &ExtractionConfig::default(),
        )
        .unwrap();
        let report = extractor.run_all(&[OdJob::new("NLRTM", "DEHAM")]);
        assert!(report.succeeded.is_empty());
        assert_eq!(
            report.failed,
            vec![FailedJob {
                job: OdJob::new("NLRTM", "DEHAM"),
                failure: JobFailure::TooFewCandidates {
                    found: 2,
                    required: 4
                },
            }]
        );
    }

    #[test]
    fn gate_rejects_too_few_cleansed_routes() {
        let registry = registry();
        let mut rows = shuttle(1, 2, 0);
        rows.extend(shuttle(2, 2, 30));
        let config = ExtractionConfig {
            min_cleansed_routes: 5,
            ..ExtractionConfig::default()
        };
        let extractor = Extractor::prepare(PositionTable::new(rows), &registry, &config).unwrap();
        assert_eq!(
            extractor.run_job(&OdJob::new("NLRTM", "DEHAM")).unwrap_err(),
            JobFailure::TooFewRoutes {
                found: 4,
                required: 5
            }
        );
    }

    #[test]
    fn unknown_and_same_ports_fail() {
        let registry = registry();
        let extractor = Extractor::prepare(
            PositionTable::new(shuttle(1, 1, 0)),
            &registry,
            &ExtractionConfig::default(),
        )
        .unwrap();
        assert_eq!(
            extractor.run_job(&OdJob::new("XXXXX", "DEHAM")).unwrap_err(),
            JobFailure::UnknownPort(PortCode::from("XXXXX"))
        );
        assert_eq!(
            extractor.run_job(&OdJob::new("NLRTA", "NLRTM")).unwrap_err(),
            JobFailure::SameCanonicalPort(PortCode::from("NLRTM"))
        );
    }

    #[test]
    fn jobs_keep_their_order_in_the_report() {
        let registry = registry();
        let mut rows = shuttle(1, 2, 0);
        rows.extend(shuttle(2, 2, 30));
        let extractor =
            Extractor::prepare(PositionTable::new(rows), &registry, &ExtractionConfig::default())
                .unwrap();
        let jobs = vec![
            OdJob::new("GBFXT", "DEHAM"),
            OdJob::new("NLRTM", "DEHAM"),
            OdJob::new("DEHAM", "NLRTM"),
        ];
        let report = extractor.run_all(&jobs);
        assert_eq!(report.succeeded.len(), 1);
        assert_eq!(report.succeeded[0].job.name, "NLRTM-DEHAM");
        let failed: Vec<&str> = report.failed.iter().map(|f| f.job.name.as_str()).collect();
        // Nobody called at Felixstowe; the return leg only happened twice.
        assert_eq!(failed, vec!["GBFXT-DEHAM", "DEHAM-NLRTM"]);
    }

    #[test]
    fn invalid_config_rejected_on_prepare() {
        let registry = registry();
        let config = ExtractionConfig {
            stopped_speed_knots: f64::NAN,
            ..ExtractionConfig::default()
        };
        assert!(Extractor::prepare(PositionTable::default(), &registry, &config).is_err());
    }
}
