//! Extraction diagnostics: timing and counts for each stage.
//!
//! Every call to [`Extractor::prepare`](crate::Extractor::prepare) and
//! [`Extractor::run_job`](crate::Extractor::run_job) collects
//! diagnostics alongside its results, so threshold tuning can see where
//! candidates are lost.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Per-row stop detection and port attribution.
    PortLabeling {
        /// Rows in the position table.
        row_count: usize,
        /// Rows attributed to a port.
        labeled_count: usize,
    },
    /// Per-vessel visit encoding.
    Encoding {
        /// Vessels in the position table.
        vessel_count: usize,
        /// Vessels without any port visit.
        empty_count: usize,
        /// Visits across all vessels, breaks included.
        visit_count: usize,
    },
    /// Journey matching for one OD.
    Matching {
        /// Vessels that visited both ports.
        vessels_with_both_ports: usize,
        /// Accepted journeys.
        candidate_count: usize,
    },
    /// Route assembly for one OD.
    Assembly {
        /// Rows in the combined table.
        row_count: usize,
    },
    /// Port-sequence cleansing for one OD.
    Cleansing {
        /// Distinct port sequences.
        sequence_count: usize,
        /// Sequences salvaged against a template.
        salvaged_count: usize,
        /// Sequences dropped.
        invalid_count: usize,
        /// Routes that survived.
        route_count: usize,
        /// Rows that survived.
        row_count: usize,
    },
}

/// Diagnostics of the one-off preparation of the position table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparationDiagnostics {
    /// Port attribution of every row.
    pub labeling: StageDiagnostics,
    /// Encoding of every vessel.
    pub encoding: StageDiagnostics,
}

/// Diagnostics of one OD job that reached the output gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDiagnostics {
    /// OD label.
    pub od: String,
    /// Journey matching.
    pub matching: StageDiagnostics,
    /// Route assembly.
    pub assembly: StageDiagnostics,
    /// Port-sequence cleansing.
    pub cleansing: StageDiagnostics,
    /// Total wall-clock duration of the job (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
}

impl PreparationDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let total = self.labeling.duration + self.encoding.duration;
        render(
            "Preparation",
            total,
            &[("Port Labeling", &self.labeling), ("Encoding", &self.encoding)],
        )
    }
}

impl JobDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        render(
            &format!("Job {}", self.od),
            self.total_duration,
            &[
                ("Matching", &self.matching),
                ("Assembly", &self.assembly),
                ("Cleansing", &self.cleansing),
            ],
        )
    }
}

fn render(title: &str, total: Duration, stages: &[(&str, &StageDiagnostics)]) -> String {
    let mut lines = Vec::new();

    lines.push(format!("{title} Diagnostics\n{}", "=".repeat(60)));
    lines.push(format!("Total duration: {:.3}ms", duration_ms(total)));
    lines.push(String::new());

    lines.push(format!(
        "{:<24} {:>10} {:>10}  {}",
        "Stage", "Duration", "% Total", "Details"
    ));
    lines.push("-".repeat(80));

    let total_ms = duration_ms(total);
    for (name, diag) in stages {
        let ms = duration_ms(diag.duration);
        let pct = if total_ms > 0.0 {
            ms / total_ms * 100.0
        } else {
            0.0
        };
        let details = format_metrics(&diag.metrics);
        lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
    }

    lines.join("\n")
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::PortLabeling {
            row_count,
            labeled_count,
        } => {
            #[allow(clippy::cast_precision_loss)]
            let share = if *row_count > 0 {
                *labeled_count as f64 / *row_count as f64 * 100.0
            } else {
                0.0
            };
            format!("{labeled_count}/{row_count} rows at a port ({share:.1}%)")
        }
        StageMetrics::Encoding {
            vessel_count,
            empty_count,
            visit_count,
        } => format!("{vessel_count} vessels ({empty_count} without stops), {visit_count} visits"),
        StageMetrics::Matching {
            vessels_with_both_ports,
            candidate_count,
        } => format!("{candidate_count} journeys from {vessels_with_both_ports} vessels"),
        StageMetrics::Assembly { row_count } => format!("{row_count} rows"),
        StageMetrics::Cleansing {
            sequence_count,
            salvaged_count,
            invalid_count,
            route_count,
            row_count,
        } => format!(
            "{sequence_count} sequences (salvaged={salvaged_count} dropped={invalid_count}) -> {route_count} routes, {row_count} rows",
        ),
    }
}
