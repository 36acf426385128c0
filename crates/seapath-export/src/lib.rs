//! seapath-export: Pure format serializers (sans-IO)
//!
//! Converts pipeline results into the persisted output formats: CSV
//! tables for journeys, statistics, job lists and labels, and JSON for
//! job lists and single route queries. Every function returns a
//! `String`; writing it anywhere is the caller's business.

pub mod json;
pub mod table;

pub use json::{RouteReport, failed_jobs_json, route_report_json, successful_jobs_json};
pub use table::{
    ObservationRow, failed_jobs_csv, labels_to_csv, observations_to_csv, routes_to_csv,
    sequences_to_csv, successful_jobs_csv,
};

/// Errors from serializing output tables.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// A row could not be written as CSV.
    #[error("CSV serialization failed: {0}")]
    Csv(#[from] csv::Error),

    /// A value could not be written as JSON.
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// The in-memory CSV buffer could not be flushed.
    #[error("failed to flush CSV buffer: {0}")]
    Flush(#[from] std::io::Error),

    /// The serialized bytes are not valid UTF-8.
    #[error("serialized output is not UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}
