//! JSON serializers.
//!
//! Job lists use the same `name -> {origin, destination}` shape as the
//! `jobs` block of the settings file, so a failed list can be edited
//! and fed back in as the job list of a rerun.

use std::collections::BTreeMap;

use serde::Serialize;

use seapath_pipeline::{FailedJob, OceanNetwork, OdJob, ShortestPathResult};

use crate::ExportError;

#[derive(Serialize)]
struct JobEntry<'a> {
    origin: &'a str,
    destination: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl<'a> From<&'a OdJob> for JobEntry<'a> {
    fn from(job: &'a OdJob) -> Self {
        Self {
            origin: job.origin.as_str(),
            destination: job.destination.as_str(),
            reason: None,
        }
    }
}

/// Jobs that produced output (`successful_jobs.json`).
///
/// # Errors
///
/// Returns [`ExportError::Json`] if serialization fails.
pub fn successful_jobs_json<'a>(
    jobs: impl IntoIterator<Item = &'a OdJob>,
) -> Result<String, ExportError> {
    let map: BTreeMap<&str, JobEntry<'_>> = jobs
        .into_iter()
        .map(|job| (job.name.as_str(), JobEntry::from(job)))
        .collect();
    Ok(serde_json::to_string_pretty(&map)?)
}

/// Jobs that failed, with the reason (`failed_jobs.json`).
///
/// # Errors
///
/// Returns [`ExportError::Json`] if serialization fails.
pub fn failed_jobs_json(failed: &[FailedJob]) -> Result<String, ExportError> {
    let map: BTreeMap<&str, JobEntry<'_>> = failed
        .iter()
        .map(|f| {
            let entry = JobEntry {
                reason: Some(f.failure.to_string()),
                ..JobEntry::from(&f.job)
            };
            (f.job.name.as_str(), entry)
        })
        .collect();
    Ok(serde_json::to_string_pretty(&map)?)
}

/// A single distance query as printed by `seapath route`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteReport<'a> {
    /// Reported distance in km.
    pub distance_km: f64,
    /// Great-circle distance in km.
    pub direct_km: f64,
    /// Whether the distance was taken through the network.
    pub via_network: bool,
    /// Distance to the first network node in km.
    pub to_network_km: f64,
    /// Distance along the network in km.
    pub network_km: f64,
    /// Distance from the last network node in km.
    pub from_network_km: f64,
    /// Names of the chokepoints the network path crosses.
    pub chokepoints: Vec<&'a str>,
}

impl<'a> RouteReport<'a> {
    /// Pair a result with the chokepoint names of its network.
    #[must_use]
    pub fn new(result: &ShortestPathResult, network: &'a OceanNetwork) -> Self {
        Self {
            distance_km: result.distance_km,
            direct_km: result.direct_km,
            via_network: result.via_network(),
            to_network_km: result.to_network_km,
            network_km: result.network_km,
            from_network_km: result.from_network_km,
            chokepoints: result.crossed(network).collect(),
        }
    }
}

/// Pretty-printed [`RouteReport`].
///
/// Unreachable destinations give an infinite distance, which JSON
/// cannot represent; it is written as `null`.
///
/// # Errors
///
/// Returns [`ExportError::Json`] if serialization fails.
pub fn route_report_json(
    result: &ShortestPathResult,
    network: &OceanNetwork,
) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(&RouteReport::new(result, network))?)
}
