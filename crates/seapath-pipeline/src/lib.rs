//! seapath-pipeline: vessel journey reconstruction and ocean distance
//! estimation (sans-IO).
//!
//! Turns raw vessel position reports into origin/destination journeys
//! through:
//! port attribution -> visit encoding -> journey matching ->
//! route assembly -> port-sequence cleansing -> output gate.
//!
//! Separately, estimates ocean-going distance and chokepoint crossings
//! between arbitrary points over a navigable ocean graph, and labels
//! journey observations with it in failure-tolerant batches.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! records and returns structured data. All filesystem interaction
//! lives in `seapath-io`.

pub mod anomaly;
pub mod assembly;
pub mod cleanse;
pub mod diagnostics;
pub mod encode;
pub mod extract;
pub mod labeling;
pub mod matcher;
pub mod ocean;
pub mod spatial_index;
pub mod types;

pub use anomaly::{AnomalyConfig, AnomalyReport, filter_anomalies};
pub use assembly::JourneyObservation;
pub use cleanse::{CleanseConfig, PortSequenceStatistic, RouteStatistic, SequenceStatus};
pub use diagnostics::{JobDiagnostics, PreparationDiagnostics};
pub use encode::{PortRegistry, VesselPortSequence};
pub use extract::{ExtractionReport, Extractor, FailedJob, JobFailure, JobOutput, PositionTable};
pub use labeling::{
    BatchLabeler, LabelRow, LabelSelection, LabelState, LabelingConfig, LabelingSummary,
};
pub use matcher::JourneySlice;
pub use ocean::{
    Chokepoint, NetworkConfig, NetworkError, OceanEdge, OceanNetwork, OceanNode, QueryError,
    ShortestPathEngine, ShortestPathResult,
};
pub use spatial_index::{IndexLevels, SpatialIndex};
pub use types::{
    ExtractionConfig, GeoPoint, NavStatus, OdJob, PipelineError, PortCode, PortRecord,
    PositionRecord, VesselId,
};

/// Run every job over a set of position reports.
///
/// Convenience wrapper around [`PortRegistry::new`],
/// [`Extractor::prepare`] and [`Extractor::run_all`] for callers that
/// need neither the registry nor the prepared state afterwards.
///
/// # Errors
///
/// Returns a [`PipelineError`] if the registry cannot be built or the
/// configuration is invalid. Per-job failures are reported in
/// [`ExtractionReport::failed`] instead.
pub fn extract(
    records: Vec<PositionRecord>,
    ports: Vec<PortRecord>,
    jobs: &[OdJob],
    config: &ExtractionConfig,
) -> Result<ExtractionReport, PipelineError> {
    let registry = PortRegistry::new(ports, &config.port_index)?;
    let extractor = Extractor::prepare(PositionTable::new(records), &registry, config)?;
    Ok(extractor.run_all(jobs))
}
