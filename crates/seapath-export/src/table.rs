//! CSV serializers.
//!
//! Journey tables are flat: nested pipeline types are spread into one
//! column per field so the files load directly into dataframe tools.
//! [`ObservationRow`] also deserializes, which lets later stages read
//! a persisted journey table back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use seapath_pipeline::{
    FailedJob, GeoPoint, JourneyObservation, LabelRow, NavStatus, OdJob, PortCode,
    PortSequenceStatistic, PositionRecord, RouteStatistic, SequenceStatus, VesselId,
};

use crate::ExportError;

/// One row of a journey table (`od_extracts/{O}{D}.csv`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRow {
    pub vessel_id: u64,
    pub timestamp: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    pub speed: f64,
    pub nav_status: String,
    pub cell: Option<u64>,
    pub journey_break: bool,
    pub od: String,
    pub route_id: u32,
    pub unique_route_id: u32,
    pub port: Option<String>,
    pub remaining_lead_time: f64,
    pub percent_complete: f64,
    pub elapsed_time: f64,
    pub journey_time: f64,
    pub week: u32,
}

impl From<&JourneyObservation> for ObservationRow {
    fn from(o: &JourneyObservation) -> Self {
        let r = &o.record;
        Self {
            vessel_id: r.vessel_id.0,
            timestamp: r.timestamp,
            lat: r.position.lat,
            lon: r.position.lon,
            speed: r.speed,
            nav_status: r.nav_status.clone().into(),
            cell: r.cell,
            journey_break: r.journey_break,
            od: o.od.clone(),
            route_id: o.route_id,
            unique_route_id: o.unique_route_id,
            port: o.port.as_ref().map(|p| p.as_str().to_owned()),
            remaining_lead_time: o.remaining_lead_time,
            percent_complete: o.percent_complete,
            elapsed_time: o.elapsed_time,
            journey_time: o.journey_time,
            week: o.week,
        }
    }
}

impl From<ObservationRow> for JourneyObservation {
    fn from(row: ObservationRow) -> Self {
        Self {
            record: PositionRecord {
                vessel_id: VesselId(row.vessel_id),
                timestamp: row.timestamp,
                position: GeoPoint::new(row.lat, row.lon),
                speed: row.speed,
                nav_status: NavStatus::from(row.nav_status),
                cell: row.cell,
                journey_break: row.journey_break,
            },
            od: row.od,
            route_id: row.route_id,
            unique_route_id: row.unique_route_id,
            port: row.port.filter(|p| !p.is_empty()).map(PortCode::new),
            remaining_lead_time: row.remaining_lead_time,
            percent_complete: row.percent_complete,
            elapsed_time: row.elapsed_time,
            journey_time: row.journey_time,
            week: row.week,
        }
    }
}

/// Flattened [`PortSequenceStatistic`]; the status becomes plain columns.
#[derive(Serialize)]
struct SequenceRow<'a> {
    od: &'a str,
    port_sequence: &'a str,
    count: usize,
    mean_intermediate_ports: f64,
    max_journey_time: f64,
    min_journey_time: f64,
    mean_journey_time: f64,
    median_journey_time: f64,
    q95_journey_time: f64,
    status: &'static str,
    template: Option<&'a str>,
    score: Option<f64>,
}

impl<'a> From<&'a PortSequenceStatistic> for SequenceRow<'a> {
    fn from(s: &'a PortSequenceStatistic) -> Self {
        let (template, score) = match &s.status {
            SequenceStatus::Salvaged { template, score } => {
                (Some(template.as_str()), Some(*score))
            }
            _ => (None, None),
        };
        Self {
            od: &s.od,
            port_sequence: &s.port_sequence,
            count: s.count,
            mean_intermediate_ports: s.mean_intermediate_ports,
            max_journey_time: s.max_journey_time,
            min_journey_time: s.min_journey_time,
            mean_journey_time: s.mean_journey_time,
            median_journey_time: s.median_journey_time,
            q95_journey_time: s.q95_journey_time,
            status: s.status.as_str(),
            template,
            score,
        }
    }
}

#[derive(Serialize)]
struct JobRow<'a> {
    name: &'a str,
    origin: &'a str,
    destination: &'a str,
    reason: Option<String>,
}

impl<'a> From<&'a OdJob> for JobRow<'a> {
    fn from(job: &'a OdJob) -> Self {
        Self {
            name: &job.name,
            origin: job.origin.as_str(),
            destination: job.destination.as_str(),
            reason: None,
        }
    }
}

/// Serialize every item with a header row taken from the first one.
fn serialize_all<T: Serialize>(items: impl IntoIterator<Item = T>) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for item in items {
        writer.serialize(item)?;
    }
    finish(writer)
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String, ExportError> {
    let bytes = writer.into_inner().map_err(csv::IntoInnerError::into_error)?;
    Ok(String::from_utf8(bytes)?)
}

/// Journey table of one OD.
///
/// # Errors
///
/// Returns [`ExportError`] if a row cannot be serialized.
pub fn observations_to_csv(observations: &[JourneyObservation]) -> Result<String, ExportError> {
    serialize_all(observations.iter().map(ObservationRow::from))
}

/// Route statistics table (`od_stats/routeID_{O}{D}.csv`).
///
/// # Errors
///
/// Returns [`ExportError`] if a row cannot be serialized.
pub fn routes_to_csv<'a>(
    routes: impl IntoIterator<Item = &'a RouteStatistic>,
) -> Result<String, ExportError> {
    serialize_all(routes)
}

/// Port-sequence statistics table (`od_stats/portsequence_{O}{D}.csv`).
///
/// # Errors
///
/// Returns [`ExportError`] if a row cannot be serialized.
pub fn sequences_to_csv(sequences: &[PortSequenceStatistic]) -> Result<String, ExportError> {
    serialize_all(sequences.iter().map(SequenceRow::from))
}

/// Jobs that produced output (`ods_successfully_processed.csv`).
///
/// # Errors
///
/// Returns [`ExportError`] if a row cannot be serialized.
pub fn successful_jobs_csv<'a>(
    jobs: impl IntoIterator<Item = &'a OdJob>,
) -> Result<String, ExportError> {
    serialize_all(jobs.into_iter().map(JobRow::from))
}

/// Jobs that failed, with the reason (`ods_unsuccessfully_processed.csv`).
///
/// # Errors
///
/// Returns [`ExportError`] if a row cannot be serialized.
pub fn failed_jobs_csv(failed: &[FailedJob]) -> Result<String, ExportError> {
    serialize_all(failed.iter().map(|f| JobRow {
        reason: Some(f.failure.to_string()),
        ..JobRow::from(&f.job)
    }))
}

/// Labeling output table.
///
/// One boolean column per chokepoint follows the distance columns, in
/// the order of `chokepoints`. Unlabeled rows leave the result columns
/// empty.
///
/// # Errors
///
/// Returns [`ExportError`] if a row cannot be written.
pub fn labels_to_csv(rows: &[LabelRow], chokepoints: &[&str]) -> Result<String, ExportError> {
    const FIXED: [&str; 16] = [
        "vessel_id",
        "od",
        "route_id",
        "unique_route_id",
        "timestamp",
        "lat",
        "lon",
        "destination_lat",
        "destination_lon",
        "remaining_lead_time",
        "elapsed_time",
        "state",
        "distance_km",
        "direct_km",
        "to_network_km",
        "from_network_km",
    ];

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(FIXED.iter().chain(chokepoints))?;

    for row in rows {
        let o = &row.observation;
        let mut record: Vec<String> = vec![
            o.record.vessel_id.to_string(),
            o.od.clone(),
            o.route_id.to_string(),
            o.unique_route_id.to_string(),
            o.record.timestamp.to_rfc3339(),
            o.record.position.lat.to_string(),
            o.record.position.lon.to_string(),
            row.destination.lat.to_string(),
            row.destination.lon.to_string(),
            o.remaining_lead_time.to_string(),
            o.elapsed_time.to_string(),
            row.state.as_str().to_owned(),
        ];
        match row.state.result() {
            Some(r) => {
                record.extend(
                    [r.distance_km, r.direct_km, r.to_network_km, r.from_network_km]
                        .map(|v| v.to_string()),
                );
                record.extend(
                    (0..chokepoints.len())
                        .map(|i| r.chokepoints.get(i).copied().unwrap_or(false).to_string()),
                );
            }
            None => record.extend(std::iter::repeat_n(String::new(), 4 + chokepoints.len())),
        }
        writer.write_record(&record)?;
    }
    finish(writer)
}
