//! Integration test: run a small fleet through extraction and serialize every per-job table.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{Duration, TimeZone, Utc};
use seapath_pipeline::{
    ExtractionConfig, GeoPoint, JourneyObservation, NavStatus, OdJob, PortRecord,
    PositionRecord, VesselId, extract,
};

fn ports() -> Vec<PortRecord> {
    [("NLRTM", 51.95, 4.14), ("SGSIN", 1.26, 103.84)]
        .into_iter()
        .map(|(code, lat, lon)| PortRecord {
            code: code.into(),
            position: GeoPoint::new(lat, lon),
            mapped_code: None,
        })
        .collect()
}

/// Moored at Singapore, one report in the Indian Ocean, moored at
/// Rotterdam 24 days later.
fn passage(vessel: u64) -> Vec<PositionRecord> {
    let depart = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()
        + Duration::hours(i64::try_from(vessel).unwrap());
    let row = |hours: i64, lat: f64, lon: f64, speed: f64, nav_status: NavStatus| PositionRecord {
        vessel_id: VesselId(vessel),
        timestamp: depart + Duration::hours(hours),
        position: GeoPoint::new(lat, lon),
        speed,
        nav_status,
        cell: None,
        journey_break: false,
    };
    vec![
        row(0, 1.26, 103.84, 0.0, NavStatus::Moored),
        row(240, 5.0, 70.0, 15.0, NavStatus::UnderWay),
        row(576, 51.95, 4.14, 0.1, NavStatus::Moored),
    ]
}

#[test]
fn successful_job_serializes_every_table() {
    let records: Vec<PositionRecord> = (1..=4).flat_map(passage).collect();
    let jobs = [OdJob::new("SGSIN", "NLRTM"), OdJob::new("NLRTM", "SGSIN")];
    let report = extract(records, ports(), &jobs, &ExtractionConfig::default()).unwrap();
    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.failed.len(), 1);
    let output = &report.succeeded[0];

    let journeys = seapath_export::observations_to_csv(output.observations()).unwrap();
    assert_eq!(journeys.lines().count(), 1 + 4 * 3);
    let restored: Vec<JourneyObservation> = csv::Reader::from_reader(journeys.as_bytes())
        .deserialize::<seapath_export::ObservationRow>()
        .map(|r| r.unwrap().into())
        .collect();
    assert_eq!(restored.as_slice(), output.observations());

    let routes = seapath_export::routes_to_csv(output.kept_routes()).unwrap();
    assert_eq!(routes.lines().count(), 1 + 4);
    assert!(routes.lines().skip(1).all(|l| l.starts_with("SGSIN-NLRTM,")));

    let sequences = seapath_export::sequences_to_csv(output.sequences()).unwrap();
    assert_eq!(sequences.lines().count(), 2);
    assert!(sequences.lines().nth(1).unwrap().contains(",valid,"));

    let succeeded = seapath_export::successful_jobs_csv([&output.job]).unwrap();
    assert_eq!(succeeded.lines().nth(1), Some("SGSIN-NLRTM,SGSIN,NLRTM,"));
    let failed = seapath_export::failed_jobs_json(&report.failed).unwrap();
    assert!(failed.contains("\"NLRTM-SGSIN\""));
}
