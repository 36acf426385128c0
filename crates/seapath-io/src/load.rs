//! CSV loaders for the input tables.
//!
//! Each loader reads headed CSV by column name, so extra columns are
//! ignored and column order does not matter. Coordinates are checked on
//! load; a bad row aborts the load with its line number.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::info;

use seapath_export::{ExportError, ObservationRow};
use seapath_pipeline::{
    Chokepoint, GeoPoint, JourneyObservation, NavStatus, NetworkError, OceanEdge, OceanNetwork,
    OceanNode, PipelineError, PortCode, PortRecord, PositionRecord, VesselId,
};

use crate::settings::NetworkSettings;

/// Errors reading inputs or writing outputs.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// A CSV file could not be opened or a row could not be parsed.
    #[error("failed to read {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A row parsed but holds an invalid value.
    #[error("{}, line {line}: {source}", path.display())]
    Record {
        path: PathBuf,
        line: u64,
        #[source]
        source: PipelineError,
    },

    /// The ocean network could not be built from its tables.
    #[error("invalid ocean network: {0}")]
    Network(#[from] NetworkError),

    /// An output could not be serialized.
    #[error(transparent)]
    Export(#[from] ExportError),

    /// A file or directory could not be created, written or listed.
    #[error("filesystem error at {}: {source}", path.display())]
    Fs {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Deserialize)]
struct PositionRow {
    vessel_id: u64,
    timestamp: DateTime<Utc>,
    lat: f64,
    lon: f64,
    speed: f64,
    nav_status: String,
    #[serde(default)]
    cell: Option<u64>,
    #[serde(default)]
    journey_break: Option<bool>,
}

#[derive(Deserialize)]
struct PortRow {
    code: String,
    lat: f64,
    lon: f64,
    #[serde(default)]
    mapped_code: Option<String>,
}

#[derive(Deserialize)]
struct NodeRow {
    id: u64,
    lat: f64,
    lon: f64,
}

#[derive(Deserialize)]
struct EdgeRow {
    source: u64,
    target: u64,
    #[serde(default)]
    weight_km: Option<f64>,
}

#[derive(Deserialize)]
struct ChokepointRow {
    name: String,
    lat: f64,
    lon: f64,
}

/// Deserialize every row of `path`, paired with its line number.
fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<(u64, T)>, IoError> {
    let csv_error = |source| IoError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_error)?;
    let headers = reader.headers().map_err(csv_error)?.clone();
    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(csv_error)?;
        let line = record.position().map_or(0, csv::Position::line);
        rows.push((line, record.deserialize(Some(&headers)).map_err(csv_error)?));
    }
    Ok(rows)
}

/// Build a point, rejecting out-of-range coordinates.
fn checked_point(path: &Path, line: u64, lat: f64, lon: f64) -> Result<GeoPoint, IoError> {
    let point = GeoPoint::new(lat, lon);
    if point.is_valid() {
        Ok(point)
    } else {
        Err(IoError::Record {
            path: path.to_path_buf(),
            line,
            source: PipelineError::InvalidCoordinate { lat, lon },
        })
    }
}

/// Load a position history.
///
/// Columns: `vessel_id, timestamp, lat, lon, speed, nav_status`, and
/// optionally `cell` and `journey_break`. Rows may come in any order.
///
/// # Errors
///
/// Returns [`IoError::Csv`] for unreadable files, missing columns or
/// unparsable values, and [`IoError::Record`] for invalid coordinates.
pub fn load_positions(path: &Path) -> Result<Vec<PositionRecord>, IoError> {
    let records = read_rows::<PositionRow>(path)?
        .into_iter()
        .map(|(line, row)| {
            Ok(PositionRecord {
                vessel_id: VesselId(row.vessel_id),
                timestamp: row.timestamp,
                position: checked_point(path, line, row.lat, row.lon)?,
                speed: row.speed,
                nav_status: NavStatus::from(row.nav_status),
                cell: row.cell,
                journey_break: row.journey_break.unwrap_or(false),
            })
        })
        .collect::<Result<Vec<_>, IoError>>()?;
    info!(path = %path.display(), rows = records.len(), "loaded position history");
    Ok(records)
}

/// Load a port registry.
///
/// Columns: `code, lat, lon`, and optionally `mapped_code`; an empty
/// mapped code means the port is canonical.
///
/// # Errors
///
/// As [`load_positions`].
pub fn load_ports(path: &Path) -> Result<Vec<PortRecord>, IoError> {
    let ports = read_rows::<PortRow>(path)?
        .into_iter()
        .map(|(line, row)| {
            Ok(PortRecord {
                position: checked_point(path, line, row.lat, row.lon)?,
                code: PortCode::new(row.code),
                mapped_code: row.mapped_code.filter(|m| !m.is_empty()).map(PortCode::new),
            })
        })
        .collect::<Result<Vec<_>, IoError>>()?;
    info!(path = %path.display(), ports = ports.len(), "loaded port registry");
    Ok(ports)
}

/// Load the node, edge and chokepoint tables and build the network.
///
/// # Errors
///
/// As [`load_positions`] for each table, plus [`IoError::Network`] if
/// the tables do not form a valid network.
pub fn load_network(settings: &NetworkSettings) -> Result<OceanNetwork, IoError> {
    let nodes = read_rows::<NodeRow>(&settings.nodes)?
        .into_iter()
        .map(|(line, row)| {
            Ok(OceanNode {
                id: row.id,
                position: checked_point(&settings.nodes, line, row.lat, row.lon)?,
            })
        })
        .collect::<Result<Vec<_>, IoError>>()?;
    let edges: Vec<OceanEdge> = read_rows::<EdgeRow>(&settings.edges)?
        .into_iter()
        .map(|(_, row)| OceanEdge {
            source: row.source,
            target: row.target,
            weight_km: row.weight_km,
        })
        .collect();
    let chokepoints = read_rows::<ChokepointRow>(&settings.chokepoints)?
        .into_iter()
        .map(|(line, row)| {
            Ok(Chokepoint {
                position: checked_point(&settings.chokepoints, line, row.lat, row.lon)?,
                name: row.name,
            })
        })
        .collect::<Result<Vec<_>, IoError>>()?;

    let network = OceanNetwork::new(&nodes, &edges, chokepoints, &settings.graph)?;
    info!(
        nodes = network.node_count(),
        edges = network.edge_count(),
        chokepoints = network.chokepoints().len(),
        "loaded ocean network"
    );
    Ok(network)
}

/// Load a journey table written by extraction.
///
/// # Errors
///
/// Returns [`IoError::Csv`] if the file is unreadable or not a journey
/// table.
pub fn load_observations(path: &Path) -> Result<Vec<JourneyObservation>, IoError> {
    Ok(read_rows::<ObservationRow>(path)?
        .into_iter()
        .map(|(_, row)| row.into())
        .collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use super::*;

    fn file(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn positions_with_optional_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = file(
            &dir,
            "positions.csv",
            "vessel_id,timestamp,lat,lon,speed,nav_status,journey_break\n\
             7,2024-01-01T00:00:00Z,51.95,4.14,0.0,Moored,\n\
             7,2024-01-01T06:00:00Z,52.50,3.00,12.5,under way using engine,true\n",
        );
        let records = load_positions(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].vessel_id, VesselId(7));
        assert_eq!(records[0].nav_status, NavStatus::Moored);
        assert!(!records[0].journey_break);
        assert!(records[1].journey_break);
        assert_eq!(records[1].nav_status, NavStatus::UnderWay);
        assert_eq!(records[1].cell, None);
    }

    #[test]
    fn missing_column_is_a_csv_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = file(
            &dir,
            "positions.csv",
            "vessel_id,timestamp,lat,lon,nav_status\n7,2024-01-01T00:00:00Z,51.95,4.14,moored\n",
        );
        assert!(matches!(load_positions(&path), Err(IoError::Csv { .. })));
    }

    #[test]
    fn non_numeric_value_is_a_csv_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = file(&dir, "ports.csv", "code,lat,lon\nNLRTM,north,4.14\n");
        assert!(matches!(load_ports(&path), Err(IoError::Csv { .. })));
    }

    #[test]
    fn out_of_range_coordinate_names_the_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = file(
            &dir,
            "ports.csv",
            "code,lat,lon\nNLRTM,51.95,4.14\nBAD01,95.0,4.14\n",
        );
        let err = load_ports(&path).unwrap_err();
        assert!(matches!(err, IoError::Record { line: 3, .. }), "{err}");
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn ports_with_mapped_codes() {
        let dir = tempfile::tempdir().unwrap();
        let path = file(
            &dir,
            "ports.csv",
            "code,lat,lon,mapped_code\nNLRTM,51.95,4.14,\nNLRTA,52.00,4.05,NLRTM\n",
        );
        let ports = load_ports(&path).unwrap();
        assert_eq!(ports[0].canonical().as_str(), "NLRTM");
        assert_eq!(ports[1].canonical().as_str(), "NLRTM");
        assert_eq!(ports[1].code.as_str(), "NLRTA");
    }

    #[test]
    fn network_tables_build_a_network() {
        let dir = tempfile::tempdir().unwrap();
        let settings = NetworkSettings {
            nodes: file(&dir, "nodes.csv", "id,lat,lon\n1,0.0,0.0\n2,0.0,1.0\n3,0.0,2.0\n"),
            edges: file(&dir, "edges.csv", "source,target,weight_km\n1,2,\n2,3,150.0\n"),
            chokepoints: file(&dir, "chokepoints.csv", "name,lat,lon\nnarrows,0.0,1.0\n"),
            graph: seapath_pipeline::NetworkConfig::default(),
        };
        let network = load_network(&settings).unwrap();
        assert_eq!(network.node_count(), 3);
        assert_eq!(network.edge_count(), 2);
        assert_eq!(network.chokepoints()[0].name, "narrows");

        let broken = NetworkSettings {
            edges: file(&dir, "broken.csv", "source,target\n1,9\n"),
            ..settings
        };
        assert!(matches!(
            load_network(&broken),
            Err(IoError::Network(NetworkError::UnknownNode { missing: 9, .. }))
        ));
    }
}
