//! Shared types for the seapath pipeline.

use std::fmt;

use chrono::{DateTime, Utc};
use geo::Haversine;
use geo::line_measures::Distance;
use serde::{Deserialize, Serialize};

use crate::cleanse::CleanseConfig;
use crate::spatial_index::IndexLevels;

/// Kilometres per international nautical mile.
pub const KM_PER_NAUTICAL_MILE: f64 = 1.852;

/// A position on the Earth's surface in decimal degrees (WGS84).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees, positive north.
    pub lat: f64,
    /// Longitude in degrees, positive east.
    pub lon: f64,
}

impl GeoPoint {
    /// Create a new point.
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Returns `true` if both coordinates are finite and in range.
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && self.lat.abs() <= 90.0
            && self.lon.abs() <= 180.0
    }

    /// Great-circle (haversine) distance to another point in kilometres.
    #[must_use]
    pub fn distance_km(self, other: Self) -> f64 {
        Haversine.distance(geo::Point::from(self), geo::Point::from(other)) / 1000.0
    }

    /// Great-circle (haversine) distance to another point in nautical miles.
    #[must_use]
    pub fn distance_nm(self, other: Self) -> f64 {
        self.distance_km(other) / KM_PER_NAUTICAL_MILE
    }

    /// Position on the unit sphere.
    ///
    /// Chord length between unit vectors is monotonic in great-circle
    /// distance, so nearest-neighbour order in this space equals
    /// nearest-neighbour order on the sphere.
    #[must_use]
    pub fn unit_vector(self) -> [f64; 3] {
        let (lat, lon) = (self.lat.to_radians(), self.lon.to_radians());
        [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()]
    }
}

impl From<GeoPoint> for geo::Point<f64> {
    fn from(p: GeoPoint) -> Self {
        Self::new(p.lon, p.lat)
    }
}

/// Vessel identifier (IMO number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VesselId(pub u64);

impl fmt::Display for VesselId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A port code (UN/LOCODE or a canonical cluster code).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortCode(String);

impl PortCode {
    /// Create a new port code.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// The code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PortCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PortCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// AIS navigational status.
///
/// Only the statuses that matter for stop detection get their own
/// variant; everything else is preserved verbatim in [`Other`](Self::Other).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NavStatus {
    /// "moored"
    Moored,
    /// "at anchor"
    AtAnchor,
    /// "aground"
    Aground,
    /// "under way using engine"
    UnderWay,
    /// Any other reported status.
    Other(String),
}

impl NavStatus {
    /// Whether this status indicates the vessel is stationary.
    #[must_use]
    pub const fn is_stationary(&self) -> bool {
        matches!(self, Self::Moored | Self::AtAnchor | Self::Aground)
    }
}

impl From<String> for NavStatus {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "moored" => Self::Moored,
            "at anchor" => Self::AtAnchor,
            "aground" => Self::Aground,
            "under way using engine" => Self::UnderWay,
            _ => Self::Other(s),
        }
    }
}

impl From<NavStatus> for String {
    fn from(status: NavStatus) -> Self {
        match status {
            NavStatus::Moored => "moored".to_owned(),
            NavStatus::AtAnchor => "at anchor".to_owned(),
            NavStatus::Aground => "aground".to_owned(),
            NavStatus::UnderWay => "under way using engine".to_owned(),
            NavStatus::Other(s) => s,
        }
    }
}

/// One vessel position report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    /// Reporting vessel.
    pub vessel_id: VesselId,
    /// Report time.
    pub timestamp: DateTime<Utc>,
    /// Reported position.
    pub position: GeoPoint,
    /// Speed over ground in knots.
    pub speed: f64,
    /// Navigational status.
    pub nav_status: NavStatus,
    /// Precomputed coarse H3 cell of `position`, if the source provides one.
    pub cell: Option<u64>,
    /// Set when the source marks a data gap before this report.
    pub journey_break: bool,
}

/// One entry of the port registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortRecord {
    /// Raw port code.
    pub code: PortCode,
    /// Port location.
    pub position: GeoPoint,
    /// Canonical code shared by clustered anchorages. `None` means the
    /// port is its own canonical code.
    pub mapped_code: Option<PortCode>,
}

impl PortRecord {
    /// The canonical code for this port.
    #[must_use]
    pub fn canonical(&self) -> &PortCode {
        self.mapped_code.as_ref().unwrap_or(&self.code)
    }
}

/// One origin/destination extraction job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OdJob {
    /// Job name, usually `"{origin}-{destination}"`.
    pub name: String,
    /// Raw origin port code.
    pub origin: PortCode,
    /// Raw destination port code.
    pub destination: PortCode,
}

impl OdJob {
    /// Create a job named after its port pair.
    #[must_use]
    pub fn new(origin: impl Into<String>, destination: impl Into<String>) -> Self {
        let origin = PortCode::new(origin);
        let destination = PortCode::new(destination);
        Self {
            name: format!("{origin}-{destination}"),
            origin,
            destination,
        }
    }

    /// OD label written into every output row, `"{origin}-{destination}"`.
    #[must_use]
    pub fn od_label(&self) -> String {
        format!("{}-{}", self.origin, self.destination)
    }

    /// File stem for per-job outputs, `"{origin}{destination}"`.
    #[must_use]
    pub fn file_stem(&self) -> String {
        format!("{}{}", self.origin, self.destination)
    }
}

/// Configuration for journey extraction.
///
/// All fields have defaults matching the documented algorithm
/// parameters; a partially specified settings file only overrides the
/// keys it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// A stationary report counts as stopped only at or below this speed
    /// (knots).
    pub stopped_speed_knots: f64,

    /// A stopped report is attributed to the nearest port only within
    /// this distance (nautical miles).
    pub arrival_threshold_nm: f64,

    /// A job is abandoned unless strictly more candidate journeys than
    /// this are found.
    pub min_route_candidates: usize,

    /// A job's output is persisted only if at least this many distinct
    /// routes survive cleansing.
    pub min_cleansed_routes: usize,

    /// Insert a journey break wherever consecutive reports of one vessel
    /// are further apart than this many hours. `None` disables gap
    /// detection; explicit break flags on records still apply.
    pub max_report_gap_hours: Option<f64>,

    /// Grid levels for the port index.
    pub port_index: IndexLevels,

    /// Port-sequence cleansing parameters.
    pub cleanse: CleanseConfig,
}

impl ExtractionConfig {
    /// Default stopped-speed threshold (knots).
    pub const DEFAULT_STOPPED_SPEED_KNOTS: f64 = 0.5;
    /// Default arrival threshold (nautical miles).
    pub const DEFAULT_ARRIVAL_THRESHOLD_NM: f64 = 15.0;
    /// Default candidate threshold.
    pub const DEFAULT_MIN_ROUTE_CANDIDATES: usize = 3;
    /// Default cleansed route threshold.
    pub const DEFAULT_MIN_CLEANSED_ROUTES: usize = 3;

    /// Check that all thresholds are usable.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(self.stopped_speed_knots.is_finite() && self.stopped_speed_knots >= 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "stopped_speed_knots must be a non-negative number, got {}",
                self.stopped_speed_knots
            )));
        }
        if !(self.arrival_threshold_nm.is_finite() && self.arrival_threshold_nm >= 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "arrival_threshold_nm must be a non-negative number, got {}",
                self.arrival_threshold_nm
            )));
        }
        if let Some(gap) = self.max_report_gap_hours
            && !(gap.is_finite() && gap > 0.0)
        {
            return Err(PipelineError::InvalidConfig(format!(
                "max_report_gap_hours must be positive, got {gap}"
            )));
        }
        self.port_index.validate()?;
        self.cleanse.validate()
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            stopped_speed_knots: Self::DEFAULT_STOPPED_SPEED_KNOTS,
            arrival_threshold_nm: Self::DEFAULT_ARRIVAL_THRESHOLD_NM,
            min_route_candidates: Self::DEFAULT_MIN_ROUTE_CANDIDATES,
            min_cleansed_routes: Self::DEFAULT_MIN_CLEANSED_ROUTES,
            max_report_gap_hours: None,
            port_index: IndexLevels::ports(),
            cleanse: CleanseConfig::default(),
        }
    }
}

/// Validation errors raised by the pipeline.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    /// A vessel history is not sorted ascending by timestamp.
    #[error("position history of vessel {vessel} is not sorted by time at row {row}")]
    UnsortedHistory {
        /// Offending vessel.
        vessel: VesselId,
        /// Row (within the vessel's slice) that goes back in time.
        row: usize,
    },

    /// A single-vessel slice contains reports from another vessel.
    #[error("expected reports of vessel {expected} only, found vessel {found}")]
    MixedVessels {
        /// Vessel of the first row.
        expected: VesselId,
        /// Vessel found later in the slice.
        found: VesselId,
    },

    /// Per-row side data does not line up with the rows it describes.
    #[error("expected {expected} per-row entries, got {found}")]
    LengthMismatch {
        /// Number of rows.
        expected: usize,
        /// Number of entries supplied.
        found: usize,
    },

    /// A coordinate is non-finite or out of range.
    #[error("invalid coordinate ({lat}, {lon})")]
    InvalidCoordinate {
        /// Latitude as given.
        lat: f64,
        /// Longitude as given.
        lon: f64,
    },

    /// A spatial index was built over an empty reference set.
    #[error("spatial index reference set is empty")]
    EmptyReferenceSet,

    /// An H3 resolution outside 0..=15 was configured.
    #[error("invalid grid resolution {0}")]
    InvalidResolution(u8),

    /// Configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
