//! Run settings.
//!
//! Read from an optional YAML file, then overridden by environment
//! variables prefixed `SEAPATH__` with `__` between nested keys, e.g.
//! `SEAPATH__EXTRACTION__ARRIVAL_THRESHOLD_NM=10`. Every section other
//! than the input paths and output root has defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File, Map};
use serde::Deserialize;

use seapath_pipeline::{
    AnomalyConfig, ExtractionConfig, LabelingConfig, NetworkConfig, OdJob, PipelineError,
};

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "SEAPATH";

/// Errors loading settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The sources could not be read or deserialized.
    #[error("failed to load settings: {0}")]
    Config(#[from] ConfigError),

    /// A value was read but is out of range.
    #[error("invalid settings: {0}")]
    Invalid(#[from] PipelineError),

    /// A job names the same port twice.
    #[error("job {0} has the same origin and destination")]
    DegenerateJob(String),
}

/// Position history and port registry files.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InputPaths {
    pub positions: PathBuf,
    pub ports: PathBuf,
}

/// Ocean network files and graph parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NetworkSettings {
    pub nodes: PathBuf,
    pub edges: PathBuf,
    pub chokepoints: PathBuf,
    #[serde(default)]
    pub graph: NetworkConfig,
}

/// Log output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Maximum level: `error`, `warn`, `info`, `debug` or `trace`.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
        }
    }
}

/// One entry of the `jobs` map.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobSpec {
    pub origin: String,
    pub destination: String,
}

/// Everything a run needs besides its data.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    pub inputs: InputPaths,
    /// Root of the output tree, see [`OutputLayout`](crate::OutputLayout).
    pub output_root: PathBuf,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    /// Only needed for labeling and route queries.
    #[serde(default)]
    pub network: Option<NetworkSettings>,
    #[serde(default)]
    pub labeling: LabelingConfig,
    #[serde(default)]
    pub anomaly: AnomalyConfig,
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Job name to port pair, run in name order.
    #[serde(default)]
    pub jobs: BTreeMap<String, JobSpec>,
}

impl Settings {
    /// Load from `path` (if any) and the environment, then validate.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] if a source cannot be read, a required
    /// key is missing, or a value is out of range.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        Self::from_sources(path, None)
    }

    /// Like [`load`](Self::load), but with environment variables taken
    /// from `env` instead of the process environment when given.
    ///
    /// # Errors
    ///
    /// See [`load`](Self::load).
    pub fn from_sources(
        path: Option<&Path>,
        env: Option<Map<String, String>>,
    ) -> Result<Self, SettingsError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings: Self = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check every section.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.extraction.validate()?;
        self.labeling.validate()?;
        self.anomaly.validate()?;
        if let Some(network) = &self.network {
            network.graph.node_index.validate()?;
        }
        if let Some((name, _)) = self.jobs.iter().find(|(_, j)| j.origin == j.destination) {
            return Err(SettingsError::DegenerateJob(name.clone()));
        }
        Ok(())
    }

    /// The job list, in name order.
    #[must_use]
    pub fn jobs(&self) -> Vec<OdJob> {
        self.jobs
            .iter()
            .map(|(name, spec)| OdJob {
                name: name.clone(),
                ..OdJob::new(spec.origin.as_str(), spec.destination.as_str())
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use super::*;

    const MINIMAL: &str = "\
inputs:
  positions: data/positions.csv
  ports: data/ports.csv
output_root: out
";

    fn write(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("seapath.yaml");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn minimal_file_gets_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, MINIMAL);
        let settings = Settings::from_sources(Some(&path), Some(Map::new())).unwrap();
        assert_eq!(settings.inputs.positions, PathBuf::from("data/positions.csv"));
        assert_eq!(settings.extraction, ExtractionConfig::default());
        assert_eq!(settings.labeling, LabelingConfig::default());
        assert_eq!(settings.logging.level, "info");
        assert!(settings.network.is_none());
        assert!(settings.jobs().is_empty());
    }

    #[test]
    fn nested_sections_and_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            &format!(
                "{MINIMAL}\
extraction:
  arrival_threshold_nm: 10.0
  cleanse:
    similarity_threshold: 90.0
network:
  nodes: net/nodes.csv
  edges: net/edges.csv
  chokepoints: net/chokepoints.csv
  graph:
    chokepoint_radius_km: 8.0
jobs:
  asia-europe:
    origin: CNSHA
    destination: NLRTM
  coastal:
    origin: NLRTM
    destination: DEHAM
"
            ),
        );
        let settings = Settings::from_sources(Some(&path), Some(Map::new())).unwrap();
        assert!((settings.extraction.arrival_threshold_nm - 10.0).abs() < f64::EPSILON);
        assert!((settings.extraction.cleanse.similarity_threshold - 90.0).abs() < f64::EPSILON);
        assert_eq!(settings.extraction.min_route_candidates, 3);

        let network = settings.network.as_ref().unwrap();
        assert!((network.graph.chokepoint_radius_km - 8.0).abs() < f64::EPSILON);
        assert_eq!(network.graph.node_index, NetworkConfig::default().node_index);

        let jobs = settings.jobs();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].name, "asia-europe");
        assert_eq!(jobs[0].origin.as_str(), "CNSHA");
        assert_eq!(jobs[1].od_label(), "NLRTM-DEHAM");
    }

    #[test]
    fn environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, MINIMAL);
        let env = Map::from([
            ("SEAPATH__OUTPUT_ROOT".to_owned(), "elsewhere".to_owned()),
            (
                "SEAPATH__EXTRACTION__STOPPED_SPEED_KNOTS".to_owned(),
                "1.5".to_owned(),
            ),
            ("SEAPATH__LOGGING__LEVEL".to_owned(), "debug".to_owned()),
        ]);
        let settings = Settings::from_sources(Some(&path), Some(env)).unwrap();
        assert_eq!(settings.output_root, PathBuf::from("elsewhere"));
        assert!((settings.extraction.stopped_speed_knots - 1.5).abs() < f64::EPSILON);
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn missing_required_key_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "output_root: out\n");
        assert!(matches!(
            Settings::from_sources(Some(&path), Some(Map::new())),
            Err(SettingsError::Config(_))
        ));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, &format!("{MINIMAL}labeling:\n  batch_size: 0\n"));
        assert!(matches!(
            Settings::from_sources(Some(&path), Some(Map::new())),
            Err(SettingsError::Invalid(_))
        ));

        let path = write(
            &dir,
            &format!("{MINIMAL}jobs:\n  loop:\n    origin: NLRTM\n    destination: NLRTM\n"),
        );
        assert!(matches!(
            Settings::from_sources(Some(&path), Some(Map::new())),
            Err(SettingsError::DegenerateJob(name)) if name == "loop"
        ));
    }
}
