//! seapath-io: Filesystem I/O for seapath.
//!
//! Loads settings, position histories, port registries and ocean
//! networks from disk, lays out and writes the per-job output tree, and
//! installs the log subscriber. Computation is left to
//! `seapath-pipeline` and output formatting to `seapath-export`.

pub mod load;
pub mod logging;
pub mod settings;
pub mod store;

pub use load::{IoError, load_network, load_observations, load_ports, load_positions};
pub use logging::LoggingError;
pub use settings::{InputPaths, JobSpec, LoggingSettings, NetworkSettings, Settings, SettingsError};
pub use store::OutputLayout;
