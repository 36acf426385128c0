//! seapath: vessel journey extraction and ocean-distance labeling.
//!
//! Three subcommands share one settings file:
//!
//! - `extract` reconstructs origin/destination journeys from the
//!   position history and writes the per-job tables and job lists.
//! - `label` labels the extracted journeys with remaining ocean-going
//!   distance and chokepoint crossings, then filters anomalies.
//! - `route` prints the distance between two points as JSON.
//!
//! # Usage
//!
//! ```text
//! seapath --config seapath.yaml extract
//! seapath --config seapath.yaml label
//! seapath --config seapath.yaml route --from 1.26,103.84 --to 51.95,4.14
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{debug, error, info, warn};

use seapath_io::{IoError, OutputLayout, Settings};
use seapath_pipeline::labeling::{destination_lookup, select_label_rows};
use seapath_pipeline::{
    BatchLabeler, Extractor, GeoPoint, OceanNetwork, PipelineError, PortRegistry, PositionTable,
    ShortestPathEngine, filter_anomalies,
};

/// Vessel journey extraction and ocean-distance labeling.
#[derive(Parser)]
#[command(name = "seapath", version)]
struct Cli {
    /// Settings file (YAML). `SEAPATH__`-prefixed environment variables
    /// override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level, overriding `logging.level` from the settings.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract journeys for every configured job.
    Extract,

    /// Label extracted journeys with ocean-going distance.
    Label {
        /// Keep every labeled row instead of dropping anomalous journeys.
        #[arg(long)]
        no_anomaly_filter: bool,
    },

    /// Print the ocean-going distance between two points.
    Route {
        /// Start point as `lat,lon`.
        #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
        from: GeoPoint,

        /// End point as `lat,lon`.
        #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
        to: GeoPoint,
    },
}

/// Errors that end a run.
#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Export(#[from] seapath_export::ExportError),

    #[error("settings have no `network` section")]
    NoNetwork,
}

fn parse_point(s: &str) -> Result<GeoPoint, String> {
    let (lat, lon) = s
        .split_once(',')
        .ok_or_else(|| format!("expected `lat,lon`, got {s:?}"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid coordinate {v:?}: {e}"))
    };
    let point = GeoPoint::new(parse(lat)?, parse(lon)?);
    if point.is_valid() {
        Ok(point)
    } else {
        Err(format!("coordinate out of range: {s}"))
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let level = cli.log_level.as_deref().unwrap_or(&settings.logging.level);
    if let Err(e) = seapath_io::logging::init(level) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Command::Extract => run_extract(&settings),
        Command::Label { no_anomaly_filter } => run_label(&settings, !no_anomaly_filter),
        Command::Route { from, to } => run_route(&settings, from, to),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run_extract(settings: &Settings) -> Result<(), AppError> {
    let jobs = settings.jobs();
    if jobs.is_empty() {
        warn!("no jobs configured");
    }

    let records = seapath_io::load_positions(&settings.inputs.positions)?;
    let ports = seapath_io::load_ports(&settings.inputs.ports)?;
    let registry = PortRegistry::new(ports, &settings.extraction.port_index)?;
    let extractor =
        Extractor::prepare(PositionTable::new(records), &registry, &settings.extraction)?;
    debug!("\n{}", extractor.diagnostics().report());

    let report = extractor.run_all(&jobs);
    for output in &report.succeeded {
        debug!("\n{}", output.diagnostics.report());
    }

    let layout = OutputLayout::new(&settings.output_root);
    layout.create_dirs()?;
    layout.write_report(&report)?;
    Ok(())
}

fn load_network(settings: &Settings) -> Result<OceanNetwork, AppError> {
    let network = settings.network.as_ref().ok_or(AppError::NoNetwork)?;
    Ok(seapath_io::load_network(network)?)
}

fn run_label(settings: &Settings, filter: bool) -> Result<(), AppError> {
    let network = load_network(settings)?;
    let layout = OutputLayout::new(&settings.output_root);
    layout.create_dirs()?;

    let jobs = settings.jobs();
    let registry = PortRegistry::new(
        seapath_io::load_ports(&settings.inputs.ports)?,
        &settings.extraction.port_index,
    )?;
    let destinations: HashMap<String, GeoPoint> = destination_lookup(&jobs, &registry);

    let mut observations = Vec::new();
    for path in layout.job_extracts(&jobs) {
        observations.extend(seapath_io::load_observations(&path)?);
    }
    info!(rows = observations.len(), "loaded journey tables");

    let selection = select_label_rows(
        &observations,
        &destinations,
        &settings.extraction,
        &settings.labeling,
    );
    let mut rows = selection.rows;
    let labeler = BatchLabeler::new(ShortestPathEngine::new(&network), settings.labeling.clone())?;
    let summary = labeler.label(&mut rows);
    if summary.failed_batches > 0 {
        warn!(
            failed_batches = summary.failed_batches,
            failed_rows = summary.failed,
            "some batches failed; rerun to retry them"
        );
    }
    layout.write_labels(&layout.labels_path(), &rows, &network)?;

    if filter {
        let filtered = filter_anomalies(rows, &settings.anomaly);
        layout.write_labels(&layout.filtered_labels_path(), &filtered.kept, &network)?;
    }
    Ok(())
}

fn run_route(settings: &Settings, from: GeoPoint, to: GeoPoint) -> Result<(), AppError> {
    let network = load_network(settings)?;
    let result = ShortestPathEngine::new(&network).query(from, to);
    println!("{}", seapath_export::route_report_json(&result, &network)?);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn points_parse_with_signs_and_spaces() {
        let p = parse_point("-33.9, 18.4").unwrap();
        assert!((p.lat + 33.9).abs() < f64::EPSILON);
        assert!((p.lon - 18.4).abs() < f64::EPSILON);
        assert!(parse_point("91,0").is_err());
        assert!(parse_point("north,0").is_err());
        assert!(parse_point("12.5").is_err());
    }

    #[test]
    fn route_arguments_accept_negative_coordinates() {
        let cli = Cli::try_parse_from([
            "seapath",
            "route",
            "--from",
            "-33.9,18.4",
            "--to",
            "1.26,103.84",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Route { from, .. } if from.lat < 0.0));
    }
}
