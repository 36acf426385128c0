//! Output directory layout and writers.
//!
//! ```text
//! {root}/
//!   od_extracts/{O}{D}.csv
//!   od_stats/routeID_{O}{D}.csv
//!   od_stats/portsequence_{O}{D}.csv
//!   successful_jobs.json
//!   failed_jobs.json
//!   ods_successfully_processed.csv
//!   ods_unsuccessfully_processed.csv
//!   labels/labels.csv
//!   labels/labels_filtered.csv
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use seapath_pipeline::{ExtractionReport, JobOutput, LabelRow, OceanNetwork, OdJob};

use crate::load::IoError;

const EXTRACTS_DIR: &str = "od_extracts";
const STATS_DIR: &str = "od_stats";
const LABELS_DIR: &str = "labels";

/// Paths of every output under one root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Journey table of one job.
    #[must_use]
    pub fn extract_path(&self, job: &OdJob) -> PathBuf {
        self.root
            .join(EXTRACTS_DIR)
            .join(format!("{}.csv", job.file_stem()))
    }

    /// Route statistics of one job.
    #[must_use]
    pub fn route_stats_path(&self, job: &OdJob) -> PathBuf {
        self.root
            .join(STATS_DIR)
            .join(format!("routeID_{}.csv", job.file_stem()))
    }

    /// Port-sequence statistics of one job.
    #[must_use]
    pub fn sequence_stats_path(&self, job: &OdJob) -> PathBuf {
        self.root
            .join(STATS_DIR)
            .join(format!("portsequence_{}.csv", job.file_stem()))
    }

    #[must_use]
    pub fn labels_path(&self) -> PathBuf {
        self.root.join(LABELS_DIR).join("labels.csv")
    }

    /// Labels that survived the anomaly filter.
    #[must_use]
    pub fn filtered_labels_path(&self) -> PathBuf {
        self.root.join(LABELS_DIR).join("labels_filtered.csv")
    }

    /// Create the output directories.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Fs`] if a directory cannot be created.
    pub fn create_dirs(&self) -> Result<(), IoError> {
        for dir in [EXTRACTS_DIR, STATS_DIR, LABELS_DIR] {
            let path = self.root.join(dir);
            fs::create_dir_all(&path).map_err(|source| IoError::Fs { path, source })?;
        }
        Ok(())
    }

    /// Write the three tables of a successful job.
    ///
    /// Route statistics cover kept routes only; sequence statistics
    /// cover every sequence with its status.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`] if a table cannot be serialized or written.
    pub fn write_job(&self, output: &JobOutput) -> Result<(), IoError> {
        let job = &output.job;
        write_file(
            &self.extract_path(job),
            &seapath_export::observations_to_csv(output.observations())?,
        )?;
        write_file(
            &self.route_stats_path(job),
            &seapath_export::routes_to_csv(output.kept_routes())?,
        )?;
        write_file(
            &self.sequence_stats_path(job),
            &seapath_export::sequences_to_csv(output.sequences())?,
        )?;
        debug!(job = %job.name, rows = output.observations().len(), "job outputs written");
        Ok(())
    }

    /// Write every successful job and the success and failure lists.
    ///
    /// Tables a failed job left from an earlier run are deleted.
    ///
    /// # Errors
    ///
    /// Returns the first [`IoError`] encountered.
    pub fn write_report(&self, report: &ExtractionReport) -> Result<(), IoError> {
        for output in &report.succeeded {
            self.write_job(output)?;
        }
        for failed in &report.failed {
            self.remove_job(&failed.job)?;
        }
        let succeeded: Vec<&OdJob> = report.succeeded.iter().map(|o| &o.job).collect();
        write_file(
            &self.root.join("successful_jobs.json"),
            &seapath_export::successful_jobs_json(succeeded.iter().copied())?,
        )?;
        write_file(
            &self.root.join("ods_successfully_processed.csv"),
            &seapath_export::successful_jobs_csv(succeeded.iter().copied())?,
        )?;
        write_file(
            &self.root.join("failed_jobs.json"),
            &seapath_export::failed_jobs_json(&report.failed)?,
        )?;
        write_file(
            &self.root.join("ods_unsuccessfully_processed.csv"),
            &seapath_export::failed_jobs_csv(&report.failed)?,
        )?;
        info!(
            root = %self.root.display(),
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "extraction outputs written"
        );
        Ok(())
    }

    /// Journey tables of `jobs` present under the root, in job order.
    ///
    /// Tables of jobs that are not listed are never returned, even if an
    /// earlier run left them behind.
    #[must_use]
    pub fn job_extracts(&self, jobs: &[OdJob]) -> Vec<PathBuf> {
        jobs.iter()
            .map(|job| self.extract_path(job))
            .filter(|path| path.is_file())
            .collect()
    }

    /// Delete the tables of one job left by an earlier run, if any.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Fs`] if an existing table cannot be removed.
    pub fn remove_job(&self, job: &OdJob) -> Result<(), IoError> {
        for path in [
            self.extract_path(job),
            self.route_stats_path(job),
            self.sequence_stats_path(job),
        ] {
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "removed stale job output"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => return Err(IoError::Fs { path, source }),
            }
        }
        Ok(())
    }

    /// Write a label table to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`] if the table cannot be serialized or written.
    pub fn write_labels(
        &self,
        path: &Path,
        rows: &[LabelRow],
        network: &OceanNetwork,
    ) -> Result<(), IoError> {
        let names: Vec<&str> = network.chokepoints().iter().map(|c| c.name.as_str()).collect();
        write_file(path, &seapath_export::labels_to_csv(rows, &names)?)
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), IoError> {
    fs::write(path, contents).map_err(|source| IoError::Fs {
        path: path.to_path_buf(),
        source,
    })
}
