//! One backup, start to finish.
//!
//! Stages run strictly in order: pre-hooks, capture, name and compress,
//! retention, post-hooks. Hook and retention failures are collected as warnings.
//! A capture or compression failure aborts the backup before any later stage.

use crate::backup::backup_config::{BackupConfig, GlobalConfig};
use crate::backup::capture::Capture;
use crate::backup::compress::Compressor;
use crate::backup::function_path;
use crate::backup::hooks::run_hooks;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use crate::backup::retention::RetentionReport;
use chrono::{Local, NaiveDateTime};
use function_name::named;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug)]
pub struct BackupOutcome {
    pub archive: PathBuf,
    pub retention: RetentionReport,
    /// Hook and retention failures that did not fail the backup.
    pub warnings: Vec<Error>,
}

pub struct Executor<'a> {
    global: &'a GlobalConfig,
}

impl<'a> Executor<'a> {
    pub fn new(global: &'a GlobalConfig) -> Self {
        Self { global }
    }

    pub fn execute_backup(&self, backup: &BackupConfig) -> Result<BackupOutcome> {
        self.execute_backup_at(backup, Local::now().naive_local())
    }

    /// Runs the pipeline, naming the archive after `now`.
    #[named]
    pub fn execute_backup_at(
        &self,
        backup: &BackupConfig,
        now: NaiveDateTime,
    ) -> Result<BackupOutcome> {
        let name = backup.name().as_str();
        let mut warnings = Vec::new();
        info!("Starting backup {:?}", name);

        if !backup.pre_hooks().is_empty() {
            info!("Running pre-hooks of {:?}", name);
            if let Err(e) = run_hooks(backup.pre_hooks()) {
                warn!("Pre-hooks of {:?} completed with errors", name);
                warnings.push(e.add_msg(format!("Pre-hooks of {:?}", name)));
            }
        }

        let source = backup.capture_source()?;
        let scratch = tempfile::Builder::new()
            .prefix("rotabak-")
            .tempdir()
            .map_err(Error::from)
            .add_fn_name(function_path!())?;
        let captured = source
            .capture(scratch.path())
            .add_msg(format!("Capture of {:?} failed", name))?;

        let compression = backup.effective_compression(self.global);
        let mask = self.global.filename_mask();
        let destination_dir = backup.destination_dir(self.global);
        std::fs::create_dir_all(&destination_dir)
            .map_err(Error::from)
            .add_msg(format!("Creating {:?} failed", destination_dir))?;
        let archive = destination_dir.join(mask.file_name(name, &now, compression));

        info!("Compressing {:?} as {} into {:?}", captured, compression, archive);
        let partial = tempfile::Builder::new()
            .prefix(".rotabak-")
            .suffix(".partial")
            .tempfile_in(&destination_dir)
            .map_err(Error::from)
            .add_fn_name(function_path!())?;
        compression
            .compress(&captured, partial.path())
            .add_msg(format!("Compression of {:?} failed", name))?;
        partial
            .persist(&archive)
            .map_err(Error::from)
            .add_fn_name(function_path!())?;
        drop(scratch);
        info!("Created backup file: {:?}", archive);

        let policy = backup.effective_retention(self.global);
        let retention = match policy.apply(&destination_dir, name, mask) {
            Ok(mut report) => {
                for path in &report.deleted {
                    info!("Removed out of retention file {:?}", path);
                }
                for e in &report.warnings {
                    warn!("Retention of {:?}: {}", name, e);
                }
                warnings.append(&mut report.warnings);
                report
            }
            Err(e) => {
                warn!("Retention of {:?} failed: {}", name, e);
                warnings.push(e);
                RetentionReport::default()
            }
        };

        if !backup.post_hooks().is_empty() {
            info!("Running post-hooks of {:?}", name);
            if let Err(e) = run_hooks(backup.post_hooks()) {
                warn!("Post-hooks of {:?} completed with errors", name);
                warnings.push(e.add_msg(format!("Post-hooks of {:?}", name)));
            }
        }

        info!(
            "Backup {:?} done with {} warning(s)",
            name,
            warnings.len()
        );
        Ok(BackupOutcome {
            archive,
            retention,
            warnings,
        })
    }
}
