use crate::backup::backup_config::{BackupConfig, Config};
use crate::backup::executor::Executor;
use crate::backup::hooks::run_hooks;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use bon::Builder;
use itertools::Itertools;
use tracing::{error, info, warn};

#[derive(Clone, Debug, Default, Builder)]
pub struct RunOptions {
    /// Names of the backups to run; empty runs all of them.
    #[builder(default)]
    pub selected: Vec<String>,
    #[builder(default)]
    pub skip_global_pre_hooks: bool,
    #[builder(default)]
    pub skip_global_post_hooks: bool,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, Error)>,
    /// Hook and retention failures, which never fail a run.
    pub warnings: Vec<Error>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

impl Config {
    /// Backups to run, in configuration order.
    ///
    /// An unknown name is an error, reported before anything runs.
    pub fn select_backups(&self, selected: &[String]) -> Result<Vec<&BackupConfig>> {
        if let Some(unknown) = selected
            .iter()
            .find(|name| !self.backups().iter().any(|b| b.name() == *name))
        {
            return Err(Error::UnknownBackup(unknown.clone()));
        }

        Ok(self
            .backups()
            .iter()
            .filter(|b| selected.is_empty() || selected.contains(b.name()))
            .collect_vec())
    }

    /// Runs the selected backups one after the other.
    ///
    /// Global pre-hooks run once before the first backup and global post-hooks
    /// once after the last. A failing backup is recorded and the next one still
    /// runs.
    pub fn run(&self, options: &RunOptions) -> Result<RunSummary> {
        let backups = self.select_backups(&options.selected)?;
        let global = self.global();
        let mut summary = RunSummary::default();

        if options.skip_global_pre_hooks {
            info!("Skipping global pre-hooks");
        } else if !global.pre_hooks().is_empty() {
            info!("Running global pre-hooks...");
            if let Err(e) = run_hooks(global.pre_hooks()) {
                warn!("Global pre-hooks completed with errors");
                summary.warnings.push(e);
            }
        }

        let executor = Executor::new(global);
        let total = backups.len();
        for (i, backup) in backups.into_iter().enumerate() {
            info!("[{}/{}] Processing backup: {}", i + 1, total, backup.name());
            match executor.execute_backup(backup) {
                Ok(mut outcome) => {
                    summary.warnings.append(&mut outcome.warnings);
                    summary.succeeded.push(backup.name().clone());
                }
                Err(e) => {
                    error!("Backup {:?} failed:\n{}", backup.name(), e);
                    summary.failed.push((backup.name().clone(), e));
                }
            }
        }

        if options.skip_global_post_hooks {
            info!("Skipping global post-hooks");
        } else if !global.post_hooks().is_empty() {
            info!("Running global post-hooks...");
            if let Err(e) = run_hooks(global.post_hooks()) {
                warn!("Global post-hooks completed with errors");
                summary.warnings.push(e);
            }
        }

        info!(
            "Backups finished: {} succeeded, {} failed",
            summary.succeeded.len(),
            summary.failed.len()
        );
        if !summary.is_success() {
            error!(
                "Failed backups: {}",
                summary.failed.iter().map(|(name, _)| name).join(", ")
            );
        }

        Ok(summary)
    }
}
