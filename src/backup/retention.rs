//! Grandfather-father-son retention.
//!
//! Every existing archive of a backup is read back from its file name. For each
//! granularity (day, ISO week, month, year) the archives are grouped by the start
//! of their period and the latest archive of each period becomes that period's
//! anchor. The newest `N` anchors of every granularity are kept, everything else
//! belonging to the backup is deleted. Nothing is persisted between runs.

use crate::backup::naming::FilenameMask;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddMsg;
use bon::Builder;
use chrono::{Datelike, Days, NaiveDateTime, NaiveTime};
use getset::CopyGetters;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use validator::Validate;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Validate, Builder, CopyGetters,
)]
#[serde(deny_unknown_fields)]
#[getset(get_copy = "pub")]
pub struct RetentionPolicy {
    #[serde(default)]
    #[builder(default)]
    daily: u32,
    #[serde(default)]
    #[builder(default)]
    weekly: u32,
    #[serde(default)]
    #[builder(default)]
    monthly: u32,
    #[serde(default)]
    #[builder(default)]
    yearly: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            daily: 7,
            weekly: 4,
            monthly: 12,
            yearly: 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Granularity {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Granularity {
    pub const ALL: [Granularity; 4] = [
        Granularity::Daily,
        Granularity::Weekly,
        Granularity::Monthly,
        Granularity::Yearly,
    ];

    /// Midnight of the day, of the Monday on or before, of the 1st, or of January 1.
    pub fn period_start(&self, date_time: &NaiveDateTime) -> NaiveDateTime {
        let date = date_time.date();
        let days_into_period = match self {
            Granularity::Daily => 0,
            Granularity::Weekly => date.weekday().num_days_from_monday(),
            Granularity::Monthly => date.day0(),
            Granularity::Yearly => date.ordinal0(),
        };
        (date - Days::new(days_into_period.into())).and_time(NaiveTime::MIN)
    }

    fn count(&self, policy: &RetentionPolicy) -> u32 {
        match self {
            Granularity::Daily => policy.daily,
            Granularity::Weekly => policy.weekly,
            Granularity::Monthly => policy.monthly,
            Granularity::Yearly => policy.yearly,
        }
    }
}

/// An existing archive with the timestamp recovered from its file name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ArchiveFile {
    pub path: PathBuf,
    pub timestamp: NaiveDateTime,
}

/// The latest archive observed within one calendar period.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeriodAnchor {
    pub period_start: NaiveDateTime,
    pub archive: ArchiveFile,
}

/// Anchors of `granularity`, ascending by timestamp.
///
/// Within a period the later timestamp wins, equal timestamps fall back to the
/// greater path so the choice never depends on directory order.
pub fn anchors(candidates: &[ArchiveFile], granularity: Granularity) -> Vec<PeriodAnchor> {
    candidates
        .iter()
        .into_grouping_map_by(|a| granularity.period_start(&a.timestamp))
        .max_by(|_, a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.path.cmp(&b.path))
        })
        .into_iter()
        .map(|(period_start, archive)| PeriodAnchor {
            period_start,
            archive: archive.clone(),
        })
        .sorted_by(|a, b| a.archive.timestamp.cmp(&b.archive.timestamp))
        .collect()
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RetentionDecision {
    pub keep: BTreeSet<PathBuf>,
    pub delete: Vec<PathBuf>,
}

#[derive(Debug, Default)]
pub struct RetentionReport {
    pub kept: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
    /// Archives that should have been deleted but could not be.
    pub warnings: Vec<Error>,
}

impl RetentionPolicy {
    pub fn max_kept(&self) -> u64 {
        Granularity::ALL
            .iter()
            .map(|g| u64::from(g.count(self)))
            .sum()
    }

    /// Splits `candidates` into the archives to keep and the ones to delete.
    pub fn decide(&self, candidates: &[ArchiveFile]) -> RetentionDecision {
        let keep: BTreeSet<PathBuf> = Granularity::ALL
            .iter()
            .flat_map(|granularity| {
                let anchors = anchors(candidates, *granularity);
                let skip = anchors.len().saturating_sub(granularity.count(self) as usize);
                anchors.into_iter().skip(skip).map(|anchor| anchor.archive.path)
            })
            .collect();

        let delete = candidates
            .iter()
            .filter(|a| !keep.contains(&a.path))
            .map(|a| a.path.clone())
            .sorted()
            .collect();

        RetentionDecision { keep, delete }
    }

    /// Applies the policy to the archives of backup `name` found in `dir`.
    ///
    /// A missing directory is not an error. Failing to list `dir` is; failing to
    /// delete a single archive only adds a warning to the report.
    pub fn apply(&self, dir: &Path, name: &str, mask: &FilenameMask) -> Result<RetentionReport> {
        let candidates = find_archives(dir, name, mask)
            .add_msg(format!("Listing archives of {:?} in {:?} failed", name, dir))?;
        if candidates.is_empty() {
            tracing::debug!("No archives of {:?} in {:?}, nothing to prune", name, dir);
            return Ok(RetentionReport::default());
        }

        let decision = self.decide(&candidates);
        tracing::info!(
            "Retention for {:?}: {} candidate(s), keeping {}, deleting {}",
            name,
            candidates.len(),
            decision.keep.len(),
            decision.delete.len()
        );

        let (deleted, warnings) =
            delete_archives(decision.delete, |path| std::fs::remove_file(path));
        Ok(RetentionReport {
            kept: decision.keep.into_iter().collect(),
            deleted,
            warnings,
        })
    }
}

/// Lists the archives of backup `name` in `dir`.
///
/// Only non-directory entries whose name without its last extension starts with
/// `"{name}-"` and whose timestamp parses are returned. Everything else is left
/// out, so it is never deleted.
pub fn find_archives(dir: &Path, name: &str, mask: &FilenameMask) -> Result<Vec<ArchiveFile>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let prefix = format!("{}-", name);
    let mut archives = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry in {:?}: {}", dir, e);
                continue;
            }
        };
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(true) {
            continue;
        }
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        let stem = file_name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(file_name);
        if !stem.starts_with(&prefix) {
            continue;
        }
        match mask.parse_timestamp(name, file_name) {
            Some(timestamp) => archives.push(ArchiveFile {
                path: entry.path(),
                timestamp,
            }),
            None => tracing::trace!("Ignoring {:?}, no timestamp in its name", file_name),
        }
    }

    Ok(archives)
}

/// Removes every path with `remove`, collecting failures instead of stopping.
fn delete_archives<F>(to_delete: Vec<PathBuf>, mut remove: F) -> (Vec<PathBuf>, Vec<Error>)
where
    F: FnMut(&Path) -> std::io::Result<()>,
{
    let mut deleted = Vec::new();
    let mut warnings = Vec::new();
    for path in to_delete {
        match remove(&path) {
            Ok(()) => {
                tracing::info!("Removed old backup {:?}", path);
                deleted.push(path);
            }
            Err(e) => {
                tracing::warn!("Failed to remove old backup {:?}: {}", path, e);
                warnings.push(Error::from(e).add_msg(format!("Removing {:?} failed", path)));
            }
        }
    }
    (deleted, warnings)
}
