//! Validation functions for configuration values.
//!
//! Provides custom validation functions for backup names, directories and
//! filename masks.

use crate::backup::compress::CompressionType;
use crate::backup::naming::{FilenameMask, NAME_TOKEN};
use chrono::NaiveDate;
use sanitize_filename::{is_sanitized, sanitize};
use validator::ValidationError;

use std::path::{Component, Path};

static SAMPLE_NAME: &str = "backup";

pub fn validate_valid_archive_base_name<S: AsRef<str>>(name: S) -> Result<(), ValidationError> {
    let name = name.as_ref();
    if name.is_empty() {
        return Err(ValidationError::new("InvalidArchiveBaseName")
            .with_message("Backup name must not be empty".into()));
    }

    if !is_sanitized(name) {
        return Err(ValidationError::new("InvalidArchiveBaseName").with_message(
            format!(
                "Invalid file name, try sanitizing like {:?}",
                sanitize(name)
            )
            .into(),
        ));
    }

    Ok(())
}

pub fn validate_dir_exist_or_created<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    if dir.exists() {
        if !dir.is_dir() {
            return Err(ValidationError::new("InvalidDirectory")
                .with_message(format!("{:?} is not a directory", dir).into()));
        }
    } else {
        return std::fs::create_dir_all(dir).map_err(|e| {
            ValidationError::new("InvalidDirectory").with_message(
                format!("cannot create or access backup_dir path {:?}: {}", dir, e).into(),
            )
        });
    }

    Ok(())
}

/// A subdirectory must stay below `backup_dir`: relative, without `..`.
pub fn validate_relative_subdirectory<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    if dir
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
    {
        Ok(())
    } else {
        Err(ValidationError::new("InvalidSubdirectory").with_message(
            format!("{:?} must be a relative path without '..'", dir).into(),
        ))
    }
}

/// The mask must start with `%name%-`, name the backup exactly once and only use
/// strftime items the formatter understands. The rendered file name must parse
/// back to a timestamp, otherwise retention would never see the archives.
pub fn validate_filename_mask(mask: &FilenameMask) -> Result<(), ValidationError> {
    let s = mask.as_str();
    if !s.starts_with(&format!("{}-", NAME_TOKEN)) || s.matches(NAME_TOKEN).count() != 1 {
        return Err(ValidationError::new("InvalidFilenameMask").with_message(
            format!("{:?} must start with \"{}-\" and contain it once", s, NAME_TOKEN).into(),
        ));
    }

    if !mask.has_valid_date_pattern() {
        return Err(ValidationError::new("InvalidFilenameMask")
            .with_message(format!("{:?} contains an invalid date pattern", s).into()));
    }

    let sample = NaiveDate::from_ymd_opt(2024, 3, 5)
        .and_then(|d| d.and_hms_opt(7, 8, 9))
        .unwrap_or_default();
    let file_name = mask.file_name(SAMPLE_NAME, &sample, CompressionType::default());
    if mask.parse_timestamp(SAMPLE_NAME, &file_name).is_none() {
        return Err(ValidationError::new("InvalidFilenameMask").with_message(
            format!(
                "{:?} renders {:?}, which has no date to read back; include at least year, month and day",
                s, file_name
            )
            .into(),
        ));
    }

    Ok(())
}
