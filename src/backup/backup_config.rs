use crate::backup::capture::command::CommandSource;
use crate::backup::capture::directory::{CustomDeserializedGlob, DirectorySource};
use crate::backup::capture::CaptureSource;
use crate::backup::compress::CompressionType;
use crate::backup::naming::FilenameMask;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddMsg;
use crate::backup::retention::RetentionPolicy;
use crate::backup::validate::{
    validate_dir_exist_or_created, validate_filename_mask, validate_relative_subdirectory,
    validate_valid_archive_base_name,
};
use bon::Builder;
use getset::Getters;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fs::File;
use std::path::{Path, PathBuf};
use validator::{Validate, ValidationError};

/// The whole configuration file: shared settings plus the ordered backups.
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = validate_backups))]
#[getset(get = "pub")]
pub struct Config {
    #[validate(nested)]
    global: GlobalConfig,
    #[serde(default)]
    #[builder(default)]
    #[validate(nested)]
    backups: Vec<BackupConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct GlobalConfig {
    #[validate(custom(function = validate_dir_exist_or_created))]
    #[builder(into)]
    backup_dir: PathBuf,
    #[serde(default)]
    #[builder(default, into)]
    #[validate(custom(function = validate_filename_mask))]
    filename_mask: FilenameMask,
    #[serde(default)]
    #[builder(default)]
    default_compression: CompressionType,
    #[serde(default)]
    #[builder(default)]
    #[validate(nested)]
    retention: RetentionPolicy,
    #[serde(default)]
    #[builder(default)]
    pre_hooks: Vec<String>,
    #[serde(default)]
    #[builder(default)]
    post_hooks: Vec<String>,
}

/// One named backup.
///
/// Exactly one capture mode is set: `source_dir` (with optional
/// `exclude_patterns`) or `command` with its `output_file`.
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = validate_capture_mode))]
#[getset(get = "pub")]
pub struct BackupConfig {
    #[validate(custom(function = validate_valid_archive_base_name))]
    #[builder(into)]
    name: String,
    #[builder(into)]
    source_dir: Option<PathBuf>,
    #[serde(default)]
    #[builder(default)]
    exclude_patterns: Vec<CustomDeserializedGlob>,
    #[builder(into)]
    command: Option<String>,
    #[builder(into)]
    output_file: Option<PathBuf>,
    #[serde(default)]
    #[builder(default, into)]
    #[validate(custom(function = validate_relative_subdirectory))]
    subdirectory: PathBuf,
    compression: Option<CompressionType>,
    #[validate(nested)]
    retention: Option<RetentionPolicy>,
    #[serde(default)]
    #[builder(default)]
    pre_hooks: Vec<String>,
    #[serde(default)]
    #[builder(default)]
    post_hooks: Vec<String>,
}

fn validate_backups(config: &Config) -> std::result::Result<(), ValidationError> {
    if let Some(name) = config.backups.iter().map(|b| &b.name).duplicates().next() {
        return Err(ValidationError::new("DuplicateBackupName")
            .with_message(format!("Backup name {:?} is used more than once", name).into()));
    }

    if let Some(backup) = config.backups.iter().find(|b| {
        b.source_dir.is_some() && !b.effective_compression(&config.global).accepts_directory()
    }) {
        return Err(ValidationError::new("InvalidCompression").with_message(
            format!(
                "Backup {:?} copies a directory, compression \"none\" only packages a single file",
                backup.name
            )
            .into(),
        ));
    }

    Ok(())
}

fn validate_capture_mode(backup: &BackupConfig) -> std::result::Result<(), ValidationError> {
    let message = match (&backup.source_dir, &backup.command, &backup.output_file) {
        (Some(_), None, None) | (None, Some(_), Some(_)) => None,
        (None, None, _) => Some("one of source_dir or command is required"),
        (Some(_), Some(_), _) => Some("source_dir and command are mutually exclusive"),
        (Some(_), None, Some(_)) => Some("output_file is only valid with command"),
        (None, Some(_), None) => Some("command requires output_file"),
    };
    if let Some(message) = message {
        return Err(ValidationError::new("InvalidCaptureMode")
            .with_message(format!("Backup {:?}: {}", backup.name, message).into()));
    }

    if backup.command.is_some() && !backup.exclude_patterns.is_empty() {
        return Err(ValidationError::new("InvalidCaptureMode").with_message(
            format!(
                "Backup {:?}: exclude_patterns is only valid with source_dir",
                backup.name
            )
            .into(),
        ));
    }

    Ok(())
}

impl Config {
    /// Reads and validates the YAML configuration at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
        let path = path.as_ref();
        let config: Config = File::open(path)
            .map_err(Error::from)
            .and_then(|f| serde_yml::from_reader(f).map_err(Error::from))
            .add_msg(format!("Parse YAML config failed: {:?}", path))?;
        config
            .validate()
            .map_err(Error::from)
            .add_msg(format!("Config validation failed: {:?}", path))?;
        Ok(config)
    }
}

impl BackupConfig {
    /// The capture mode selected by the configuration.
    pub fn capture_source(&self) -> Result<CaptureSource> {
        match (&self.source_dir, &self.command, &self.output_file) {
            (Some(src_dir), None, _) => Ok(DirectorySource::builder()
                .src_dir(src_dir.clone())
                .exclude(self.exclude_patterns.clone())
                .build()
                .into()),
            (None, Some(command), Some(output_file)) => Ok(CommandSource::builder()
                .command(command.clone())
                .output_file(output_file.clone())
                .build()
                .into()),
            _ => Err(Error::from(std::io::Error::other(format!(
                "backup {:?} has no single capture mode",
                self.name
            )))),
        }
    }

    pub fn effective_compression(&self, global: &GlobalConfig) -> CompressionType {
        self.compression.unwrap_or(global.default_compression)
    }

    pub fn effective_retention(&self, global: &GlobalConfig) -> RetentionPolicy {
        self.retention.unwrap_or(global.retention)
    }

    /// Directory holding this backup's archives.
    pub fn destination_dir(&self, global: &GlobalConfig) -> PathBuf {
        global.backup_dir.join(&self.subdirectory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(yaml: &str) -> Config {
        serde_yml::from_str(yaml).unwrap()
    }

    fn config_yaml(backup_dir: &Path, backups: &str) -> String {
        format!("global:\n  backup_dir: {:?}\nbackups:\n{}", backup_dir, backups)
    }

    #[test]
    fn test_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = parse(&config_yaml(
            temp_dir.path(),
            "  - name: web\n    source_dir: /srv/www\n",
        ));

        assert!(config.validate().is_ok());
        let global = config.global();
        assert_eq!(global.filename_mask(), &FilenameMask::default());
        assert_eq!(*global.default_compression(), CompressionType::TarGz);
        assert_eq!(*global.retention(), RetentionPolicy::default());

        let backup = &config.backups()[0];
        assert_eq!(backup.effective_compression(global), CompressionType::TarGz);
        assert_eq!(backup.effective_retention(global), RetentionPolicy::default());
        assert_eq!(backup.destination_dir(global), temp_dir.path());
    }

    #[test]
    fn test_per_backup_overrides() {
        let temp_dir = TempDir::new().unwrap();
        let config = parse(&config_yaml(
            temp_dir.path(),
            concat!(
                "  - name: db\n",
                "    command: pg_dump -f /tmp/db.sql\n",
                "    output_file: /tmp/db.sql\n",
                "    subdirectory: postgres\n",
                "    compression: gzip\n",
                "    retention:\n",
                "      daily: 3\n",
            ),
        ));

        assert!(config.validate().is_ok());
        let global = config.global();
        let backup = &config.backups()[0];
        assert_eq!(backup.effective_compression(global), CompressionType::Gzip);
        assert_eq!(
            backup.effective_retention(global),
            RetentionPolicy::builder().daily(3).build()
        );
        assert_eq!(
            backup.destination_dir(global),
            temp_dir.path().join("postgres")
        );
        assert!(matches!(
            backup.capture_source().unwrap(),
            CaptureSource::Command(_)
        ));
    }

    #[test]
    fn test_exclude_patterns_become_directory_capture() {
        let temp_dir = TempDir::new().unwrap();
        let config = parse(&config_yaml(
            temp_dir.path(),
            "  - name: web\n    source_dir: /srv/www\n    exclude_patterns: ['**/*.log', cache]\n",
        ));

        match config.backups()[0].capture_source().unwrap() {
            CaptureSource::Directory(d) => {
                assert_eq!(d.src_dir(), Path::new("/srv/www"));
                assert_eq!(d.exclude().len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_compression_rejected_at_load() {
        let temp_dir = TempDir::new().unwrap();
        let yaml = config_yaml(
            temp_dir.path(),
            "  - name: web\n    source_dir: /srv/www\n    compression: rar\n",
        );
        let err = serde_yml::from_str::<Config>(&yaml).unwrap_err();
        assert!(err.to_string().contains("rar"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let yaml = config_yaml(
            temp_dir.path(),
            "  - name: web\n    source_dir: /srv/www\n    excludes: []\n",
        );
        assert!(serde_yml::from_str::<Config>(&yaml).is_err());
    }

    #[test]
    fn test_negative_retention_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let yaml = format!(
            "global:\n  backup_dir: {:?}\n  retention:\n    daily: -1\n",
            temp_dir.path()
        );
        assert!(serde_yml::from_str::<Config>(&yaml).is_err());
    }

    #[test]
    fn test_capture_mode_validation() {
        let temp_dir = TempDir::new().unwrap();
        for backups in [
            "  - name: none\n",
            "  - name: both\n    source_dir: /srv\n    command: 'true'\n    output_file: /tmp/x\n",
            "  - name: no-output\n    command: 'true'\n",
            "  - name: stray-output\n    source_dir: /srv\n    output_file: /tmp/x\n",
            "  - name: stray-exclude\n    command: 'true'\n    output_file: /tmp/x\n    exclude_patterns: ['*']\n",
        ] {
            let config = parse(&config_yaml(temp_dir.path(), backups));
            assert!(config.validate().is_err(), "{backups}");
        }
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config = parse(&config_yaml(
            temp_dir.path(),
            "  - name: web\n    source_dir: /a\n  - name: web\n    source_dir: /b\n",
        ));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_none_compression_rejected_for_directory() {
        let temp_dir = TempDir::new().unwrap();
        let config = parse(&config_yaml(
            temp_dir.path(),
            "  - name: web\n    source_dir: /a\n    compression: none\n",
        ));
        assert!(config.validate().is_err());

        let config = parse(&config_yaml(
            temp_dir.path(),
            "  - name: db\n    command: 'true'\n    output_file: /tmp/x\n    compression: none\n",
        ));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_name_and_mask_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config = parse(&config_yaml(
            temp_dir.path(),
            "  - name: 'a/b'\n    source_dir: /a\n",
        ));
        assert!(config.validate().is_err());

        let yaml = format!(
            "global:\n  backup_dir: {:?}\n  filename_mask: '%Y-%name%'\n",
            temp_dir.path()
        );
        assert!(parse(&yaml).validate().is_err());
    }

    #[test]
    fn test_subdirectory_must_stay_inside_backup_dir() {
        let temp_dir = TempDir::new().unwrap();
        let config = parse(&config_yaml(
            temp_dir.path(),
            "  - name: web\n    source_dir: /a\n    subdirectory: ../elsewhere\n",
        ));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_creates_backup_dir() {
        let temp_dir = TempDir::new().unwrap();
        let backup_dir = temp_dir.path().join("archives");
        let path = temp_dir.path().join("config.yml");
        std::fs::write(
            &path,
            config_yaml(&backup_dir, "  - name: web\n    source_dir: /srv/www\n"),
        )
        .unwrap();

        let config = Config::load(&path).unwrap();

        assert_eq!(config.backups().len(), 1);
        assert!(backup_dir.is_dir());
    }

    #[test]
    fn test_load_reports_path_on_failure() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.yml");
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("missing.yml"));
    }
}
