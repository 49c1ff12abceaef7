//! # rotabak
//!
//! A backup tool that captures directories or command output, packages them into
//! timestamped archives and prunes old archives with grandfather-father-son
//! retention.
//!
//! ## Features
//!
//! - **Captures**: Directory copies with glob exclusions, or the output file of a shell command
//! - **Compression**: gzip, zip, tar, tar.gz, tar.xz, or a plain copy
//! - **Retention**: Daily, weekly, monthly and yearly tiers recomputed from archive names
//! - **Hooks**: Global and per-backup shell hooks around each run
//!
//! ## Quick Start
//!
//! ```no_run
//! use rotabak::backup::backup_config::Config;
//! use rotabak::backup::orchestrator::RunOptions;
//!
//! // Load and validate configuration from YAML file
//! let config = Config::load("config.yml")?;
//!
//! // Run every configured backup once
//! let summary = config.run(&RunOptions::default())?;
//! assert!(summary.is_success());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;
