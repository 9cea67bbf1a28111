//! Run configuration
//!
//! The on-disk form is `config.json` inside the data directory:
//! `{"Threshold": 2, "PartyCount": 5}`. A missing file is created with the
//! defaults.

use crate::{Error, Result, DEFAULT_PARTIES, DEFAULT_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::{fs, io, path::Path, time::Duration};
use tracing::info;

/// Name of the configuration file inside the data directory
pub const CONFIG_FILE: &str = "config.json";

/// What to do when persisting one party's share fails during key generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistencePolicy {
    /// Log the failure, keep the run going and report the unsaved index
    #[default]
    BestEffort,
    /// Fail the whole run
    Strict,
}

/// Configuration for key generation and signing runs
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Threshold (threshold + 1 parties sign)
    pub threshold: usize,

    /// Number of parties taking part in key generation
    pub party_count: usize,

    /// Upper bound on a single run, `None` waits forever
    pub deadline: Option<Duration>,

    /// Save failure handling for key generation
    pub persistence: PersistencePolicy,
}

impl RunConfig {
    pub fn new(threshold: usize, party_count: usize) -> Self {
        Self {
            threshold,
            party_count,
            deadline: None,
            persistence: PersistencePolicy::default(),
        }
    }

    /// Set a run deadline
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set the save failure policy
    pub fn with_persistence(mut self, persistence: PersistencePolicy) -> Self {
        self.persistence = persistence;
        self
    }

    /// Read `config.json` from `data_dir`, writing the defaults if it does not exist
    pub fn load_or_init(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);

        let file = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<ConfigFile>(&bytes).map_err(|e| {
                Error::Config(format!("failed to parse {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Config file not found, creating default");
                let defaults = ConfigFile::default();
                fs::create_dir_all(data_dir).map_err(|e| {
                    Error::Config(format!("failed to create data directory: {}", e))
                })?;
                let json = serde_json::to_vec_pretty(&defaults)?;
                fs::write(&path, json).map_err(|e| {
                    Error::Config(format!("failed to write default config file: {}", e))
                })?;
                defaults
            }
            Err(e) => {
                return Err(Error::Config(format!(
                    "failed to open {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        Ok(RunConfig::new(file.threshold, file.party_count))
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_PARTIES)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConfigFile {
    threshold: usize,
    party_count: usize,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            party_count: DEFAULT_PARTIES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creates_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");

        let config = RunConfig::load_or_init(&data_dir).unwrap();
        assert_eq!(config.threshold, 2);
        assert_eq!(config.party_count, 5);

        let written = std::fs::read_to_string(data_dir.join(CONFIG_FILE)).unwrap();
        assert!(written.contains("\"Threshold\": 2"));
        assert!(written.contains("\"PartyCount\": 5"));
    }

    #[test]
    fn test_reads_existing_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"Threshold": 1, "PartyCount": 3}"#,
        )
        .unwrap();

        let config = RunConfig::load_or_init(dir.path()).unwrap();
        assert_eq!(config.threshold, 1);
        assert_eq!(config.party_count, 3);
        assert_eq!(config.persistence, PersistencePolicy::BestEffort);
        assert!(config.deadline.is_none());
    }

    #[test]
    fn test_malformed_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{not json").unwrap();

        assert!(matches!(
            RunConfig::load_or_init(dir.path()),
            Err(Error::Config(_))
        ));
    }
}
