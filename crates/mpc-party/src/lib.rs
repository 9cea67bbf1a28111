//! Shared plumbing for the `mpc-keygen`, `mpc-sign` and `mpc-verify` tools

use clap::Args;
use mpc_core::{RunConfig, ShareStore};
use std::path::PathBuf;
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Errors raised while parsing command-line input
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Invalid party index {0:?}")]
    InvalidPartyIndex(String),

    #[error("No party indexes given")]
    NoParties,
}

/// Options every tool accepts
#[derive(Debug, Args)]
pub struct DataArgs {
    /// Directory holding config.json and the party files
    #[arg(short = 'd', long, env = "MPC_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,
}

impl DataArgs {
    /// Load the run configuration, writing defaults on first use
    pub fn config(&self) -> mpc_core::Result<RunConfig> {
        RunConfig::load_or_init(&self.data_dir)
    }

    pub fn store(&self) -> ShareStore {
        ShareStore::new(self.data_dir.clone())
    }
}

/// Initialize stderr logging, `RUST_LOG` overriding `default`
pub fn init_tracing(default: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default.to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Parse a comma-separated list of party indexes such as `0,1,2`
pub fn parse_party_indexes(input: &str) -> Result<Vec<usize>, CliError> {
    let indexes = input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().map_err(|_| CliError::InvalidPartyIndex(s.to_string())))
        .collect::<Result<Vec<usize>, _>>()?;

    if indexes.is_empty() {
        return Err(CliError::NoParties);
    }
    Ok(indexes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_party_indexes() {
        assert_eq!(parse_party_indexes("0,1,2,3").unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(parse_party_indexes(" 4, 2 ").unwrap(), vec![4, 2]);
        assert!(matches!(
            parse_party_indexes("0,x"),
            Err(CliError::InvalidPartyIndex(s)) if s == "x"
        ));
        assert!(matches!(parse_party_indexes("-1"), Err(CliError::InvalidPartyIndex(_))));
        assert!(matches!(parse_party_indexes(""), Err(CliError::NoParties)));
    }

    #[test]
    fn test_data_args_initializes_config() {
        let dir = tempfile::tempdir().unwrap();
        let args = DataArgs {
            data_dir: dir.path().join("data"),
        };

        let config = args.config().unwrap();
        assert_eq!(config.threshold, mpc_core::DEFAULT_THRESHOLD);
        assert_eq!(config.party_count, mpc_core::DEFAULT_PARTIES);
        assert_eq!(args.store().dir(), args.data_dir.as_path());
    }
}
