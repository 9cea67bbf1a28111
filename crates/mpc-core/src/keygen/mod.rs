//! Distributed Key Generation (DKG) module
//!
//! Runs one [`DkgParty`] per configured party through the orchestrator,
//! persists each share as it arrives and reads party 0's share back to
//! report the group public key.

mod dkg;
mod messages;

pub use dkg::DkgParty;
pub use messages::*;

use crate::config::PersistencePolicy;
use crate::mpc::Orchestrator;
use crate::quorum::validate_keygen_quorum;
use crate::store::ShareStore;
use crate::types::{x_coordinate, y_coordinate};
use crate::{Error, PartyIdentity, PeerContext, Result, RunConfig};
use tracing::{info, instrument, warn};

/// Outcome of a key generation run
#[derive(Debug, Clone)]
pub struct KeygenReport {
    /// Group public key (compressed SEC1)
    pub public_key: Vec<u8>,
    /// Affine x coordinate of the group key
    pub x: [u8; 32],
    /// Affine y coordinate of the group key
    pub y: [u8; 32],
    /// Indexes whose share could not be saved (best-effort policy only)
    pub unsaved: Vec<usize>,
}

impl KeygenReport {
    pub fn public_key_hex(&self) -> String {
        hex::encode(&self.public_key)
    }
}

/// Run distributed key generation for `config.party_count` parties
#[instrument(skip(store), fields(data = %store.dir().display()))]
pub async fn run_keygen(config: &RunConfig, store: &ShareStore) -> Result<KeygenReport> {
    validate_keygen_quorum(config.threshold, config.party_count)?;

    info!(
        n_parties = config.party_count,
        threshold = config.threshold,
        "Starting DKG"
    );

    let ctx = PeerContext::new(PartyIdentity::enumerate(config.party_count))?;
    let engines = ctx
        .parties()
        .iter()
        .map(|me| DkgParty::new(me.clone(), ctx.clone(), config.threshold))
        .collect::<Result<Vec<_>>>()?;

    let mut orchestrator = Orchestrator::new(engines)?.with_deadline(config.deadline);
    let mut unsaved = Vec::new();

    orchestrator
        .run(|party, share| match store.save(share) {
            Ok(()) => {
                info!(index = share.index, "Saved data for party");
                Ok(())
            }
            Err(err) if config.persistence == PersistencePolicy::BestEffort => {
                warn!(party = %party, index = share.index, error = %err, "Failed to save party data");
                unsaved.push(share.index);
                Ok(())
            }
            Err(err) => Err(err),
        })
        .await?;

    info!("Key generation successful");

    // Read back the lowest party whose data was saved
    let index = (0..config.party_count)
        .find(|index| !unsaved.contains(index))
        .ok_or_else(|| Error::SaveFailed {
            indexes: unsaved.clone(),
            reason: "no party data could be saved".into(),
        })?;
    let first = store.load(index).map_err(|err| match err {
        Error::PartyNotFound(_) | Error::CorruptData { .. } => Error::Internal(format!(
            "failed to read data for party {} after saving: {}",
            index, err
        )),
        other => other,
    })?;

    let report = KeygenReport {
        public_key: first.public_key_bytes(),
        x: x_coordinate(&first.public_key)?,
        y: y_coordinate(&first.public_key)?,
        unsaved,
    };
    info!(public_key = report.public_key_hex(), "Generated public key");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_keygen_shares_agree_on_public_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShareStore::new(dir.path());
        let config = RunConfig::new(2, 5);

        let report = run_keygen(&config, &store).await.unwrap();
        assert!(report.unsaved.is_empty());

        let shares = store.load_all(&[0, 1, 2, 3, 4]).unwrap();
        for (index, share) in shares.iter().enumerate() {
            assert_eq!(share.index, index);
            assert_eq!(share.share_id, index as u64 + 1);
            assert_eq!(share.threshold, 2);
            assert_eq!(share.party_count, 5);
            assert_eq!(share.public_key_bytes(), report.public_key);
            assert_eq!(share.public_shares, shares[0].public_shares);
        }
        assert_eq!(x_coordinate(&shares[3].public_key).unwrap(), report.x);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_keygen_rejects_bad_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShareStore::new(dir.path());

        let err = run_keygen(&RunConfig::new(3, 3), &store).await.unwrap_err();
        assert!(matches!(err, Error::ThresholdNotMet { required: 4, actual: 3 }));
        assert!(!store.path(0).exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_keygen_reads_back_first_saved_party() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShareStore::new(dir.path());
        std::fs::create_dir_all(store.path(0)).unwrap();

        let report = run_keygen(&RunConfig::new(1, 3), &store).await.unwrap();
        assert_eq!(report.unsaved, vec![0]);
        assert_eq!(store.load(1).unwrap().public_key_bytes(), report.public_key);
        assert_eq!(store.load(2).unwrap().public_key_bytes(), report.public_key);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_keygen_fails_when_nothing_saved() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShareStore::new(dir.path());
        for index in 0..3 {
            std::fs::create_dir_all(store.path(index)).unwrap();
        }

        match run_keygen(&RunConfig::new(1, 3), &store).await {
            Err(Error::SaveFailed { mut indexes, .. }) => {
                indexes.sort();
                assert_eq!(indexes, vec![0, 1, 2]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_keygen_save_failure_policies() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShareStore::new(dir.path());
        // A directory where party 2's file should go makes only that save fail
        std::fs::create_dir_all(store.path(2)).unwrap();

        let strict = RunConfig::new(1, 3).with_persistence(PersistencePolicy::Strict);
        assert!(matches!(run_keygen(&strict, &store).await, Err(Error::Io(_))));

        let report = run_keygen(&RunConfig::new(1, 3), &store).await.unwrap();
        assert_eq!(report.unsaved, vec![2]);
        assert_eq!(store.load(1).unwrap().public_key_bytes(), report.public_key);
    }
}
