//! Distributed Signature Generation (DSG) module
//!
//! Loads the shares of the requested participants, runs one [`DsgParty`]
//! per participant through the orchestrator and returns the signature they
//! all agreed on.

mod dsg;
mod messages;

pub use dsg::DsgParty;
pub use messages::*;

use crate::mpc::{Completion, Orchestrator};
use crate::quorum::validate_signing_quorum;
use crate::store::ShareStore;
use crate::{Error, KeyShare, PeerContext, Result, RunConfig, Signature};
use sha2::{Digest, Sha256};
use tracing::{info, instrument};

/// Sign SHA-256 of `message` with the shares of `participants`
#[instrument(skip(config, store, message), fields(data = %store.dir().display()))]
pub async fn run_signing(
    config: &RunConfig,
    store: &ShareStore,
    message: &[u8],
    participants: &[usize],
) -> Result<Signature> {
    validate_signing_quorum(config.threshold, participants)?;

    let shares = store.load_all(participants)?;
    check_shares(config, &shares)?;

    info!(
        participants = ?participants,
        threshold = config.threshold,
        "Starting DSG"
    );

    let hash: [u8; 32] = Sha256::digest(message).into();
    let ctx = PeerContext::new(shares.iter().map(KeyShare::identity).collect())?;
    let engines = shares
        .iter()
        .map(|share| {
            let me = ctx
                .parties()
                .iter()
                .find(|p| p.key_share_id() == share.share_id)
                .cloned()
                .ok_or_else(|| Error::Internal(format!("no identity for share {}", share.share_id)))?;
            DsgParty::new(me, ctx.clone(), share, hash)
        })
        .collect::<Result<Vec<_>>>()?;

    let completions = Orchestrator::new(engines)?
        .with_deadline(config.deadline)
        .run(|_, _| Ok(()))
        .await
        .map_err(|err| match err {
            Error::Protocol { .. }
            | Error::UnknownRecipient { .. }
            | Error::Timeout(_)
            | Error::Internal(_) => {
                Error::SigningFailed(format!("no signature received: {}", err))
            }
            other => other,
        })?;

    let signature = assemble(completions)?;
    info!(signature = signature.to_hex(), "Signing successful");
    Ok(signature)
}

/// Shares from one key generation run, matching the configured threshold
fn check_shares(config: &RunConfig, shares: &[KeyShare]) -> Result<()> {
    let first = match shares.first() {
        Some(first) => first,
        None => return Ok(()),
    };

    for share in shares {
        if share.threshold != config.threshold {
            return Err(Error::InvalidConfig(format!(
                "Party {} was generated with threshold {}, configured {}",
                share.index, share.threshold, config.threshold
            )));
        }
        if share.public_key != first.public_key {
            return Err(Error::InvalidConfig(format!(
                "Party {} belongs to a different key than party {}",
                share.index, first.index
            )));
        }
    }
    Ok(())
}

/// Every party must have produced the same signature
fn assemble(completions: Vec<Completion<Signature>>) -> Result<Signature> {
    let mut completions = completions.into_iter();
    let first = completions
        .next()
        .ok_or_else(|| Error::SigningFailed("no signature received".into()))?;

    for other in completions {
        if other.output != first.output {
            return Err(Error::SigningFailed(format!(
                "parties {} and {} produced different signatures",
                first.party, other.party
            )));
        }
    }
    Ok(first.output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keygen::run_keygen;
    use crate::verify::{verify_signature, verify_with_key};
    use crate::PartyIdentity;

    async fn keygen(threshold: usize, parties: usize) -> (tempfile::TempDir, ShareStore, RunConfig) {
        let dir = tempfile::tempdir().unwrap();
        let store = ShareStore::new(dir.path());
        let config = RunConfig::new(threshold, parties);
        run_keygen(&config, &store).await.unwrap();
        (dir, store, config)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sign_and_verify() {
        let (_dir, store, config) = keygen(2, 5).await;

        let signature = run_signing(&config, &store, b"Hello", &[0, 1, 2]).await.unwrap();
        assert!(verify_signature(&store, b"Hello", &signature.to_hex()).unwrap());
        assert!(!verify_signature(&store, b"Hellp", &signature.to_hex()).unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_any_quorum_signs_for_the_same_key() {
        let (_dir, store, config) = keygen(2, 5).await;
        let public_key = store.load(0).unwrap().public_key;

        for participants in [&[1, 3, 4][..], &[0, 1, 2, 3][..]] {
            let signature = run_signing(&config, &store, b"quorum", participants)
                .await
                .unwrap();
            assert!(verify_with_key(&public_key, b"quorum", &signature).unwrap());
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rejects_small_quorum_before_loading() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShareStore::new(dir.path());

        // No shares exist, so reaching the store would fail differently
        let err = run_signing(&RunConfig::new(2, 5), &store, b"Hello", &[0, 1])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ThresholdNotMet { required: 3, actual: 2 }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_share() {
        let (_dir, store, config) = keygen(1, 3).await;
        std::fs::remove_file(store.path(2)).unwrap();

        let err = run_signing(&config, &store, b"Hello", &[0, 2]).await.unwrap_err();
        assert!(matches!(err, Error::PartyNotFound(2)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_failure_is_signing_failure() {
        let (_dir, store, config) = keygen(1, 3).await;
        let config = config.with_deadline(std::time::Duration::from_millis(1));

        match run_signing(&config, &store, b"Hello", &[0, 1, 2]).await {
            Err(Error::SigningFailed(reason)) => assert!(reason.contains("Timeout")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rejects_threshold_mismatch() {
        let (_dir, store, _) = keygen(1, 3).await;

        let err = run_signing(&RunConfig::new(2, 3), &store, b"Hello", &[0, 1, 2])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_assemble() {
        let party = |id: u64| PartyIdentity::new(id.to_string(), id);
        let sig = Signature::new([1; 32], [2; 32], 0);

        assert!(matches!(assemble(Vec::new()), Err(Error::SigningFailed(_))));

        let agreed = vec![
            Completion { party: party(1), output: sig.clone() },
            Completion { party: party(2), output: sig.clone() },
        ];
        assert_eq!(assemble(agreed).unwrap(), sig);

        let split = vec![
            Completion { party: party(1), output: sig.clone() },
            Completion { party: party(2), output: Signature::new([1; 32], [3; 32], 0) },
        ];
        assert!(matches!(assemble(split), Err(Error::SigningFailed(_))));
    }
}
