//! Persistence of per-party key shares
//!
//! One JSON file per party index under the data directory. Points are stored
//! curve-agnostic as SEC1 hex next to a curve tag; loading checks the tag and
//! binds every point field back to secp256k1 before the share is handed out.

use crate::types::{decode_point, decode_scalar, encode_point};
use crate::{Error, KeyShare, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tracing::debug;

/// Curve tag written into every share file
pub const CURVE_NAME: &str = "secp256k1";

/// Directory-backed share store
#[derive(Debug, Clone)]
pub struct ShareStore {
    dir: PathBuf,
}

impl ShareStore {
    /// Create a store rooted at `dir`; nothing is touched on disk until the first save
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the share for `index`
    pub fn path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("party_{}.json", index))
    }

    /// Write the share under its own index, replacing any previous file
    pub fn save(&self, share: &KeyShare) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let record = ShareFile::from(share);
        let json = serde_json::to_vec_pretty(&record)?;
        let path = self.path(share.index);
        fs::write(&path, json)?;

        debug!(index = share.index, path = %path.display(), "Saved party data");
        Ok(())
    }

    /// Read the share for `index` and rebind its curve points
    pub fn load(&self, index: usize) -> Result<KeyShare> {
        let bytes = match fs::read(self.path(index)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::PartyNotFound(index))
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let record: ShareFile = serde_json::from_slice(&bytes).map_err(|e| Error::CorruptData {
            index,
            reason: e.to_string(),
        })?;
        if record.index != index {
            return Err(Error::CorruptData {
                index,
                reason: format!("file records index {}", record.index),
            });
        }

        record.rehydrate().map_err(|e| Error::CorruptData {
            index,
            reason: e.to_string(),
        })
    }

    /// Load the shares of a participant set, in the given order
    pub fn load_all(&self, indexes: &[usize]) -> Result<Vec<KeyShare>> {
        indexes.iter().map(|index| self.load(*index)).collect()
    }
}

/// On-disk form of a [`KeyShare`]
#[derive(Debug, Serialize, Deserialize)]
struct ShareFile {
    index: usize,
    share_id: u64,
    threshold: usize,
    party_count: usize,
    curve: String,
    secret_share: String,
    public_key: String,
    public_shares: Vec<String>,
    share_ids: Vec<u64>,
}

impl From<&KeyShare> for ShareFile {
    fn from(share: &KeyShare) -> Self {
        Self {
            index: share.index,
            share_id: share.share_id,
            threshold: share.threshold,
            party_count: share.party_count,
            curve: CURVE_NAME.to_string(),
            secret_share: hex::encode(share.secret_share.to_bytes()),
            public_key: hex::encode(encode_point(&share.public_key)),
            public_shares: share
                .public_shares
                .iter()
                .map(|p| hex::encode(encode_point(p)))
                .collect(),
            share_ids: share.share_ids.clone(),
        }
    }
}

impl ShareFile {
    fn rehydrate(self) -> Result<KeyShare> {
        if self.curve != CURVE_NAME {
            return Err(Error::Deserialization(format!(
                "unsupported curve {}",
                self.curve
            )));
        }
        if self.public_shares.len() != self.share_ids.len() {
            return Err(Error::Deserialization(format!(
                "{} public shares for {} share IDs",
                self.public_shares.len(),
                self.share_ids.len()
            )));
        }
        if !self.share_ids.contains(&self.share_id) {
            return Err(Error::Deserialization(format!(
                "share ID {} missing from share ID list",
                self.share_id
            )));
        }

        let secret_share = decode_scalar(&decode_hex(&self.secret_share)?)?;
        let public_key = decode_point(&decode_hex(&self.public_key)?)?;
        let public_shares = self
            .public_shares
            .iter()
            .map(|p| decode_hex(p).and_then(|bytes| decode_point(&bytes)))
            .collect::<Result<Vec<_>>>()?;

        Ok(KeyShare {
            index: self.index,
            share_id: self.share_id,
            threshold: self.threshold,
            party_count: self.party_count,
            secret_share,
            public_key,
            public_shares,
            share_ids: self.share_ids,
        })
    }
}

fn decode_hex(s: &str) -> Result<Vec<u8>> {
    hex::decode(s).map_err(|e| Error::Deserialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::{elliptic_curve::Field, ProjectivePoint, Scalar};
    use rand::rngs::OsRng;

    fn sample_share(index: usize) -> KeyShare {
        let secret = Scalar::random(&mut OsRng);
        let share_ids = vec![1, 2, 3];
        let public_shares = share_ids
            .iter()
            .map(|_| ProjectivePoint::GENERATOR * Scalar::random(&mut OsRng))
            .collect();
        KeyShare {
            index,
            share_id: index as u64 + 1,
            threshold: 1,
            party_count: 3,
            secret_share: secret,
            public_key: ProjectivePoint::GENERATOR * Scalar::random(&mut OsRng),
            public_shares,
            share_ids,
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShareStore::new(dir.path().join("nested").join("data"));
        let share = sample_share(1);

        store.save(&share).unwrap();
        let loaded = store.load(1).unwrap();

        assert_eq!(loaded.index, 1);
        assert_eq!(loaded.share_id, 2);
        assert_eq!(loaded.secret_share, share.secret_share);
        assert_eq!(loaded.public_key, share.public_key);
        assert_eq!(loaded.public_shares, share.public_shares);
        assert_eq!(loaded.share_ids, share.share_ids);

        let identity = loaded.identity();
        assert_eq!(identity.moniker(), "2");
        assert_eq!(identity.key_share_id(), 2);
    }

    #[test]
    fn test_missing_party() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShareStore::new(dir.path());

        assert!(matches!(store.load(4), Err(Error::PartyNotFound(4))));
        assert_eq!(
            store.load(4).unwrap_err().to_string(),
            "Party data for index 4 not found"
        );
    }

    #[test]
    fn test_corrupt_point_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShareStore::new(dir.path());
        store.save(&sample_share(0)).unwrap();

        let path = store.path(0);
        let mut value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        value["public_shares"][2] = serde_json::Value::String(hex::encode([0x05u8; 33]));
        std::fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();

        assert!(matches!(
            store.load(0),
            Err(Error::CorruptData { index: 0, .. })
        ));
    }

    #[test]
    fn test_wrong_curve_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShareStore::new(dir.path());
        store.save(&sample_share(0)).unwrap();

        let path = store.path(0);
        let mut value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        value["curve"] = serde_json::Value::String("P-256".into());
        std::fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();

        assert!(matches!(store.load(0), Err(Error::CorruptData { .. })));
    }

    #[test]
    fn test_last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShareStore::new(dir.path());
        let first = sample_share(2);
        let second = sample_share(2);

        store.save(&first).unwrap();
        store.save(&second).unwrap();

        assert_eq!(store.load(2).unwrap().secret_share, second.secret_share);
    }
}
