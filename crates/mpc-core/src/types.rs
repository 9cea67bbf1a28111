//! Core types shared by the registry, orchestrator and protocol engines

use crate::{Error, Result};
use k256::{
    ecdsa,
    elliptic_curve::{sec1::FromEncodedPoint, sec1::ToEncodedPoint, PrimeField},
    AffinePoint, ProjectivePoint, Scalar,
};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Identity of one participant within a run
///
/// `index` is assigned by [`PeerContext::new`] and is 1-based and dense.
/// An identity that has not been registered yet carries index 0.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartyIdentity {
    index: usize,
    moniker: String,
    key_share_id: u64,
}

impl PartyIdentity {
    /// Create an unregistered identity
    pub fn new(moniker: impl Into<String>, key_share_id: u64) -> Self {
        Self {
            index: 0,
            moniker: moniker.into(),
            key_share_id,
        }
    }

    /// Fresh identities for a key generation run: monikers `"0".."n-1"`,
    /// key share IDs `1..=n`
    pub fn enumerate(count: usize) -> Vec<PartyIdentity> {
        (0..count)
            .map(|i| PartyIdentity::new(i.to_string(), i as u64 + 1))
            .collect()
    }

    /// 1-based position in the peer context
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn moniker(&self) -> &str {
        &self.moniker
    }

    /// The evaluation point of this party's secret share
    pub fn key_share_id(&self) -> u64 {
        self.key_share_id
    }
}

impl fmt::Display for PartyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{},{}}}", self.index, self.moniker)
    }
}

/// The ordered set of identities visible to every engine in a run
///
/// Cloning shares the same underlying instance.
#[derive(Debug, Clone)]
pub struct PeerContext {
    parties: Arc<Vec<PartyIdentity>>,
}

impl PeerContext {
    /// Sort identities by key share ID and assign dense 1-based indices
    pub fn new(mut parties: Vec<PartyIdentity>) -> Result<Self> {
        if parties.is_empty() {
            return Err(Error::InvalidConfig("Peer context is empty".into()));
        }
        parties.sort_by_key(|p| p.key_share_id);

        for pair in parties.windows(2) {
            if pair[0].key_share_id == pair[1].key_share_id {
                return Err(Error::InvalidConfig(format!(
                    "Duplicate key share ID {}",
                    pair[0].key_share_id
                )));
            }
        }
        if parties[0].key_share_id == 0 {
            return Err(Error::InvalidConfig(
                "Key share ID 0 is reserved".into(),
            ));
        }

        for (position, party) in parties.iter_mut().enumerate() {
            party.index = position + 1;
        }

        Ok(Self {
            parties: Arc::new(parties),
        })
    }

    pub fn parties(&self) -> &[PartyIdentity] {
        &self.parties
    }

    pub fn len(&self) -> usize {
        self.parties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parties.is_empty()
    }

    /// Look up a registered identity by 1-based index
    pub fn get(&self, index: usize) -> Option<&PartyIdentity> {
        index.checked_sub(1).and_then(|i| self.parties.get(i))
    }

    pub fn contains(&self, party: &PartyIdentity) -> bool {
        self.get(party.index).map_or(false, |p| p == party)
    }

    /// All parties except `me`
    pub fn others<'a>(&'a self, me: &'a PartyIdentity) -> impl Iterator<Item = &'a PartyIdentity> {
        self.parties.iter().filter(move |p| *p != me)
    }

    /// Whether two contexts are the same instance
    pub fn same_instance(&self, other: &PeerContext) -> bool {
        Arc::ptr_eq(&self.parties, &other.parties)
    }

    /// Check that indices are dense and monotonic starting at 1
    pub fn validate(&self) -> Result<()> {
        for (position, party) in self.parties.iter().enumerate() {
            if party.index != position + 1 {
                return Err(Error::InvalidConfig(format!(
                    "Party {} has index {}, expected {}",
                    party.moniker,
                    party.index,
                    position + 1
                )));
            }
        }
        Ok(())
    }
}

/// Message types exchanged between local protocol engines
#[derive(Debug, Clone)]
pub enum ProtocolMessage {
    /// Delivered to every participant except the sender
    Broadcast {
        from: PartyIdentity,
        round: u32,
        payload: Vec<u8>,
    },
    /// Delivered to exactly one participant
    Direct {
        from: PartyIdentity,
        to: PartyIdentity,
        round: u32,
        payload: Vec<u8>,
    },
}

impl ProtocolMessage {
    /// Get the sender of this message
    pub fn sender(&self) -> &PartyIdentity {
        match self {
            ProtocolMessage::Broadcast { from, .. } => from,
            ProtocolMessage::Direct { from, .. } => from,
        }
    }

    /// Get the addressee, `None` for broadcasts
    pub fn recipient(&self) -> Option<&PartyIdentity> {
        match self {
            ProtocolMessage::Broadcast { .. } => None,
            ProtocolMessage::Direct { to, .. } => Some(to),
        }
    }

    /// Get the round number
    pub fn round(&self) -> u32 {
        match self {
            ProtocolMessage::Broadcast { round, .. } => *round,
            ProtocolMessage::Direct { round, .. } => *round,
        }
    }

    pub fn payload(&self) -> &[u8] {
        match self {
            ProtocolMessage::Broadcast { payload, .. } => payload,
            ProtocolMessage::Direct { payload, .. } => payload,
        }
    }
}

/// ECDSA signature (r, s)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// R component
    pub r: [u8; 32],
    /// S component
    pub s: [u8; 32],
    /// Recovery ID (0 or 1)
    pub recovery_id: u8,
}

impl Signature {
    /// Create a new signature
    pub fn new(r: [u8; 32], s: [u8; 32], recovery_id: u8) -> Self {
        Self { r, s, recovery_id }
    }

    /// Convert to bytes (r || s)
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&self.r);
        bytes[32..].copy_from_slice(&self.s);
        bytes
    }

    /// Hex of `r || s`
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Parse hex of `r || s`
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let bytes = hex::decode(encoded.trim()).map_err(|_| Error::InvalidSignature)?;
        if bytes.len() != 64 {
            return Err(Error::InvalidSignature);
        }

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Ok(Self::new(r, s, 0))
    }

    /// Convert to DER format
    pub fn to_der(&self) -> Result<Vec<u8>> {
        Ok(self.to_ecdsa()?.to_der().as_bytes().to_vec())
    }

    pub(crate) fn to_ecdsa(&self) -> Result<ecdsa::Signature> {
        ecdsa::Signature::from_scalars(
            *k256::FieldBytes::from_slice(&self.r),
            *k256::FieldBytes::from_slice(&self.s),
        )
        .map_err(|_| Error::InvalidSignature)
    }
}

/// Key share held by a party after key generation, with all curve points bound
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyShare {
    /// Storage index (0-based)
    pub index: usize,

    /// Evaluation point of this share
    pub share_id: u64,

    /// Threshold
    pub threshold: usize,

    /// Total number of parties
    pub party_count: usize,

    /// This party's secret share (x_i)
    pub secret_share: Scalar,

    /// Group public key
    #[zeroize(skip)]
    pub public_key: ProjectivePoint,

    /// Public shares `x_j * G` of all parties, ordered like `share_ids`
    #[zeroize(skip)]
    pub public_shares: Vec<ProjectivePoint>,

    /// Key share IDs of all parties from the key generation run
    pub share_ids: Vec<u64>,
}

impl KeyShare {
    /// Identity regenerated from the share: moniker is the share ID
    pub fn identity(&self) -> PartyIdentity {
        PartyIdentity::new(self.share_id.to_string(), self.share_id)
    }

    /// Compressed SEC1 encoding of the group public key
    pub fn public_key_bytes(&self) -> Vec<u8> {
        encode_point(&self.public_key)
    }

    /// Public share registered for a key share ID
    pub fn public_share_of(&self, share_id: u64) -> Option<&ProjectivePoint> {
        self.share_ids
            .iter()
            .position(|id| *id == share_id)
            .and_then(|pos| self.public_shares.get(pos))
    }
}

impl fmt::Debug for KeyShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyShare")
            .field("index", &self.index)
            .field("share_id", &self.share_id)
            .field("threshold", &self.threshold)
            .field("party_count", &self.party_count)
            .field("public_key", &hex::encode(self.public_key_bytes()))
            .finish_non_exhaustive()
    }
}

/// Compressed SEC1 encoding of a point
pub(crate) fn encode_point(point: &ProjectivePoint) -> Vec<u8> {
    point.to_affine().to_encoded_point(true).as_bytes().to_vec()
}

/// Decode a SEC1 point, checking it lies on secp256k1
pub(crate) fn decode_point(bytes: &[u8]) -> Result<ProjectivePoint> {
    let encoded = k256::EncodedPoint::from_bytes(bytes)
        .map_err(|e| Error::Deserialization(e.to_string()))?;
    let affine: AffinePoint = Option::from(AffinePoint::from_encoded_point(&encoded))
        .ok_or_else(|| Error::Deserialization("Point is not on secp256k1".into()))?;
    Ok(ProjectivePoint::from(affine))
}

/// Decode a canonical big-endian scalar
pub(crate) fn decode_scalar(bytes: &[u8]) -> Result<Scalar> {
    if bytes.len() != 32 {
        return Err(Error::Deserialization(format!(
            "Invalid scalar length {}",
            bytes.len()
        )));
    }
    Option::from(Scalar::from_repr(*k256::FieldBytes::from_slice(bytes)))
        .ok_or_else(|| Error::Deserialization("Scalar out of range".into()))
}

/// Affine x coordinate of a point as big-endian bytes
pub(crate) fn x_coordinate(point: &ProjectivePoint) -> Result<[u8; 32]> {
    Ok(affine_coordinates(point)?.0)
}

/// Affine y coordinate of a point as big-endian bytes
pub(crate) fn y_coordinate(point: &ProjectivePoint) -> Result<[u8; 32]> {
    Ok(affine_coordinates(point)?.1)
}

fn affine_coordinates(point: &ProjectivePoint) -> Result<([u8; 32], [u8; 32])> {
    let encoded = point.to_affine().to_encoded_point(false);
    match (encoded.x(), encoded.y()) {
        (Some(x), Some(y)) => {
            let mut out = ([0u8; 32], [0u8; 32]);
            out.0.copy_from_slice(x);
            out.1.copy_from_slice(y);
            Ok(out)
        }
        _ => Err(Error::Crypto("Point at infinity has no coordinates".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_context_assigns_dense_indices() {
        let ctx = PeerContext::new(vec![
            PartyIdentity::new("5", 5),
            PartyIdentity::new("1", 1),
            PartyIdentity::new("3", 3),
        ])
        .unwrap();

        let ids: Vec<_> = ctx.parties().iter().map(|p| (p.index(), p.key_share_id())).collect();
        assert_eq!(ids, vec![(1, 1), (2, 3), (3, 5)]);
        ctx.validate().unwrap();
        assert_eq!(ctx.get(2).unwrap().moniker(), "3");
        assert!(ctx.get(0).is_none());
    }

    #[test]
    fn test_peer_context_rejects_duplicates_and_zero() {
        assert!(PeerContext::new(vec![
            PartyIdentity::new("a", 2),
            PartyIdentity::new("b", 2),
        ])
        .is_err());
        assert!(PeerContext::new(vec![PartyIdentity::new("a", 0)]).is_err());
        assert!(PeerContext::new(vec![]).is_err());
    }

    #[test]
    fn test_unregistered_identity_not_in_context() {
        let ctx = PeerContext::new(PartyIdentity::enumerate(3)).unwrap();
        let stranger = PartyIdentity::new("9", 9);
        assert!(!ctx.contains(&stranger));
        assert!(ctx.contains(&ctx.parties()[0].clone()));
        assert_eq!(ctx.others(&ctx.parties()[0]).count(), 2);
    }

    #[test]
    fn test_signature_hex_layout() {
        let sig = Signature::new([0xab; 32], [0x01; 32], 0);
        let hex = sig.to_hex();
        assert_eq!(hex.len(), 128);
        assert!(hex.starts_with("abab"));
        assert!(hex.ends_with("0101"));

        let der = sig.to_der().unwrap();
        assert_eq!(der[0], 0x30);
        assert!(matches!(
            Signature::new([0; 32], [1; 32], 0).to_der(),
            Err(Error::InvalidSignature)
        ));

        let parsed = Signature::from_hex(&hex).unwrap();
        assert_eq!((parsed.r, parsed.s), (sig.r, sig.s));
        assert!(matches!(Signature::from_hex("abcd"), Err(Error::InvalidSignature)));
        assert!(matches!(Signature::from_hex("zz"), Err(Error::InvalidSignature)));
    }

    #[test]
    fn test_point_encoding() {
        let point = ProjectivePoint::GENERATOR * Scalar::from(7u64);
        let bytes = encode_point(&point);
        assert_eq!(bytes.len(), 33);
        assert_eq!(decode_point(&bytes).unwrap(), point);
        assert!(decode_point(&[0x05; 33]).is_err());
    }

    #[test]
    fn test_affine_coordinates() {
        let g = ProjectivePoint::GENERATOR;
        assert_eq!(
            hex::encode(x_coordinate(&g).unwrap()),
            "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"
        );
        assert_eq!(
            hex::encode(y_coordinate(&g).unwrap()),
            "483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8"
        );

        let identity = ProjectivePoint::IDENTITY;
        assert!(matches!(x_coordinate(&identity), Err(Error::Crypto(_))));
        assert!(matches!(y_coordinate(&identity), Err(Error::Crypto(_))));
    }
}
