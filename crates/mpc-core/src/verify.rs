//! Standard ECDSA verification against the persisted group key

use crate::store::ShareStore;
use crate::{Error, Result, Signature};
use k256::{
    ecdsa::{signature::hazmat::PrehashVerifier, VerifyingKey},
    ProjectivePoint,
};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

/// Verify a hex `r || s` signature over `message` with party 0's group key
///
/// A well-formed signature that does not verify yields `Ok(false)`.
#[instrument(skip(store, message, signature_hex), fields(data = %store.dir().display()))]
pub fn verify_signature(store: &ShareStore, message: &[u8], signature_hex: &str) -> Result<bool> {
    let signature = Signature::from_hex(signature_hex)?;
    let share = store.load(0)?;
    verify_with_key(&share.public_key, message, &signature)
}

/// Verify a signature over SHA-256 of `message`
pub fn verify_with_key(
    public_key: &ProjectivePoint,
    message: &[u8],
    signature: &Signature,
) -> Result<bool> {
    let hash: [u8; 32] = Sha256::digest(message).into();
    verify_prehash(public_key, &hash, signature)
}

/// Verify a signature over an already hashed message
pub fn verify_prehash(
    public_key: &ProjectivePoint,
    hash: &[u8; 32],
    signature: &Signature,
) -> Result<bool> {
    let key = VerifyingKey::from_affine(public_key.to_affine())
        .map_err(|e| Error::Crypto(format!("Invalid public key: {}", e)))?;
    let signature = signature.to_ecdsa()?;

    match key.verify_prehash(hash, &signature) {
        Ok(()) => Ok(true),
        Err(e) => {
            debug!(error = %e, "Signature rejected");
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::SigningKey;
    use rand::rngs::OsRng;

    fn sign(key: &SigningKey, message: &[u8]) -> Signature {
        let (sig, recovery_id) = key.sign_recoverable(message).unwrap();
        let bytes = sig.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Signature::new(r, s, recovery_id.to_byte())
    }

    #[test]
    fn test_verify_with_key() {
        let key = SigningKey::random(&mut OsRng);
        let public_key: ProjectivePoint = key.verifying_key().as_affine().into();
        let signature = sign(&key, b"Hello");

        assert!(verify_with_key(&public_key, b"Hello", &signature).unwrap());
        assert!(!verify_with_key(&public_key, b"Hellp", &signature).unwrap());
    }

    #[test]
    fn test_zero_signature_is_malformed() {
        let public_key = ProjectivePoint::GENERATOR;
        let signature = Signature::new([0u8; 32], [0u8; 32], 0);
        assert!(matches!(
            verify_with_key(&public_key, b"Hello", &signature),
            Err(Error::InvalidSignature)
        ));
    }
}
