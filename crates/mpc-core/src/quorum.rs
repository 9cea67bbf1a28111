//! Threshold and participant-count checks performed before any engine exists

use crate::{Error, Result};
use std::collections::HashSet;

/// Key generation needs `threshold < party_count`
pub fn validate_keygen_quorum(threshold: usize, party_count: usize) -> Result<()> {
    if threshold >= party_count {
        return Err(Error::ThresholdNotMet {
            required: threshold + 1,
            actual: party_count,
        });
    }
    Ok(())
}

/// Signing needs at least `threshold + 1` distinct participants
pub fn validate_signing_quorum(threshold: usize, participants: &[usize]) -> Result<()> {
    let mut seen = HashSet::with_capacity(participants.len());
    if let Some(dup) = participants.iter().find(|index| !seen.insert(**index)) {
        return Err(Error::InvalidConfig(format!(
            "Party index {} listed more than once",
            dup
        )));
    }

    if participants.len() < threshold + 1 {
        return Err(Error::ThresholdNotMet {
            required: threshold + 1,
            actual: participants.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keygen_quorum() {
        for party_count in 0..8 {
            for threshold in 0..8 {
                let result = validate_keygen_quorum(threshold, party_count);
                if threshold >= party_count {
                    assert!(matches!(result, Err(Error::ThresholdNotMet { .. })));
                } else {
                    assert!(result.is_ok());
                }
            }
        }
    }

    #[test]
    fn test_signing_quorum() {
        assert!(validate_signing_quorum(2, &[0, 1, 2]).is_ok());
        assert!(validate_signing_quorum(2, &[0, 1, 2, 3]).is_ok());

        match validate_signing_quorum(2, &[0, 1]) {
            Err(Error::ThresholdNotMet { required, actual }) => {
                assert_eq!(required, 3);
                assert_eq!(actual, 2);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(validate_signing_quorum(0, &[]).is_err());
    }

    #[test]
    fn test_signing_quorum_rejects_duplicates() {
        assert!(matches!(
            validate_signing_quorum(2, &[0, 1, 1]),
            Err(Error::InvalidConfig(_))
        ));
    }
}
