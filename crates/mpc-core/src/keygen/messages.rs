//! DKG message types

use serde::{Deserialize, Serialize};

/// Round carrying [`DkgRound1Message`]
pub const DKG_ROUND_COMMIT: u32 = 1;

/// Round carrying [`DkgRound2Message`]
pub const DKG_ROUND_SHARE: u32 = 2;

/// Round 1 message (broadcast): commitment to secret polynomial
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DkgRound1Message {
    /// Commitments to polynomial coefficients (Feldman VSS)
    pub commitments: Vec<Vec<u8>>,
}

/// Round 2 message (direct): secret share for the recipient
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DkgRound2Message {
    /// Polynomial evaluated at the recipient's key share ID
    pub share: Vec<u8>,
}
