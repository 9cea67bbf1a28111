//! DSG message types

use serde::{Deserialize, Serialize};

pub const DSG_ROUND_COMMIT: u32 = 1;
pub const DSG_ROUND_MTA_CHOICE: u32 = 2;
pub const DSG_ROUND_MTA_RESPONSE: u32 = 3;
pub const DSG_ROUND_DELTA: u32 = 4;
pub const DSG_ROUND_PARTIAL: u32 = 5;

/// Round 1 message (broadcast): nonce commitment and OT setup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DsgRound1Message {
    /// Commitment to gamma_i
    pub gamma_commitment: Vec<u8>,
    /// Setup point for MtA transfers where this party is the sender
    pub ot_setup: Vec<u8>,
}

/// Round 2 message (direct, receiver to sender): MtA choice points
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DsgRound2Message {
    pub choices: Vec<Vec<u8>>,
}

/// Round 3 message (direct, sender to receiver): masked MtA messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DsgRound3Message {
    pub ciphertexts: Vec<(Vec<u8>, Vec<u8>)>,
}

/// Round 4 message (broadcast): share of k * gamma
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DsgRound4Message {
    pub delta_share: Vec<u8>,
}

/// Round 5 message (broadcast): partial signature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DsgPartialMessage {
    /// Sigma share
    pub sigma_share: Vec<u8>,
}
