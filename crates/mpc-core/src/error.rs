//! Error types for party orchestration

use thiserror::Error;

/// Result type alias for orchestration operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while preparing, running or persisting a protocol run
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid party configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Threshold requirements not met
    #[error("Invalid threshold: required at least {required} parties, got {actual}")]
    ThresholdNotMet { required: usize, actual: usize },

    /// A unicast message was addressed to a party outside the run
    #[error("Unknown recipient: party {from} addressed party {to}, which is not part of this run")]
    UnknownRecipient { from: String, to: String },

    /// A local protocol engine failed
    #[error("Protocol error from party {party}: {reason}")]
    Protocol { party: String, reason: String },

    /// No persisted share exists for the index
    #[error("Party data for index {0} not found")]
    PartyNotFound(usize),

    /// A persisted share exists but could not be rebuilt
    #[error("Corrupt party data for index {index}: {reason}")]
    CorruptData { index: usize, reason: String },

    /// Key generation finished but no share could be persisted
    #[error("Failed to save party data for indexes {indexes:?}: {reason}")]
    SaveFailed { indexes: Vec<usize>, reason: String },

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Signing run ended without a usable signature
    #[error("Signing process failed: {0}")]
    SigningFailed(String),

    /// Malformed signature encoding
    #[error("Invalid signature")]
    InvalidSignature,

    /// Cryptographic operation failed
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Run deadline elapsed
    #[error("Timeout waiting for {0}")]
    Timeout(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand used by engines to report a failure attributed to a party
    pub fn protocol(party: impl ToString, reason: impl ToString) -> Self {
        Error::Protocol {
            party: party.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
