//! # MPC Core
//!
//! In-process orchestration of threshold ECDSA parties over secp256k1.
//!
//! This crate provides:
//! - An [`Orchestrator`](mpc::Orchestrator) that drives one protocol engine
//!   per party, routing broadcast and direct messages between them
//! - Distributed Key Generation (DKG) with per-party share persistence
//! - Distributed Signature Generation (DSG) for any `threshold + 1` parties
//! - Standard ECDSA verification against the stored group key
//!
//! ## Example
//!
//! ```rust,ignore
//! use mpc_core::{keygen, sign, RunConfig, ShareStore};
//! use std::path::Path;
//!
//! let config = RunConfig::load_or_init(Path::new("./data"))?;
//! let store = ShareStore::new("./data");
//!
//! let report = keygen::run_keygen(&config, &store).await?;
//! let signature = sign::run_signing(&config, &store, b"Hello", &[0, 1, 2]).await?;
//! ```

pub mod config;
pub mod error;
pub mod keygen;
pub mod mpc;
pub mod oblivious;
pub mod quorum;
pub mod sign;
pub mod store;
pub mod types;
pub mod verify;

pub use config::{PersistencePolicy, RunConfig};
pub use error::{Error, Result};
pub use keygen::{run_keygen, KeygenReport};
pub use sign::run_signing;
pub use store::ShareStore;
pub use types::{KeyShare, PartyIdentity, PeerContext, ProtocolMessage, Signature};
pub use verify::{verify_signature, verify_with_key};

/// Default threshold
pub const DEFAULT_THRESHOLD: usize = 2;

/// Default number of parties
pub const DEFAULT_PARTIES: usize = 5;
