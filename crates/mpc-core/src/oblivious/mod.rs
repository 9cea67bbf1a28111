//! Oblivious Transfer (OT) primitives
//!
//! This module provides the pieces the signing engine uses to multiply
//! secrets held by two different parties:
//! - Base OT (Chou–Orlandi "simplest OT" over secp256k1)
//! - MtA: multiplicative-to-additive share conversion built on base OT

pub mod base_ot;
pub mod mta;

pub use base_ot::{OtReceiver, OtSender, OtTag};
pub use mta::{MtaReceiver, MtaSender, MTA_BITS};
