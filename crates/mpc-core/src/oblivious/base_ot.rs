//! Base OT from https://eprint.iacr.org/2015/267.pdf
//!
//! The sender publishes `A = a*G` once. For every transfer the receiver
//! answers with `B = b*G` (choice 0) or `B = A + b*G` (choice 1) and can only
//! derive the pad for its choice, `H(b*A)`. The sender derives both pads,
//! `H(a*B)` and `H(a*(B - A))`, and masks its two messages with them.

use crate::types::encode_point;
use crate::{Error, Result};
use k256::{elliptic_curve::Field, ProjectivePoint, Scalar};
use rand::rngs::OsRng;
use sha2::{Digest, Sha512};

/// Length of one transferred message
pub const PAD_LEN: usize = 64;

/// One transferred message, or the mask hiding it
pub type Pad = [u8; PAD_LEN];

const DOMAIN: &[u8] = b"mpc-core/base-ot/v1";

/// Binds derived pads to one ordered sender/receiver pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtTag {
    pub sender: u64,
    pub receiver: u64,
}

impl OtTag {
    pub fn new(sender: u64, receiver: u64) -> Self {
        Self { sender, receiver }
    }

    fn pad(&self, position: usize, point: &ProjectivePoint) -> Pad {
        let mut hasher = Sha512::new();
        hasher.update(DOMAIN);
        hasher.update(self.sender.to_be_bytes());
        hasher.update(self.receiver.to_be_bytes());
        hasher.update((position as u64).to_be_bytes());
        hasher.update(encode_point(point));

        let mut pad = [0u8; PAD_LEN];
        pad.copy_from_slice(&hasher.finalize());
        pad
    }
}

/// Sender state: the secret behind the published setup point
pub struct OtSender {
    secret: Scalar,
    setup: ProjectivePoint,
}

impl OtSender {
    pub fn new() -> Self {
        let secret = Scalar::random(&mut OsRng);
        Self {
            secret,
            setup: ProjectivePoint::GENERATOR * secret,
        }
    }

    /// The point `A` every receiver needs before it can choose
    pub fn setup_point(&self) -> ProjectivePoint {
        self.setup
    }

    /// Both pads for every receiver choice point
    pub fn pads(&self, tag: &OtTag, choice_points: &[ProjectivePoint]) -> Vec<(Pad, Pad)> {
        choice_points
            .iter()
            .enumerate()
            .map(|(position, point)| {
                let zero = tag.pad(position, &(*point * self.secret));
                let one = tag.pad(position, &((*point - self.setup) * self.secret));
                (zero, one)
            })
            .collect()
    }
}

impl Default for OtSender {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver state: the pads of the chosen messages
pub struct OtReceiver {
    choices: Vec<bool>,
    pads: Vec<Pad>,
}

impl OtReceiver {
    /// Commit to `choices` against the sender's setup point, returning the
    /// points to send back
    pub fn new(
        tag: &OtTag,
        setup: &ProjectivePoint,
        choices: &[bool],
    ) -> Result<(Self, Vec<ProjectivePoint>)> {
        if *setup == ProjectivePoint::IDENTITY {
            return Err(Error::Crypto("OT setup point is the identity".into()));
        }

        let mut pads = Vec::with_capacity(choices.len());
        let mut points = Vec::with_capacity(choices.len());
        for (position, choice) in choices.iter().enumerate() {
            let secret = Scalar::random(&mut OsRng);
            let blind = ProjectivePoint::GENERATOR * secret;
            points.push(if *choice { *setup + blind } else { blind });
            pads.push(tag.pad(position, &(*setup * secret)));
        }

        Ok((
            Self {
                choices: choices.to_vec(),
                pads,
            },
            points,
        ))
    }

    /// Unmask the chosen message of every pair
    pub fn open(&self, ciphertexts: &[(Pad, Pad)]) -> Result<Vec<Pad>> {
        if ciphertexts.len() != self.pads.len() {
            return Err(Error::Crypto(format!(
                "Expected {} OT ciphertexts, got {}",
                self.pads.len(),
                ciphertexts.len()
            )));
        }

        Ok(ciphertexts
            .iter()
            .zip(self.choices.iter().zip(&self.pads))
            .map(|((zero, one), (choice, pad))| xor(if *choice { one } else { zero }, pad))
            .collect())
    }
}

/// Bytewise XOR of two pads
pub fn xor(a: &Pad, b: &Pad) -> Pad {
    let mut out = [0u8; PAD_LEN];
    for (o, (x, y)) in out.iter_mut().zip(a.iter().zip(b.iter())) {
        *o = x ^ y;
    }
    out
}
