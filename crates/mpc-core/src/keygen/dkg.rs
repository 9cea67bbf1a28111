//! DKG engine: Feldman VSS over secp256k1
//!
//! Round 1 broadcasts commitments to a random polynomial of degree
//! `threshold`; round 2 sends each peer its evaluation. Once every peer's
//! commitment and share are in, the share is verified and summed.

use super::messages::{DkgRound1Message, DkgRound2Message, DKG_ROUND_COMMIT, DKG_ROUND_SHARE};
use crate::mpc::{LocalProtocolEngine, Outbox};
use crate::types::{decode_point, decode_scalar, encode_point};
use crate::{Error, KeyShare, PartyIdentity, PeerContext, ProtocolMessage, Result};
use k256::{elliptic_curve::Field, ProjectivePoint, Scalar};
use rand::rngs::OsRng;
use std::collections::HashMap;
use tracing::{debug, info};

/// One party's key generation state machine
pub struct DkgParty {
    me: PartyIdentity,
    ctx: PeerContext,
    threshold: usize,
    coefficients: Vec<Scalar>,
    /// Commitments per sender key share ID, own included
    commitments: HashMap<u64, Vec<ProjectivePoint>>,
    /// Shares received per sender key share ID, own included
    shares: HashMap<u64, Scalar>,
    done: bool,
}

impl DkgParty {
    pub fn new(me: PartyIdentity, ctx: PeerContext, threshold: usize) -> Result<Self> {
        if !ctx.contains(&me) {
            return Err(Error::InvalidConfig(format!(
                "Party {} is not in the peer context",
                me
            )));
        }
        if threshold >= ctx.len() {
            return Err(Error::ThresholdNotMet {
                required: threshold + 1,
                actual: ctx.len(),
            });
        }

        Ok(Self {
            me,
            ctx,
            threshold,
            coefficients: Vec::new(),
            commitments: HashMap::new(),
            shares: HashMap::new(),
            done: false,
        })
    }

    fn on_commitments(&mut self, from: &PartyIdentity, payload: &[u8]) -> Result<()> {
        let msg: DkgRound1Message = serde_json::from_slice(payload)
            .map_err(|e| Error::protocol(&self.me, format!("bad commitment from {}: {}", from, e)))?;
        if msg.commitments.len() != self.threshold + 1 {
            return Err(Error::protocol(
                &self.me,
                format!(
                    "party {} committed to {} coefficients, expected {}",
                    from,
                    msg.commitments.len(),
                    self.threshold + 1
                ),
            ));
        }

        let points = msg
            .commitments
            .iter()
            .map(|bytes| decode_point(bytes))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| Error::protocol(&self.me, format!("bad commitment from {}: {}", from, e)))?;

        if self.commitments.insert(from.key_share_id(), points).is_some() {
            return Err(Error::protocol(
                &self.me,
                format!("duplicate commitment from {}", from),
            ));
        }
        Ok(())
    }

    fn on_share(&mut self, from: &PartyIdentity, payload: &[u8]) -> Result<()> {
        let msg: DkgRound2Message = serde_json::from_slice(payload)
            .map_err(|e| Error::protocol(&self.me, format!("bad share from {}: {}", from, e)))?;
        let share = decode_scalar(&msg.share)
            .map_err(|e| Error::protocol(&self.me, format!("bad share from {}: {}", from, e)))?;

        if self.shares.insert(from.key_share_id(), share).is_some() {
            return Err(Error::protocol(
                &self.me,
                format!("duplicate share from {}", from),
            ));
        }
        Ok(())
    }

    /// Finish once every commitment and share has arrived
    fn try_finish(&mut self, outbox: &Outbox<KeyShare>) -> Result<()> {
        let n = self.ctx.len();
        if self.done || self.commitments.len() < n || self.shares.len() < n {
            return Ok(());
        }

        let my_id = self.me.key_share_id();
        let mut secret_share = Scalar::ZERO;
        for party in self.ctx.parties() {
            let id = party.key_share_id();
            let (commitments, share) = match (self.commitments.get(&id), self.shares.get(&id)) {
                (Some(c), Some(s)) => (c, s),
                _ => return Err(Error::protocol(&self.me, format!("missing data from {}", party))),
            };

            if ProjectivePoint::GENERATOR * share != evaluate_commitments(commitments, my_id) {
                return Err(Error::protocol(
                    &self.me,
                    format!("share from party {} does not match commitment", party),
                ));
            }
            secret_share += share;
        }

        let public_key = self
            .ctx
            .parties()
            .iter()
            .filter_map(|p| self.commitments.get(&p.key_share_id()))
            .fold(ProjectivePoint::IDENTITY, |acc, c| acc + c[0]);

        let share_ids: Vec<u64> = self.ctx.parties().iter().map(|p| p.key_share_id()).collect();
        let public_shares: Vec<ProjectivePoint> = share_ids
            .iter()
            .map(|id| {
                self.commitments
                    .values()
                    .fold(ProjectivePoint::IDENTITY, |acc, c| acc + evaluate_commitments(c, *id))
            })
            .collect();

        let key_share = KeyShare {
            index: (my_id - 1) as usize,
            share_id: my_id,
            threshold: self.threshold,
            party_count: n,
            secret_share,
            public_key,
            public_shares,
            share_ids,
        };

        if key_share.public_share_of(my_id) != Some(&(ProjectivePoint::GENERATOR * secret_share)) {
            return Err(Error::protocol(&self.me, "public share does not match secret share"));
        }

        info!(
            party = %self.me,
            public_key = hex::encode(key_share.public_key_bytes()),
            "DKG completed"
        );
        self.done = true;
        self.coefficients.clear();
        outbox.finish(key_share);
        Ok(())
    }
}

impl LocalProtocolEngine for DkgParty {
    type Output = KeyShare;

    fn identity(&self) -> &PartyIdentity {
        &self.me
    }

    fn peer_context(&self) -> &PeerContext {
        &self.ctx
    }

    fn start(&mut self, outbox: &Outbox<KeyShare>) -> Result<()> {
        debug!(party = %self.me, "DKG Round 1: Commitment");
        self.coefficients = (0..=self.threshold)
            .map(|_| Scalar::random(&mut OsRng))
            .collect();
        let commitments: Vec<ProjectivePoint> = self
            .coefficients
            .iter()
            .map(|c| ProjectivePoint::GENERATOR * c)
            .collect();

        let commit_msg = DkgRound1Message {
            commitments: commitments.iter().map(encode_point).collect(),
        };
        outbox.broadcast(DKG_ROUND_COMMIT, serde_json::to_vec(&commit_msg)?);

        debug!(party = %self.me, "DKG Round 2: Secret sharing");
        for peer in self.ctx.others(&self.me) {
            let share = evaluate_polynomial(&self.coefficients, peer.key_share_id());
            let share_msg = DkgRound2Message {
                share: share.to_bytes().to_vec(),
            };
            outbox.send_direct(peer, DKG_ROUND_SHARE, serde_json::to_vec(&share_msg)?);
        }

        let my_id = self.me.key_share_id();
        self.shares
            .insert(my_id, evaluate_polynomial(&self.coefficients, my_id));
        self.commitments.insert(my_id, commitments);

        self.try_finish(outbox)
    }

    fn update(&mut self, message: &ProtocolMessage, outbox: &Outbox<KeyShare>) -> Result<()> {
        if self.done {
            return Ok(());
        }

        let from = message.sender();
        match message.round() {
            DKG_ROUND_COMMIT => self.on_commitments(from, message.payload())?,
            DKG_ROUND_SHARE => self.on_share(from, message.payload())?,
            round => {
                return Err(Error::protocol(
                    &self.me,
                    format!("unexpected DKG round {} from {}", round, from),
                ))
            }
        }

        self.try_finish(outbox)
    }
}

/// Evaluate polynomial at a point
fn evaluate_polynomial(coefficients: &[Scalar], x: u64) -> Scalar {
    let x_scalar = Scalar::from(x);
    let mut result = Scalar::ZERO;
    let mut x_power = Scalar::ONE;

    for coef in coefficients {
        result += *coef * x_power;
        x_power *= x_scalar;
    }

    result
}

/// Evaluate committed polynomial "in the exponent" at a point
fn evaluate_commitments(commitments: &[ProjectivePoint], x: u64) -> ProjectivePoint {
    let x_scalar = Scalar::from(x);
    let mut result = ProjectivePoint::IDENTITY;
    let mut x_power = Scalar::ONE;

    for commitment in commitments {
        result += *commitment * x_power;
        x_power *= x_scalar;
    }

    result
}
