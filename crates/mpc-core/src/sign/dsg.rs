//! DSG engine
//!
//! Every signer picks a nonce share `k_i` and a blinding share `gamma_i`.
//! Pairwise MtA turns `k_i * gamma_j` and `k_i * w_j` into additive shares,
//! which gives each party a share of `k * gamma` and `k * x`. Revealing
//! `delta = k * gamma` lets everyone compute `R = delta^-1 * sum(Gamma_j)`.

use super::messages::{
    DsgPartialMessage, DsgRound1Message, DsgRound2Message, DsgRound3Message, DsgRound4Message,
    DSG_ROUND_COMMIT, DSG_ROUND_DELTA, DSG_ROUND_MTA_CHOICE, DSG_ROUND_MTA_RESPONSE,
    DSG_ROUND_PARTIAL,
};
use crate::mpc::{LocalProtocolEngine, Outbox};
use crate::oblivious::{base_ot::Pad, MtaReceiver, MtaSender, OtTag};
use crate::types::{decode_point, decode_scalar, encode_point, x_coordinate};
use crate::verify::verify_prehash;
use crate::{Error, KeyShare, PartyIdentity, PeerContext, ProtocolMessage, Result, Signature};
use k256::{
    elliptic_curve::{bigint::U256, ops::Reduce, scalar::IsHigh, Field},
    ProjectivePoint, Scalar,
};
use rand::rngs::OsRng;
use std::collections::HashMap;
use tracing::{debug, info};

/// Nonce point and its reduced x coordinate
struct Nonce {
    point: ProjectivePoint,
    r: Scalar,
}

/// One party's signing state machine
pub struct DsgParty {
    me: PartyIdentity,
    ctx: PeerContext,
    hash: [u8; 32],
    public_key: ProjectivePoint,
    /// Lagrange-weighted secret share for this signing set
    weighted_share: Scalar,
    k: Scalar,
    gamma: Scalar,
    mta: MtaSender,
    /// Pending MtA receivers, keyed by the sender's key share ID
    receivers: HashMap<u64, MtaReceiver>,
    gamma_points: HashMap<u64, ProjectivePoint>,
    alphas: HashMap<u64, [Scalar; 2]>,
    betas: HashMap<u64, [Scalar; 2]>,
    deltas: HashMap<u64, Scalar>,
    sigma: Option<Scalar>,
    nonce: Option<Nonce>,
    partials: HashMap<u64, Scalar>,
    done: bool,
}

impl DsgParty {
    /// Create a signer for `hash` over the signing set in `ctx`
    pub fn new(
        me: PartyIdentity,
        ctx: PeerContext,
        key_share: &KeyShare,
        hash: [u8; 32],
    ) -> Result<Self> {
        if !ctx.contains(&me) {
            return Err(Error::InvalidConfig(format!(
                "Party {} is not in the peer context",
                me
            )));
        }
        if me.key_share_id() != key_share.share_id {
            return Err(Error::InvalidConfig(format!(
                "Party {} does not own key share {}",
                me, key_share.share_id
            )));
        }
        if let Some(stranger) = ctx
            .parties()
            .iter()
            .find(|p| !key_share.share_ids.contains(&p.key_share_id()))
        {
            return Err(Error::InvalidConfig(format!(
                "Party {} did not take part in key generation",
                stranger
            )));
        }

        let ids: Vec<u64> = ctx.parties().iter().map(|p| p.key_share_id()).collect();
        let lambda = lagrange_coefficient(key_share.share_id, &ids)?;

        Ok(Self {
            me,
            ctx,
            hash,
            public_key: key_share.public_key,
            weighted_share: key_share.secret_share * lambda,
            k: Scalar::ZERO,
            gamma: Scalar::ZERO,
            mta: MtaSender::new(),
            receivers: HashMap::new(),
            gamma_points: HashMap::new(),
            alphas: HashMap::new(),
            betas: HashMap::new(),
            deltas: HashMap::new(),
            sigma: None,
            nonce: None,
            partials: HashMap::new(),
            done: false,
        })
    }

    fn on_commit(
        &mut self,
        from: &PartyIdentity,
        payload: &[u8],
        outbox: &Outbox<Signature>,
    ) -> Result<()> {
        let msg: DsgRound1Message = serde_json::from_slice(payload)
            .map_err(|e| Error::protocol(&self.me, format!("bad commitment from {}: {}", from, e)))?;
        let gamma_point = decode_point(&msg.gamma_commitment)
            .map_err(|e| Error::protocol(&self.me, format!("bad commitment from {}: {}", from, e)))?;
        let setup = decode_point(&msg.ot_setup)
            .map_err(|e| Error::protocol(&self.me, format!("bad OT setup from {}: {}", from, e)))?;

        let sender = from.key_share_id();
        if self.gamma_points.insert(sender, gamma_point).is_some() {
            return Err(Error::protocol(
                &self.me,
                format!("duplicate commitment from {}", from),
            ));
        }

        let tag = OtTag::new(sender, self.me.key_share_id());
        let (receiver, points) = MtaReceiver::new(&tag, &setup, &self.k)
            .map_err(|e| Error::protocol(&self.me, format!("MtA with {}: {}", from, e)))?;
        self.receivers.insert(sender, receiver);

        let choice_msg = DsgRound2Message {
            choices: points.iter().map(encode_point).collect(),
        };
        outbox.send_direct(from, DSG_ROUND_MTA_CHOICE, serde_json::to_vec(&choice_msg)?);
        Ok(())
    }

    fn on_choices(
        &mut self,
        from: &PartyIdentity,
        payload: &[u8],
        outbox: &Outbox<Signature>,
    ) -> Result<()> {
        let receiver = from.key_share_id();
        if self.betas.contains_key(&receiver) {
            return Err(Error::protocol(
                &self.me,
                format!("duplicate MtA request from {}", from),
            ));
        }

        let msg: DsgRound2Message = serde_json::from_slice(payload)
            .map_err(|e| Error::protocol(&self.me, format!("bad MtA request from {}: {}", from, e)))?;
        let points = msg
            .choices
            .iter()
            .map(|bytes| decode_point(bytes))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| Error::protocol(&self.me, format!("bad MtA request from {}: {}", from, e)))?;

        let tag = OtTag::new(self.me.key_share_id(), receiver);
        let (ciphertexts, betas) = self
            .mta
            .respond(&tag, &[self.gamma, self.weighted_share], &points)
            .map_err(|e| Error::protocol(&self.me, format!("MtA with {}: {}", from, e)))?;
        self.betas.insert(receiver, betas);

        let response = DsgRound3Message {
            ciphertexts: ciphertexts
                .iter()
                .map(|(zero, one)| (zero.to_vec(), one.to_vec()))
                .collect(),
        };
        outbox.send_direct(from, DSG_ROUND_MTA_RESPONSE, serde_json::to_vec(&response)?);
        Ok(())
    }

    fn on_response(&mut self, from: &PartyIdentity, payload: &[u8]) -> Result<()> {
        let receiver = self.receivers.remove(&from.key_share_id()).ok_or_else(|| {
            Error::protocol(&self.me, format!("unexpected MtA response from {}", from))
        })?;

        let msg: DsgRound3Message = serde_json::from_slice(payload)
            .map_err(|e| Error::protocol(&self.me, format!("bad MtA response from {}: {}", from, e)))?;
        let ciphertexts = msg
            .ciphertexts
            .iter()
            .map(|(zero, one)| Some((zero.as_slice().try_into().ok()?, one.as_slice().try_into().ok()?)))
            .collect::<Option<Vec<(Pad, Pad)>>>()
            .ok_or_else(|| {
                Error::protocol(&self.me, format!("bad MtA response length from {}", from))
            })?;

        let alphas = receiver
            .finish(&ciphertexts)
            .map_err(|e| Error::protocol(&self.me, format!("MtA with {}: {}", from, e)))?;
        self.alphas.insert(from.key_share_id(), alphas);
        Ok(())
    }

    fn on_delta(&mut self, from: &PartyIdentity, payload: &[u8]) -> Result<()> {
        let msg: DsgRound4Message = serde_json::from_slice(payload)
            .map_err(|e| Error::protocol(&self.me, format!("bad delta from {}: {}", from, e)))?;
        let delta = decode_scalar(&msg.delta_share)
            .map_err(|e| Error::protocol(&self.me, format!("bad delta from {}: {}", from, e)))?;

        if self.deltas.insert(from.key_share_id(), delta).is_some() {
            return Err(Error::protocol(
                &self.me,
                format!("duplicate delta from {}", from),
            ));
        }
        Ok(())
    }

    fn on_partial(&mut self, from: &PartyIdentity, payload: &[u8]) -> Result<()> {
        let msg: DsgPartialMessage = serde_json::from_slice(payload)
            .map_err(|e| Error::protocol(&self.me, format!("bad partial from {}: {}", from, e)))?;
        let sigma = decode_scalar(&msg.sigma_share)
            .map_err(|e| Error::protocol(&self.me, format!("bad partial from {}: {}", from, e)))?;

        if self.partials.insert(from.key_share_id(), sigma).is_some() {
            return Err(Error::protocol(
                &self.me,
                format!("duplicate partial signature from {}", from),
            ));
        }
        Ok(())
    }

    /// Move through whichever steps the collected messages allow
    fn advance(&mut self, outbox: &Outbox<Signature>) -> Result<()> {
        let n = self.ctx.len();
        let my_id = self.me.key_share_id();

        if self.sigma.is_none() && self.alphas.len() == n - 1 && self.betas.len() == n - 1 {
            debug!(party = %self.me, "DSG Round 4: Delta");
            let mut delta = self.k * self.gamma;
            let mut sigma = self.k * self.weighted_share;
            for shares in self.alphas.values().chain(self.betas.values()) {
                delta += shares[0];
                sigma += shares[1];
            }

            self.deltas.insert(my_id, delta);
            self.sigma = Some(sigma);
            let delta_msg = DsgRound4Message {
                delta_share: delta.to_bytes().to_vec(),
            };
            outbox.broadcast(DSG_ROUND_DELTA, serde_json::to_vec(&delta_msg)?);
        }

        if let (Some(sigma), true) = (self.sigma, self.nonce.is_none()) {
            if self.deltas.len() == n && self.gamma_points.len() == n {
                debug!(party = %self.me, "DSG Round 5: Partial signature");
                let delta = self.deltas.values().fold(Scalar::ZERO, |acc, d| acc + d);
                let delta_inv = Option::<Scalar>::from(delta.invert())
                    .ok_or_else(|| Error::protocol(&self.me, "delta is zero"))?;
                let point = self
                    .gamma_points
                    .values()
                    .fold(ProjectivePoint::IDENTITY, |acc, p| acc + p)
                    * delta_inv;

                let r_bytes = x_coordinate(&point).map_err(|e| Error::protocol(&self.me, e))?;
                let r = <Scalar as Reduce<U256>>::reduce_bytes(&r_bytes.into());
                if bool::from(r.is_zero()) {
                    return Err(Error::protocol(&self.me, "nonce has zero x coordinate"));
                }

                let m = <Scalar as Reduce<U256>>::reduce_bytes(&self.hash.into());
                let partial = m * self.k + r * sigma;
                self.partials.insert(my_id, partial);
                self.nonce = Some(Nonce { point, r });

                let partial_msg = DsgPartialMessage {
                    sigma_share: partial.to_bytes().to_vec(),
                };
                outbox.broadcast(DSG_ROUND_PARTIAL, serde_json::to_vec(&partial_msg)?);
            }
        }

        if let Some(nonce) = self.nonce.as_ref() {
            if !self.done && self.partials.len() == n {
                let signature = self.combine(nonce)?;
                info!(
                    party = %self.me,
                    r = hex::encode(signature.r),
                    s = hex::encode(signature.s),
                    "DSG completed successfully"
                );
                self.done = true;
                outbox.finish(signature);
            }
        }

        Ok(())
    }

    /// Sum the partials, normalize to low-s and check against the group key
    fn combine(&self, nonce: &Nonce) -> Result<Signature> {
        let mut s = self.partials.values().fold(Scalar::ZERO, |acc, p| acc + p);
        if bool::from(s.is_zero()) {
            return Err(Error::protocol(&self.me, "signature has zero s"));
        }

        // Compressed prefix 0x03 marks an odd y coordinate
        let mut recovery_id = u8::from(encode_point(&nonce.point)[0] == 0x03);
        if bool::from(s.is_high()) {
            s = -s;
            recovery_id ^= 1;
        }

        let mut r = [0u8; 32];
        r.copy_from_slice(&nonce.r.to_bytes());
        let mut s_bytes = [0u8; 32];
        s_bytes.copy_from_slice(&s.to_bytes());

        let signature = Signature::new(r, s_bytes, recovery_id);
        if !verify_prehash(&self.public_key, &self.hash, &signature)? {
            return Err(Error::protocol(
                &self.me,
                "combined signature does not verify under the group key",
            ));
        }
        Ok(signature)
    }
}

impl LocalProtocolEngine for DsgParty {
    type Output = Signature;

    fn identity(&self) -> &PartyIdentity {
        &self.me
    }

    fn peer_context(&self) -> &PeerContext {
        &self.ctx
    }

    fn start(&mut self, outbox: &Outbox<Signature>) -> Result<()> {
        debug!(party = %self.me, "DSG Round 1: Nonce commitment");
        self.k = Scalar::random(&mut OsRng);
        self.gamma = Scalar::random(&mut OsRng);

        let gamma_point = ProjectivePoint::GENERATOR * self.gamma;
        self.gamma_points.insert(self.me.key_share_id(), gamma_point);

        let commit_msg = DsgRound1Message {
            gamma_commitment: encode_point(&gamma_point),
            ot_setup: encode_point(&self.mta.setup_point()),
        };
        outbox.broadcast(DSG_ROUND_COMMIT, serde_json::to_vec(&commit_msg)?);

        self.advance(outbox)
    }

    fn update(&mut self, message: &ProtocolMessage, outbox: &Outbox<Signature>) -> Result<()> {
        if self.done {
            return Ok(());
        }

        let from = message.sender();
        match message.round() {
            DSG_ROUND_COMMIT => self.on_commit(from, message.payload(), outbox)?,
            DSG_ROUND_MTA_CHOICE => self.on_choices(from, message.payload(), outbox)?,
            DSG_ROUND_MTA_RESPONSE => self.on_response(from, message.payload())?,
            DSG_ROUND_DELTA => self.on_delta(from, message.payload())?,
            DSG_ROUND_PARTIAL => self.on_partial(from, message.payload())?,
            round => {
                return Err(Error::protocol(
                    &self.me,
                    format!("unexpected DSG round {} from {}", round, from),
                ))
            }
        }

        self.advance(outbox)
    }
}

/// Lagrange coefficient at zero for `id` over the signing set `ids`
fn lagrange_coefficient(id: u64, ids: &[u64]) -> Result<Scalar> {
    let i = Scalar::from(id);
    let mut numerator = Scalar::ONE;
    let mut denominator = Scalar::ONE;

    for &other in ids.iter().filter(|other| **other != id) {
        let j = Scalar::from(other);
        numerator *= j;
        denominator *= j - i;
    }

    Option::<Scalar>::from(denominator.invert())
        .map(|inv| numerator * inv)
        .ok_or_else(|| Error::Crypto("Lagrange denominator is zero".into()))
}
