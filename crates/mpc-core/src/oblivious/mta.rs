//! Multiplicative-to-additive conversion (Gilboa)
//!
//! The receiver holds `b`, the sender holds `a_0, a_1`. One base OT per bit
//! of `b` transfers either `t_l` or `t_l + a * 2^l`, so the receiver ends up
//! with `alpha = sum(t) + a * b` and the sender keeps `beta = -sum(t)`.
//! Both lanes share the receiver's input and one set of transfers.

use super::base_ot::{OtReceiver, OtSender, OtTag, Pad, PAD_LEN};
use crate::types::decode_scalar;
use crate::{Error, Result};
use k256::{elliptic_curve::Field, ProjectivePoint, Scalar};
use rand::rngs::OsRng;

/// Transfers per multiplication, one per bit of the receiver's input
pub const MTA_BITS: usize = 256;

/// Sender inputs multiplied against one receiver input
pub const MTA_LANES: usize = 2;

/// Sender side of a two-lane MtA
pub struct MtaSender {
    ot: OtSender,
}

impl MtaSender {
    pub fn new() -> Self {
        Self { ot: OtSender::new() }
    }

    /// Setup point published to every receiver
    pub fn setup_point(&self) -> ProjectivePoint {
        self.ot.setup_point()
    }

    /// Answer a receiver's choice points
    ///
    /// Returns the masked message pairs for the receiver and this side's
    /// additive shares.
    pub fn respond(
        &self,
        tag: &OtTag,
        inputs: &[Scalar; MTA_LANES],
        choice_points: &[ProjectivePoint],
    ) -> Result<(Vec<(Pad, Pad)>, [Scalar; MTA_LANES])> {
        if choice_points.len() != MTA_BITS {
            return Err(Error::Crypto(format!(
                "Expected {} MtA choice points, got {}",
                MTA_BITS,
                choice_points.len()
            )));
        }

        let pads = self.ot.pads(tag, choice_points);
        let mut shares = [Scalar::ZERO; MTA_LANES];
        let mut ciphertexts = Vec::with_capacity(MTA_BITS);
        let mut power = Scalar::ONE;

        for (zero_pad, one_pad) in pads {
            let masks = [Scalar::random(&mut OsRng), Scalar::random(&mut OsRng)];
            let zero = pack(&masks);
            let one = pack(&[masks[0] + inputs[0] * power, masks[1] + inputs[1] * power]);
            ciphertexts.push((xor(&zero, &zero_pad), xor(&one, &one_pad)));

            shares[0] -= masks[0];
            shares[1] -= masks[1];
            power = power + power;
        }

        Ok((ciphertexts, shares))
    }
}

impl Default for MtaSender {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver side of a two-lane MtA, waiting for the sender's answer
pub struct MtaReceiver {
    ot: OtReceiver,
}

impl MtaReceiver {
    /// Choose on the bits of `input`, returning the points for the sender
    pub fn new(
        tag: &OtTag,
        sender_setup: &ProjectivePoint,
        input: &Scalar,
    ) -> Result<(Self, Vec<ProjectivePoint>)> {
        let (ot, points) = OtReceiver::new(tag, sender_setup, &scalar_bits(input))?;
        Ok((Self { ot }, points))
    }

    /// Recover this side's additive shares from the sender's answer
    pub fn finish(self, ciphertexts: &[(Pad, Pad)]) -> Result<[Scalar; MTA_LANES]> {
        let mut shares = [Scalar::ZERO; MTA_LANES];
        for message in self.ot.open(ciphertexts)? {
            let values = unpack(&message)?;
            shares[0] += values[0];
            shares[1] += values[1];
        }
        Ok(shares)
    }
}

/// Little-endian bits of a scalar
fn scalar_bits(value: &Scalar) -> Vec<bool> {
    let bytes = value.to_bytes();
    (0..MTA_BITS)
        .map(|l| (bytes[31 - l / 8] >> (l % 8)) & 1 == 1)
        .collect()
}

fn pack(values: &[Scalar; MTA_LANES]) -> Pad {
    let mut out = [0u8; PAD_LEN];
    out[..32].copy_from_slice(&values[0].to_bytes());
    out[32..].copy_from_slice(&values[1].to_bytes());
    out
}

fn unpack(message: &Pad) -> Result<[Scalar; MTA_LANES]> {
    Ok([decode_scalar(&message[..32])?, decode_scalar(&message[32..])?])
}

fn xor(a: &Pad, b: &Pad) -> Pad {
    super::base_ot::xor(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shares_sum_to_products() {
        let tag = OtTag::new(3, 5);
        let a = [Scalar::random(&mut OsRng), Scalar::random(&mut OsRng)];
        let b = Scalar::random(&mut OsRng);

        let sender = MtaSender::new();
        let (receiver, points) = MtaReceiver::new(&tag, &sender.setup_point(), &b).unwrap();
        let (ciphertexts, beta) = sender.respond(&tag, &a, &points).unwrap();
        let alpha = receiver.finish(&ciphertexts).unwrap();

        assert_eq!(alpha[0] + beta[0], a[0] * b);
        assert_eq!(alpha[1] + beta[1], a[1] * b);
    }

    #[test]
    fn test_small_inputs() {
        let tag = OtTag::new(1, 2);
        let a = [Scalar::from(6u64), Scalar::ZERO];
        let b = Scalar::from(7u64);

        let sender = MtaSender::new();
        let (receiver, points) = MtaReceiver::new(&tag, &sender.setup_point(), &b).unwrap();
        let (ciphertexts, beta) = sender.respond(&tag, &a, &points).unwrap();
        let alpha = receiver.finish(&ciphertexts).unwrap();

        assert_eq!(alpha[0] + beta[0], Scalar::from(42u64));
        assert_eq!(alpha[1] + beta[1], Scalar::ZERO);
    }

    #[test]
    fn test_scalar_bits() {
        let bits = scalar_bits(&Scalar::from(0b1011u64));
        assert_eq!(&bits[..5], &[true, true, false, true, false]);
        assert!(bits[5..].iter().all(|b| !b));
    }

    #[test]
    fn test_rejects_short_choice_list() {
        let sender = MtaSender::new();
        let points = vec![ProjectivePoint::GENERATOR; 10];
        assert!(sender
            .respond(&OtTag::new(1, 2), &[Scalar::ONE, Scalar::ONE], &points)
            .is_err());
    }
}
