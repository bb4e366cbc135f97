// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use crate::error::CryptoError;
use num_bigint::{BigInt, BigUint, RandBigInt, Sign};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

/// Element of an imaginary-quadratic class group: the three coefficients of
/// a binary quadratic form. Backends that do not need all three leave the
/// unused ones at zero; the wire format always carries all three.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupElement {
    pub a: BigInt,
    pub b: BigInt,
    pub c: BigInt,
}

impl GroupElement {
    pub fn new(a: BigInt, b: BigInt, c: BigInt) -> Self {
        GroupElement { a, b, c }
    }

    pub fn identity() -> Self {
        GroupElement {
            a: BigInt::zero(),
            b: BigInt::zero(),
            c: BigInt::zero(),
        }
    }
}

/// The class-group arithmetic the cryptosystem is generic over.
///
/// Two groups are in play: `Cl_G`, where the first ciphertext component and
/// partial decryptions live, and `Cl_Δ`, home of the second component and of
/// the message subgroup `F = <f>` whose discrete logarithm is easy. In the
/// compact variant `Cl_G` is the smaller `Cl_ΔK` and elements are embedded
/// into `Cl_Δ` before they meet `c2`.
pub trait GroupArith: Clone + Send + Sync + 'static {
    fn security_level(&self) -> u32;

    /// Plaintext bit-width `k`; the cleartext space is `Z / 2^k Z`.
    fn message_bits(&self) -> u32;

    fn compact(&self) -> bool;

    /// `2^k`.
    fn cleartext_bound(&self) -> &BigInt;

    /// Upper bound for encryption randomness and secret keys.
    fn randomness_bound(&self) -> &BigInt;

    /// `h^e` in `Cl_G`.
    fn power_of_h(&self, e: &BigInt) -> GroupElement;

    /// `f^m` in `Cl_Δ`.
    fn power_of_f(&self, m: &BigInt) -> GroupElement;

    fn compose_g(&self, x: &GroupElement, y: &GroupElement) -> GroupElement;

    fn compose_delta(&self, x: &GroupElement, y: &GroupElement) -> GroupElement;

    /// `x ∘ y^{-1}` in `Cl_Δ`.
    fn compose_inv_delta(&self, x: &GroupElement, y: &GroupElement) -> GroupElement;

    /// `x^e` in `Cl_G`; `e` may be negative.
    fn exp_g(&self, x: &GroupElement, e: &BigInt) -> GroupElement;

    /// `x^e` in `Cl_Δ`; `e` may be negative.
    fn exp_delta(&self, x: &GroupElement, e: &BigInt) -> GroupElement;

    /// Embedding `Cl_ΔK → Cl_Δ`; identity for non-compact backends.
    fn from_delta_k_to_delta(&self, x: &GroupElement) -> GroupElement;

    /// Discrete logarithm inside `F`; fails when `x` is outside `<f>`.
    fn dlog_in_f(&self, x: &GroupElement) -> Result<BigInt, CryptoError>;
}

/// Modulus width per security level, sized after the class-group
/// discriminants used at the same levels.
fn modulus_bits(security_level: u32) -> Result<u64, CryptoError> {
    match security_level {
        80 => Ok(908),
        128 => Ok(1828),
        256 => Ok(5972),
        other => Err(CryptoError::InvalidParameter(format!(
            "unsupported security level {other}, expected 80, 128 or 256"
        ))),
    }
}

/// Reference arithmetic over the residue ring `Z_M` with `M = q·2^k`.
///
/// Composition is addition mod `M`, `f = q` generates the order-`2^k`
/// message subgroup (its dlog is a division by `q`), and `h` ranges over the
/// multiples of `2^k`. The construction is deterministic in
/// `(security_level, k, compact)`, so every node derives the same group.
/// It reproduces the CL-HSM2k equations exactly and stands in for a real
/// class-group backend behind the same trait.
#[derive(Clone, Debug)]
pub struct ResidueGroup {
    security_level: u32,
    k: u32,
    compact: bool,
    modulus: BigInt,
    q: BigInt,
    h: BigInt,
    cleartext_bound: BigInt,
    randomness_bound: BigInt,
}

impl ResidueGroup {
    pub fn new(security_level: u32, k: u32, compact: bool) -> Result<Self, CryptoError> {
        if k == 0 || k > 4096 {
            return Err(CryptoError::InvalidParameter(format!(
                "message width k={k} out of range"
            )));
        }
        let bits = modulus_bits(security_level)?;

        let mut seed = [0u8; 32];
        seed[..4].copy_from_slice(&security_level.to_le_bytes());
        seed[4..8].copy_from_slice(&k.to_le_bytes());
        seed[8] = compact as u8;
        seed[9..24].copy_from_slice(b"cofhe/residue/1");
        let mut rng = ChaCha20Rng::from_seed(seed);

        let mut q: BigUint = rng.gen_biguint(bits);
        q.set_bit(bits - 1, true);
        q.set_bit(0, true);
        let q = BigInt::from_biguint(Sign::Plus, q);

        let cleartext_bound = BigInt::one() << (k as usize);
        let modulus = &q * &cleartext_bound;

        // h generates the complement of F: a random multiple of 2^k.
        let u = rng.gen_bigint_range(&BigInt::one(), &q);
        let h = (&u * &cleartext_bound).mod_floor(&modulus);

        let randomness_bound = &modulus << 40usize;

        Ok(ResidueGroup {
            security_level,
            k,
            compact,
            modulus,
            q,
            h,
            cleartext_bound,
            randomness_bound,
        })
    }

    fn reduce(&self, v: BigInt) -> GroupElement {
        GroupElement {
            a: v.mod_floor(&self.modulus),
            b: BigInt::zero(),
            c: BigInt::zero(),
        }
    }
}

impl GroupArith for ResidueGroup {
    fn security_level(&self) -> u32 {
        self.security_level
    }

    fn message_bits(&self) -> u32 {
        self.k
    }

    fn compact(&self) -> bool {
        self.compact
    }

    fn cleartext_bound(&self) -> &BigInt {
        &self.cleartext_bound
    }

    fn randomness_bound(&self) -> &BigInt {
        &self.randomness_bound
    }

    fn power_of_h(&self, e: &BigInt) -> GroupElement {
        self.reduce(&self.h * e)
    }

    fn power_of_f(&self, m: &BigInt) -> GroupElement {
        let m = m.mod_floor(&self.cleartext_bound);
        self.reduce(&self.q * m)
    }

    fn compose_g(&self, x: &GroupElement, y: &GroupElement) -> GroupElement {
        self.reduce(&x.a + &y.a)
    }

    fn compose_delta(&self, x: &GroupElement, y: &GroupElement) -> GroupElement {
        self.reduce(&x.a + &y.a)
    }

    fn compose_inv_delta(&self, x: &GroupElement, y: &GroupElement) -> GroupElement {
        self.reduce(&x.a - &y.a)
    }

    fn exp_g(&self, x: &GroupElement, e: &BigInt) -> GroupElement {
        self.reduce(&x.a * e)
    }

    fn exp_delta(&self, x: &GroupElement, e: &BigInt) -> GroupElement {
        self.reduce(&x.a * e)
    }

    fn from_delta_k_to_delta(&self, x: &GroupElement) -> GroupElement {
        x.clone()
    }

    fn dlog_in_f(&self, x: &GroupElement) -> Result<BigInt, CryptoError> {
        let (m, rem) = x.a.div_rem(&self.q);
        if !rem.is_zero() {
            return Err(CryptoError::CryptoFailure(
                "element is outside the message subgroup".into(),
            ));
        }
        Ok(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_is_deterministic_in_parameters() {
        let a = ResidueGroup::new(128, 64, false).unwrap();
        let b = ResidueGroup::new(128, 64, false).unwrap();
        assert_eq!(a.modulus, b.modulus);
        assert_eq!(a.h, b.h);
        let c = ResidueGroup::new(128, 32, false).unwrap();
        assert_ne!(a.modulus, c.modulus);
    }

    #[test]
    fn rejects_unknown_security_level() {
        assert!(ResidueGroup::new(100, 64, false).is_err());
    }

    #[test]
    fn dlog_recovers_f_exponent() {
        let g = ResidueGroup::new(80, 32, false).unwrap();
        let m = BigInt::from(123_456u64);
        let x = g.power_of_f(&m);
        assert_eq!(g.dlog_in_f(&x).unwrap(), m);
    }

    #[test]
    fn dlog_rejects_elements_outside_f() {
        let g = ResidueGroup::new(80, 32, false).unwrap();
        let x = g.power_of_h(&BigInt::from(3));
        assert!(g.dlog_in_f(&x).is_err());
    }

    #[test]
    fn exponent_may_be_negative() {
        let g = ResidueGroup::new(80, 32, false).unwrap();
        let x = g.power_of_h(&BigInt::from(5));
        let inv = g.exp_g(&x, &BigInt::from(-1));
        let id = g.compose_g(&x, &inv);
        assert!(id.a.is_zero());
    }
}
