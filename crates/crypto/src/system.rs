// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use crate::arith::{GroupArith, GroupElement, ResidueGroup};
use crate::error::CryptoError;
use crate::threshold::{
    first_combination, lambda, next_combination, share_rows, AccessStructure, SpanProgram,
};
use crate::types::{Ciphertext, PartDecryption, Plaintext, PublicKey, SecretKey, SecretKeyShare};
use num_bigint::{BigInt, RandBigInt};
use num_integer::Integer;
use num_traits::{FromPrimitive, One, Signed, ToPrimitive, Zero};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::sync::{Arc, Mutex};
use tracing::debug;

pub type SharedRng = Arc<Mutex<ChaCha20Rng>>;

/// Parameters of a cryptosystem instance. All nodes in one network share
/// these; the group construction is deterministic in them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CryptoParams {
    pub security_level: u32,
    /// Plaintext bit-width `k`.
    pub message_bits: u32,
    pub compact: bool,
    /// One randomizer per batch (default) or one per element in batched
    /// homomorphic operations.
    pub reuse_batch_randomness: bool,
    /// Fixed-point scaling exponent for float encoding; 0 keeps the raw
    /// integer contract.
    pub scaling_exponent: u32,
}

impl CryptoParams {
    pub fn new(security_level: u32, message_bits: u32) -> Self {
        CryptoParams {
            security_level,
            message_bits,
            compact: false,
            reuse_batch_randomness: true,
            scaling_exponent: 0,
        }
    }
}

/// The linearly-homomorphic cryptosystem over an opaque class-group
/// arithmetic: encryption, decryption, homomorphic add and plaintext-scalar
/// multiplication, threshold share generation and recombination.
///
/// Stateless apart from its RNG; clones share the RNG and are cheap.
#[derive(Clone)]
pub struct CryptoSystem<G: GroupArith> {
    arith: G,
    params: CryptoParams,
    rng: SharedRng,
}

pub type DefaultCryptoSystem = CryptoSystem<ResidueGroup>;

impl DefaultCryptoSystem {
    /// System over the built-in residue backend.
    pub fn new(params: CryptoParams) -> Result<Self, CryptoError> {
        let arith = ResidueGroup::new(params.security_level, params.message_bits, params.compact)?;
        Ok(Self::with_arith(arith, params))
    }
}

impl<G: GroupArith> CryptoSystem<G> {
    pub fn with_arith(arith: G, params: CryptoParams) -> Self {
        CryptoSystem {
            arith,
            params,
            rng: Arc::new(Mutex::new(ChaCha20Rng::from_entropy())),
        }
    }

    /// Replaces the RNG, for deterministic tests.
    pub fn with_rng(mut self, rng: SharedRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn params(&self) -> &CryptoParams {
        &self.params
    }

    pub fn arith(&self) -> &G {
        &self.arith
    }

    pub fn cleartext_bound(&self) -> &BigInt {
        self.arith.cleartext_bound()
    }

    pub(crate) fn random_below(&self, bound: &BigInt) -> BigInt {
        let mut rng = self.rng.lock().expect("crypto rng poisoned");
        rng.gen_bigint_range(&BigInt::zero(), bound)
    }

    // ---- keys ----

    pub fn keygen(&self) -> SecretKey {
        SecretKey::new(self.random_below(self.arith.randomness_bound()))
    }

    pub fn derive_public(&self, sk: &SecretKey) -> PublicKey {
        PublicKey(self.arith.power_of_h(sk.expose()))
    }

    /// Splits `sk` into per-party share lists for the `t`-of-`n` access
    /// structure. Party `p` receives one share per combination containing
    /// it, each tagged with the combination's lexicographic rank.
    pub fn split(
        &self,
        sk: &SecretKey,
        threshold: usize,
        parties: usize,
    ) -> Result<Vec<Vec<SecretKeyShare>>, CryptoError> {
        let access = AccessStructure::new(threshold, parties)?;
        let program = SpanProgram::for_access_structure(&access);
        debug!(
            rows = program.matrix.len(),
            cols = program.cols,
            "generated span program"
        );
        let rows = share_rows(&program, sk.expose(), || {
            self.random_below(self.arith.randomness_bound())
        });

        let mut per_party: Vec<Vec<SecretKeyShare>> = vec![Vec::new(); parties];
        let mut combo = first_combination(threshold);
        let mut rank = 0u64;
        loop {
            for (j, &party) in combo.iter().enumerate() {
                per_party[party].push(SecretKeyShare::new(
                    rank,
                    rows[rank as usize * threshold + j].clone(),
                ));
            }
            rank += 1;
            if !next_combination(&mut combo, parties) {
                break;
            }
        }
        Ok(per_party)
    }

    // ---- scalar operations ----

    pub(crate) fn randomizer(&self, pk: &PublicKey) -> (GroupElement, GroupElement) {
        let r = self.random_below(self.arith.randomness_bound());
        let hr = self.arith.power_of_h(&r);
        let mut pkr = self.arith.exp_g(&pk.0, &r);
        if self.arith.compact() {
            pkr = self.arith.from_delta_k_to_delta(&pkr);
        }
        (hr, pkr)
    }

    pub(crate) fn encrypt_with(
        &self,
        pt: &Plaintext,
        hr: &GroupElement,
        pkr: &GroupElement,
    ) -> Ciphertext {
        let fm = self.arith.power_of_f(&pt.0);
        Ciphertext {
            c1: hr.clone(),
            c2: self.arith.compose_delta(&fm, pkr),
        }
    }

    pub fn encrypt(&self, pk: &PublicKey, pt: &Plaintext) -> Ciphertext {
        let (hr, pkr) = self.randomizer(pk);
        self.encrypt_with(pt, &hr, &pkr)
    }

    pub fn decrypt(&self, sk: &SecretKey, ct: &Ciphertext) -> Result<Plaintext, CryptoError> {
        let mut d = self.arith.exp_g(&ct.c1, sk.expose());
        if self.arith.compact() {
            d = self.arith.from_delta_k_to_delta(&d);
        }
        let r = self.arith.compose_inv_delta(&ct.c2, &d);
        Ok(Plaintext(self.arith.dlog_in_f(&r)?))
    }

    /// Homomorphic addition, re-randomized with a fresh encryption of zero.
    pub fn add(&self, pk: &PublicKey, ct1: &Ciphertext, ct2: &Ciphertext) -> Ciphertext {
        let (hr, pkr) = self.randomizer(pk);
        self.add_with(ct1, ct2, &hr, &pkr)
    }

    pub(crate) fn add_with(
        &self,
        ct1: &Ciphertext,
        ct2: &Ciphertext,
        hr: &GroupElement,
        pkr: &GroupElement,
    ) -> Ciphertext {
        let c1 = self
            .arith
            .compose_g(&self.arith.compose_g(&ct1.c1, &ct2.c1), hr);
        let c2 = self
            .arith
            .compose_delta(&self.arith.compose_delta(&ct1.c2, &ct2.c2), pkr);
        Ciphertext { c1, c2 }
    }

    /// Homomorphic addition without re-randomization: plain composition of
    /// both components. Used on accumulation paths where the result is
    /// randomized once at the end of the batch.
    pub fn add_raw(&self, ct1: &Ciphertext, ct2: &Ciphertext) -> Ciphertext {
        Ciphertext {
            c1: self.arith().compose_g(&ct1.c1, &ct2.c1),
            c2: self.arith().compose_delta(&ct1.c2, &ct2.c2),
        }
    }

    /// Encryption of zero, the identity for homomorphic accumulation.
    pub fn encrypt_zero(&self, pk: &PublicKey) -> Ciphertext {
        self.encrypt(pk, &Plaintext(BigInt::zero()))
    }

    /// Plaintext-scalar multiplication, re-randomized. The scalar is
    /// reduced into the cleartext space first, so negative scalars work.
    pub fn scal(&self, pk: &PublicKey, s: &Plaintext, ct: &Ciphertext) -> Ciphertext {
        let (hr, pkr) = self.randomizer(pk);
        self.scal_with(s, ct, &hr, &pkr)
    }

    pub(crate) fn scal_with(
        &self,
        s: &Plaintext,
        ct: &Ciphertext,
        hr: &GroupElement,
        pkr: &GroupElement,
    ) -> Ciphertext {
        let e = s.0.mod_floor(self.arith.cleartext_bound());
        let c1 = self.arith.compose_g(&self.arith.exp_g(&ct.c1, &e), hr);
        let c2 = self
            .arith
            .compose_delta(&self.arith.exp_delta(&ct.c2, &e), pkr);
        Ciphertext { c1, c2 }
    }

    /// Ciphertext negation: scalar multiplication by `2^k - 1`.
    pub fn negate(&self, pk: &PublicKey, ct: &Ciphertext) -> Ciphertext {
        let minus_one = self.arith.cleartext_bound() - BigInt::one();
        self.scal(pk, &Plaintext(minus_one), ct)
    }

    // ---- plaintext arithmetic, modulo the cleartext bound ----

    pub fn add_plain(&self, a: &Plaintext, b: &Plaintext) -> Plaintext {
        Plaintext((&a.0 + &b.0).mod_floor(self.arith.cleartext_bound()))
    }

    pub fn mul_plain(&self, a: &Plaintext, b: &Plaintext) -> Plaintext {
        Plaintext((&a.0 * &b.0).mod_floor(self.arith.cleartext_bound()))
    }

    pub fn negate_plain(&self, a: &Plaintext) -> Plaintext {
        Plaintext((-&a.0).mod_floor(self.arith.cleartext_bound()))
    }

    pub fn random_plaintext(&self) -> Plaintext {
        Plaintext(self.random_below(self.arith.cleartext_bound()))
    }

    /// Sampling bound for Beaver factors, tight enough that the product of
    /// two samples stays below the cleartext bound.
    pub fn beaver_bound(&self) -> BigInt {
        let half = (self.params.message_bits.saturating_sub(2) / 2).min(16);
        BigInt::one() << half.max(1) as usize
    }

    /// One random Beaver triple `(a, b, a·b)` in plaintext form.
    pub fn random_beaver_triple(&self) -> (Plaintext, Plaintext, Plaintext) {
        let bound = self.beaver_bound();
        let a = Plaintext(self.random_below(&bound));
        let b = Plaintext(self.random_below(&bound));
        let ab = self.mul_plain(&a, &b);
        (a, b, ab)
    }

    // ---- float encoding ----

    /// Encodes a float as a fixed-point integer in the cleartext space;
    /// negatives wrap modulo `2^k`.
    pub fn encode_f64(&self, value: f64) -> Result<Plaintext, CryptoError> {
        let scale = 2f64.powi(self.params.scaling_exponent as i32);
        let scaled = (value * scale).round();
        let v = BigInt::from_f64(scaled).ok_or_else(|| {
            CryptoError::InvalidParameter(format!("cannot encode {value} as plaintext"))
        })?;
        Ok(Plaintext(v.mod_floor(self.arith.cleartext_bound())))
    }

    /// Inverse of [`encode_f64`]: values in the upper half of the cleartext
    /// space decode as negatives.
    pub fn decode_f64(&self, pt: &Plaintext) -> Result<f64, CryptoError> {
        let bound = self.arith.cleartext_bound();
        let half = bound >> 1usize;
        let v = pt.0.mod_floor(bound);
        let signed = if v < half { v } else { v - bound };
        let scale = 2f64.powi(self.params.scaling_exponent as i32);
        signed
            .to_f64()
            .map(|f| f / scale)
            .ok_or_else(|| CryptoError::CryptoFailure("plaintext exceeds f64 range".into()))
    }

    // ---- threshold decryption ----

    pub fn part_decrypt(&self, share: &SecretKeyShare, ct: &Ciphertext) -> PartDecryption {
        let mut d = self.arith.exp_g(&ct.c1, share.expose());
        if self.arith.compact() {
            d = self.arith.from_delta_k_to_delta(&d);
        }
        PartDecryption(d)
    }

    /// Combines `t` partial decryptions taken for the same threshold
    /// combination back into the plaintext.
    pub fn combine(
        &self,
        ct: &Ciphertext,
        parts: &[PartDecryption],
    ) -> Result<Plaintext, CryptoError> {
        if parts.is_empty() {
            return Err(CryptoError::ThresholdNotMet(
                "no partial decryptions supplied".into(),
            ));
        }
        let coeffs = lambda(parts.len());
        let mut d = GroupElement::identity();
        for (part, coeff) in parts.iter().zip(&coeffs) {
            let term = self.arith.exp_delta(&part.0, &BigInt::from(*coeff));
            d = self.arith.compose_delta(&d, &term);
        }
        let r = self.arith.compose_inv_delta(&ct.c2, &d);
        let m = self.arith.dlog_in_f(&r).map_err(|_| {
            CryptoError::ThresholdNotMet(
                "partial decryptions do not combine to a plaintext".into(),
            )
        })?;
        Ok(Plaintext(m))
    }

    /// Signed view of a decrypted value, folding the upper half of the
    /// cleartext space to negatives.
    pub fn to_signed(&self, pt: &Plaintext) -> BigInt {
        let bound = self.arith.cleartext_bound();
        let half = bound >> 1usize;
        let v = pt.0.mod_floor(bound);
        if v.abs() < half {
            v
        } else {
            v - bound
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cofhe_test_helpers::shared_rng_from_seed;

    fn system() -> DefaultCryptoSystem {
        DefaultCryptoSystem::new(CryptoParams::new(128, 64))
            .unwrap()
            .with_rng(shared_rng_from_seed(7))
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let cs = system();
        let sk = cs.keygen();
        let pk = cs.derive_public(&sk);
        for v in [0u64, 1, 230, u32::MAX as u64] {
            let pt = Plaintext::from_u64(v);
            let ct = cs.encrypt(&pk, &pt);
            assert_eq!(cs.decrypt(&sk, &ct).unwrap(), pt);
        }
    }

    #[test]
    fn homomorphic_add() {
        let cs = system();
        let sk = cs.keygen();
        let pk = cs.derive_public(&sk);
        let ct = cs.add(
            &pk,
            &cs.encrypt(&pk, &Plaintext::from_u64(1200)),
            &cs.encrypt(&pk, &Plaintext::from_u64(34)),
        );
        assert_eq!(cs.decrypt(&sk, &ct).unwrap(), Plaintext::from_u64(1234));
    }

    #[test]
    fn scalar_multiplication() {
        let cs = system();
        let sk = cs.keygen();
        let pk = cs.derive_public(&sk);
        let ct = cs.scal(
            &pk,
            &Plaintext::from_u64(20),
            &cs.encrypt(&pk, &Plaintext::from_u64(230)),
        );
        assert_eq!(cs.decrypt(&sk, &ct).unwrap(), Plaintext::from_u64(4600));
    }

    #[test]
    fn negate_then_add_cancels() {
        let cs = system();
        let sk = cs.keygen();
        let pk = cs.derive_public(&sk);
        let ct = cs.encrypt(&pk, &Plaintext::from_u64(77));
        let sum = cs.add(&pk, &ct, &cs.negate(&pk, &ct));
        assert_eq!(cs.decrypt(&sk, &sum).unwrap(), Plaintext::from_u64(0));
    }

    #[test]
    fn threshold_two_of_three_reconstructs() {
        let cs = system();
        let sk = cs.keygen();
        let pk = cs.derive_public(&sk);
        let shares = cs.split(&sk, 2, 3).unwrap();
        assert_eq!(shares.len(), 3);
        for party in &shares {
            assert_eq!(party.len(), 2); // C(2,1) combinations contain each party
        }
        let ct = cs.encrypt(&pk, &Plaintext::from_u64(9001));

        // every 2-of-3 combination reconstructs
        for combo in [[0usize, 1], [0, 2], [1, 2]] {
            let rank = crate::threshold::combination_rank(3, 2, &combo);
            let parts: Vec<_> = combo
                .iter()
                .map(|&p| {
                    let share = shares[p]
                        .iter()
                        .find(|s| s.combination == rank)
                        .expect("party holds its combination share");
                    cs.part_decrypt(share, &ct)
                })
                .collect();
            assert_eq!(cs.combine(&ct, &parts).unwrap(), Plaintext::from_u64(9001));
        }
    }

    #[test]
    fn mismatched_combination_fails_threshold() {
        let cs = system();
        let sk = cs.keygen();
        let pk = cs.derive_public(&sk);
        let shares = cs.split(&sk, 2, 3).unwrap();
        let ct = cs.encrypt(&pk, &Plaintext::from_u64(5));

        // parties 0 and 1 answer with shares of different combinations
        let rank01 = crate::threshold::combination_rank(3, 2, &[0, 1]);
        let rank02 = crate::threshold::combination_rank(3, 2, &[0, 2]);
        let p0 = cs.part_decrypt(
            shares[0].iter().find(|s| s.combination == rank02).unwrap(),
            &ct,
        );
        let p1 = cs.part_decrypt(
            shares[1].iter().find(|s| s.combination == rank01).unwrap(),
            &ct,
        );
        assert!(matches!(
            cs.combine(&ct, &[p0, p1]),
            Err(CryptoError::ThresholdNotMet(_))
        ));
    }

    #[test]
    fn beaver_triple_product_within_bound() {
        let cs = system();
        let (a, b, ab) = cs.random_beaver_triple();
        assert_eq!(cs.mul_plain(&a, &b), ab);
        assert!(ab.0 < *cs.cleartext_bound());
    }

    #[test]
    fn float_encoding_wraps_negatives() {
        let cs = system();
        let pt = cs.encode_f64(-3.0).unwrap();
        assert_eq!(cs.decode_f64(&pt).unwrap(), -3.0);
        let pt = cs.encode_f64(42.0).unwrap();
        assert_eq!(cs.decode_f64(&pt).unwrap(), 42.0);
    }

    #[test]
    fn plaintext_arithmetic_is_modular() {
        let cs = system();
        let bound = cs.cleartext_bound().clone();
        let a = Plaintext(&bound - BigInt::one());
        let sum = cs.add_plain(&a, &Plaintext::from_u64(2));
        assert_eq!(sum, Plaintext::from_u64(1));
        assert_eq!(cs.to_signed(&a), BigInt::from(-1));
    }
}
