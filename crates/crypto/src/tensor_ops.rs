// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

//! Vector and tensor fan-outs of the scalar operations. Leaf loops are
//! data-parallel; randomness is drawn up front under the RNG lock, one
//! randomizer per batch by default or one per element in strict mode.

use crate::arith::{GroupArith, GroupElement};
use crate::error::CryptoError;
use crate::system::CryptoSystem;
use crate::types::{Ciphertext, PartDecryption, Plaintext, PublicKey, SecretKey, SecretKeyShare};
use cofhe_tensor::Tensor;
use rayon::prelude::*;

impl<G: GroupArith> CryptoSystem<G> {
    fn batch_randomizers(&self, pk: &PublicKey, count: usize) -> Vec<(GroupElement, GroupElement)> {
        let n = if self.params().reuse_batch_randomness {
            1
        } else {
            count.max(1)
        };
        (0..n).map(|_| self.randomizer(pk)).collect()
    }

    // ---- vectors ----

    pub fn encrypt_vector(&self, pk: &PublicKey, pts: &[Plaintext]) -> Vec<Ciphertext> {
        let rands = self.batch_randomizers(pk, pts.len());
        pts.par_iter()
            .enumerate()
            .map(|(i, pt)| {
                let (hr, pkr) = &rands[i % rands.len()];
                self.encrypt_with(pt, hr, pkr)
            })
            .collect()
    }

    pub fn decrypt_vector(
        &self,
        sk: &SecretKey,
        cts: &[Ciphertext],
    ) -> Result<Vec<Plaintext>, CryptoError> {
        cts.par_iter().map(|ct| self.decrypt(sk, ct)).collect()
    }

    pub fn part_decrypt_vector(
        &self,
        share: &SecretKeyShare,
        cts: &[Ciphertext],
    ) -> Vec<PartDecryption> {
        cts.par_iter().map(|ct| self.part_decrypt(share, ct)).collect()
    }

    /// Pointwise recombination: `parts[j]` is the j-th node's vector of
    /// partial decryptions, all taken for the same combination.
    pub fn combine_vector(
        &self,
        cts: &[Ciphertext],
        parts: &[Vec<PartDecryption>],
    ) -> Result<Vec<Plaintext>, CryptoError> {
        for p in parts {
            if p.len() != cts.len() {
                return Err(CryptoError::SizeMismatch {
                    expected: cts.len(),
                    got: p.len(),
                });
            }
        }
        cts.par_iter()
            .enumerate()
            .map(|(i, ct)| {
                let slice: Vec<PartDecryption> =
                    parts.iter().map(|p| p[i].clone()).collect();
                self.combine(ct, &slice)
            })
            .collect()
    }

    pub fn add_vectors(
        &self,
        pk: &PublicKey,
        a: &[Ciphertext],
        b: &[Ciphertext],
    ) -> Result<Vec<Ciphertext>, CryptoError> {
        if a.len() != b.len() {
            return Err(CryptoError::SizeMismatch {
                expected: a.len(),
                got: b.len(),
            });
        }
        let rands = self.batch_randomizers(pk, a.len());
        Ok(a.par_iter()
            .zip(b.par_iter())
            .enumerate()
            .map(|(i, (x, y))| {
                let (hr, pkr) = &rands[i % rands.len()];
                self.add_with(x, y, hr, pkr)
            })
            .collect())
    }

    pub fn scal_vector(&self, pk: &PublicKey, s: &Plaintext, cts: &[Ciphertext]) -> Vec<Ciphertext> {
        let rands = self.batch_randomizers(pk, cts.len());
        cts.par_iter()
            .enumerate()
            .map(|(i, ct)| {
                let (hr, pkr) = &rands[i % rands.len()];
                self.scal_with(s, ct, hr, pkr)
            })
            .collect()
    }

    pub fn scal_vector_pairwise(
        &self,
        pk: &PublicKey,
        scalars: &[Plaintext],
        cts: &[Ciphertext],
    ) -> Result<Vec<Ciphertext>, CryptoError> {
        if scalars.len() != cts.len() {
            return Err(CryptoError::SizeMismatch {
                expected: cts.len(),
                got: scalars.len(),
            });
        }
        let rands = self.batch_randomizers(pk, cts.len());
        Ok(scalars
            .par_iter()
            .zip(cts.par_iter())
            .enumerate()
            .map(|(i, (s, ct))| {
                let (hr, pkr) = &rands[i % rands.len()];
                self.scal_with(s, ct, hr, pkr)
            })
            .collect())
    }

    pub fn negate_vector(&self, pk: &PublicKey, cts: &[Ciphertext]) -> Vec<Ciphertext> {
        let minus_one = Plaintext(self.cleartext_bound() - num_bigint::BigInt::from(1u32));
        self.scal_vector(pk, &minus_one, cts)
    }

    // ---- tensors ----

    pub fn encrypt_tensor(
        &self,
        pk: &PublicKey,
        pts: &Tensor<Plaintext>,
    ) -> Result<Tensor<Ciphertext>, CryptoError> {
        let leaves = self.encrypt_vector(pk, &pts.to_vec());
        Ok(Tensor::from_vec(pts.shape(), leaves)?)
    }

    pub fn decrypt_tensor(
        &self,
        sk: &SecretKey,
        cts: &Tensor<Ciphertext>,
    ) -> Result<Tensor<Plaintext>, CryptoError> {
        let leaves = self.decrypt_vector(sk, &cts.to_vec())?;
        Ok(Tensor::from_vec(cts.shape(), leaves)?)
    }

    pub fn part_decrypt_tensor(
        &self,
        share: &SecretKeyShare,
        cts: &Tensor<Ciphertext>,
    ) -> Result<Tensor<PartDecryption>, CryptoError> {
        let leaves = self.part_decrypt_vector(share, &cts.to_vec());
        Ok(Tensor::from_vec(cts.shape(), leaves)?)
    }

    /// Pointwise recombination over tensors; every node's tensor must have
    /// the ciphertext tensor's shape.
    pub fn combine_tensor(
        &self,
        cts: &Tensor<Ciphertext>,
        parts: &[Tensor<PartDecryption>],
    ) -> Result<Tensor<Plaintext>, CryptoError> {
        for p in parts {
            if p.num_elements() != cts.num_elements() {
                return Err(CryptoError::SizeMismatch {
                    expected: cts.num_elements(),
                    got: p.num_elements(),
                });
            }
        }
        let part_vecs: Vec<Vec<PartDecryption>> = parts.iter().map(|p| p.to_vec()).collect();
        let leaves = self.combine_vector(&cts.to_vec(), &part_vecs)?;
        Ok(Tensor::from_vec(cts.shape(), leaves)?)
    }

    /// Aligns two tensors for a pointwise operation, broadcasting the
    /// smaller onto the larger when the shapes divide.
    fn align_pair<A: Clone, B: Clone>(
        a: &Tensor<A>,
        b: &Tensor<B>,
    ) -> Result<(Tensor<A>, Tensor<B>), CryptoError> {
        if a.shape() == b.shape() {
            return Ok((a.clone(), b.clone()));
        }
        if a.num_elements() >= b.num_elements() {
            let b = b.broadcast(a.shape())?;
            Ok((a.clone(), b))
        } else {
            let a = a.broadcast(b.shape())?;
            Ok((a, b.clone()))
        }
    }

    pub fn add_tensors(
        &self,
        pk: &PublicKey,
        a: &Tensor<Ciphertext>,
        b: &Tensor<Ciphertext>,
    ) -> Result<Tensor<Ciphertext>, CryptoError> {
        let (a, b) = Self::align_pair(a, b)?;
        let leaves = self.add_vectors(pk, &a.to_vec(), &b.to_vec())?;
        Ok(Tensor::from_vec(a.shape(), leaves)?)
    }

    /// Pointwise plaintext-scalar multiplication of a ciphertext tensor.
    pub fn scal_tensors(
        &self,
        pk: &PublicKey,
        scalars: &Tensor<Plaintext>,
        cts: &Tensor<Ciphertext>,
    ) -> Result<Tensor<Ciphertext>, CryptoError> {
        let (cts, scalars) = Self::align_pair(cts, scalars)?;
        let leaves = self.scal_vector_pairwise(pk, &scalars.to_vec(), &cts.to_vec())?;
        Ok(Tensor::from_vec(cts.shape(), leaves)?)
    }

    pub fn negate_tensor(
        &self,
        pk: &PublicKey,
        cts: &Tensor<Ciphertext>,
    ) -> Result<Tensor<Ciphertext>, CryptoError> {
        let minus_one = Plaintext(
            self.cleartext_bound() - num_bigint::BigInt::from(1u32),
        );
        let leaves = self.scal_vector(pk, &minus_one, &cts.to_vec());
        Ok(Tensor::from_vec(cts.shape(), leaves)?)
    }

    pub fn add_plain_tensors(
        &self,
        a: &Tensor<Plaintext>,
        b: &Tensor<Plaintext>,
    ) -> Result<Tensor<Plaintext>, CryptoError> {
        let (a, b) = Self::align_pair(a, b)?;
        let (av, bv) = (a.to_vec(), b.to_vec());
        let leaves = av
            .par_iter()
            .zip(bv.par_iter())
            .map(|(x, y)| self.add_plain(x, y))
            .collect();
        Ok(Tensor::from_vec(a.shape(), leaves)?)
    }

    pub fn mul_plain_tensors(
        &self,
        a: &Tensor<Plaintext>,
        b: &Tensor<Plaintext>,
    ) -> Result<Tensor<Plaintext>, CryptoError> {
        let (a, b) = Self::align_pair(a, b)?;
        let (av, bv) = (a.to_vec(), b.to_vec());
        let leaves = av
            .par_iter()
            .zip(bv.par_iter())
            .map(|(x, y)| self.mul_plain(x, y))
            .collect();
        Ok(Tensor::from_vec(a.shape(), leaves)?)
    }

    pub fn negate_plain_tensor(
        &self,
        pts: &Tensor<Plaintext>,
    ) -> Result<Tensor<Plaintext>, CryptoError> {
        let leaves = pts
            .to_vec()
            .par_iter()
            .map(|p| self.negate_plain(p))
            .collect();
        Ok(Tensor::from_vec(pts.shape(), leaves)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::{CryptoParams, DefaultCryptoSystem};
    use cofhe_test_helpers::shared_rng_from_seed;

    fn system() -> DefaultCryptoSystem {
        DefaultCryptoSystem::new(CryptoParams::new(80, 32))
            .unwrap()
            .with_rng(shared_rng_from_seed(11))
    }

    fn keys(cs: &DefaultCryptoSystem) -> (crate::types::SecretKey, PublicKey) {
        let sk = cs.keygen();
        let pk = cs.derive_public(&sk);
        (sk, pk)
    }

    #[test]
    fn tensor_encrypt_decrypt_round_trip() {
        let cs = system();
        let (sk, pk) = keys(&cs);
        let pts = Tensor::from_fn(&[3, 4], |i| Plaintext::from_u64(i as u64));
        let cts = cs.encrypt_tensor(&pk, &pts).unwrap();
        let back = cs.decrypt_tensor(&sk, &cts).unwrap();
        assert_eq!(back, pts);
    }

    #[test]
    fn batch_reuse_shares_the_randomizer() {
        let cs = system();
        let (_, pk) = keys(&cs);
        let pts = vec![Plaintext::from_u64(1), Plaintext::from_u64(2)];
        let cts = cs.encrypt_vector(&pk, &pts);
        assert_eq!(cts[0].c1, cts[1].c1);
    }

    #[test]
    fn strict_mode_draws_per_element() {
        let mut params = CryptoParams::new(80, 32);
        params.reuse_batch_randomness = false;
        let cs = DefaultCryptoSystem::new(params)
            .unwrap()
            .with_rng(shared_rng_from_seed(12));
        let (sk, pk) = keys(&cs);
        let pts = vec![Plaintext::from_u64(1), Plaintext::from_u64(2)];
        let cts = cs.encrypt_vector(&pk, &pts);
        assert_ne!(cts[0].c1, cts[1].c1);
        assert_eq!(
            cs.decrypt_vector(&sk, &cts).unwrap(),
            pts
        );
    }

    #[test]
    fn tensor_addition_of_ones_gives_twos() {
        let cs = system();
        let (sk, pk) = keys(&cs);
        let ones = Tensor::new(&[8, 8], Plaintext::from_u64(1));
        let ct = cs.encrypt_tensor(&pk, &ones).unwrap();
        let sum = cs.add_tensors(&pk, &ct, &ct).unwrap();
        let back = cs.decrypt_tensor(&sk, &sum).unwrap();
        assert_eq!(back, Tensor::new(&[8, 8], Plaintext::from_u64(2)));
    }

    #[test]
    fn add_tensors_broadcasts_the_smaller_operand() {
        let cs = system();
        let (sk, pk) = keys(&cs);
        let a = Tensor::from_fn(&[2, 3], |i| Plaintext::from_u64(i as u64));
        let row = Tensor::from_fn(&[3], |i| Plaintext::from_u64(10 * (i as u64 + 1)));
        let ca = cs.encrypt_tensor(&pk, &a).unwrap();
        let crow = cs.encrypt_tensor(&pk, &row).unwrap();
        let sum = cs.add_tensors(&pk, &ca, &crow).unwrap();
        let back = cs.decrypt_tensor(&sk, &sum).unwrap();
        let expected = Tensor::from_fn(&[2, 3], |i| {
            Plaintext::from_u64(i as u64 + 10 * (i as u64 % 3 + 1))
        });
        assert_eq!(back, expected);
    }

    #[test]
    fn scal_tensor_elementwise() {
        let cs = system();
        let (sk, pk) = keys(&cs);
        let pts = Tensor::from_fn(&[4], |i| Plaintext::from_u64(i as u64 + 1));
        let scalars = Tensor::from_fn(&[4], |i| Plaintext::from_u64(i as u64 + 5));
        let cts = cs.encrypt_tensor(&pk, &pts).unwrap();
        let scaled = cs.scal_tensors(&pk, &scalars, &cts).unwrap();
        let back = cs.decrypt_tensor(&sk, &scaled).unwrap();
        let expected = Tensor::from_fn(&[4], |i| {
            Plaintext::from_u64((i as u64 + 1) * (i as u64 + 5))
        });
        assert_eq!(back, expected);
    }

    #[test]
    fn tensor_threshold_decryption() {
        let cs = system();
        let sk = cs.keygen();
        let pk = cs.derive_public(&sk);
        let shares = cs.split(&sk, 2, 3).unwrap();
        let pts = Tensor::from_fn(&[2, 2], |i| Plaintext::from_u64(100 + i as u64));
        let cts = cs.encrypt_tensor(&pk, &pts).unwrap();

        let rank = crate::threshold::combination_rank(3, 2, &[0, 2]);
        let parts: Vec<_> = [0usize, 2]
            .iter()
            .map(|&p| {
                let share = shares[p]
                    .iter()
                    .find(|s| s.combination == rank)
                    .expect("share for combination");
                cs.part_decrypt_tensor(share, &cts).unwrap()
            })
            .collect();
        let back = cs.combine_tensor(&cts, &parts).unwrap();
        assert_eq!(back, pts);
    }
}
