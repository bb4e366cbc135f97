// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use anyhow::Result;
use cofhe_crypto::{Ciphertext, CryptoSystem, GroupArith, Plaintext, PublicKey};
use cofhe_tensor::Tensor;
use tracing::debug;

/// Produces batches of encrypted Beaver triples on the node holding the
/// public key. Factors are sampled below the multiplication-safe sub-bound
/// so the product stays inside the cleartext space.
#[derive(Clone)]
pub struct BeaverTripletGenerator<G: GroupArith> {
    system: CryptoSystem<G>,
    public_key: PublicKey,
}

impl<G: GroupArith> BeaverTripletGenerator<G> {
    pub fn new(system: CryptoSystem<G>, public_key: PublicKey) -> Self {
        BeaverTripletGenerator { system, public_key }
    }

    /// `count` triples as an encrypted `[count, 3]` tensor, encrypted as
    /// one batch. The returned ciphertexts are owned by the caller.
    pub fn generate(&self, count: usize) -> Result<Tensor<Ciphertext>> {
        debug!(count, "generating beaver triples");
        let mut leaves: Vec<Plaintext> = Vec::with_capacity(count * 3);
        for _ in 0..count {
            let (a, b, ab) = self.system.random_beaver_triple();
            leaves.push(a);
            leaves.push(b);
            leaves.push(ab);
        }
        let plain = Tensor::from_vec(&[count, 3], leaves)?;
        Ok(self.system.encrypt_tensor(&self.public_key, &plain)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cofhe_crypto::{CryptoParams, DefaultCryptoSystem};
    use cofhe_test_helpers::shared_rng_from_seed;

    #[test]
    fn generated_triples_decrypt_consistently() {
        let cs = DefaultCryptoSystem::new(CryptoParams::new(80, 32))
            .unwrap()
            .with_rng(shared_rng_from_seed(21));
        let sk = cs.keygen();
        let pk = cs.derive_public(&sk);
        let generator = BeaverTripletGenerator::new(cs.clone(), pk);
        let triples = generator.generate(5).unwrap();
        assert_eq!(triples.shape(), &[5, 3]);
        let plain = cs.decrypt_tensor(&sk, &triples).unwrap();
        for i in 0..5 {
            let a = plain.at2(i, 0).unwrap();
            let b = plain.at2(i, 1).unwrap();
            let ab = plain.at2(i, 2).unwrap();
            assert_eq!(cs.mul_plain(a, b), *ab);
        }
    }
}
