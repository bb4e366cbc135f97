// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

//! Ciphertext-by-ciphertext multiplication via Beaver triples.
//!
//! For `x·y` with triple `(a, b, ab)`: open `e1 = x - a` and `e2 = y - b`
//! through the decryption oracle, then assemble
//! `Enc(x·y) = ab ⊕ e1·b ⊕ e2·a ⊕ Enc(e1·e2)`. Correct as long as the
//! product stays under the cleartext bound.

use crate::client::{BeaverTriple, SmpcClient};
use anyhow::{bail, Context, Result};
use cofhe_crypto::{Ciphertext, GroupArith, Plaintext};
use cofhe_tensor::Tensor;
use rayon::prelude::*;
use tracing::debug;

pub struct CipherMultiplier<'a, G: GroupArith> {
    client: &'a SmpcClient<G>,
}

impl<'a, G: GroupArith> CipherMultiplier<'a, G> {
    pub fn new(client: &'a SmpcClient<G>) -> Self {
        CipherMultiplier { client }
    }

    /// One Beaver multiplication; the consumed triple is released with the
    /// call.
    pub async fn mul(&self, x: &Ciphertext, y: &Ciphertext) -> Result<Ciphertext> {
        let mut triples = self.client.get_beaver_triples(1).await?;
        let triple = triples.pop().context("empty beaver triple batch")?;
        let sys = self.client.system();
        let pk = self.client.public_key();

        let e1_ct = sys.add(pk, x, &sys.negate(pk, &triple.a));
        let e2_ct = sys.add(pk, y, &sys.negate(pk, &triple.b));
        let e1 = self.client.decrypt(&e1_ct).await?;
        let e2 = self.client.decrypt(&e2_ct).await?;

        let enc_e1e2 = sys.encrypt(pk, &sys.mul_plain(&e1, &e2));
        let e1_b = sys.scal(pk, &e1, &triple.b);
        let e2_a = sys.scal(pk, &e2, &triple.a);
        let mut acc = sys.add(pk, &e1_b, &e2_a);
        acc = sys.add(pk, &acc, &triple.ab);
        acc = sys.add(pk, &acc, &enc_e1e2);
        Ok(acc)
    }

    /// Pointwise multiplication of two equal-length ciphertext slices with
    /// one batched triple draw and two batched decryption rounds.
    pub async fn mul_vector(
        &self,
        xs: &[Ciphertext],
        ys: &[Ciphertext],
    ) -> Result<Vec<Ciphertext>> {
        if xs.len() != ys.len() {
            bail!(
                "invalid shape: pointwise multiplication of {} against {} elements",
                xs.len(),
                ys.len()
            );
        }
        let n = xs.len();
        let triples = self.client.get_beaver_triples(n).await?;
        let sys = self.client.system();
        let pk = self.client.public_key();

        let (a, (b, ab)): (Vec<Ciphertext>, (Vec<Ciphertext>, Vec<Ciphertext>)) = triples
            .into_iter()
            .map(|BeaverTriple { a, b, ab }| (a, (b, ab)))
            .unzip();

        let e1_ct = sys.add_vectors(pk, xs, &sys.negate_vector(pk, &a))?;
        let e2_ct = sys.add_vectors(pk, ys, &sys.negate_vector(pk, &b))?;
        let e1 = self
            .client
            .decrypt_tensor(&Tensor::from_vec(&[n], e1_ct)?)
            .await?
            .to_vec();
        let e2 = self
            .client
            .decrypt_tensor(&Tensor::from_vec(&[n], e2_ct)?)
            .await?
            .to_vec();

        let e1e2: Vec<Plaintext> = e1
            .par_iter()
            .zip(e2.par_iter())
            .map(|(p, q)| sys.mul_plain(p, q))
            .collect();
        let enc_e1e2 = sys.encrypt_vector(pk, &e1e2);
        let e1_b = sys.scal_vector_pairwise(pk, &e1, &b)?;
        let e2_a = sys.scal_vector_pairwise(pk, &e2, &a)?;

        let mut acc = sys.add_vectors(pk, &e1_b, &e2_a)?;
        acc = sys.add_vectors(pk, &acc, &ab)?;
        acc = sys.add_vectors(pk, &acc, &enc_e1e2)?;
        Ok(acc)
    }

    /// Tensor multiplication: pointwise for rank-1 operands, matrix product
    /// for rank-2 operands.
    pub async fn mul_tensors(
        &self,
        x: &Tensor<Ciphertext>,
        y: &Tensor<Ciphertext>,
    ) -> Result<Tensor<Ciphertext>> {
        if x.num_elements() == 1 && y.num_elements() == 1 {
            let xv = x.value().context("single-element tensor")?;
            let yv = y.value().context("single-element tensor")?;
            return Ok(Tensor::scalar(self.mul(xv, yv).await?));
        }
        match (x.rank(), y.rank()) {
            (1, 1) => {
                let out = self.mul_vector(&x.to_vec(), &y.to_vec()).await?;
                Ok(Tensor::from_vec(&[out.len()], out)?)
            }
            (2, 2) => self.matmul(x, y).await,
            _ => bail!(
                "not implemented: multiplication of rank {} by rank {}",
                x.rank(),
                y.rank()
            ),
        }
    }

    /// `[n×m] · [m×p]` expanded into `n·m·p` pointwise Beaver
    /// multiplications (one batched draw), then accumulated over the
    /// reduction axis. Accumulation parallelizes across output cells; the
    /// inner reduction stays sequential.
    async fn matmul(
        &self,
        x: &Tensor<Ciphertext>,
        y: &Tensor<Ciphertext>,
    ) -> Result<Tensor<Ciphertext>> {
        let (n, m) = (x.shape()[0], x.shape()[1]);
        let (m2, p) = (y.shape()[0], y.shape()[1]);
        if m != m2 {
            bail!("invalid shape: cannot multiply [{n}x{m}] by [{m2}x{p}]");
        }
        debug!(n, m, p, "ciphertext matmul");

        let xv = x.to_vec();
        let yv = y.to_vec();
        let mut lhs = Vec::with_capacity(n * m * p);
        let mut rhs = Vec::with_capacity(n * m * p);
        for i in 0..n {
            for j in 0..m {
                for k in 0..p {
                    lhs.push(xv[i * m + j].clone());
                    rhs.push(yv[j * p + k].clone());
                }
            }
        }
        let products = self.mul_vector(&lhs, &rhs).await?;

        let sys = self.client.system();
        let zero = sys.encrypt_zero(self.client.public_key());
        let cells: Vec<Ciphertext> = (0..n * p)
            .into_par_iter()
            .map(|cell| {
                let (i, k) = (cell / p, cell % p);
                let mut acc = zero.clone();
                for j in 0..m {
                    acc = sys.add_raw(&acc, &products[i * m * p + j * p + k]);
                }
                acc
            })
            .collect();
        Ok(Tensor::from_vec(&[n, p], cells)?)
    }
}
