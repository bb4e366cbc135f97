// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use crate::arith::GroupElement;
use num_bigint::BigInt;
use num_traits::Zero;
use zeroize::Zeroize;

/// Secret decryption key: an integer in the encryption randomness range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecretKey(pub(crate) BigInt);

impl SecretKey {
    pub fn new(value: BigInt) -> Self {
        SecretKey(value)
    }

    pub fn expose(&self) -> &BigInt {
        &self.0
    }
}

impl Zeroize for SecretKey {
    fn zeroize(&mut self) {
        self.0 = BigInt::zero();
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}

/// One party's share of the secret key for one threshold combination.
///
/// `combination` is the lexicographic rank of the t-subset this share
/// reconstructs with; every partial-decryption request names a rank and the
/// holder answers with the matching share.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecretKeyShare {
    pub combination: u64,
    pub(crate) value: BigInt,
}

impl SecretKeyShare {
    pub fn new(combination: u64, value: BigInt) -> Self {
        SecretKeyShare { combination, value }
    }

    pub fn expose(&self) -> &BigInt {
        &self.value
    }
}

impl Zeroize for SecretKeyShare {
    fn zeroize(&mut self) {
        self.value = BigInt::zero();
    }
}

impl Drop for SecretKeyShare {
    fn drop(&mut self) {
        self.zeroize();
    }
}

/// Public encryption key: a single group element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey(pub GroupElement);

/// Plaintext scalar: a point in `Z / 2^k Z` held as a signed big integer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Plaintext(pub BigInt);

impl Plaintext {
    pub fn from_u64(v: u64) -> Self {
        Plaintext(BigInt::from(v))
    }

    pub fn from_i64(v: i64) -> Self {
        Plaintext(BigInt::from(v))
    }
}

impl From<BigInt> for Plaintext {
    fn from(v: BigInt) -> Self {
        Plaintext(v)
    }
}

/// Ciphertext pair `(c1, c2)` with `c1 ∈ Cl_G` and `c2 ∈ Cl_Δ`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ciphertext {
    pub c1: GroupElement,
    pub c2: GroupElement,
}

/// One party's contribution to a joint decryption: an element of `Cl_Δ`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartDecryption(pub GroupElement);
