// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

//! Byte-stable serialization.
//!
//! Tensors use the little-endian offset-table layout:
//!
//! ```text
//! u32  rank
//! u32  dim[rank]
//! u64  offset[num_elements * fields_per_leaf + 1]   // top bit = sign
//! byte data[...]                                    // LE magnitudes
//! ```
//!
//! The final offset entry is a sentinel holding the data length, so every
//! field has an explicit `[start, end)`. Scalars travel as space-separated
//! decimal text, one integer per group-element coefficient.

use crate::error::CryptoError;
use crate::types::{Ciphertext, PartDecryption, Plaintext, PublicKey, SecretKeyShare};
use crate::arith::GroupElement;
use cofhe_tensor::Tensor;
use num_bigint::{BigInt, Sign};
use rayon::prelude::*;

const SIGN_BIT: u64 = 1 << 63;
const MAX_RANK: u32 = 32;
const MAX_ELEMENTS: usize = 1 << 28;

/// A leaf type with a fixed number of big-integer fields on the wire:
/// 1 for plaintexts, 3 for partial decryptions, 6 for ciphertexts.
pub trait WireLeaf: Clone + Send + Sync {
    const FIELDS: usize;
    fn to_fields(&self) -> Vec<BigInt>;
    fn from_fields(fields: Vec<BigInt>) -> Self;
}

impl WireLeaf for Plaintext {
    const FIELDS: usize = 1;

    fn to_fields(&self) -> Vec<BigInt> {
        vec![self.0.clone()]
    }

    fn from_fields(mut fields: Vec<BigInt>) -> Self {
        Plaintext(fields.swap_remove(0))
    }
}

impl WireLeaf for PartDecryption {
    const FIELDS: usize = 3;

    fn to_fields(&self) -> Vec<BigInt> {
        vec![self.0.a.clone(), self.0.b.clone(), self.0.c.clone()]
    }

    fn from_fields(fields: Vec<BigInt>) -> Self {
        let mut it = fields.into_iter();
        let (a, b, c) = (
            it.next().unwrap_or_default(),
            it.next().unwrap_or_default(),
            it.next().unwrap_or_default(),
        );
        PartDecryption(GroupElement::new(a, b, c))
    }
}

impl WireLeaf for Ciphertext {
    const FIELDS: usize = 6;

    fn to_fields(&self) -> Vec<BigInt> {
        vec![
            self.c1.a.clone(),
            self.c1.b.clone(),
            self.c1.c.clone(),
            self.c2.a.clone(),
            self.c2.b.clone(),
            self.c2.c.clone(),
        ]
    }

    fn from_fields(fields: Vec<BigInt>) -> Self {
        let mut it = fields.into_iter();
        let mut next = || it.next().unwrap_or_default();
        let c1 = GroupElement::new(next(), next(), next());
        let c2 = GroupElement::new(next(), next(), next());
        Ciphertext { c1, c2 }
    }
}

pub fn serialize_tensor<T: WireLeaf>(tensor: &Tensor<T>) -> Vec<u8> {
    let n = tensor.num_elements();
    let fields: Vec<BigInt> = tensor
        .leaves()
        .into_iter()
        .flat_map(|leaf| leaf.to_fields())
        .collect();

    let encoded: Vec<(bool, Vec<u8>)> = fields
        .par_iter()
        .map(|f| {
            let (sign, bytes) = f.to_bytes_le();
            (sign == Sign::Minus, bytes)
        })
        .collect();

    let mut out = Vec::new();
    out.extend_from_slice(&(tensor.rank() as u32).to_le_bytes());
    for &dim in tensor.shape() {
        out.extend_from_slice(&(dim as u32).to_le_bytes());
    }

    let mut offset = 0u64;
    for (negative, bytes) in &encoded {
        let entry = offset | if *negative { SIGN_BIT } else { 0 };
        out.extend_from_slice(&entry.to_le_bytes());
        offset += bytes.len() as u64;
    }
    // sentinel: total data length, no sign flag
    out.extend_from_slice(&offset.to_le_bytes());

    debug_assert_eq!(encoded.len(), n * T::FIELDS);
    for (_, bytes) in &encoded {
        out.extend_from_slice(bytes);
    }
    out
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], CryptoError> {
        if self.pos + len > self.data.len() {
            return Err(CryptoError::Codec("truncated tensor payload".into()));
        }
        let s = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(s)
    }

    fn u32(&mut self) -> Result<u32, CryptoError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, CryptoError> {
        let b = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_le_bytes(buf))
    }
}

pub fn deserialize_tensor<T: WireLeaf>(data: &[u8]) -> Result<Tensor<T>, CryptoError> {
    let mut r = Reader { data, pos: 0 };
    let rank = r.u32()?;
    if rank > MAX_RANK {
        return Err(CryptoError::Codec(format!("tensor rank {rank} too large")));
    }
    let mut shape = Vec::with_capacity(rank as usize);
    let mut n: usize = 1;
    for _ in 0..rank {
        let dim = r.u32()? as usize;
        n = n
            .checked_mul(dim)
            .filter(|&v| v <= MAX_ELEMENTS)
            .ok_or_else(|| CryptoError::Codec("tensor element count overflow".into()))?;
        shape.push(dim);
    }

    let entries = n * T::FIELDS + 1;
    if r.pos + entries * 8 > data.len() {
        return Err(CryptoError::Codec("truncated offset table".into()));
    }
    let mut offsets = Vec::with_capacity(entries);
    let mut signs = Vec::with_capacity(entries);
    for _ in 0..entries {
        let raw = r.u64()?;
        offsets.push(raw & !SIGN_BIT);
        signs.push(raw & SIGN_BIT != 0);
    }

    let region = &data[r.pos..];
    let sentinel = offsets[entries - 1];
    if sentinel as usize != region.len() {
        return Err(CryptoError::Codec(format!(
            "tensor data length {} does not match sentinel {sentinel}",
            region.len()
        )));
    }
    for w in offsets.windows(2) {
        if w[0] > w[1] {
            return Err(CryptoError::Codec("offset table not monotonic".into()));
        }
    }

    let leaves: Vec<T> = (0..n)
        .into_par_iter()
        .map(|i| {
            let fields = (0..T::FIELDS)
                .map(|j| {
                    let idx = i * T::FIELDS + j;
                    let bytes = &region[offsets[idx] as usize..offsets[idx + 1] as usize];
                    let sign = if signs[idx] { Sign::Minus } else { Sign::Plus };
                    BigInt::from_bytes_le(sign, bytes)
                })
                .collect();
            T::from_fields(fields)
        })
        .collect();

    Ok(Tensor::from_vec(&shape, leaves)?)
}

// ---- scalar text codecs ----

fn parse_ints(data: &str, expected: usize) -> Result<Vec<BigInt>, CryptoError> {
    let ints: Vec<BigInt> = data
        .split_whitespace()
        .map(|tok| {
            tok.parse::<BigInt>()
                .map_err(|e| CryptoError::Codec(format!("bad integer field: {e}")))
        })
        .collect::<Result<_, _>>()?;
    if ints.len() != expected {
        return Err(CryptoError::Codec(format!(
            "expected {expected} integer fields, got {}",
            ints.len()
        )));
    }
    Ok(ints)
}

pub fn encode_plaintext(pt: &Plaintext) -> String {
    pt.0.to_string()
}

pub fn parse_plaintext(data: &str) -> Result<Plaintext, CryptoError> {
    Ok(Plaintext(parse_ints(data, 1)?.swap_remove(0)))
}

pub fn encode_public_key(pk: &PublicKey) -> String {
    format!("{} {} {}", pk.0.a, pk.0.b, pk.0.c)
}

pub fn parse_public_key(data: &str) -> Result<PublicKey, CryptoError> {
    let mut it = parse_ints(data, 3)?.into_iter();
    let mut next = || it.next().unwrap_or_default();
    Ok(PublicKey(GroupElement::new(next(), next(), next())))
}

pub fn encode_ciphertext(ct: &Ciphertext) -> String {
    format!(
        "{} {} {} {} {} {}",
        ct.c1.a, ct.c1.b, ct.c1.c, ct.c2.a, ct.c2.b, ct.c2.c
    )
}

pub fn parse_ciphertext(data: &str) -> Result<Ciphertext, CryptoError> {
    let mut it = parse_ints(data, 6)?.into_iter();
    let mut next = || it.next().unwrap_or_default();
    let c1 = GroupElement::new(next(), next(), next());
    let c2 = GroupElement::new(next(), next(), next());
    Ok(Ciphertext { c1, c2 })
}

pub fn encode_part_decryption(pdr: &PartDecryption) -> String {
    format!("{} {} {}", pdr.0.a, pdr.0.b, pdr.0.c)
}

pub fn parse_part_decryption(data: &str) -> Result<PartDecryption, CryptoError> {
    let mut it = parse_ints(data, 3)?.into_iter();
    let mut next = || it.next().unwrap_or_default();
    Ok(PartDecryption(GroupElement::new(next(), next(), next())))
}

pub fn encode_key_share(share: &SecretKeyShare) -> String {
    format!("{} {}", share.combination, share.expose())
}

pub fn parse_key_share(data: &str) -> Result<SecretKeyShare, CryptoError> {
    let mut parts = data.split_whitespace();
    let combination = parts
        .next()
        .ok_or_else(|| CryptoError::Codec("missing combination rank".into()))?
        .parse::<u64>()
        .map_err(|e| CryptoError::Codec(format!("bad combination rank: {e}")))?;
    let value = parts
        .next()
        .ok_or_else(|| CryptoError::Codec("missing share value".into()))?
        .parse::<BigInt>()
        .map_err(|e| CryptoError::Codec(format!("bad share value: {e}")))?;
    if parts.next().is_some() {
        return Err(CryptoError::Codec("trailing data after key share".into()));
    }
    Ok(SecretKeyShare::new(combination, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::{CryptoParams, DefaultCryptoSystem};
    use cofhe_test_helpers::shared_rng_from_seed;

    fn system() -> DefaultCryptoSystem {
        DefaultCryptoSystem::new(CryptoParams::new(80, 32))
            .unwrap()
            .with_rng(shared_rng_from_seed(3))
    }

    #[test]
    fn plaintext_tensor_round_trip_rank_4() {
        let pts = Tensor::from_fn(&[2, 2, 2, 2], |i| Plaintext::from_i64(i as i64 - 8));
        let bytes = serialize_tensor(&pts);
        let back: Tensor<Plaintext> = deserialize_tensor(&bytes).unwrap();
        assert_eq!(back, pts);
    }

    #[test]
    fn ciphertext_tensor_round_trip() {
        let cs = system();
        let sk = cs.keygen();
        let pk = cs.derive_public(&sk);
        let pts = Tensor::from_fn(&[3, 5], |i| Plaintext::from_u64(i as u64));
        let cts = cs.encrypt_tensor(&pk, &pts).unwrap();
        let bytes = serialize_tensor(&cts);
        let back: Tensor<Ciphertext> = deserialize_tensor(&bytes).unwrap();
        assert_eq!(back.shape(), &[3, 5]);
        assert_eq!(back, cts);
    }

    #[test]
    fn part_decryption_tensor_round_trip() {
        let cs = system();
        let sk = cs.keygen();
        let pk = cs.derive_public(&sk);
        let shares = cs.split(&sk, 2, 2).unwrap();
        let cts = cs
            .encrypt_tensor(&pk, &Tensor::from_fn(&[4], |i| Plaintext::from_u64(i as u64)))
            .unwrap();
        let pdrs = cs.part_decrypt_tensor(&shares[0][0], &cts).unwrap();
        let bytes = serialize_tensor(&pdrs);
        let back: Tensor<PartDecryption> = deserialize_tensor(&bytes).unwrap();
        assert_eq!(back, pdrs);
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let pts = Tensor::from_fn(&[4], |i| Plaintext::from_u64(i as u64));
        let mut bytes = serialize_tensor(&pts);
        bytes.truncate(bytes.len() - 1);
        assert!(deserialize_tensor::<Plaintext>(&bytes).is_err());
    }

    #[test]
    fn oversized_rank_is_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1000u32.to_le_bytes());
        assert!(deserialize_tensor::<Plaintext>(&bytes).is_err());
    }

    #[test]
    fn scalar_text_round_trips() {
        let cs = system();
        let sk = cs.keygen();
        let pk = cs.derive_public(&sk);
        let ct = cs.encrypt(&pk, &Plaintext::from_u64(77));
        assert_eq!(parse_ciphertext(&encode_ciphertext(&ct)).unwrap(), ct);
        assert_eq!(parse_public_key(&encode_public_key(&pk)).unwrap(), pk);
        let pt = Plaintext::from_i64(-5);
        assert_eq!(parse_plaintext(&encode_plaintext(&pt)).unwrap(), pt);
        let share = SecretKeyShare::new(4, BigInt::from(-12345));
        assert_eq!(parse_key_share(&encode_key_share(&share)).unwrap(), share);
    }
}
