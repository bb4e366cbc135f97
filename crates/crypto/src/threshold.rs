// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

//! Monotone-span-program share construction for the `t`-of-`n` access
//! structure: an AND-chain of length `t`, OR-concatenated over all
//! `C(n, t)` threshold combinations. Party indices are zero-based
//! everywhere, including the combination rank carried on the wire.

use crate::error::CryptoError;
use num_bigint::BigInt;
use num_integer::binomial;
use num_traits::Zero;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccessStructure {
    pub threshold: usize,
    pub parties: usize,
}

impl AccessStructure {
    pub fn new(threshold: usize, parties: usize) -> Result<Self, CryptoError> {
        if threshold == 0 || threshold > parties {
            return Err(CryptoError::InvalidParameter(format!(
                "invalid access structure: threshold {threshold} of {parties}"
            )));
        }
        Ok(AccessStructure { threshold, parties })
    }

    pub fn combinations(&self) -> u64 {
        binomial(self.parties as u64, self.threshold as u64)
    }

    /// Shares held by each party: one per combination containing it.
    pub fn shares_per_party(&self) -> u64 {
        binomial(
            self.parties as u64 - 1,
            self.threshold as u64 - 1,
        )
    }
}

/// Monotone span program: the distribution matrix plus the mapping from
/// matrix rows to threshold combinations.
pub(crate) struct SpanProgram {
    pub matrix: Vec<Vec<i64>>,
    pub cols: usize,
}

fn or_concat(ma: &[Vec<i64>], mb: &[Vec<i64>]) -> Vec<Vec<i64>> {
    let ea = ma[0].len();
    let eb = mb[0].len();
    let cols = ea + eb - 1;
    let mut out = Vec::with_capacity(ma.len() + mb.len());
    for row in ma {
        let mut r = vec![0; cols];
        r[..ea].copy_from_slice(row);
        out.push(r);
    }
    for row in mb {
        let mut r = vec![0; cols];
        r[0] = row[0];
        r[ea..].copy_from_slice(&row[1..]);
        out.push(r);
    }
    out
}

fn and_concat(ma: &[Vec<i64>], mb: &[Vec<i64>]) -> Vec<Vec<i64>> {
    let ea = ma[0].len();
    let eb = mb[0].len();
    let cols = ea + eb;
    let mut out = Vec::with_capacity(ma.len() + mb.len());
    for row in ma {
        let mut r = vec![0; cols];
        r[0] = row[0];
        r[1] = row[0];
        r[2..ea + 1].copy_from_slice(&row[1..]);
        out.push(r);
    }
    for row in mb {
        let mut r = vec![0; cols];
        r[1] = row[0];
        r[ea + 1..].copy_from_slice(&row[1..]);
        out.push(r);
    }
    out
}

impl SpanProgram {
    /// Matrix for `x_1 ∧ … ∧ x_t`, OR-combined `C(n, t)` times.
    pub fn for_access_structure(access: &AccessStructure) -> Self {
        let unit = vec![vec![1i64]];
        let mut chain = unit.clone();
        for _ in 1..access.threshold {
            chain = and_concat(&chain, &unit);
        }
        let mut matrix = chain.clone();
        for _ in 1..access.combinations() {
            matrix = or_concat(&matrix, &chain);
        }
        let cols = matrix[0].len();
        SpanProgram { matrix, cols }
    }
}

/// Lexicographic rank of a sorted combination of zero-based party indices.
pub fn combination_rank(parties: usize, threshold: usize, combination: &[usize]) -> u64 {
    let n = parties as u64;
    let t = threshold as u64;
    let mut rank = 0u64;
    for (i, &c) in combination.iter().enumerate() {
        let start = if i == 0 { 0 } else { combination[i - 1] + 1 };
        for j in start..c {
            rank += binomial(n - 1 - j as u64, t - i as u64 - 1);
        }
    }
    rank
}

/// First combination in lexicographic order: `0, 1, …, t-1`.
pub fn first_combination(threshold: usize) -> Vec<usize> {
    (0..threshold).collect()
}

/// Advances a sorted combination to its lexicographic successor; returns
/// `false` once exhausted.
pub fn next_combination(combination: &mut [usize], parties: usize) -> bool {
    let t = combination.len();
    let mut j = t as isize - 1;
    while j >= 0 && combination[j as usize] == parties - t + j as usize {
        j -= 1;
    }
    if j < 0 {
        return false;
    }
    let j = j as usize;
    combination[j] += 1;
    for k in j + 1..t {
        combination[k] = combination[j] + k - j;
    }
    true
}

/// Computes all matrix-row shares of `secret` for the span program:
/// `rho = (secret, rho_2, …, rho_e)` with the tail uniform below
/// `randomness_bound`, share of row `i` is `<M_i, rho>` over the integers.
/// Row blocks of `t` map to combinations in lexicographic rank order.
pub(crate) fn share_rows(
    program: &SpanProgram,
    secret: &BigInt,
    mut draw: impl FnMut() -> BigInt,
) -> Vec<BigInt> {
    let mut rho = Vec::with_capacity(program.cols);
    rho.push(secret.clone());
    for _ in 1..program.cols {
        rho.push(draw());
    }
    program
        .matrix
        .iter()
        .map(|row| {
            let mut acc = BigInt::zero();
            for (m, r) in row.iter().zip(&rho) {
                if *m != 0 {
                    acc += BigInt::from(*m) * r;
                }
            }
            acc
        })
        .collect()
}

/// Reconstruction coefficients for one AND-chain combination:
/// `(1, -1, …, -1)` of length `t`.
pub(crate) fn lambda(threshold: usize) -> Vec<i64> {
    let mut l = vec![-1i64; threshold];
    l[0] = 1;
    l
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_is_lexicographic() {
        // (t=2, n=3): (0,1) -> 0, (0,2) -> 1, (1,2) -> 2
        assert_eq!(combination_rank(3, 2, &[0, 1]), 0);
        assert_eq!(combination_rank(3, 2, &[0, 2]), 1);
        assert_eq!(combination_rank(3, 2, &[1, 2]), 2);
    }

    #[test]
    fn rank_matches_enumeration_order() {
        let (n, t) = (6, 3);
        let mut combo = first_combination(t);
        let mut expected = 0u64;
        loop {
            assert_eq!(combination_rank(n, t, &combo), expected);
            expected += 1;
            if !next_combination(&mut combo, n) {
                break;
            }
        }
        assert_eq!(expected, binomial(n as u64, t as u64));
    }

    #[test]
    fn span_program_dimensions() {
        let access = AccessStructure::new(2, 3).unwrap();
        let sp = SpanProgram::for_access_structure(&access);
        // C(3,2) = 3 OR-branches of a 2-row AND chain
        assert_eq!(sp.matrix.len(), 6);
        assert_eq!(sp.cols, 2 + 2 * 1);
    }

    #[test]
    fn and_chain_shares_reconstruct_with_lambda() {
        let access = AccessStructure::new(3, 4).unwrap();
        let sp = SpanProgram::for_access_structure(&access);
        let secret = BigInt::from(424_242);
        let mut state = 1u64;
        let shares = share_rows(&sp, &secret, || {
            // small deterministic pseudo-randomness is enough here
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            BigInt::from(state >> 16)
        });
        let l = lambda(access.threshold);
        for combo in 0..access.combinations() as usize {
            let base = combo * access.threshold;
            let mut acc = BigInt::zero();
            for (j, coeff) in l.iter().enumerate() {
                acc += BigInt::from(*coeff) * &shares[base + j];
            }
            assert_eq!(acc, secret, "combination block {combo}");
        }
    }
}
