// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TensorError {
    #[error("shape mismatch: expected {expected} elements, got {got}")]
    ShapeMismatch { expected: usize, got: usize },

    #[error("cannot broadcast shape {from:?} to {to:?}")]
    BroadcastMismatch { from: Vec<usize>, to: Vec<usize> },

    #[error("index {index} out of bounds for axis of size {size}")]
    IndexOutOfBounds { index: usize, size: usize },

    #[error("operation requires rank {expected}, tensor has rank {got}")]
    RankMismatch { expected: usize, got: usize },
}
