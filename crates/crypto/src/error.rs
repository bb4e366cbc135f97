// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use cofhe_tensor::TensorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// Failure inside the group arithmetic; fatal for the request.
    #[error("crypto failure: {0}")]
    CryptoFailure(String),

    #[error("malformed payload: {0}")]
    Codec(String),

    #[error(transparent)]
    Shape(#[from] TensorError),

    #[error("operand size mismatch: expected {expected}, got {got}")]
    SizeMismatch { expected: usize, got: usize },

    #[error("threshold not met: {0}")]
    ThresholdNotMet(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}
