// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

pub mod arith;
pub mod codec;
pub mod error;
pub mod system;
pub mod tensor_ops;
pub mod threshold;
pub mod types;

pub use arith::{GroupArith, GroupElement, ResidueGroup};
pub use error::CryptoError;
pub use system::{CryptoParams, CryptoSystem, DefaultCryptoSystem, SharedRng};
pub use threshold::AccessStructure;
pub use types::{Ciphertext, PartDecryption, Plaintext, PublicKey, SecretKey, SecretKeyShare};

pub type PartyId = u64;
