// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

pub mod client;
pub mod generator;
pub mod multiplier;

pub use client::{BeaverTriple, SmpcClient};
pub use generator::BeaverTripletGenerator;
pub use multiplier::CipherMultiplier;
