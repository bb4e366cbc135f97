// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

pub mod client_node;
pub mod handlers;
pub mod join;
pub mod roles;

pub use client_node::ClientNode;
pub use roles::{run_cofhe_node, run_compute_node, run_setup_node};

use cofhe_config::NodeConfig;
use cofhe_crypto::CryptoParams;
use cofhe_net::CryptoSystemDetails;

/// Cryptosystem parameters for this network, combining the shared details
/// served by the setup node with this node's local flags.
pub fn crypto_params(details: &CryptoSystemDetails, config: &NodeConfig) -> CryptoParams {
    CryptoParams {
        security_level: details.security_level,
        message_bits: details.message_bits,
        compact: details.compact,
        reuse_batch_randomness: config.reuse_batch_randomness,
        scaling_exponent: config.scaling_exponent,
    }
}
