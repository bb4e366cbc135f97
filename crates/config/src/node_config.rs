// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use anyhow::{bail, Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Runtime configuration shared by every node role. Values resolve from
/// defaults, then an optional YAML file, then `COFHE_*` environment
/// variables.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeConfig {
    /// Security level of the class-group construction: 80, 128 or 256.
    pub security_level: u32,
    /// Plaintext bit-width `k`.
    pub message_bits: u32,
    /// Compact ciphertext variant.
    pub compact: bool,
    /// Decryption threshold `t`.
    pub threshold: usize,
    /// Number of cofhe nodes `n`.
    pub total_nodes: usize,
    /// One randomizer per batch in batched homomorphic operations, or one
    /// per element when false.
    pub reuse_batch_randomness: bool,
    /// Fixed-point scaling exponent for float encoding.
    pub scaling_exponent: u32,
    /// Beaver triple cache size on compute nodes.
    pub beaver_cache_size: usize,
    /// Worker threads for CPU-bound crypto work.
    pub server_threads: usize,
    /// Concurrent requests admitted into the worker pool.
    pub max_concurrent_tasks: usize,
    /// Per-request deadline, seconds.
    pub request_timeout_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            security_level: 128,
            message_bits: 64,
            compact: false,
            threshold: 2,
            total_nodes: 3,
            reuse_batch_randomness: true,
            scaling_exponent: 0,
            beaver_cache_size: 10_000,
            server_threads: 8,
            max_concurrent_tasks: 32,
            request_timeout_secs: 120,
        }
    }
}

impl NodeConfig {
    /// Resolves the configuration, merging an optional YAML file and the
    /// environment over the defaults.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(NodeConfig::default()));
        if let Some(path) = file {
            figment = figment.merge(Yaml::file(path));
        }
        let config: NodeConfig = figment
            .merge(Env::prefixed("COFHE_"))
            .extract()
            .context("invalid node configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !matches!(self.security_level, 80 | 128 | 256) {
            bail!(
                "security_level must be 80, 128 or 256, got {}",
                self.security_level
            );
        }
        if self.message_bits == 0 {
            bail!("message_bits must be positive");
        }
        if self.threshold == 0 || self.threshold > self.total_nodes {
            bail!(
                "threshold {} incompatible with {} total nodes",
                self.threshold,
                self.total_nodes
            );
        }
        if self.beaver_cache_size == 0 {
            bail!("beaver_cache_size must be positive");
        }
        if self.server_threads == 0 {
            bail!("server_threads must be positive");
        }
        Ok(())
    }
}
