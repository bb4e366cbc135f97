// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

//! In-process network harness for the integration tests.

use anyhow::Result;
use cofhe_config::NodeConfig;
use cofhe_node::handlers::SetupNodeHandler;
use cofhe_node::roles::{cofhe_server, compute_server, setup_server};
use cofhe_crypto::ResidueGroup;
use cofhe_test_helpers::free_port;
use std::sync::Arc;

/// A full network on localhost: one setup node, `total_nodes` cofhe nodes
/// and one compute node, each on its own ephemeral port.
pub struct TestNetwork {
    pub setup_port: u16,
    pub cofhe_ports: Vec<u16>,
    pub compute_port: u16,
    pub setup_handler: Arc<SetupNodeHandler<ResidueGroup>>,
}

/// Small, fast parameters for the test network.
pub fn test_config() -> NodeConfig {
    NodeConfig {
        security_level: 80,
        message_bits: 32,
        threshold: 2,
        total_nodes: 3,
        beaver_cache_size: 100,
        server_threads: 2,
        max_concurrent_tasks: 8,
        request_timeout_secs: 60,
        ..NodeConfig::default()
    }
}

/// Boots the network in startup order: setup, cofhe quorum, compute.
/// `skip_first_cofhe` leaves the first joined cofhe node dark, so clients
/// must fall back to the remaining quorum.
pub async fn spawn_network(config: &NodeConfig, skip_first_cofhe: bool) -> Result<TestNetwork> {
    let setup_port = free_port();
    let setup = setup_server(config, "127.0.0.1", setup_port).await?;
    let setup_handler = setup.handler();
    tokio::spawn(setup.run());

    let mut cofhe_ports = Vec::new();
    for party in 0..config.total_nodes {
        let port = free_port();
        let server = cofhe_server(config, "127.0.0.1", port, "127.0.0.1", setup_port).await?;
        cofhe_ports.push(port);
        if skip_first_cofhe && party == 0 {
            // joined and registered, but never serves
            drop(server);
        } else {
            tokio::spawn(server.run());
        }
    }

    let compute_port = free_port();
    let compute = compute_server(config, "127.0.0.1", compute_port, "127.0.0.1", setup_port).await?;
    tokio::spawn(compute.run());

    Ok(TestNetwork {
        setup_port,
        cofhe_ports,
        compute_port,
        setup_handler,
    })
}
