// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

//! Node lifecycles. Startup order matters: the setup node first, then `n`
//! cofhe nodes, then compute nodes; a compute node dials the cofhe quorum
//! while connecting.

use crate::handlers::{CofheNodeHandler, ComputeNodeHandler, SetupNodeHandler};
use crate::join::join_network;
use anyhow::Result;
use cofhe_config::NodeConfig;
use cofhe_crypto::{DefaultCryptoSystem, ResidueGroup};
use cofhe_multithread::TaskPool;
use cofhe_net::messages::JoinRole;
use cofhe_net::{NodeDetails, NodeType, Server};
use cofhe_smpc::SmpcClient;
use std::time::Duration;

fn request_timeout(config: &NodeConfig) -> Duration {
    Duration::from_secs(config.request_timeout_secs)
}

pub async fn setup_server(
    config: &NodeConfig,
    host: &str,
    port: u16,
) -> Result<Server<SetupNodeHandler<ResidueGroup>>> {
    let self_node = NodeDetails::new(host, port, NodeType::Setup);
    let handler = SetupNodeHandler::new(config, self_node)?;
    Ok(Server::bind(host, port, handler).await?)
}

pub async fn cofhe_server(
    config: &NodeConfig,
    host: &str,
    port: u16,
    setup_host: &str,
    setup_port: u16,
) -> Result<Server<CofheNodeHandler<ResidueGroup>>> {
    let self_node = NodeDetails::new(host, port, NodeType::Cofhe);
    let joined = join_network(
        setup_host,
        setup_port,
        self_node,
        JoinRole::Cofhe,
        request_timeout(config),
    )
    .await?;
    let system =
        DefaultCryptoSystem::new(crate::crypto_params(&joined.details.cryptosystem, config))?;
    let pool = TaskPool::new(config.server_threads, config.max_concurrent_tasks)?;
    let handler = CofheNodeHandler::new(system, &joined.details.secret_key_shares, pool)?;
    Ok(Server::bind(host, port, handler).await?)
}

pub async fn compute_server(
    config: &NodeConfig,
    host: &str,
    port: u16,
    setup_host: &str,
    setup_port: u16,
) -> Result<Server<ComputeNodeHandler<ResidueGroup>>> {
    let self_node = NodeDetails::new(host, port, NodeType::Compute);
    let joined = join_network(
        setup_host,
        setup_port,
        self_node,
        JoinRole::Compute,
        request_timeout(config),
    )
    .await?;
    let system =
        DefaultCryptoSystem::new(crate::crypto_params(&joined.details.cryptosystem, config))?;
    let smpc = SmpcClient::connect(
        joined.details,
        system.clone(),
        config.beaver_cache_size,
        request_timeout(config),
    )
    .await?;
    let pool = TaskPool::new(config.server_threads, config.max_concurrent_tasks)?;
    let handler = ComputeNodeHandler::new(system, smpc, pool);
    Ok(Server::bind(host, port, handler).await?)
}

pub async fn run_setup_node(config: NodeConfig, host: String, port: u16) -> Result<()> {
    let server = setup_server(&config, &host, port).await?;
    Ok(server.run().await?)
}

pub async fn run_cofhe_node(
    config: NodeConfig,
    host: String,
    port: u16,
    setup_host: String,
    setup_port: u16,
) -> Result<()> {
    let server = cofhe_server(&config, &host, port, &setup_host, setup_port).await?;
    Ok(server.run().await?)
}

pub async fn run_compute_node(
    config: NodeConfig,
    host: String,
    port: u16,
    setup_host: String,
    setup_port: u16,
) -> Result<()> {
    let server = compute_server(&config, &host, port, &setup_host, setup_port).await?;
    Ok(server.run().await?)
}
