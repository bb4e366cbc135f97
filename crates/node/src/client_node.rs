// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use anyhow::{anyhow, Context, Result};
use cofhe_config::NodeConfig;
use cofhe_crypto::codec::parse_public_key;
use cofhe_crypto::{DefaultCryptoSystem, PublicKey};
use cofhe_net::messages::{
    ComputeRequest, NetworkDetailsRequest, ServiceResponse, SetupRequest, SetupRequestKind,
};
use cofhe_net::{Client, NetworkDetails, NodeDetails, NodeType, ServiceType};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

/// A client of the network: no server loop, just a connection to the first
/// reachable compute node and the key material needed to build requests.
pub struct ClientNode {
    system: DefaultCryptoSystem,
    public_key: PublicKey,
    details: NetworkDetails,
    compute: Mutex<Client>,
}

impl ClientNode {
    pub async fn connect(
        setup_host: &str,
        setup_port: u16,
        config: &NodeConfig,
    ) -> Result<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let mut setup = Client::connect(setup_host, setup_port, timeout)
            .await
            .context("cannot reach setup node")?;
        let request = SetupRequest::new(
            SetupRequestKind::NetworkDetails,
            NetworkDetailsRequest::get().to_bytes(),
        );
        let envelope = setup.run(ServiceType::Setup, request.to_bytes()).await?;
        let payload = ServiceResponse::from_bytes(&envelope.body)?.into_result()?;
        let mut details = NetworkDetails::from_json(&payload)?;
        details.self_node = NodeDetails::new("127.0.0.1", 0, NodeType::Client);
        details.secret_key_shares.clear();

        let system =
            DefaultCryptoSystem::new(crate::crypto_params(&details.cryptosystem, config))?;
        let public_key = parse_public_key(&details.cryptosystem.public_key)?;

        let mut compute = None;
        for node in details.compute_nodes() {
            match Client::connect(&node.host, node.port, timeout).await {
                Ok(client) => {
                    info!(host = %node.host, port = node.port, "using compute node");
                    compute = Some(client);
                    break;
                }
                Err(e) => {
                    tracing::warn!(host = %node.host, port = node.port, error = %e, "compute node unreachable")
                }
            }
        }
        let compute = compute.ok_or_else(|| anyhow!("no compute node reachable"))?;

        Ok(ClientNode {
            system,
            public_key,
            details,
            compute: Mutex::new(compute),
        })
    }

    pub fn system(&self) -> &DefaultCryptoSystem {
        &self.system
    }

    pub fn network_public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn network_details(&self) -> &NetworkDetails {
        &self.details
    }

    /// Sends a compute request and returns the inner service response.
    pub async fn compute(&self, request: &ComputeRequest) -> Result<ServiceResponse> {
        let mut compute = self.compute.lock().await;
        let envelope = compute
            .run(ServiceType::Compute, request.to_bytes())
            .await?;
        Ok(ServiceResponse::from_bytes(&envelope.body)?)
    }
}
