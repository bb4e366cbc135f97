// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use anyhow::{bail, Context, Result};
use cofhe_net::messages::{
    JoinRequest, JoinResponse, JoinRole, NetworkDetailsRequest, ServiceResponse, SetupRequest,
    SetupRequestKind,
};
use cofhe_net::{Client, NetworkDetails, NodeDetails, ServiceType, Status};
use std::time::Duration;
use tracing::info;

/// Result of the join handshake: the network as the setup node sees it,
/// with this node's own identity patched in, plus the share list for cofhe
/// joiners.
pub struct Joined {
    pub details: NetworkDetails,
}

/// Announces this node to the setup node and fetches the current network
/// registry.
pub async fn join_network(
    setup_host: &str,
    setup_port: u16,
    self_node: NodeDetails,
    role: JoinRole,
    timeout: Duration,
) -> Result<Joined> {
    let mut setup = Client::connect(setup_host, setup_port, timeout)
        .await
        .context("cannot reach setup node")?;

    let join = JoinRequest {
        role,
        host: self_node.host.clone(),
        port: self_node.port,
    };
    let request = SetupRequest::new(SetupRequestKind::JoinAsNode, join.to_bytes());
    let envelope = setup
        .run(ServiceType::Setup, request.to_bytes())
        .await
        .context("join request failed")?;
    let payload = ServiceResponse::from_bytes(&envelope.body)?.into_result()?;
    let response = JoinResponse::from_bytes(&payload)?;
    if response.status == Status::Error {
        bail!("join rejected: {}", response.error);
    }
    info!(role = ?role, host = %self_node.host, port = self_node.port, "joined network");

    let request = SetupRequest::new(
        SetupRequestKind::NetworkDetails,
        NetworkDetailsRequest::get().to_bytes(),
    );
    let envelope = setup
        .run(ServiceType::Setup, request.to_bytes())
        .await
        .context("network details request failed")?;
    let payload = ServiceResponse::from_bytes(&envelope.body)?.into_result()?;
    let mut details = NetworkDetails::from_json(&payload)?;
    details.self_node = self_node;
    details.secret_key_shares = response.secret_key_shares;
    Ok(Joined { details })
}
