// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use anyhow::{Context, Result};
use cofhe_config::NodeConfig;
use cofhe_crypto::codec::{encode_key_share, encode_public_key, serialize_tensor};
use cofhe_crypto::{DefaultCryptoSystem, GroupArith};
use cofhe_multithread::TaskPool;
use cofhe_net::messages::{
    BeaverTripletRequest, JoinRequest, JoinResponse, JoinRole, NetworkDetailsRequest,
    ServiceResponse, SetupRequest, SetupRequestKind,
};
use cofhe_net::{
    CryptoSystemDetails, NetworkDetails, NodeDetails, NodeType, RequestEnvelope, RequestHandler,
    ResponseEnvelope, ServiceType, Status,
};
use cofhe_smpc::BeaverTripletGenerator;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{info, warn};

/// Largest Beaver batch served in one request.
const MAX_TRIPLES_PER_REQUEST: u64 = 1 << 20;

struct SetupState {
    details: NetworkDetails,
    /// Encoded share list per party, handed out in join order.
    share_lists: Vec<Vec<String>>,
    joined_cofhe: usize,
}

/// The trusted dealer role: generates the network key material at startup,
/// hands shares to joining cofhe nodes, serves Beaver triples and the
/// network registry. The registry lives in memory only.
pub struct SetupNodeHandler<G: GroupArith> {
    generator: BeaverTripletGenerator<G>,
    pool: TaskPool,
    state: Mutex<SetupState>,
    beaver_requests: AtomicU64,
}

impl SetupNodeHandler<cofhe_crypto::ResidueGroup> {
    /// Generates `sk`, `pk` and all `t x C(n,t)` shares, then drops the
    /// secret key; only the shares survive.
    pub fn new(config: &NodeConfig, self_node: NodeDetails) -> Result<Self> {
        let params = crate::crypto_params(
            &CryptoSystemDetails {
                security_level: config.security_level,
                message_bits: config.message_bits,
                compact: config.compact,
                threshold: config.threshold,
                total_nodes: config.total_nodes,
                public_key: String::new(),
            },
            config,
        );
        let system = DefaultCryptoSystem::new(params)?;
        let sk = system.keygen();
        let pk = system.derive_public(&sk);
        let shares = system
            .split(&sk, config.threshold, config.total_nodes)
            .context("key share generation failed")?;
        drop(sk);

        let share_lists: Vec<Vec<String>> = shares
            .iter()
            .map(|party| party.iter().map(encode_key_share).collect())
            .collect();
        let public_key = encode_public_key(&pk);
        info!(
            threshold = config.threshold,
            total_nodes = config.total_nodes,
            "setup node key material ready"
        );

        let details = NetworkDetails {
            self_node: self_node.clone(),
            nodes: vec![self_node],
            cryptosystem: CryptoSystemDetails {
                security_level: config.security_level,
                message_bits: config.message_bits,
                compact: config.compact,
                threshold: config.threshold,
                total_nodes: config.total_nodes,
                public_key,
            },
            secret_key_shares: Vec::new(),
        };

        Ok(SetupNodeHandler {
            generator: BeaverTripletGenerator::new(system, pk),
            pool: TaskPool::new(config.server_threads, config.max_concurrent_tasks)?,
            state: Mutex::new(SetupState {
                details,
                share_lists,
                joined_cofhe: 0,
            }),
            beaver_requests: AtomicU64::new(0),
        })
    }
}

impl<G: GroupArith> SetupNodeHandler<G> {
    async fn dispatch(&self, body: &[u8]) -> ServiceResponse {
        let request = match SetupRequest::from_bytes(body) {
            Ok(r) => r,
            Err(e) => return ServiceResponse::error(e.to_string()),
        };
        match request.kind {
            SetupRequestKind::BeaverTriplet => self.handle_beaver(&request.data).await,
            SetupRequestKind::JoinAsNode => self.handle_join(&request.data),
            SetupRequestKind::NetworkDetails => self.handle_network_details(&request.data),
        }
    }

    /// Beaver batch requests served so far.
    pub fn beaver_requests(&self) -> u64 {
        self.beaver_requests.load(Ordering::Relaxed)
    }

    async fn handle_beaver(&self, data: &[u8]) -> ServiceResponse {
        self.beaver_requests.fetch_add(1, Ordering::Relaxed);
        let request = match BeaverTripletRequest::from_bytes(data) {
            Ok(r) => r,
            Err(e) => return ServiceResponse::error(e.to_string()),
        };
        if request.count == 0 || request.count > MAX_TRIPLES_PER_REQUEST {
            return ServiceResponse::error(format!(
                "triple count {} out of range",
                request.count
            ));
        }
        let generator = self.generator.clone();
        let count = request.count as usize;
        let result = self
            .pool
            .spawn("beaver-triplets", move || {
                generator.generate(count).map(|t| serialize_tensor(&t))
            })
            .await;
        match result {
            Ok(Ok(bytes)) => ServiceResponse::ok(bytes),
            Ok(Err(e)) => ServiceResponse::error(format!("triple generation failed: {e:#}")),
            Err(e) => ServiceResponse::error(format!("triple generation failed: {e:#}")),
        }
    }

    fn handle_join(&self, data: &[u8]) -> ServiceResponse {
        let request = match JoinRequest::from_bytes(data) {
            Ok(r) => r,
            Err(e) => return ServiceResponse::error(e.to_string()),
        };
        let mut state = self.state.lock().expect("setup state lock poisoned");
        let response = match request.role {
            JoinRole::Cofhe => {
                if state.joined_cofhe >= state.details.cryptosystem.total_nodes {
                    warn!(host = %request.host, port = request.port, "cofhe join rejected, network full");
                    JoinResponse::rejected(JoinRole::Cofhe, "no more nodes can join")
                } else {
                    let party = state.joined_cofhe;
                    state.details.nodes.push(NodeDetails::new(
                        request.host.clone(),
                        request.port,
                        NodeType::Cofhe,
                    ));
                    state.joined_cofhe += 1;
                    info!(host = %request.host, port = request.port, party, "cofhe node joined");
                    JoinResponse::for_cofhe(
                        state.details.cryptosystem.public_key.clone(),
                        state.share_lists[party].clone(),
                    )
                }
            }
            JoinRole::Compute => {
                state.details.nodes.push(NodeDetails::new(
                    request.host.clone(),
                    request.port,
                    NodeType::Compute,
                ));
                info!(host = %request.host, port = request.port, "compute node joined");
                JoinResponse::for_compute()
            }
        };
        ServiceResponse::ok(response.to_bytes())
    }

    fn handle_network_details(&self, data: &[u8]) -> ServiceResponse {
        if let Err(e) = NetworkDetailsRequest::from_bytes(data) {
            return ServiceResponse::error(e.to_string());
        }
        let state = self.state.lock().expect("setup state lock poisoned");
        match state.details.to_json() {
            Ok(json) => ServiceResponse::ok(json),
            Err(e) => ServiceResponse::error(e.to_string()),
        }
    }
}

impl<G: GroupArith> RequestHandler for SetupNodeHandler<G> {
    async fn handle(&self, request: RequestEnvelope) -> ResponseEnvelope {
        if request.service != ServiceType::Setup {
            return ResponseEnvelope::new(
                request.service,
                Status::Error,
                b"wrong service for setup node".to_vec(),
            );
        }
        let response = self.dispatch(&request.body).await;
        ResponseEnvelope::new(ServiceType::Setup, Status::Ok, response.to_bytes())
    }
}
