// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use anyhow::Result;
use cofhe_crypto::codec::{
    deserialize_tensor, encode_part_decryption, parse_ciphertext, parse_key_share,
    serialize_tensor,
};
use cofhe_crypto::{Ciphertext, CryptoSystem, GroupArith, SecretKeyShare};
use cofhe_multithread::TaskPool;
use cofhe_net::messages::{
    CofheRequest, CofheRequestKind, OperandKind, PartialDecryptionRequest, ServiceResponse,
};
use cofhe_net::{RequestEnvelope, RequestHandler, ResponseEnvelope, ServiceType, Status};
use cofhe_tensor::Tensor;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Partial-decryption service. Holds this party's share list keyed by
/// combination rank; every request names the rank the requester assembled
/// and is rejected when this node is not part of that combination.
pub struct CofheNodeHandler<G: GroupArith> {
    system: CryptoSystem<G>,
    shares: Arc<HashMap<u64, SecretKeyShare>>,
    pool: TaskPool,
}

impl<G: GroupArith> CofheNodeHandler<G> {
    pub fn new(
        system: CryptoSystem<G>,
        encoded_shares: &[String],
        pool: TaskPool,
    ) -> Result<Self> {
        let mut shares = HashMap::with_capacity(encoded_shares.len());
        for encoded in encoded_shares {
            let share = parse_key_share(encoded)?;
            shares.insert(share.combination, share);
        }
        info!(shares = shares.len(), "cofhe node holds its share list");
        if shares.is_empty() {
            anyhow::bail!("cofhe node received no key shares");
        }
        Ok(CofheNodeHandler {
            system,
            shares: Arc::new(shares),
            pool,
        })
    }

    async fn dispatch(&self, body: &[u8]) -> ServiceResponse {
        let request = match CofheRequest::from_bytes(body) {
            Ok(r) => r,
            Err(e) => return ServiceResponse::error(e.to_string()),
        };
        match request.kind {
            CofheRequestKind::PartialDecryption => self.handle_partial_decryption(&request.data).await,
            CofheRequestKind::Smpc => ServiceResponse::error("not implemented"),
        }
    }

    async fn handle_partial_decryption(&self, data: &[u8]) -> ServiceResponse {
        let request = match PartialDecryptionRequest::from_bytes(data) {
            Ok(r) => r,
            Err(e) => return ServiceResponse::error(e.to_string()),
        };
        let Some(share) = self.shares.get(&request.combination).cloned() else {
            return ServiceResponse::error(format!(
                "threshold not met: no share for combination {}",
                request.combination
            ));
        };
        debug!(combination = request.combination, kind = ?request.kind, "partial decryption");
        match request.kind {
            OperandKind::Single => {
                let ct = match std::str::from_utf8(&request.data)
                    .map_err(|_| "ciphertext is not ASCII".to_string())
                    .and_then(|s| parse_ciphertext(s).map_err(|e| e.to_string()))
                {
                    Ok(ct) => ct,
                    Err(e) => return ServiceResponse::error(e),
                };
                let system = self.system.clone();
                let result = self
                    .pool
                    .spawn("part-decrypt", move || {
                        encode_part_decryption(&system.part_decrypt(&share, &ct))
                    })
                    .await;
                match result {
                    Ok(text) => ServiceResponse::ok(text.into_bytes()),
                    Err(e) => ServiceResponse::error(format!("partial decryption failed: {e:#}")),
                }
            }
            OperandKind::Tensor => {
                let cts: Tensor<Ciphertext> = match deserialize_tensor(&request.data) {
                    Ok(t) => t,
                    Err(e) => return ServiceResponse::error(e.to_string()),
                };
                let system = self.system.clone();
                let result = self
                    .pool
                    .spawn("part-decrypt-tensor", move || {
                        system
                            .part_decrypt_tensor(&share, &cts)
                            .map(|t| serialize_tensor(&t))
                    })
                    .await;
                match result {
                    Ok(Ok(bytes)) => ServiceResponse::ok(bytes),
                    Ok(Err(e)) => {
                        ServiceResponse::error(format!("partial decryption failed: {e}"))
                    }
                    Err(e) => ServiceResponse::error(format!("partial decryption failed: {e:#}")),
                }
            }
            OperandKind::TensorId => ServiceResponse::error("not implemented"),
        }
    }
}

impl<G: GroupArith> RequestHandler for CofheNodeHandler<G> {
    async fn handle(&self, request: RequestEnvelope) -> ResponseEnvelope {
        if request.service != ServiceType::Cofhe {
            return ResponseEnvelope::new(
                request.service,
                Status::Error,
                b"wrong service for cofhe node".to_vec(),
            );
        }
        let response = self.dispatch(&request.body).await;
        ResponseEnvelope::new(ServiceType::Cofhe, Status::Ok, response.to_bytes())
    }
}
