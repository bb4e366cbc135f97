// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use anyhow::{anyhow, bail, Context, Result};
use cofhe_crypto::codec::{
    self, deserialize_tensor, encode_ciphertext, parse_part_decryption, serialize_tensor,
};
use cofhe_crypto::{Ciphertext, CryptoSystem, GroupArith, PartDecryption, Plaintext, PublicKey};
use cofhe_crypto::threshold::combination_rank;
use cofhe_net::messages::{
    BeaverTripletRequest, CofheRequest, CofheRequestKind, NetworkDetailsRequest, OperandKind,
    PartialDecryptionRequest, ServiceResponse, SetupRequest, SetupRequestKind,
};
use cofhe_net::{Client, NetworkDetails, ServiceType};
use cofhe_tensor::Tensor;
use std::collections::VecDeque;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// One encrypted Beaver triple `(Enc(a), Enc(b), Enc(a·b))`, consumed by a
/// single ciphertext multiplication.
#[derive(Clone, Debug)]
pub struct BeaverTriple {
    pub a: Ciphertext,
    pub b: Ciphertext,
    pub ab: Ciphertext,
}

struct Decryptors {
    clients: Vec<Client>,
    /// Rank of the threshold combination formed by the connected parties.
    combination: u64,
}

/// Client side of the SMPC subprotocols: keeps a persistent connection to
/// the setup node and to `t` cofhe nodes, caches Beaver triples, and
/// orchestrates joint decryption.
///
/// Each remote socket carries one request at a time; the triple cache
/// mutex stays held across a refill so cache order remains FIFO.
pub struct SmpcClient<G: GroupArith> {
    system: CryptoSystem<G>,
    public_key: PublicKey,
    details: StdMutex<NetworkDetails>,
    setup: Mutex<Client>,
    decryptors: Mutex<Decryptors>,
    cache: Mutex<VecDeque<BeaverTriple>>,
    cache_size: usize,
    timeout: Duration,
}

impl<G: GroupArith> SmpcClient<G> {
    /// Connects to the setup node and the first `t` reachable cofhe nodes
    /// from the peer list.
    pub async fn connect(
        details: NetworkDetails,
        system: CryptoSystem<G>,
        cache_size: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let public_key = codec::parse_public_key(&details.cryptosystem.public_key)
            .context("network details carry an invalid public key")?;
        let setup_details = details
            .setup_node()
            .ok_or_else(|| anyhow!("no setup node in network details"))?;
        let setup = Client::connect(&setup_details.host, setup_details.port, timeout)
            .await
            .context("cannot reach setup node")?;
        let decryptors = connect_decryptors(&details, timeout).await?;
        info!(
            threshold = details.cryptosystem.threshold,
            combination = decryptors.combination,
            "smpc client connected"
        );
        Ok(SmpcClient {
            system,
            public_key,
            details: StdMutex::new(details),
            setup: Mutex::new(setup),
            decryptors: Mutex::new(decryptors),
            cache: Mutex::new(VecDeque::new()),
            cache_size,
            timeout,
        })
    }

    pub fn system(&self) -> &CryptoSystem<G> {
        &self.system
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    fn threshold(&self) -> usize {
        self.details
            .lock()
            .expect("network details lock poisoned")
            .cryptosystem
            .threshold
    }

    /// Pops `count` triples from the cache, refilling from the setup node
    /// first if the cache runs short. The refill happens under the cache
    /// lock so concurrent consumers keep FIFO order.
    pub async fn get_beaver_triples(&self, count: usize) -> Result<Vec<BeaverTriple>> {
        let mut cache = self.cache.lock().await;
        if cache.len() >= count {
            return Ok(cache.drain(..count).collect());
        }

        let need = count + self.cache_size - cache.len();
        debug!(count, cached = cache.len(), need, "refilling beaver cache");
        let request = SetupRequest::new(
            SetupRequestKind::BeaverTriplet,
            BeaverTripletRequest { count: need as u64 }.to_bytes(),
        );
        let payload = {
            let mut setup = self.setup.lock().await;
            let envelope = setup
                .run(ServiceType::Setup, request.to_bytes())
                .await
                .context("beaver triple request failed")?;
            ServiceResponse::from_bytes(&envelope.body)?.into_result()?
        };
        let fresh: Tensor<Ciphertext> =
            deserialize_tensor(&payload).context("malformed beaver triple batch")?;
        if fresh.rank() != 2 || fresh.shape()[1] != 3 || fresh.shape()[0] < need {
            bail!(
                "beaver triple batch has shape {:?}, expected [{need}, 3]",
                fresh.shape()
            );
        }

        let mut out: Vec<BeaverTriple> = cache.drain(..).collect();
        for i in 0..fresh.shape()[0] {
            let triple = BeaverTriple {
                a: fresh.at2(i, 0)?.clone(),
                b: fresh.at2(i, 1)?.clone(),
                ab: fresh.at2(i, 2)?.clone(),
            };
            if out.len() < count {
                out.push(triple);
            } else {
                cache.push_back(triple);
            }
        }
        Ok(out)
    }

    /// Joint decryption of a single ciphertext.
    pub async fn decrypt(&self, ct: &Ciphertext) -> Result<Plaintext> {
        let payload = encode_ciphertext(ct).into_bytes();
        let bodies = self
            .partial_decryptions(OperandKind::Single, payload)
            .await?;
        let parts: Vec<PartDecryption> = bodies
            .iter()
            .map(|body| {
                let text = std::str::from_utf8(body)
                    .map_err(|_| anyhow!("partial decryption is not ASCII"))?;
                Ok(parse_part_decryption(text)?)
            })
            .collect::<Result<_>>()?;
        Ok(self.system.combine(ct, &parts)?)
    }

    /// Joint decryption of a whole tensor in one round trip per node.
    pub async fn decrypt_tensor(&self, cts: &Tensor<Ciphertext>) -> Result<Tensor<Plaintext>> {
        let payload = serialize_tensor(cts);
        let bodies = self
            .partial_decryptions(OperandKind::Tensor, payload)
            .await?;
        let parts: Vec<Tensor<PartDecryption>> = bodies
            .iter()
            .map(|body| Ok(deserialize_tensor(body)?))
            .collect::<Result<_>>()?;
        Ok(self.system.combine_tensor(cts, &parts)?)
    }

    /// Sends one partial-decryption request to each of the `t` connected
    /// cofhe nodes in parallel and returns their raw payloads.
    async fn partial_decryptions(
        &self,
        kind: OperandKind,
        data: Vec<u8>,
    ) -> Result<Vec<Vec<u8>>> {
        let threshold = self.threshold();
        let mut decryptors = self.decryptors.lock().await;
        if decryptors.clients.len() < threshold {
            self.reinit_partial_decryption_clients(&mut decryptors)
                .await?;
        }

        let request = CofheRequest::new(
            CofheRequestKind::PartialDecryption,
            PartialDecryptionRequest::new(decryptors.combination, kind, data).to_bytes(),
        )
        .to_bytes();

        let calls = decryptors.clients.iter_mut().map(|client| {
            let body = request.clone();
            async move { client.run(ServiceType::Cofhe, body).await }
        });
        let results = futures::future::join_all(calls).await;

        let mut bodies = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(envelope) => {
                    bodies.push(ServiceResponse::from_bytes(&envelope.body)?.into_result()?)
                }
                Err(e) => {
                    // force a peer refresh on the next call
                    warn!(error = %e, "partial decryption peer failed");
                    decryptors.clients.clear();
                    return Err(e).context("partial decryption round failed");
                }
            }
        }
        Ok(bodies)
    }

    /// Fetches a fresh peer list from the setup node, rebuilds the cofhe
    /// connections and recomputes the combination rank.
    async fn reinit_partial_decryption_clients(
        &self,
        decryptors: &mut Decryptors,
    ) -> Result<()> {
        info!("refreshing partial decryption peers");
        let request = SetupRequest::new(
            SetupRequestKind::NetworkDetails,
            NetworkDetailsRequest::get().to_bytes(),
        );
        let payload = {
            let mut setup = self.setup.lock().await;
            let envelope = setup
                .run(ServiceType::Setup, request.to_bytes())
                .await
                .context("network details request failed")?;
            ServiceResponse::from_bytes(&envelope.body)?.into_result()?
        };
        let mut fresh = NetworkDetails::from_json(&payload)?;
        {
            let mut details = self.details.lock().expect("network details lock poisoned");
            fresh.self_node = details.self_node.clone();
            *details = fresh.clone();
        }
        *decryptors = connect_decryptors(&fresh, self.timeout).await?;
        Ok(())
    }
}

/// Connects the first `t` reachable cofhe nodes, in peer-list order, and
/// derives the combination rank from their party indices.
async fn connect_decryptors(details: &NetworkDetails, timeout: Duration) -> Result<Decryptors> {
    let threshold = details.cryptosystem.threshold;
    let total = details.cryptosystem.total_nodes;
    let mut clients = Vec::with_capacity(threshold);
    let mut parties = Vec::with_capacity(threshold);
    for (party, node) in details.cofhe_nodes().enumerate() {
        if clients.len() == threshold {
            break;
        }
        match Client::connect(&node.host, node.port, timeout).await {
            Ok(client) => {
                clients.push(client);
                parties.push(party);
            }
            Err(e) => warn!(host = %node.host, port = node.port, error = %e, "cofhe node unreachable"),
        }
    }
    if clients.len() < threshold {
        bail!(
            "threshold not met: only {} of {threshold} cofhe nodes reachable",
            clients.len()
        );
    }
    let combination = combination_rank(total, threshold, &parties);
    Ok(Decryptors {
        clients,
        combination,
    })
}
