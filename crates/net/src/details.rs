// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

//! The network registry the setup node serves: who is in the network, the
//! cryptosystem parameters everyone shares, and — for cofhe nodes — the key
//! shares this node holds. Travels as JSON; key material stays in its text
//! encoding so this layer needs no crypto types.

use crate::error::NetError;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Setup,
    Cofhe,
    Compute,
    Client,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDetails {
    pub host: String,
    pub port: u16,
    #[serde(rename = "type")]
    pub node_type: NodeType,
}

impl NodeDetails {
    pub fn new(host: impl Into<String>, port: u16, node_type: NodeType) -> Self {
        NodeDetails {
            host: host.into(),
            port,
            node_type,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoSystemDetails {
    pub security_level: u32,
    pub message_bits: u32,
    pub compact: bool,
    pub threshold: usize,
    pub total_nodes: usize,
    /// Serialized public key, empty until the setup node has generated it.
    pub public_key: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDetails {
    pub self_node: NodeDetails,
    /// All known peers in join order; cofhe-node party indices follow this
    /// order.
    pub nodes: Vec<NodeDetails>,
    pub cryptosystem: CryptoSystemDetails,
    /// Serialized key shares held by this node; populated on cofhe nodes
    /// only.
    #[serde(default)]
    pub secret_key_shares: Vec<String>,
}

impl NetworkDetails {
    pub fn to_json(&self) -> Result<Vec<u8>, NetError> {
        serde_json::to_vec(self)
            .map_err(|e| NetError::Protocol(format!("cannot encode network details: {e}")))
    }

    pub fn from_json(data: &[u8]) -> Result<Self, NetError> {
        serde_json::from_slice(data)
            .map_err(|e| NetError::Protocol(format!("cannot decode network details: {e}")))
    }

    /// Cofhe peers in join order; index in this list is the party id.
    pub fn cofhe_nodes(&self) -> impl Iterator<Item = &NodeDetails> {
        self.nodes
            .iter()
            .filter(|n| n.node_type == NodeType::Cofhe)
    }

    pub fn setup_node(&self) -> Option<&NodeDetails> {
        self.nodes.iter().find(|n| n.node_type == NodeType::Setup)
    }

    pub fn compute_nodes(&self) -> impl Iterator<Item = &NodeDetails> {
        self.nodes
            .iter()
            .filter(|n| n.node_type == NodeType::Compute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NetworkDetails {
        NetworkDetails {
            self_node: NodeDetails::new("127.0.0.1", 4455, NodeType::Setup),
            nodes: vec![
                NodeDetails::new("127.0.0.1", 4455, NodeType::Setup),
                NodeDetails::new("127.0.0.1", 4456, NodeType::Cofhe),
                NodeDetails::new("127.0.0.1", 4457, NodeType::Cofhe),
                NodeDetails::new("127.0.0.1", 4459, NodeType::Compute),
            ],
            cryptosystem: CryptoSystemDetails {
                security_level: 128,
                message_bits: 64,
                compact: false,
                threshold: 2,
                total_nodes: 3,
                public_key: "1 0 0".into(),
            },
            secret_key_shares: vec![],
        }
    }

    #[test]
    fn json_round_trip() {
        let details = sample();
        let json = details.to_json().unwrap();
        assert_eq!(NetworkDetails::from_json(&json).unwrap(), details);
    }

    #[test]
    fn peer_filters() {
        let details = sample();
        assert_eq!(details.cofhe_nodes().count(), 2);
        assert_eq!(details.compute_nodes().count(), 1);
        assert_eq!(details.setup_node().unwrap().port, 4455);
    }
}
