// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

pub mod client;
pub mod details;
pub mod envelope;
pub mod error;
pub mod frame;
pub mod messages;
pub mod server;

pub use client::Client;
pub use details::{CryptoSystemDetails, NetworkDetails, NodeDetails, NodeType};
pub use envelope::{RequestEnvelope, ResponseEnvelope, ServiceType, Status, PROTOCOL_VERSION};
pub use error::NetError;
pub use server::{RequestHandler, Server};
