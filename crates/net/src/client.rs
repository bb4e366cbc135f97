// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use crate::envelope::{RequestEnvelope, ResponseEnvelope, ServiceType};
use crate::error::NetError;
use crate::frame;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tracing::{debug, warn};

const CONNECT_ATTEMPTS: u32 = 3;
const CONNECT_BACKOFF: Duration = Duration::from_millis(200);

/// Persistent client connection to one peer.
///
/// The socket carries one request at a time: a `run` call owns the
/// connection until the response has been read, so callers needing
/// concurrency hold several clients.
pub struct Client {
    addr: String,
    reader: BufReader<TcpStream>,
    timeout: Duration,
}

impl Client {
    /// Connects with a bounded retry before surfacing `PeerUnavailable`.
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, NetError> {
        let addr = format!("{host}:{port}");
        let mut last_err = None;
        for attempt in 0..CONNECT_ATTEMPTS {
            match tokio::time::timeout(timeout, TcpStream::connect(&addr)).await {
                Ok(Ok(stream)) => {
                    stream.set_nodelay(true)?;
                    debug!(%addr, "connected");
                    return Ok(Client {
                        addr,
                        reader: BufReader::new(stream),
                        timeout,
                    });
                }
                Ok(Err(e)) => {
                    warn!(%addr, attempt, error = %e, "connect failed");
                    last_err = Some(e);
                }
                Err(_) => {
                    warn!(%addr, attempt, "connect timed out");
                    return Err(NetError::Timeout(addr));
                }
            }
            tokio::time::sleep(CONNECT_BACKOFF).await;
        }
        let _ = last_err;
        Err(NetError::PeerUnavailable(addr))
    }

    pub fn peer_addr(&self) -> &str {
        &self.addr
    }

    /// Sends one request and waits for its response, bounded by the
    /// per-request deadline.
    pub async fn run(
        &mut self,
        service: ServiceType,
        body: Vec<u8>,
    ) -> Result<ResponseEnvelope, NetError> {
        let req = RequestEnvelope::new(service, body);
        let addr = self.addr.clone();
        let fut = async {
            frame::write_request(self.reader.get_mut(), &req).await?;
            frame::read_response(&mut self.reader).await
        };
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(res) => res,
            Err(_) => Err(NetError::Timeout(addr)),
        }
    }
}
