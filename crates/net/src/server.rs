// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use crate::envelope::{RequestEnvelope, ResponseEnvelope, PROTOCOL_VERSION};
use crate::error::NetError;
use crate::frame;
use std::future::Future;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

/// A node's request dispatcher. The handler decides what to do with every
/// envelope; transport-level failures never reach it.
pub trait RequestHandler: Send + Sync + 'static {
    fn handle(
        &self,
        request: RequestEnvelope,
    ) -> impl Future<Output = ResponseEnvelope> + Send;
}

/// Accept loop over a reliable stream transport. Each connection gets its
/// own session task; within a session requests are handled strictly in
/// order, so concurrent load comes from concurrent connections.
pub struct Server<H: RequestHandler> {
    listener: TcpListener,
    handler: Arc<H>,
}

impl<H: RequestHandler> Server<H> {
    pub async fn bind(host: &str, port: u16, handler: H) -> Result<Self, NetError> {
        let listener = TcpListener::bind((host, port)).await?;
        info!(addr = %listener.local_addr()?, "server listening");
        Ok(Server {
            listener,
            handler: Arc::new(handler),
        })
    }

    pub fn local_port(&self) -> Result<u16, NetError> {
        Ok(self.listener.local_addr()?.port())
    }

    pub fn handler(&self) -> Arc<H> {
        Arc::clone(&self.handler)
    }

    /// Serves until SIGINT/SIGTERM.
    pub async fn run(self) -> Result<(), NetError> {
        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!(%peer, "accepted connection");
                            let handler = Arc::clone(&self.handler);
                            tokio::spawn(async move {
                                if let Err(e) = session(stream, handler).await {
                                    debug!(%peer, error = %e, "session closed");
                                }
                            });
                        }
                        Err(e) => error!(error = %e, "accept failed"),
                    }
                }
                _ = &mut shutdown => {
                    info!("shutdown signal received");
                    return Ok(());
                }
            }
        }
    }
}

/// One connection's request loop: read, dispatch, respond, repeat until the
/// peer closes. A malformed header or a dropped connection ends the session
/// without a response; buffers owned by the request go with it.
async fn session<H: RequestHandler>(stream: TcpStream, handler: Arc<H>) -> Result<(), NetError> {
    stream.set_nodelay(true)?;
    let mut reader = BufReader::new(stream);
    loop {
        let Some(request) = frame::read_request(&mut reader).await? else {
            return Ok(());
        };
        if request.version != PROTOCOL_VERSION {
            return Err(NetError::Protocol(format!(
                "unsupported protocol version {}",
                request.version
            )));
        }
        let response = handler.handle(request).await;
        frame::write_response(reader.get_mut(), &response).await?;
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "cannot install SIGTERM handler");
                std::future::pending::<()>().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{ServiceType, Status};
    use crate::Client;
    use std::time::Duration;

    struct Echo;

    impl RequestHandler for Echo {
        async fn handle(&self, request: RequestEnvelope) -> ResponseEnvelope {
            ResponseEnvelope::new(request.service, Status::Ok, request.body)
        }
    }

    #[tokio::test]
    async fn echo_round_trip_and_session_reuse() {
        let server = Server::bind("127.0.0.1", 0, Echo).await.unwrap();
        let port = server.local_port().unwrap();
        tokio::spawn(server.run());

        let mut client = Client::connect("127.0.0.1", port, Duration::from_secs(2))
            .await
            .unwrap();
        for i in 0..3u8 {
            let res = client
                .run(ServiceType::Setup, vec![i, i + 1])
                .await
                .unwrap();
            assert_eq!(res.status, Status::Ok);
            assert_eq!(res.body, vec![i, i + 1]);
        }
    }

    #[tokio::test]
    async fn connect_to_dead_peer_surfaces_unavailable() {
        let port = cofhe_test_helpers::free_port();
        let err = Client::connect("127.0.0.1", port, Duration::from_secs(1)).await;
        assert!(matches!(
            err,
            Err(NetError::PeerUnavailable(_)) | Err(NetError::Timeout(_))
        ));
    }
}
