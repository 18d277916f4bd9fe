//! TCP coordination server.
//!
//! One accept loop; every accepted connection is served by its own task, so
//! a slow or idle client never blocks others. Requests on one connection are
//! answered strictly in order.

pub mod handler;

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::Result;
use crate::protocol::FrameCodec;

pub use handler::{CommandHandler, Reply};

pub struct CoordinationServer {
    listener: TcpListener,
    handler: CommandHandler,
}

impl CoordinationServer {
    /// Bind the listening socket. Port 0 picks a free port.
    pub async fn bind(addr: SocketAddr, handler: CommandHandler) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, handler })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        tracing::info!(addr = %self.local_addr()?, "Coordination server listening");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Coordination server stopped accepting connections");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let connection = ConnectionHandler::new(stream, peer, self.handler.clone());
                        tokio::spawn(connection.run());
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
            }
        }
        Ok(())
    }
}

/// Serves one client connection.
pub struct ConnectionHandler {
    id: Uuid,
    framed: Framed<TcpStream, FrameCodec>,
    peer: SocketAddr,
    handler: CommandHandler,
}

impl ConnectionHandler {
    pub fn new(stream: TcpStream, peer: SocketAddr, handler: CommandHandler) -> Self {
        Self {
            id: Uuid::new_v4(),
            framed: Framed::new(stream, FrameCodec),
            peer,
            handler,
        }
    }

    pub async fn run(mut self) {
        tracing::debug!(connection = %self.id, peer = %self.peer, "Client connected");

        while let Some(frame) = self.framed.next().await {
            let request = match frame {
                Ok(request) => request,
                Err(e) => {
                    tracing::warn!(
                        connection = %self.id,
                        peer = %self.peer,
                        error = %e,
                        "Closing connection on bad frame"
                    );
                    break;
                }
            };

            let reply = self.handler.handle(request, self.peer).await;
            if let Err(e) = self.framed.send(reply.value).await {
                tracing::debug!(connection = %self.id, error = %e, "Failed to send response");
                break;
            }
            if reply.close {
                break;
            }
        }

        tracing::debug!(connection = %self.id, "Client disconnected");
    }
}
