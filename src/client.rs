use futures::{SinkExt, StreamExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::Framed;

use crate::error::{CoordinatorError, Result};
use crate::protocol::{FrameCodec, Value};

/// Client side of the coordination protocol: one request, one response.
pub struct CoordinationClient {
    framed: Framed<TcpStream, FrameCodec>,
}

impl CoordinationClient {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            framed: Framed::new(stream, FrameCodec),
        })
    }

    /// Send any value and wait for the response.
    pub async fn request(&mut self, value: Value) -> Result<Value> {
        self.framed.send(value).await?;
        match self.framed.next().await {
            Some(response) => response,
            None => Err(CoordinatorError::Protocol(
                "connection closed before a response was received".to_string(),
            )),
        }
    }

    pub async fn send(&mut self, message: &str) -> Result<Value> {
        self.request(Value::from(message)).await
    }

    /// Say `exit` and wait for the server to acknowledge it.
    pub async fn close(mut self) -> Result<()> {
        let response = self.send("exit").await?;
        tracing::debug!(response = %response, "Connection closed");
        Ok(())
    }
}
