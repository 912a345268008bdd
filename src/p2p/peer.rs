use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;

use super::codec::MessageCodec;
use super::messages::Message;
use crate::addrman::PeerAddr;
use crate::error::{NodeError, Result};

/// Per-connection timeouts and framing limit.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    /// Bound on the TCP connect
    pub connect_timeout: Duration,

    /// Bound on each single send or receive
    pub io_timeout: Duration,

    /// Longest accepted line
    pub max_line_length: usize,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            io_timeout: Duration::from_secs(5),
            max_line_length: super::codec::MAX_LINE_LENGTH,
        }
    }
}

/// An outbound, ephemeral connection.
///
/// Each protocol interaction dials, writes one message, optionally reads one
/// reply and drops the connection. Nothing here is pooled.
pub struct Connection {
    /// Remote address as dialed
    pub addr: PeerAddr,

    /// Framed stream
    framed: Framed<TcpStream, MessageCodec>,

    io_timeout: Duration,
}

impl Connection {
    pub async fn open(addr: &PeerAddr, limits: ConnectionLimits) -> Result<Self> {
        let stream = match timeout(
            limits.connect_timeout,
            TcpStream::connect((addr.host.as_str(), addr.port)),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(NodeError::Connect {
                    peer: addr.clone(),
                    source,
                })
            }
            Err(_) => {
                return Err(NodeError::Timeout {
                    peer: addr.clone(),
                    op: "connect",
                })
            }
        };
        // Small one-shot messages; don't wait for Nagle.
        let _ = stream.set_nodelay(true);

        Ok(Self {
            addr: addr.clone(),
            framed: Framed::new(stream, MessageCodec::new(limits.max_line_length)),
            io_timeout: limits.io_timeout,
        })
    }

    pub async fn send(&mut self, msg: Message) -> Result<()> {
        match timeout(self.io_timeout, self.framed.send(msg)).await {
            Ok(res) => res,
            Err(_) => Err(self.timed_out("send")),
        }
    }

    /// Read the next message. A clean EOF is reported as [`NodeError::Closed`].
    pub async fn recv(&mut self) -> Result<Message> {
        match timeout(self.io_timeout, self.framed.next()).await {
            Ok(Some(res)) => res,
            Ok(None) => Err(NodeError::Closed),
            Err(_) => Err(self.timed_out("recv")),
        }
    }

    /// Send one message and wait for exactly one reply.
    pub async fn request(&mut self, msg: Message) -> Result<Message> {
        self.send(msg).await?;
        self.recv().await
    }

    /// Flush and shut down the write half.
    pub async fn close(mut self) {
        let _ = timeout(self.io_timeout, self.framed.close()).await;
    }

    fn timed_out(&self, op: &'static str) -> NodeError {
        NodeError::Timeout {
            peer: self.addr.clone(),
            op,
        }
    }
}

// Helper methods

/// Dial, send one message, close.
pub async fn send_one(addr: &PeerAddr, msg: Message, limits: ConnectionLimits) -> Result<()> {
    let mut conn = Connection::open(addr, limits).await?;
    conn.send(msg).await?;
    conn.close().await;
    Ok(())
}

/// Dial, send one message, read one reply, close.
pub async fn request_one(addr: &PeerAddr, msg: Message, limits: ConnectionLimits) -> Result<Message> {
    let mut conn = Connection::open(addr, limits).await?;
    let reply = conn.request(msg).await?;
    conn.close().await;
    Ok(reply)
}
