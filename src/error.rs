// src/error.rs
use thiserror::Error;

use crate::addrman::PeerAddr;

pub type Result<T> = std::result::Result<T, NodeError>;

#[derive(Error, Debug)]
pub enum NodeError {
    /// The listening socket could not be bound. The only fatal class.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to connect to {peer}: {source}")]
    Connect {
        peer: PeerAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("{op} timed out for {peer}")]
    Timeout { peer: PeerAddr, op: &'static str },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("framing error: {0}")]
    Codec(String),

    #[error("message decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("connection closed by peer")]
    Closed,

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl From<tokio_util::codec::LinesCodecError> for NodeError {
    fn from(err: tokio_util::codec::LinesCodecError) -> Self {
        match err {
            tokio_util::codec::LinesCodecError::Io(e) => NodeError::Io(e),
            other => NodeError::Codec(other.to_string()),
        }
    }
}

impl From<rsa::Error> for NodeError {
    fn from(err: rsa::Error) -> Self {
        NodeError::Crypto(err.to_string())
    }
}

impl NodeError {
    /// Whether the error came from the transport rather than from the peer's bytes.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            NodeError::Connect { .. } | NodeError::Timeout { .. } | NodeError::Io(_) | NodeError::Closed
        )
    }
}
