//! Serverless flood-gossip overlay node.
//!
//! Nodes find each other by scanning their local /24 and swapping peer
//! lists, then flood RSA-PSS signed transactions to every reachable peer
//! over newline-delimited JSON on TCP.

pub mod addrman;
pub mod config;
pub mod error;
pub mod logging;
pub mod mempool;
pub mod network;
pub mod p2p;
pub mod seeds;
pub mod transaction;

pub use crate::addrman::{PeerAddr, PeerSet};
pub use crate::config::Settings;
pub use crate::error::{NodeError, Result};
pub use crate::mempool::TransactionPool;
pub use crate::network::{NetworkManager, Node};
pub use crate::p2p::{Message, TransactionPayload};
pub use crate::transaction::Transaction;
