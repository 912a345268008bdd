use serde::{Deserialize, Serialize};

use crate::addrman::PeerAddr;
use crate::error::Result;

/// Transaction as it travels in a `transaction` message.
///
/// `id` is chosen by whoever first broadcast it and is only used for
/// gossip dedup; it need not equal the content hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionPayload {
    pub id: String,
    pub sender: String,
    pub recipient: String,
    pub amount: f64,
    pub timestamp: i64,
    #[serde(default)]
    pub signature: Option<String>,
}

/// P2P message types, one JSON object per line, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Announce self, request registration
    Hello {
        node_id: String,
        host: String,
        port: u16,
    },

    /// Registration acknowledgment
    HelloAck { node_id: String },

    /// Request peer list
    GetPeers,

    /// Peer list snapshot
    Peers { peers: Vec<PeerAddr> },

    /// Flood a transaction
    Transaction { transaction: TransactionPayload },

    /// Liveness check
    Ping,

    /// Liveness reply
    Pong,

    /// Any `type` this node does not speak. Decoded so it can be ignored
    /// instead of tearing down the connection; never sent.
    #[serde(other)]
    Unknown,
}

impl Message {
    pub fn command_name(&self) -> &'static str {
        match self {
            Message::Hello { .. } => "hello",
            Message::HelloAck { .. } => "hello_ack",
            Message::GetPeers => "get_peers",
            Message::Peers { .. } => "peers",
            Message::Transaction { .. } => "transaction",
            Message::Ping => "ping",
            Message::Pong => "pong",
            Message::Unknown => "unknown",
        }
    }

    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_line(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shapes() {
        let hello = Message::Hello {
            node_id: "abc".into(),
            host: "10.0.0.1".into(),
            port: 17000,
        };
        assert_eq!(
            serde_json::to_value(&hello).unwrap(),
            json!({"type": "hello", "node_id": "abc", "host": "10.0.0.1", "port": 17000})
        );
        assert_eq!(serde_json::to_value(Message::GetPeers).unwrap(), json!({"type": "get_peers"}));
        assert_eq!(serde_json::to_value(Message::Pong).unwrap(), json!({"type": "pong"}));

        let peers = Message::Peers {
            peers: vec![PeerAddr::new("10.0.0.2", 17001)],
        };
        assert_eq!(
            serde_json::to_value(&peers).unwrap(),
            json!({"type": "peers", "peers": [{"host": "10.0.0.2", "port": 17001}]})
        );
    }

    #[test]
    fn test_decode_transaction() {
        let line = r#"{"type":"transaction","transaction":{"id":"t1","sender":"a","recipient":"b","amount":2.5,"timestamp":10,"signature":null}}"#;
        match Message::from_line(line).unwrap() {
            Message::Transaction { transaction } => {
                assert_eq!(transaction.id, "t1");
                assert_eq!(transaction.amount, 2.5);
                assert_eq!(transaction.signature, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_is_not_an_error() {
        let msg = Message::from_line(r#"{"type":"gossip_v2","x":1}"#).unwrap();
        assert_eq!(msg, Message::Unknown);
    }

    #[test]
    fn test_missing_field_is_an_error() {
        assert!(Message::from_line(r#"{"type":"hello","node_id":"x","host":"h"}"#).is_err());
        assert!(Message::from_line(r#"{"type":"transaction","transaction":{"sender":"a"}}"#).is_err());
        assert!(Message::from_line(r#"{"no_type":true}"#).is_err());
        assert!(Message::from_line("not json").is_err());
    }

    #[test]
    fn test_message_command_names() {
        assert_eq!(Message::GetPeers.command_name(), "get_peers");
        assert_eq!(Message::HelloAck { node_id: "n".into() }.command_name(), "hello_ack");
        assert_eq!(Message::Unknown.command_name(), "unknown");
    }
}
