// src/network/node.rs
use futures::{stream, SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::addrman::{PeerAddr, PeerSet};
use crate::config::Settings;
use crate::error::{NodeError, Result};
use crate::mempool::TransactionPool;
use crate::p2p::peer::send_one;
use crate::p2p::{KnownTransactions, Message, MessageCodec, TransactionPayload};
use crate::seeds;
use crate::transaction::Transaction;

/// Outcome of one flood to the current peer set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Peers whose send failed; they are no longer in the peer set
    pub failed: Vec<PeerAddr>,
}

/// A participant in the overlay.
///
/// `Node` is a cheap handle: clones share identity, peer set and both
/// transaction maps, so the accept loop, every connection task and the
/// caller all act on the same node.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

struct NodeInner {
    /// Process-lifetime identifier, self-declared
    node_id: String,

    settings: Settings,

    /// Known peers
    peers: PeerSet,

    /// Gossip dedup, keyed by message id
    known: KnownTransactions,

    /// Content-hash keyed pool
    pool: TransactionPool,

    /// Actual listen address once bound
    local_addr: OnceLock<SocketAddr>,

    /// Address announced in `hello`, fixed at bind time
    advertised: OnceLock<PeerAddr>,
}

/// A bound but not yet serving listener.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    node: Node,
}

impl Node {
    pub fn new(settings: Settings) -> Result<Self> {
        Self::with_peers(settings, PeerSet::new())
    }

    /// Build a node around an existing peer set, e.g. one shared with a
    /// [`NetworkManager`](super::NetworkManager). Settings are validated.
    pub fn with_peers(settings: Settings, peers: PeerSet) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            inner: Arc::new(NodeInner {
                node_id: Uuid::new_v4().to_string(),
                settings,
                peers,
                known: KnownTransactions::new(),
                pool: TransactionPool::new(),
                local_addr: OnceLock::new(),
                advertised: OnceLock::new(),
            }),
        })
    }

    /// Bind the listening socket. Failure here is the one error that should
    /// stop the node. A node binds at most once.
    pub async fn bind(&self) -> Result<Server> {
        let host = self.inner.settings.node.host.clone();
        let port = self.inner.settings.node.port;
        let addr = format!("{host}:{port}");

        if let Some(bound) = self.local_addr() {
            return Err(NodeError::Bind {
                addr,
                source: std::io::Error::new(
                    std::io::ErrorKind::AddrInUse,
                    format!("node already listening on {bound}"),
                ),
            });
        }

        let listener = TcpListener::bind((host.as_str(), port))
            .await
            .map_err(|source| NodeError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local = listener
            .local_addr()
            .map_err(|source| NodeError::Bind { addr, source })?;

        self.register_listen_addr(local).await;
        info!(
            node_id = %self.inner.node_id,
            listen = %local,
            advertise = %self.advertised_addr(),
            "node listening"
        );

        Ok(Server {
            listener,
            node: self.clone(),
        })
    }

    /// Bind and serve until the process ends.
    pub async fn start(&self) -> Result<()> {
        self.bind().await?.serve().await
    }

    /// Announce ourselves to `host:port`.
    ///
    /// The peer is added before dialing and dropped again if the dial or
    /// write fails. No `hello_ack` is awaited.
    pub async fn connect_to_peer(&self, host: &str, port: u16) -> bool {
        let addr = PeerAddr::new(host, port);
        self.inner.peers.add(addr.clone());

        match send_one(&addr, self.hello(), self.inner.settings.connection_limits()).await {
            Ok(()) => {
                info!(peer = %addr, "sent hello");
                true
            }
            Err(e) => {
                self.inner.peers.remove(&addr);
                warn!(peer = %addr, error = %e, "connect failed");
                false
            }
        }
    }

    /// Send `payload` to every peer in a snapshot of the peer set, one
    /// ephemeral connection each. Peers whose send fails are removed from
    /// the live set; nothing is retried.
    pub async fn broadcast_transaction(&self, payload: TransactionPayload) -> BroadcastReport {
        let targets = self.inner.peers.snapshot();
        if targets.is_empty() {
            return BroadcastReport::default();
        }

        let limits = self.inner.settings.connection_limits();
        let total = targets.len();
        let tx_id = payload.id.clone();
        let msg = Message::Transaction {
            transaction: payload,
        };

        let failed: Vec<PeerAddr> = stream::iter(targets)
            .map(|peer| {
                let msg = msg.clone();
                async move {
                    match send_one(&peer, msg, limits).await {
                        Ok(()) => None,
                        Err(e) => {
                            warn!(peer = %peer, error = %e, "broadcast failed, dropping peer");
                            Some(peer)
                        }
                    }
                }
            })
            .buffer_unordered(self.inner.settings.limits.broadcast_concurrency)
            .filter_map(|res| async move { res })
            .collect()
            .await;

        self.inner.peers.remove_all(&failed);
        debug!(tx_id = %tx_id, delivered = total - failed.len(), failed = failed.len(), "broadcast done");

        BroadcastReport {
            delivered: total - failed.len(),
            failed,
        }
    }

    /// Record a locally created transaction and flood it.
    pub async fn submit_transaction(&self, tx: &Transaction) -> BroadcastReport {
        let payload = tx.to_payload();
        self.inner.known.insert_if_absent(payload.clone());
        self.inner.pool.add(tx.clone());
        info!(tx_id = %payload.id, "submitting transaction");
        self.broadcast_transaction(payload).await
    }

    // Read access

    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    /// Current peer list
    pub fn peers(&self) -> Vec<PeerAddr> {
        self.inner.peers.snapshot()
    }

    /// Shared handle onto the peer set
    pub fn peer_set(&self) -> &PeerSet {
        &self.inner.peers
    }

    /// Every transaction seen on the wire, by id
    pub fn known_transactions(&self) -> Vec<TransactionPayload> {
        self.inner.known.snapshot()
    }

    pub fn known_transaction(&self, id: &str) -> Option<TransactionPayload> {
        self.inner.known.get(id)
    }

    pub fn pool(&self) -> &TransactionPool {
        &self.inner.pool
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.local_addr.get().copied()
    }

    /// Address we announce in `hello`.
    pub fn advertised_addr(&self) -> PeerAddr {
        match self.inner.advertised.get() {
            Some(addr) => addr.clone(),
            None => self.inner.settings.advertised_addr(),
        }
    }

    // Helper methods

    fn hello(&self) -> Message {
        let me = self.advertised_addr();
        Message::Hello {
            node_id: self.inner.node_id.clone(),
            host: me.host,
            port: me.port,
        }
    }

    /// Fix the advertised address and mark every name for our listener as
    /// our own so discovery never enrolls it.
    async fn register_listen_addr(&self, local: SocketAddr) {
        let settings = &self.inner.settings;
        let port = local.port();

        let advertised_host = match &settings.node.advertise_host {
            Some(host) => host.clone(),
            None if local.ip().is_unspecified() => {
                seeds::local_ipv4(&settings.network.route_addr).await.to_string()
            }
            None => local.ip().to_string(),
        };
        let advertised = PeerAddr::new(advertised_host, port);

        let peers = &self.inner.peers;
        peers.add_own(advertised.clone());
        peers.add_own(PeerAddr::new("127.0.0.1", port));
        peers.add_own(PeerAddr::new("localhost", port));
        if !local.ip().is_unspecified() {
            peers.add_own(PeerAddr::from(local));
        }

        // Two racing binds: the first one to get here keeps its address.
        if self.inner.local_addr.set(local).is_err() || self.inner.advertised.set(advertised).is_err() {
            warn!(listen = %local, "node already bound, keeping first listen address");
        }
    }

    /// Serve one accepted connection until EOF, idle timeout, or the first
    /// bad frame. Errors never leave this function.
    async fn handle_connection(self, stream: TcpStream, remote: SocketAddr) {
        let settings = &self.inner.settings;
        let idle = settings.idle_timeout();
        let io_timeout = settings.connection_limits().io_timeout;
        let mut framed = Framed::new(stream, MessageCodec::new(settings.limits.max_line_length));

        loop {
            let msg = match timeout(idle, framed.next()).await {
                Err(_) => {
                    debug!(remote = %remote, "idle connection closed");
                    break;
                }
                Ok(None) => break,
                Ok(Some(Err(e))) => {
                    warn!(remote = %remote, error = %e, "malformed message, closing connection");
                    break;
                }
                Ok(Some(Ok(msg))) => msg,
            };

            debug!(remote = %remote, kind = msg.command_name(), "received");
            let Some(reply) = self.dispatch(msg, remote).await else {
                continue;
            };

            match timeout(io_timeout, framed.send(reply)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!(remote = %remote, error = %e, "reply failed");
                    break;
                }
                Err(_) => {
                    debug!(remote = %remote, "reply timed out");
                    break;
                }
            }
        }
    }

    /// Apply one inbound message; returns the reply to write back, if any.
    async fn dispatch(&self, msg: Message, remote: SocketAddr) -> Option<Message> {
        match msg {
            Message::Hello { node_id, host, port } => {
                let addr = PeerAddr::new(host, port);
                if self.inner.peers.add(addr.clone()) {
                    info!(peer = %addr, remote_id = %node_id, "peer registered");
                }
                Some(Message::HelloAck {
                    node_id: self.inner.node_id.clone(),
                })
            }
            Message::GetPeers => Some(Message::Peers {
                peers: self.inner.peers.snapshot(),
            }),
            Message::Transaction { transaction } => {
                if !self.inner.known.insert_if_absent(transaction.clone()) {
                    debug!(tx_id = %transaction.id, "already known");
                    return None;
                }
                info!(tx_id = %transaction.id, from = %remote, "new transaction");
                self.inner.pool.add(Transaction::from_payload(&transaction));
                self.broadcast_transaction(transaction).await;
                None
            }
            Message::Ping => Some(Message::Pong),
            Message::HelloAck { .. } | Message::Peers { .. } | Message::Pong => {
                debug!(remote = %remote, kind = msg.command_name(), "unsolicited reply ignored");
                None
            }
            Message::Unknown => {
                debug!(remote = %remote, "unknown message type ignored");
                None
            }
        }
    }
}

impl Server {
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept forever, one task per connection.
    pub async fn serve(self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, remote)) => {
                    info!(remote = %remote, "accepted connection");
                    let node = self.node.clone();
                    tokio::spawn(node.handle_connection(stream, remote));
                }
                Err(e) => {
                    // Usually fd exhaustion; back off instead of spinning.
                    error!(error = %e, "accept failed");
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                }
            }
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("node_id", &self.inner.node_id)
            .field("local_addr", &self.local_addr())
            .field("peers", &self.inner.peers.len())
            .finish()
    }
}
