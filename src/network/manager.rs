// src/network/manager.rs
use futures::{stream, StreamExt};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::addrman::{PeerAddr, PeerSet};
use crate::config::Settings;
use crate::error::{NodeError, Result};
use crate::p2p::peer::request_one;
use crate::p2p::{Connection, Message};
use crate::seeds;

/// What one discovery pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Scan targets attempted
    pub scanned: usize,
    /// Scan targets that accepted a connection
    pub found: Vec<PeerAddr>,
    /// Peers that answered `get_peers`
    pub exchanged: usize,
    /// Addresses not known before this pass
    pub learned: usize,
    /// Peers dropped after a failed exchange
    pub dropped: Vec<PeerAddr>,
}

/// What one liveness pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LivenessReport {
    pub checked: usize,
    pub dead: Vec<PeerAddr>,
}

/// Keeps a [`PeerSet`] populated and pruned without any coordinator.
///
/// Discovery and liveness run as two independent loops over the same set.
/// Both iterate over snapshots and apply their verdicts to the live set
/// afterwards, so a ping never holds the set while it waits on the network.
#[derive(Clone)]
pub struct NetworkManager {
    peers: PeerSet,
    settings: Settings,
}

impl NetworkManager {
    /// Settings are validated; a zero loop interval is rejected here.
    pub fn new(peers: PeerSet, settings: Settings) -> Result<Self> {
        settings.validate()?;
        Ok(Self { peers, settings })
    }

    pub fn peers(&self) -> &PeerSet {
        &self.peers
    }

    /// Run whichever loops are enabled. Never returns while one is enabled.
    pub async fn run(self) {
        let discovery = async {
            if self.settings.network.enable_discovery {
                self.run_discovery().await;
            }
        };
        let liveness = async {
            if self.settings.network.enable_liveness {
                self.run_liveness().await;
            }
        };
        tokio::join!(discovery, liveness);
    }

    /// Scan and exchange immediately, then once per discovery interval.
    pub async fn run_discovery(&self) {
        let mut ticker = interval(self.settings.discovery_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let report = self.discovery_pass().await;
            info!(
                scanned = report.scanned,
                found = report.found.len(),
                exchanged = report.exchanged,
                learned = report.learned,
                dropped = report.dropped.len(),
                known = self.peers.get_stats().known_count,
                "discovery pass complete"
            );
        }
    }

    /// Probe every known peer once per liveness interval.
    pub async fn run_liveness(&self) {
        let mut ticker = interval(self.settings.liveness_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let report = self.liveness_pass().await;
            let stats = self.peers.get_stats();
            if report.dead.is_empty() {
                debug!(checked = report.checked, known = stats.known_count, "liveness pass complete");
            } else {
                info!(
                    checked = report.checked,
                    dead = report.dead.len(),
                    known = stats.known_count,
                    own = stats.own_count,
                    "liveness pass pruned peers"
                );
            }
        }
    }

    /// Subnet scan followed by peer exchange.
    pub async fn discovery_pass(&self) -> DiscoveryReport {
        let mut report = self.scan_local_subnet().await;
        let exchange = self.exchange_peer_lists().await;
        report.exchanged = exchange.exchanged;
        report.learned += exchange.learned;
        report.dropped = exchange.dropped;
        report
    }

    /// Scan the /24 of this host's outbound address on the configured ports.
    pub async fn scan_local_subnet(&self) -> DiscoveryReport {
        let ip = seeds::local_ipv4(&self.settings.network.route_addr).await;
        let targets = seeds::subnet_targets(ip, self.settings.scan_ports());
        debug!(local_ip = %ip, targets = targets.len(), "scanning local subnet");
        self.scan_targets(targets).await
    }

    /// Try a bare TCP connect to each target; every one that accepts is
    /// recorded as a peer. No handshake is attempted.
    pub async fn scan_targets(&self, targets: Vec<PeerAddr>) -> DiscoveryReport {
        let limits = self.settings.scan_limits();
        let scanned = targets.len();
        let targets: Vec<PeerAddr> = targets
            .into_iter()
            .filter(|addr| !self.peers.is_own(addr))
            .collect();

        let found: Vec<PeerAddr> = stream::iter(targets)
            .map(|addr| async move {
                match Connection::open(&addr, limits).await {
                    Ok(conn) => {
                        conn.close().await;
                        Some(addr)
                    }
                    Err(_) => None,
                }
            })
            .buffer_unordered(self.settings.network.scan_concurrency)
            .filter_map(|res| async move { res })
            .collect()
            .await;

        let learned = self.peers.extend(found.iter().cloned());
        for addr in &found {
            debug!(peer = %addr, "scan hit");
        }

        DiscoveryReport {
            scanned,
            found,
            learned,
            ..Default::default()
        }
    }

    /// Ask every known peer for its peer list and merge the answers. A peer
    /// whose exchange fails at the transport or framing level is dropped.
    pub async fn exchange_peer_lists(&self) -> DiscoveryReport {
        let limits = self.settings.connection_limits();
        let snapshot = self.peers.snapshot();

        let results: Vec<(PeerAddr, Result<Message>)> = stream::iter(snapshot)
            .map(|peer| async move {
                let reply = request_one(&peer, Message::GetPeers, limits).await;
                (peer, reply)
            })
            .buffer_unordered(self.settings.network.exchange_concurrency)
            .collect()
            .await;

        let mut report = DiscoveryReport::default();
        for (peer, reply) in results {
            match reply {
                Ok(Message::Peers { peers }) => {
                    report.exchanged += 1;
                    report.learned += self.peers.extend(peers);
                }
                Ok(other) => {
                    debug!(peer = %peer, kind = other.command_name(), "unexpected reply to get_peers");
                }
                Err(e) => {
                    warn!(peer = %peer, error = %e, "peer exchange failed, dropping peer");
                    report.dropped.push(peer);
                }
            }
        }
        self.peers.remove_all(&report.dropped);
        report
    }

    /// Ping every known peer; all that fail are removed together at the end.
    pub async fn liveness_pass(&self) -> LivenessReport {
        let snapshot = self.peers.snapshot();
        let checked = snapshot.len();

        let dead: Vec<PeerAddr> = stream::iter(snapshot)
            .map(|peer| async move {
                match self.ping(&peer).await {
                    Ok(()) => None,
                    Err(e) => {
                        debug!(peer = %peer, error = %e, "ping failed");
                        Some(peer)
                    }
                }
            })
            .buffer_unordered(self.settings.network.exchange_concurrency)
            .filter_map(|res| async move { res })
            .collect()
            .await;

        self.peers.remove_all(&dead);
        LivenessReport { checked, dead }
    }

    /// One `ping`, expecting `pong`.
    pub async fn ping(&self, peer: &PeerAddr) -> Result<()> {
        match request_one(peer, Message::Ping, self.settings.connection_limits()).await? {
            Message::Pong => Ok(()),
            other => Err(NodeError::Protocol(format!(
                "expected pong, got {}",
                other.command_name()
            ))),
        }
    }
}
