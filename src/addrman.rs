use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

/// A peer as the protocol sees it: a declared host and a port.
///
/// Hosts are kept as strings because `hello` and `peers` messages carry
/// whatever the remote side announced, which need not be an IP literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerAddr {
    pub host: String,
    pub port: u16,
}

impl PeerAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host:port`. The port is taken after the last colon.
    pub fn parse(s: &str) -> Option<Self> {
        let (host, port) = s.rsplit_once(':')?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return None;
        }
        Some(Self::new(host, port.parse().ok()?))
    }
}

impl From<SocketAddr> for PeerAddr {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Shared set of known peers.
///
/// Cloning yields another handle onto the same set; the node's dispatch loop
/// and the network manager's loops all mutate one instance. Every operation
/// takes the lock for its own duration only, so no caller ever holds it
/// across a suspension point.
#[derive(Clone, Default)]
pub struct PeerSet {
    /// Known peers
    peers: Arc<RwLock<HashSet<PeerAddr>>>,

    /// Our own addresses (to avoid enrolling ourselves)
    own_addrs: Arc<RwLock<HashSet<PeerAddr>>>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a peer. Returns true if it was not already present.
    pub fn add(&self, addr: PeerAddr) -> bool {
        if self.own_addrs.read().contains(&addr) {
            return false;
        }
        self.peers.write().insert(addr)
    }

    /// Merge many peers at once, returning how many were new.
    pub fn extend<I>(&self, addrs: I) -> usize
    where
        I: IntoIterator<Item = PeerAddr>,
    {
        let own = self.own_addrs.read();
        let mut peers = self.peers.write();
        addrs
            .into_iter()
            .filter(|a| !own.contains(a))
            .filter(|a| peers.insert(a.clone()))
            .count()
    }

    /// Remove a peer. Removing an absent peer is a no-op.
    pub fn remove(&self, addr: &PeerAddr) -> bool {
        self.peers.write().remove(addr)
    }

    /// Remove several peers under a single write.
    pub fn remove_all<'a, I>(&self, addrs: I) -> usize
    where
        I: IntoIterator<Item = &'a PeerAddr>,
    {
        let mut peers = self.peers.write();
        addrs.into_iter().filter(|a| peers.remove(*a)).count()
    }

    pub fn contains(&self, addr: &PeerAddr) -> bool {
        self.peers.read().contains(addr)
    }

    /// Copy of the current contents, taken under one read lock.
    pub fn snapshot(&self) -> Vec<PeerAddr> {
        self.peers.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }

    /// Register an address that refers to this node; it is dropped from the
    /// set if already present and refused from then on.
    pub fn add_own(&self, addr: PeerAddr) {
        self.peers.write().remove(&addr);
        self.own_addrs.write().insert(addr);
    }

    pub fn is_own(&self, addr: &PeerAddr) -> bool {
        self.own_addrs.read().contains(addr)
    }

    /// Get statistics
    pub fn get_stats(&self) -> PeerSetStats {
        PeerSetStats {
            known_count: self.peers.read().len(),
            own_count: self.own_addrs.read().len(),
        }
    }
}

impl fmt::Debug for PeerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerSet")
            .field("peers", &*self.peers.read())
            .field("own_addrs", &*self.own_addrs.read())
            .finish()
    }
}

/// Peer set statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSetStats {
    pub known_count: usize,
    pub own_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_peer_set_creation() {
        let peers = PeerSet::new();
        assert!(peers.is_empty());
        assert_eq!(peers.get_stats().known_count, 0);
    }

    #[test]
    fn test_add_is_value_equal() {
        let peers = PeerSet::new();
        assert!(peers.add(PeerAddr::new("127.0.0.1", 17000)));
        assert!(!peers.add(PeerAddr::new("127.0.0.1", 17000)));
        assert!(peers.add(PeerAddr::new("127.0.0.1", 17001)));
        assert_eq!(peers.len(), 2);
    }

    #[test]
    fn test_clones_share_state() {
        let a = PeerSet::new();
        let b = a.clone();
        a.add(PeerAddr::new("10.0.0.2", 17000));
        assert!(b.contains(&PeerAddr::new("10.0.0.2", 17000)));
        b.remove(&PeerAddr::new("10.0.0.2", 17000));
        assert!(a.is_empty());
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let peers = PeerSet::new();
        assert!(!peers.remove(&PeerAddr::new("1.2.3.4", 1)));
    }

    #[test]
    fn test_own_address_filtered() {
        let peers = PeerSet::new();
        let me = PeerAddr::new("192.168.1.5", 17000);
        peers.add(me.clone());
        peers.add_own(me.clone());

        assert!(!peers.contains(&me));
        assert!(!peers.add(me.clone()));
        assert_eq!(peers.extend(vec![me, PeerAddr::new("192.168.1.6", 17000)]), 1);
        assert_eq!(
            peers.get_stats(),
            PeerSetStats {
                known_count: 1,
                own_count: 1
            }
        );
    }

    #[test]
    fn test_remove_all() {
        let peers = PeerSet::new();
        let a = PeerAddr::new("a", 1);
        let b = PeerAddr::new("b", 2);
        peers.extend(vec![a.clone(), b.clone(), PeerAddr::new("c", 3)]);

        assert_eq!(peers.remove_all(&[a, b, PeerAddr::new("z", 9)]), 2);
        assert_eq!(peers.snapshot(), vec![PeerAddr::new("c", 3)]);
    }

    #[test]
    fn test_parse_peer_addr() {
        assert_eq!(PeerAddr::parse("127.0.0.1:17000"), Some(PeerAddr::new("127.0.0.1", 17000)));
        assert_eq!(PeerAddr::parse("node.local:80"), Some(PeerAddr::new("node.local", 80)));
        assert_eq!(PeerAddr::parse("[::1]:17000"), Some(PeerAddr::new("::1", 17000)));
        assert_eq!(PeerAddr::parse("no-port"), None);
        assert_eq!(PeerAddr::parse(":17000"), None);
        assert_eq!(PeerAddr::parse("host:notaport"), None);
    }

    proptest! {
        #[test]
        fn prop_set_has_no_duplicates(ports in proptest::collection::vec(1u16..50, 0..64)) {
            let peers = PeerSet::new();
            let added = peers.extend(ports.iter().map(|p| PeerAddr::new("127.0.0.1", *p)));

            let distinct: HashSet<u16> = ports.iter().copied().collect();
            prop_assert_eq!(added, distinct.len());
            prop_assert_eq!(peers.len(), distinct.len());
        }
    }
}
