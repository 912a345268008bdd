use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

use crate::transaction::Transaction;

/// Deduplicating store of transactions keyed by content hash.
///
/// Unbounded and unordered: nothing is evicted for the life of the node.
/// Clones share the same underlying map.
#[derive(Clone, Default)]
pub struct TransactionPool {
    /// All transactions in the pool
    entries: Arc<DashMap<String, Transaction>>,
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transaction. Returns false if its hash was already present,
    /// in which case the pool is left untouched.
    pub fn add(&self, tx: Transaction) -> bool {
        match self.entries.entry(tx.calculate_hash()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(tx);
                true
            }
        }
    }

    /// Get a transaction from the pool
    pub fn get(&self, hash: &str) -> Option<Transaction> {
        self.entries.get(hash).map(|entry| entry.value().clone())
    }

    /// Remove by hash; absent keys are ignored.
    pub fn remove(&self, hash: &str) -> Option<Transaction> {
        self.entries.remove(hash).map(|(_, tx)| tx)
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get all transaction hashes
    pub fn get_all_hashes(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_tx(n: i64) -> Transaction {
        Transaction::with_timestamp("alice", "bob", 1.5, n)
    }

    #[test]
    fn test_pool_creation() {
        let pool = TransactionPool::new();
        assert_eq!(pool.size(), 0);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_add_is_idempotent() {
        let pool = TransactionPool::new();
        let tx = dummy_tx(1);

        assert!(pool.add(tx.clone()));
        assert!(!pool.add(tx.clone()));
        assert_eq!(pool.size(), 1);
    }

    #[test]
    fn test_signature_does_not_change_key() {
        let pool = TransactionPool::new();
        let mut tx = dummy_tx(1);
        assert!(pool.add(tx.clone()));

        tx.signature = Some("c2ln".into());
        assert!(!pool.add(tx));
        assert_eq!(pool.get(&dummy_tx(1).calculate_hash()).unwrap().signature, None);
    }

    #[test]
    fn test_get_and_remove() {
        let pool = TransactionPool::new();
        let tx = dummy_tx(7);
        let hash = tx.calculate_hash();
        pool.add(tx.clone());

        assert_eq!(pool.get(&hash), Some(tx));
        assert!(pool.get("missing").is_none());

        assert!(pool.remove(&hash).is_some());
        assert!(pool.remove(&hash).is_none());
        assert!(!pool.contains(&hash));
    }

    #[test]
    fn test_hashes_listed() {
        let pool = TransactionPool::new();
        pool.add(dummy_tx(1));
        pool.add(dummy_tx(2));

        let mut hashes = pool.get_all_hashes();
        hashes.sort();
        let mut expected = vec![dummy_tx(1).calculate_hash(), dummy_tx(2).calculate_hash()];
        expected.sort();
        assert_eq!(hashes, expected);
    }
}
