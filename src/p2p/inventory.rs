use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

use super::messages::TransactionPayload;

/// Transactions this node has seen on the wire, keyed by message id.
///
/// Separate from the content-hash keyed pool: this map only answers "have
/// we already flooded this id?". The check-and-record is one atomic step so
/// two connections delivering the same id cannot both rebroadcast it.
#[derive(Clone, Default)]
pub struct KnownTransactions {
    /// Items we have seen
    seen: Arc<DashMap<String, TransactionPayload>>,
}

impl KnownTransactions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the payload under its id. Returns false if the id was already
    /// known, leaving the earlier payload in place.
    pub fn insert_if_absent(&self, payload: TransactionPayload) -> bool {
        match self.seen.entry(payload.id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(payload);
                true
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<TransactionPayload> {
        self.seen.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains_key(id)
    }

    /// Copy of every known payload
    pub fn snapshot(&self) -> Vec<TransactionPayload> {
        self.seen.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
