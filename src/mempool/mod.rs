pub mod txmempool;

pub use txmempool::TransactionPool;
