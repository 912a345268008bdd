pub mod codec;
pub mod inventory;
pub mod messages;
pub mod peer;

pub use codec::MessageCodec;
pub use inventory::KnownTransactions;
pub use messages::{Message, TransactionPayload};
pub use peer::{Connection, ConnectionLimits};
