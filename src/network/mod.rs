pub mod manager;
pub mod node;

pub use manager::{DiscoveryReport, LivenessReport, NetworkManager};
pub use node::{BroadcastReport, Node, Server};
