//! The protocols nodes can run.

mod server;
pub use server::ServerProtocol;

mod standard;
pub use standard::{PeerRecord, StandardProtocol};
