//! A network emulator for peer-to-peer protocols, running entirely inside one
//! process.
//!
//! Nodes do not open sockets. Instead, a [`Network`] hands out pairs of
//! simulated [`Endpoint`]s, and every packet written to one end arrives at the
//! other after a delay drawn from a normal distribution. This makes it
//! possible to run many nodes cheaply while still seeing realistic timing,
//! reordering included.
//!
//! # Organization
//! - [`connection`] implements the simulated transport and
//!   [`latency`] its delay model
//! - [`Node`] and [`Protocol`] describe the participants and what they run
//! - [`registry`] picks protocols for new nodes by weight
//! - [`dialogue`] describes request/response exchanges declaratively, and
//!   [`dialogues`] holds the ones every standard node speaks
//! - [`Network`] ties it all together
//!
//! # Dialogues
//!
//! Rather than hand-writing a read/write loop, a protocol registers a pair of
//! [`Dialogue`](dialogue::Dialogue) graphs under a header: one for the party
//! that opens the connection and one for the party that accepts it. Walking
//! the graph performs one endpoint operation per step and validates whatever
//! the peer sends.

mod logging;

pub mod config;
pub use config::NetworkConfig;

pub mod connection;
pub use connection::{Endpoint, Transport};

pub mod dialogue;
pub mod dialogues;

mod id;
pub use id::Id;

pub mod latency;

pub mod network;
pub use network::Network;

pub mod node;
pub use node::{Address, Node};

pub mod protocol;
pub use protocol::Protocol;

pub mod protocols;

pub mod registry;
pub use registry::Registry;

pub mod shutdown;
pub use shutdown::Shutdown;
