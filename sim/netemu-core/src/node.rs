//! Addressable participants in the simulation.

use crate::{
    connection::{ConnectionError, Endpoint},
    protocol::{Protocol, SharedProtocol},
};
use serde::{Deserialize, Serialize};
use std::{
    fmt::Display,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

/// The address of a [`Node`]. Addresses are handed out in increasing order
/// and never reused within a [`Network`](crate::Network).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Address(u64);

impl Address {
    pub const fn new(address: u64) -> Self {
        Self(address)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl From<u64> for Address {
    fn from(n: u64) -> Self {
        Self(n)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out monotonically increasing addresses.
#[derive(Debug, Default)]
pub struct AddressGenerator(AtomicU64);

impl AddressGenerator {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn next(&self) -> Address {
        Address(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// A participant on the network. A node owns exactly one protocol for its
/// whole lifetime and hands every inbound connection to it.
pub struct Node {
    address: Address,
    protocol: SharedProtocol,
}

impl Node {
    pub fn new(address: Address, protocol: SharedProtocol) -> Self {
        Self { address, protocol }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn protocol(&self) -> SharedProtocol {
        self.protocol.clone()
    }

    /// Gets the node's protocol as its concrete type, if it is a `P`.
    pub fn protocol_as<P: Protocol>(&self) -> Option<Arc<P>> {
        self.protocol.clone().as_any().downcast::<P>().ok()
    }

    /// Gives the node's protocol a periodic tick.
    pub fn update(&self) {
        self.protocol.clone().update()
    }

    /// Accepts a connection opened by another node.
    ///
    /// `endpoint` is the initiating side of the pair. The side owned by this
    /// node is looked up and handed to the protocol.
    pub fn request_connection(&self, endpoint: &Endpoint) -> Result<(), ConnectionError> {
        let ours = endpoint.peer()?;
        if ours.owner() != self.address {
            return Err(ConnectionError::ForeignEndpoint {
                expected: self.address,
                actual: ours.owner(),
            });
        }
        self.protocol.clone().connection_requested(ours)
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("address", &self.address)
            .field("protocol", &self.protocol.id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses_increase() {
        let addresses = AddressGenerator::new();
        let first = addresses.next();
        let second = addresses.next();
        assert!(first < second);
        assert_eq!(second.into_inner(), 1);
    }
}
