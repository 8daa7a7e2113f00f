//! The table of nodes and the connections between them.

use crate::{
    config::{ConfigError, NetworkConfig},
    connection::{ConnectionError, Endpoint, Transport},
    latency::Latency,
    logging::node_creation_event,
    node::{Address, AddressGenerator, Node},
    protocol::{ProtocolType, SharedProtocol},
    protocols::ServerProtocol,
    registry::{Registry, RegistryError},
};
use dashmap::DashMap;
use rand::{rngs::SmallRng, SeedableRng};
use std::sync::{Arc, Mutex};
use thiserror::Error as ThisError;

/// A simulated network: every node, plus the transport that carries packets
/// between them.
pub struct Network {
    registry: Arc<Registry>,
    transport: Arc<Transport>,
    nodes: DashMap<Address, Arc<Node>>,
    addresses: AddressGenerator,
    /// Draws protocol types for new nodes.
    rng: Mutex<SmallRng>,
    /// Held while the server is added, so at most one is ever created.
    server: Mutex<Option<Address>>,
}

impl Network {
    /// Creates an empty network seeded from entropy.
    pub fn new(registry: Arc<Registry>, config: NetworkConfig) -> Result<Self, ConfigError> {
        Ok(Self::from_parts(
            registry,
            Latency::new(config)?,
            SmallRng::from_entropy(),
        ))
    }

    /// Creates an empty network whose delays and protocol draws are fully
    /// determined by `seed`.
    pub fn seeded(
        registry: Arc<Registry>,
        config: NetworkConfig,
        seed: u64,
    ) -> Result<Self, ConfigError> {
        // Separate streams, so adding a node does not shift later delays.
        Ok(Self::from_parts(
            registry,
            Latency::seeded(config, seed)?,
            SmallRng::seed_from_u64(seed.wrapping_add(1)),
        ))
    }

    fn from_parts(registry: Arc<Registry>, latency: Latency, rng: SmallRng) -> Self {
        Self {
            registry,
            transport: Transport::new(latency),
            nodes: DashMap::new(),
            addresses: AddressGenerator::new(),
            rng: Mutex::new(rng),
            server: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    /// Adds a node running a protocol drawn from the registry by weight.
    pub fn add_node(&self) -> Result<Arc<Node>, NetworkError> {
        let address = self.addresses.next();
        let (protocol, name) = {
            let mut rng = self.rng.lock().unwrap();
            self.registry.instantiate(address, &mut *rng)?
        };
        Ok(self.insert(address, protocol, name))
    }

    /// Adds a node running a `P`, regardless of registered weights.
    pub fn add_node_with<P: ProtocolType>(&self) -> Arc<Node> {
        let address = self.addresses.next();
        let protocol: SharedProtocol = P::build(address, &self.registry);
        self.insert(address, protocol, P::NAME)
    }

    /// Adds the network's server. A network has at most one.
    pub fn add_server(&self) -> Result<Arc<Node>, NetworkError> {
        let mut server = self.server.lock().unwrap();
        if let Some(existing) = *server {
            return Err(NetworkError::ServerExists(existing));
        }
        let node = self.add_node_with::<ServerProtocol>();
        *server = Some(node.address());
        Ok(node)
    }

    /// Adds `count` nodes with drawn protocols.
    pub fn populate(&self, count: usize) -> Result<Vec<Arc<Node>>, NetworkError> {
        (0..count).map(|_| self.add_node()).collect()
    }

    fn insert(&self, address: Address, protocol: SharedProtocol, name: &str) -> Arc<Node> {
        node_creation_event(address, protocol.id(), name);
        let node = Arc::new(Node::new(address, protocol));
        self.nodes.insert(address, node.clone());
        node
    }

    pub fn node(&self, address: Address) -> Option<Arc<Node>> {
        self.nodes.get(&address).map(|entry| entry.value().clone())
    }

    /// Every node, ordered by address.
    pub fn nodes(&self) -> Vec<Arc<Node>> {
        let mut nodes: Vec<_> = self.nodes.iter().map(|entry| entry.value().clone()).collect();
        nodes.sort_by_key(|node| node.address());
        nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The address of the server, if one has been added.
    pub fn server(&self) -> Option<Address> {
        *self.server.lock().unwrap()
    }

    /// Opens a connection from `from` to `to` tagged with `header`.
    ///
    /// The node at `to` is handed its side of the pair right away. The
    /// returned endpoint is `from`'s side; it is open if the other node
    /// accepted the connection.
    pub fn connect(&self, from: Address, to: Address, header: &str) -> Result<Endpoint, NetworkError> {
        if !self.nodes.contains_key(&from) {
            return Err(NetworkError::UnknownNode(from));
        }
        let target = self.node(to).ok_or(NetworkError::UnknownNode(to))?;
        let (ours, theirs) = self.transport.create(from, to, header);
        if let Err(e) = target.request_connection(&ours) {
            ours.close();
            theirs.close();
            return Err(e.into());
        }
        Ok(ours)
    }

    /// Opens a connection from `from` to the server.
    pub fn connect_to_server(&self, from: Address, header: &str) -> Result<Endpoint, NetworkError> {
        let server = self.server().ok_or(NetworkError::NoServer)?;
        self.connect(from, server, header)
    }

    /// Gives every node a periodic tick.
    pub fn update(&self) {
        for node in self.nodes() {
            node.update();
        }
    }

    /// Waits until every packet in flight has been delivered or dropped.
    pub async fn drain(&self) {
        self.transport.drain().await
    }
}

#[derive(Debug, ThisError, Clone, PartialEq)]
pub enum NetworkError {
    #[error("No node has the address {0}")]
    UnknownNode(Address),
    #[error("The network has no server")]
    NoServer,
    #[error("The network already has a server at {0}")]
    ServerExists(Address),
    #[error("{0}")]
    Connection(#[from] ConnectionError),
    #[error("{0}")]
    Registry(#[from] RegistryError),
}
