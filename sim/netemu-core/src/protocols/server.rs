use crate::{
    connection::{ConnectionError, Endpoint},
    id::Id,
    node::Address,
    protocol::{Protocol, ProtocolId, ProtocolType},
    registry::Registry,
};
use std::{
    any::Any,
    sync::{Arc, Mutex},
};

/// A central point nodes can connect to.
///
/// The server accepts and opens every connection it is offered and otherwise
/// stays silent. It has a weight of zero and is only installed explicitly
/// with [`Network::add_server`](crate::Network::add_server).
#[derive(Debug, Default)]
pub struct ServerProtocol {
    endpoints: Mutex<Vec<Endpoint>>,
}

impl ServerProtocol {
    pub fn new() -> Self {
        Default::default()
    }

    /// The number of connections the server is holding.
    pub fn connections(&self) -> usize {
        self.endpoints.lock().unwrap().len()
    }
}

impl Protocol for ServerProtocol {
    fn id(&self) -> ProtocolId {
        Self::ID
    }

    fn update(self: Arc<Self>) {
        self.endpoints.lock().unwrap().retain(|endpoint| {
            let linked = endpoint.is_linked();
            if !linked {
                endpoint.close();
            }
            linked
        });
    }

    fn connection_requested(self: Arc<Self>, endpoint: Endpoint) -> Result<(), ConnectionError> {
        endpoint.open()?;
        tracing::debug!(remote = %endpoint.remote(), "Server accepted connection");
        self.endpoints.lock().unwrap().push(endpoint);
        Ok(())
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl ProtocolType for ServerProtocol {
    const ID: ProtocolId = Id::from_string("Server");
    const NAME: &'static str = "server";
    const WEIGHT: f64 = 0.0;

    fn build(_node: Address, _registry: &Registry) -> Arc<Self> {
        Arc::new(Self::new())
    }
}
