//! The [`Protocol`] trait and supporting types.
//!
//! A protocol is the behaviour a [`Node`](crate::Node) runs. Implementing one
//! looks like this:
//!
//! ```
//! use netemu_core::{
//!     connection::{ConnectionError, Endpoint},
//!     protocol::{Protocol, ProtocolId, ProtocolType},
//!     Address, Id, Registry,
//! };
//! use std::{any::Any, sync::{Arc, Mutex}};
//!
//! #[derive(Default)]
//! struct Listener {
//!     endpoints: Mutex<Vec<Endpoint>>,
//! }
//!
//! impl Protocol for Listener {
//!     fn id(&self) -> ProtocolId {
//!         Self::ID
//!     }
//!
//!     fn connection_requested(self: Arc<Self>, endpoint: Endpoint) -> Result<(), ConnectionError> {
//!         endpoint.open()?;
//!         self.endpoints.lock().unwrap().push(endpoint);
//!         Ok(())
//!     }
//!
//!     fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
//!         self
//!     }
//! }
//!
//! impl ProtocolType for Listener {
//!     const ID: ProtocolId = Id::from_string("Listener");
//!     const NAME: &'static str = "listener";
//!     const WEIGHT: f64 = 0.5;
//!
//!     fn build(_node: Address, _registry: &Registry) -> Arc<Self> {
//!         Arc::new(Self::default())
//!     }
//! }
//! ```

use crate::{
    connection::{ConnectionError, Endpoint},
    id::Id,
    node::Address,
    registry::Registry,
};
use std::{any::Any, sync::Arc};

/// Identifies a protocol type.
pub type ProtocolId = Id;

/// A shared handle to a [`Protocol`].
pub type SharedProtocol = Arc<dyn Protocol>;

/// Behaviour attached to a node.
pub trait Protocol: Send + Sync + 'static {
    fn id(&self) -> ProtocolId;

    /// A periodic tick from the simulation driver. Protocols are not required
    /// to do anything with it.
    fn update(self: Arc<Self>) {}

    /// Called when another node opens a connection to this one. `endpoint` is
    /// this node's side of the pair. A protocol that wants to use the
    /// connection must keep the endpoint and open it.
    fn connection_requested(self: Arc<Self>, endpoint: Endpoint) -> Result<(), ConnectionError>;

    /// Converts the protocol into [`Any`] so callers can recover the concrete
    /// type with [`Node::protocol_as`](crate::Node::protocol_as).
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// A protocol that can be registered with a
/// [`ProtocolRegistry`](crate::registry::ProtocolRegistry) and built for new
/// nodes.
pub trait ProtocolType: Protocol + Sized {
    const ID: ProtocolId;

    /// A human readable name for logs.
    const NAME: &'static str;

    /// The default weight with which this protocol is chosen to populate the
    /// network. A weight of zero means the protocol is only ever installed
    /// explicitly.
    const WEIGHT: f64;

    /// Builds the protocol for the node at `node`.
    fn build(node: Address, registry: &Registry) -> Arc<Self>;
}
