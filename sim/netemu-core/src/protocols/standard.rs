use crate::{
    connection::{ConnectionError, Endpoint},
    dialogue::{DialogueError, DialogueRegistry, Role, WalkSummary, Walker},
    id::Id,
    node::Address,
    protocol::{Protocol, ProtocolId, ProtocolType},
    registry::Registry,
};
use serde::{Deserialize, Serialize};
use std::{
    any::Any,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};
use tokio_util::task::TaskTracker;

/// What a node publishes about itself to the rest of the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub address: Address,
    pub public_key: Option<String>,
    /// Milliseconds since the Unix epoch at which the record was issued.
    pub timestamp: i64,
}

/// The protocol every ordinary node runs.
///
/// It keeps a list of the peers it has heard of and speaks the dialogues in
/// its registry: as responder for every connection another node opens to it,
/// and as initiator when [`initiate`](Self::initiate) is called.
pub struct StandardProtocol {
    address: Address,
    timestamp: i64,
    dialogues: Arc<DialogueRegistry<StandardProtocol>>,
    walker: Walker,
    peers: Mutex<Vec<PeerRecord>>,
    endpoints: Mutex<Vec<Endpoint>>,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    responders: TaskTracker,
}

impl StandardProtocol {
    pub fn new(address: Address, dialogues: Arc<DialogueRegistry<StandardProtocol>>) -> Self {
        Self {
            address,
            timestamp: chrono::Utc::now().timestamp_millis(),
            dialogues,
            walker: Walker::new(),
            peers: Mutex::new(Vec::new()),
            endpoints: Mutex::new(Vec::new()),
            succeeded: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            responders: TaskTracker::new(),
        }
    }

    /// A builder function that replaces the walker used for every dialogue.
    pub fn with_walker(mut self, walker: Walker) -> Self {
        self.walker = walker;
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// This node's own record.
    pub fn descriptor(&self) -> PeerRecord {
        PeerRecord {
            address: self.address,
            public_key: None,
            timestamp: self.timestamp,
        }
    }

    /// Adds `record` to the known peers. A record for an address already known
    /// replaces the old one only if it is newer. Records for this node itself
    /// are ignored.
    pub fn remember(&self, record: PeerRecord) {
        if record.address == self.address {
            return;
        }
        let mut peers = self.peers.lock().unwrap();
        match peers.iter_mut().find(|peer| peer.address == record.address) {
            Some(known) if known.timestamp < record.timestamp => *known = record,
            Some(_) => {}
            None => {
                tracing::trace!(node = %self.address, peer = %record.address, "Learned of peer");
                peers.push(record);
            }
        }
    }

    pub fn merge(&self, records: impl IntoIterator<Item = PeerRecord>) {
        for record in records {
            self.remember(record);
        }
    }

    /// The peers this node knows of, ordered by address.
    pub fn known_peers(&self) -> Vec<PeerRecord> {
        let mut peers = self.peers.lock().unwrap().clone();
        peers.sort_by_key(|peer| peer.address);
        peers
    }

    /// The endpoints this node is holding.
    pub fn connections(&self) -> Vec<Endpoint> {
        self.endpoints.lock().unwrap().clone()
    }

    /// How many walks, as initiator or responder, have succeeded.
    pub fn dialogues_ok(&self) -> usize {
        self.succeeded.load(Ordering::Relaxed)
    }

    /// How many walks, as initiator or responder, have failed.
    pub fn dialogues_failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    /// Opens `endpoint` and keeps it without speaking on it, so it is closed
    /// along with this node's other connections.
    pub fn attach(&self, endpoint: Endpoint) -> Result<(), ConnectionError> {
        endpoint.open()?;
        self.endpoints.lock().unwrap().push(endpoint);
        Ok(())
    }

    /// Opens `endpoint`, keeps it and walks the initiating side of the
    /// dialogue registered for its header.
    pub async fn initiate(self: &Arc<Self>, endpoint: Endpoint) -> Result<WalkSummary, DialogueError> {
        self.attach(endpoint.clone())?;
        let outcome = self
            .walker
            .run(&self.dialogues, Role::Initiator, &endpoint, &**self)
            .await;
        self.count(&outcome);
        outcome
    }

    /// Waits for every responder walk started so far to finish.
    pub async fn settle(&self) {
        self.responders.close();
        self.responders.wait().await;
        self.responders.reopen();
    }

    async fn respond(self: Arc<Self>, endpoint: Endpoint) {
        let outcome = self
            .walker
            .run(&self.dialogues, Role::Responder, &endpoint, &*self)
            .await;
        self.count(&outcome);
    }

    fn count(&self, outcome: &Result<WalkSummary, DialogueError>) {
        let counter = match outcome {
            Ok(_) => &self.succeeded,
            Err(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

impl Protocol for StandardProtocol {
    fn id(&self) -> ProtocolId {
        Self::ID
    }

    /// Closes and forgets endpoints whose pair has been unlinked.
    fn update(self: Arc<Self>) {
        self.endpoints.lock().unwrap().retain(|endpoint| {
            let linked = endpoint.is_linked();
            if !linked {
                endpoint.close();
            }
            linked
        });
    }

    /// Keeps and opens `endpoint`. If its header names a registered dialogue,
    /// the responding side is walked on a new task, so this must be called
    /// from within a Tokio runtime.
    fn connection_requested(self: Arc<Self>, endpoint: Endpoint) -> Result<(), ConnectionError> {
        self.attach(endpoint.clone())?;
        if self.dialogues.contains(endpoint.header()) {
            self.responders.spawn(self.clone().respond(endpoint));
        } else {
            tracing::debug!(
                node = %self.address,
                header = endpoint.header(),
                "Accepted connection with no dialogue"
            );
        }
        Ok(())
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl ProtocolType for StandardProtocol {
    const ID: ProtocolId = Id::from_string("Standard");
    const NAME: &'static str = "standard";
    const WEIGHT: f64 = 1.0;

    fn build(node: Address, registry: &Registry) -> Arc<Self> {
        Arc::new(Self::new(node, registry.dialogues().clone()))
    }
}
