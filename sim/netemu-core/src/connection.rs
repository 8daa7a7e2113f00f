//! Simulated connections between nodes.
//!
//! A connection is a pair of [`Endpoint`]s. Each endpoint writes into the read
//! buffer of the other after a randomly sampled delay (see
//! [`Latency`](crate::latency::Latency)), so a pair behaves like a duplex
//! channel with realistic timing but no sockets.
//!
//! Pairs live in an arena owned by the [`Transport`]. An endpoint is a cheap
//! handle holding the pair id and its own side; the peer is found by indexing
//! the arena rather than through a reference to the other endpoint.

use crate::{latency::Latency, logging::packet_event, node::Address};
use dashmap::DashMap;
use std::{
    collections::VecDeque,
    fmt::Debug,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};
use thiserror::Error as ThisError;
use tokio::sync::Notify;
use tokio_util::task::TaskTracker;

/// Identifies one connection pair in the [`Transport`] arena.
pub type PairId = u64;

/// Which end of a pair an [`Endpoint`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The end owned by the node that asked for the connection.
    Initiator,
    /// The end owned by the node that was asked.
    Acceptor,
}

impl Side {
    fn index(self) -> usize {
        match self {
            Side::Initiator => 0,
            Side::Acceptor => 1,
        }
    }

    pub fn other(self) -> Self {
        match self {
            Side::Initiator => Side::Acceptor,
            Side::Acceptor => Side::Initiator,
        }
    }
}

/// A unit of data crossing a connection.
///
/// Closing a connection is signalled out of band with [`Packet::Close`], so no
/// application payload can ever be mistaken for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Data(String),
    Close,
}

impl Packet {
    pub fn as_data(&self) -> Option<&str> {
        match self {
            Packet::Data(data) => Some(data),
            Packet::Close => None,
        }
    }

    pub fn into_data(self) -> Option<String> {
        match self {
            Packet::Data(data) => Some(data),
            Packet::Close => None,
        }
    }

    pub fn is_close(&self) -> bool {
        matches!(self, Packet::Close)
    }
}

impl From<&str> for Packet {
    fn from(data: &str) -> Self {
        Packet::Data(data.to_owned())
    }
}

#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Cannot write to a closed connection")]
    Closed,
    #[error("The connection has no peer; it was torn down or never linked")]
    NoPeer,
    #[error("The endpoint belongs to node {actual}, not {expected}")]
    ForeignEndpoint { expected: Address, actual: Address },
}

#[derive(Debug, Default)]
struct EndState {
    open: bool,
    closed: bool,
    buffer: VecDeque<Packet>,
    /// Packets written toward this end that have not been delivered yet.
    in_flight: usize,
}

#[derive(Debug)]
struct PairState {
    /// Cleared for both ends at once when either end closes.
    linked: bool,
    ends: [EndState; 2],
}

struct Pair {
    state: Mutex<PairState>,
    arrived: [Notify; 2],
}

impl Pair {
    fn new() -> Self {
        Self {
            state: Mutex::new(PairState {
                linked: true,
                ends: Default::default(),
            }),
            arrived: [Notify::new(), Notify::new()],
        }
    }
}

/// The arena of connection pairs and the scheduler for in-flight packets.
pub struct Transport {
    pairs: DashMap<PairId, Arc<Pair>>,
    next_pair: AtomicU64,
    latency: Latency,
    deliveries: TaskTracker,
}

impl Transport {
    pub fn new(latency: Latency) -> Arc<Self> {
        Arc::new(Self {
            pairs: DashMap::new(),
            next_pair: AtomicU64::new(0),
            latency,
            deliveries: TaskTracker::new(),
        })
    }

    /// Creates a new pair between `initiator` and `acceptor`. Both ends start
    /// out not open.
    pub fn create(
        self: &Arc<Self>,
        initiator: Address,
        acceptor: Address,
        header: impl Into<String>,
    ) -> (Endpoint, Endpoint) {
        let pair = self.next_pair.fetch_add(1, Ordering::Relaxed);
        self.pairs.insert(pair, Arc::new(Pair::new()));
        let header: Arc<str> = header.into().into();
        tracing::debug!(pair, %initiator, %acceptor, header = &*header, "Created connection pair");
        let a = Endpoint {
            transport: self.clone(),
            pair,
            side: Side::Initiator,
            owner: initiator,
            remote: acceptor,
            header: header.clone(),
        };
        let b = Endpoint {
            transport: self.clone(),
            pair,
            side: Side::Acceptor,
            owner: acceptor,
            remote: initiator,
            header,
        };
        (a, b)
    }

    /// The number of pairs that still have at least one end not closed.
    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    /// The number of packets currently in flight.
    pub fn in_flight(&self) -> usize {
        self.deliveries.len()
    }

    /// Waits until every packet in flight has been delivered or dropped.
    pub async fn drain(&self) {
        self.deliveries.close();
        self.deliveries.wait().await;
        self.deliveries.reopen();
    }

    fn pair(&self, pair: PairId) -> Option<Arc<Pair>> {
        self.pairs.get(&pair).map(|entry| entry.value().clone())
    }

    /// Puts `packet` in flight toward the `to` end of `pair`. The caller must
    /// already have counted it in that end's `in_flight`.
    fn schedule(self: &Arc<Self>, from: &Endpoint, packet: Packet) {
        let delay = self.latency.sample();
        packet_event(from.pair, from.owner, from.remote, &packet, delay);
        let transport = self.clone();
        let pair = from.pair;
        let to = from.side.other();
        self.deliveries.spawn(async move {
            tokio::time::sleep(delay).await;
            transport.deliver(pair, to, packet);
        });
    }

    fn deliver(&self, id: PairId, to: Side, packet: Packet) {
        let Some(pair) = self.pair(id) else {
            tracing::trace!(pair = id, "Dropped packet for a torn down pair");
            return;
        };
        {
            let mut state = pair.state.lock().unwrap();
            let end = &mut state.ends[to.index()];
            end.in_flight = end.in_flight.saturating_sub(1);
            if end.closed {
                tracing::trace!(pair = id, "Dropped packet for a closed endpoint");
            } else {
                end.buffer.push_back(packet);
            }
        }
        pair.arrived[to.index()].notify_one();
    }
}

/// One side of a connection pair.
///
/// Endpoints are cheap to clone; clones refer to the same side of the same
/// pair. A pair expects a single reader per side.
#[derive(Clone)]
pub struct Endpoint {
    transport: Arc<Transport>,
    pair: PairId,
    side: Side,
    owner: Address,
    remote: Address,
    header: Arc<str>,
}

impl Endpoint {
    pub fn pair_id(&self) -> PairId {
        self.pair
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// The node this endpoint belongs to.
    pub fn owner(&self) -> Address {
        self.owner
    }

    /// The node at the other end of the pair.
    pub fn remote(&self) -> Address {
        self.remote
    }

    /// The protocol or session tag the pair was created with.
    pub fn header(&self) -> &str {
        &self.header
    }

    /// Whether this endpoint and the given one are the same side of the same
    /// pair.
    pub fn same_as(&self, other: &Endpoint) -> bool {
        self.pair == other.pair && self.side == other.side
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut PairState) -> T) -> Option<T> {
        let pair = self.transport.pair(self.pair)?;
        let mut state = pair.state.lock().unwrap();
        Some(f(&mut state))
    }

    pub fn is_open(&self) -> bool {
        self.with_state(|state| {
            let end = &state.ends[self.side.index()];
            end.open && !end.closed
        })
        .unwrap_or(false)
    }

    pub fn is_closed(&self) -> bool {
        self.with_state(|state| state.ends[self.side.index()].closed)
            .unwrap_or(true)
    }

    /// Whether the pair is still linked, i.e. neither end has closed.
    pub fn is_linked(&self) -> bool {
        self.with_state(|state| state.linked).unwrap_or(false)
    }

    /// Whether there is data waiting in the read buffer.
    pub fn in_waiting(&self) -> bool {
        self.with_state(|state| !state.ends[self.side.index()].buffer.is_empty())
            .unwrap_or(false)
    }

    /// The other end of this pair.
    pub fn peer(&self) -> Result<Endpoint, ConnectionError> {
        if !self.is_linked() {
            return Err(ConnectionError::NoPeer);
        }
        Ok(Endpoint {
            transport: self.transport.clone(),
            pair: self.pair,
            side: self.side.other(),
            owner: self.remote,
            remote: self.owner,
            header: self.header.clone(),
        })
    }

    /// Marks the endpoint open, which opens the whole pair.
    pub fn open(&self) -> Result<(), ConnectionError> {
        self.with_state(|state| {
            if !state.linked {
                return Err(ConnectionError::NoPeer);
            }
            for end in state.ends.iter_mut() {
                end.open = true;
            }
            Ok(())
        })
        .unwrap_or(Err(ConnectionError::NoPeer))
    }

    /// Sends `data` to the peer. Returns as soon as the packet is in flight.
    pub fn write(&self, data: impl Into<String>) -> Result<(), ConnectionError> {
        self.send(Packet::Data(data.into()))
    }

    fn send(&self, packet: Packet) -> Result<(), ConnectionError> {
        self.with_state(|state| {
            if !state.ends[self.side.index()].open || state.ends[self.side.index()].closed {
                return Err(ConnectionError::Closed);
            }
            if !state.linked {
                return Err(ConnectionError::NoPeer);
            }
            state.ends[self.side.other().index()].in_flight += 1;
            Ok(())
        })
        .unwrap_or(Err(ConnectionError::Closed))?;
        self.transport.schedule(self, packet);
        Ok(())
    }

    /// Takes the oldest packet from the read buffer without waiting.
    pub fn try_read(&self) -> Option<Packet> {
        self.with_state(|state| {
            let end = &mut state.ends[self.side.index()];
            if end.closed {
                None
            } else {
                end.buffer.pop_front()
            }
        })
        .flatten()
    }

    /// Takes the oldest packet from the read buffer, waiting for one to arrive
    /// if it is empty.
    ///
    /// Resolves to `None` once nothing more can arrive: this end has been
    /// closed, or the pair is unlinked and no packet is still in flight toward
    /// this end.
    pub async fn read(&self) -> Option<Packet> {
        let index = self.side.index();
        loop {
            let pair = self.transport.pair(self.pair)?;
            {
                let mut state = pair.state.lock().unwrap();
                let linked = state.linked;
                let end = &mut state.ends[index];
                if end.closed {
                    return None;
                }
                if let Some(packet) = end.buffer.pop_front() {
                    return Some(packet);
                }
                if !linked && end.in_flight == 0 {
                    return None;
                }
            }
            pair.arrived[index].notified().await;
        }
    }

    /// Reads with the blocking behaviour chosen at runtime.
    pub async fn read_blocking(&self, blocking: bool) -> Option<Packet> {
        if blocking {
            self.read().await
        } else {
            self.try_read()
        }
    }

    /// Sends a close packet to the peer if possible, then unlinks the pair and
    /// closes this end for good. Closing an endpoint twice does nothing.
    pub fn close(&self) {
        let Some(pair) = self.transport.pair(self.pair) else {
            return;
        };
        let (notify_peer, torn_down) = {
            let mut state = pair.state.lock().unwrap();
            let me = self.side.index();
            let other = self.side.other().index();
            if state.ends[me].closed {
                return;
            }
            let notify_peer = state.linked && state.ends[me].open;
            if notify_peer {
                state.ends[other].in_flight += 1;
            }
            state.linked = false;
            let end = &mut state.ends[me];
            end.open = false;
            end.closed = true;
            end.buffer.clear();
            (notify_peer, state.ends[other].closed)
        };
        if notify_peer {
            self.transport.schedule(self, Packet::Close);
        }
        tracing::debug!(pair = self.pair, owner = %self.owner, "Closed endpoint");
        for arrived in pair.arrived.iter() {
            arrived.notify_one();
        }
        if torn_down {
            self.transport.pairs.remove(&self.pair);
        }
    }
}

impl Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("pair", &self.pair)
            .field("side", &self.side)
            .field("owner", &self.owner)
            .field("remote", &self.remote)
            .field("header", &self.header)
            .finish()
    }
}
