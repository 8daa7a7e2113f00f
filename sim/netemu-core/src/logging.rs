//! Wrapper functions for the structured events the core emits.
//!
//! Each function corresponds to one kind of event and logs under its own
//! target, so a subscriber can filter on `NODE`, `PACKET` or `DIALOGUE`.

use crate::{
    connection::{Packet, PairId},
    dialogue::{DialogueError, Role, WalkSummary},
    node::Address,
    protocol::ProtocolId,
};
use std::time::Duration;
use tracing::{event, Level};

/// Logs the creation of a node and the protocol it was given.
pub fn node_creation_event(address: Address, protocol: ProtocolId, name: &str) {
    event!(
        target: "NODE",
        Level::INFO,
        address = address.into_inner(),
        protocol = %protocol,
        name = name,
    );
}

/// Logs a packet being put in flight.
pub fn packet_event(pair: PairId, from: Address, to: Address, packet: &Packet, delay: Duration) {
    match packet {
        Packet::Data(data) => event!(
            target: "PACKET",
            Level::TRACE,
            pair = pair,
            from = from.into_inner(),
            to = to.into_inner(),
            delay_ms = delay.as_secs_f64() * 1000.0,
            data = data.as_str(),
        ),
        Packet::Close => event!(
            target: "PACKET",
            Level::TRACE,
            pair = pair,
            from = from.into_inner(),
            to = to.into_inner(),
            delay_ms = delay.as_secs_f64() * 1000.0,
            control = "close",
        ),
    }
}

/// Logs the end of a dialogue walk.
pub fn dialogue_event(
    node: Address,
    header: &str,
    role: Role,
    outcome: &Result<WalkSummary, DialogueError>,
) {
    match outcome {
        Ok(summary) => event!(
            target: "DIALOGUE",
            Level::DEBUG,
            node = node.into_inner(),
            header = header,
            role = ?role,
            steps = summary.steps,
        ),
        Err(error) => event!(
            target: "DIALOGUE",
            Level::WARN,
            node = node.into_inner(),
            header = header,
            role = ?role,
            error = %error,
        ),
    }
}
