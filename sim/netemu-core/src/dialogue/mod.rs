//! Declarative request/response exchanges.
//!
//! A [`Dialogue`] describes one party's side of an exchange as a graph of
//! steps. A [`Walker`] executes it against an [`Endpoint`](crate::Endpoint):
//! reply steps write a packet, expect steps wait for a packet and validate it,
//! and fork steps choose where to go next. Forks are the only way to branch or
//! to loop back to an earlier step.
//!
//! Dialogues come in pairs registered under a shared header in a
//! [`DialogueRegistry`]: the initiator starts by sending the header, the
//! responder starts by expecting it.
//!
//! ```
//! use netemu_core::dialogue::{Chain, Dialogue, DialogueRegistry};
//!
//! struct Peer;
//!
//! let mut initiator = Dialogue::<Peer>::new("ping");
//! initiator.send_header().expect("pong");
//! let mut responder = Dialogue::<Peer>::new("ping");
//! responder.accept_header().reply("pong");
//!
//! let mut registry = DialogueRegistry::new();
//! registry.register(initiator, responder).unwrap();
//! ```

use crate::connection::ConnectionError;
use std::time::Duration;
use thiserror::Error as ThisError;

mod graph;
pub use graph::{
    Action, Branch, Chain, Compose, Dialogue, Expectation, ForkBuilder, Payload, Predicate,
    Selector, Step, StepBuilder, StepId, StepKind, Turn,
};

mod registry;
pub use registry::{DialoguePair, DialogueRegistry};

mod state;
pub use state::{State, StateError};

mod walker;
pub use walker::{WalkSummary, Walker};

/// Packets with a fixed meaning shared by every dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlPacket {
    Acknowledgement,
}

impl ControlPacket {
    /// The wire form of the packet.
    pub const fn as_str(self) -> &'static str {
        match self {
            ControlPacket::Acknowledgement => "ok",
        }
    }
}

/// Which side of a dialogue pair to walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Speaks first by sending the header.
    Initiator,
    /// Starts by expecting the header.
    Responder,
}

/// Why a walk failed.
#[derive(Debug, ThisError)]
pub enum DialogueError {
    #[error("No data could be read from the connection")]
    NoData,
    #[error("The peer closed the connection mid-dialogue")]
    Closed,
    #[error("Timed out after {0:?} waiting for the peer")]
    Timeout(Duration),
    #[error("Expected {expected:?} but got {got:?}")]
    Unexpected { expected: String, got: String },
    #[error("Could not decode {got:?} as {schema}: {reason}")]
    Decode {
        schema: &'static str,
        got: String,
        reason: String,
    },
    #[error("Invalid response: {0:?}")]
    Rejected(String),
    #[error("Could not encode a reply: {0}")]
    Encode(String),
    #[error("{0}")]
    Callback(String),
    #[error("No dialogue is registered for header {0:?}")]
    UnknownHeader(String),
    #[error("Failed to write to the connection: {0}")]
    Connection(#[from] ConnectionError),
    #[error("Malformed dialogue graph: {0}")]
    Graph(#[from] DialogueGraphError),
    #[error("Session state error: {0}")]
    State(#[from] StateError),
}

impl DialogueError {
    /// Whether the walk failed because the connection went away, as opposed to
    /// the peer saying something wrong.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            DialogueError::NoData | DialogueError::Closed | DialogueError::Connection(_)
        )
    }
}

/// A structural defect in a dialogue definition.
#[derive(Debug, ThisError, Clone, PartialEq, Eq)]
pub enum DialogueGraphError {
    #[error("Header mismatch between initiator {initiator:?} and responder {responder:?}")]
    HeaderMismatch {
        initiator: String,
        responder: String,
    },
    #[error("Dialogue {0:?} has no root step")]
    MissingRoot(String),
    #[error("Initiating dialogue must start by sending, but starts with {0:?}")]
    InitiatorRoot(StepKind),
    #[error("Responding dialogue must start by expecting, but starts with {0:?}")]
    ResponderRoot(StepKind),
    #[error("Step {from} links to step {to}, which does not exist")]
    DanglingLink { from: StepId, to: StepId },
    #[error("Fork {0} has no branches")]
    EmptyFork(StepId),
    #[error("Fork {step} has no branch named {key:?}")]
    UnknownBranch { step: StepId, key: String },
    #[error("Step {0} does not exist")]
    MissingStep(StepId),
    #[error("A dialogue is already registered for header {0:?}")]
    DuplicateHeader(String),
}
