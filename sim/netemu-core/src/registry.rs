//! The process-wide tables a simulation is configured with.
//!
//! A [`Registry`] is built once during startup and shared behind an [`Arc`].
//! It is read-only while the simulation runs.

use crate::{
    dialogue::{DialogueGraphError, DialogueRegistry},
    dialogues,
    node::Address,
    protocol::{ProtocolId, ProtocolType, SharedProtocol},
    protocols::StandardProtocol,
};
use rand::Rng;
use rand_distr::{Distribution, WeightedAliasIndex};
use std::sync::Arc;
use thiserror::Error as ThisError;

type Constructor = fn(Address, &Registry) -> SharedProtocol;

fn construct<P: ProtocolType>(node: Address, registry: &Registry) -> SharedProtocol {
    P::build(node, registry)
}

/// A registered protocol type.
#[derive(Clone, Copy)]
pub struct ProtocolEntry {
    pub id: ProtocolId,
    pub name: &'static str,
    pub weight: f64,
    build: Constructor,
}

impl std::fmt::Debug for ProtocolEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolEntry")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("weight", &self.weight)
            .finish()
    }
}

/// The set of protocol types nodes are populated with, each with a selection
/// weight.
#[derive(Debug, Default, Clone)]
pub struct ProtocolRegistry {
    /// Kept in registration order so that seeded draws are reproducible.
    entries: Vec<ProtocolEntry>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    /// Registers `P` with its default weight.
    pub fn register<P: ProtocolType>(&mut self) -> Result<(), RegistryError> {
        self.register_weighted::<P>(P::WEIGHT)
    }

    /// Registers `P` with the given weight. Registering a type again replaces
    /// its weight.
    pub fn register_weighted<P: ProtocolType>(&mut self, weight: f64) -> Result<(), RegistryError> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(RegistryError::InvalidWeight {
                protocol: P::NAME,
                weight,
            });
        }
        let entry = ProtocolEntry {
            id: P::ID,
            name: P::NAME,
            weight,
            build: construct::<P>,
        };
        match self.entries.iter_mut().find(|e| e.id == P::ID) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        Ok(())
    }

    pub fn weight(&self, id: ProtocolId) -> Option<f64> {
        self.entry(id).map(|e| e.weight)
    }

    pub fn entry(&self, id: ProtocolId) -> Option<&ProtocolEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Draws a protocol type with probability proportional to its weight.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<&ProtocolEntry, RegistryError> {
        if self.entries.is_empty() {
            return Err(RegistryError::Empty);
        }
        let candidates: Vec<&ProtocolEntry> =
            self.entries.iter().filter(|e| e.weight > 0.0).collect();
        if candidates.is_empty() {
            return Err(RegistryError::AllWeightsZero);
        }
        let weights = candidates.iter().map(|e| e.weight).collect();
        let index = WeightedAliasIndex::new(weights).map_err(|_| RegistryError::AllWeightsZero)?;
        Ok(candidates[index.sample(rng)])
    }
}

#[derive(Debug, ThisError, Clone, PartialEq)]
pub enum RegistryError {
    #[error("No protocol types are registered")]
    Empty,
    #[error("Every registered protocol type has a weight of zero")]
    AllWeightsZero,
    #[error("Protocol {protocol} was given an invalid weight {weight}")]
    InvalidWeight { protocol: &'static str, weight: f64 },
    #[error("Failed to register a dialogue: {0}")]
    Dialogue(#[from] DialogueGraphError),
}

/// Everything a running simulation looks protocols and dialogues up in.
pub struct Registry {
    protocols: ProtocolRegistry,
    dialogues: Arc<DialogueRegistry<StandardProtocol>>,
}

impl Registry {
    pub fn new(protocols: ProtocolRegistry, dialogues: DialogueRegistry<StandardProtocol>) -> Self {
        Self {
            protocols,
            dialogues: Arc::new(dialogues),
        }
    }

    /// The registry every node of a default simulation uses: the standard
    /// protocol and its handshake and node list dialogues.
    pub fn standard() -> Result<Self, RegistryError> {
        let mut protocols = ProtocolRegistry::new();
        protocols.register::<StandardProtocol>()?;
        let mut dialogues = DialogueRegistry::new();
        dialogues::register_standard(&mut dialogues)?;
        Ok(Self::new(protocols, dialogues))
    }

    pub fn protocols(&self) -> &ProtocolRegistry {
        &self.protocols
    }

    pub fn dialogues(&self) -> &Arc<DialogueRegistry<StandardProtocol>> {
        &self.dialogues
    }

    /// Draws a protocol type and builds it for the node at `node`.
    pub fn instantiate<R: Rng + ?Sized>(
        &self,
        node: Address,
        rng: &mut R,
    ) -> Result<(SharedProtocol, &'static str), RegistryError> {
        let entry = self.protocols.draw(rng)?;
        Ok(((entry.build)(node, self), entry.name))
    }
}
