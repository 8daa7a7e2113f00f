use super::{Dialogue, DialogueGraphError, Role, StepKind};
use rustc_hash::FxHashMap;

/// An initiating dialogue and the responding dialogue it talks to.
pub struct DialoguePair<P> {
    pub initiator: Dialogue<P>,
    pub responder: Dialogue<P>,
}

impl<P> DialoguePair<P> {
    pub fn get(&self, role: Role) -> &Dialogue<P> {
        match role {
            Role::Initiator => &self.initiator,
            Role::Responder => &self.responder,
        }
    }
}

/// Dialogue pairs keyed by header.
///
/// Filled in during startup and read-only while a simulation runs.
pub struct DialogueRegistry<P> {
    pairs: FxHashMap<String, DialoguePair<P>>,
}

impl<P: 'static> DialogueRegistry<P> {
    pub fn new() -> Self {
        Self {
            pairs: FxHashMap::default(),
        }
    }

    /// Registers a pair of dialogues under their shared header.
    ///
    /// Only the shape of the graphs is checked: the headers must match, the
    /// initiator must start by sending and the responder by expecting, and
    /// every link must point at a step. A difference of more than one step in
    /// the straight-line length of the two graphs is logged but allowed.
    pub fn register(
        &mut self,
        initiator: Dialogue<P>,
        responder: Dialogue<P>,
    ) -> Result<(), DialogueGraphError> {
        if initiator.header() != responder.header() {
            return Err(DialogueGraphError::HeaderMismatch {
                initiator: initiator.header().to_owned(),
                responder: responder.header().to_owned(),
            });
        }
        if self.pairs.contains_key(initiator.header()) {
            return Err(DialogueGraphError::DuplicateHeader(
                initiator.header().to_owned(),
            ));
        }
        match initiator.validate()? {
            StepKind::Reply => {}
            kind => return Err(DialogueGraphError::InitiatorRoot(kind)),
        }
        match responder.validate()? {
            StepKind::Expect => {}
            kind => return Err(DialogueGraphError::ResponderRoot(kind)),
        }

        let (initiator_length, responder_length) =
            (initiator.walk_length(), responder.walk_length());
        if initiator_length.abs_diff(responder_length) > 1 {
            tracing::warn!(
                header = initiator.header(),
                initiator_length,
                responder_length,
                "Dialogue length mismatch between initiator and responder"
            );
        }

        tracing::debug!(header = initiator.header(), "Registered dialogue");
        self.pairs.insert(
            initiator.header().to_owned(),
            DialoguePair {
                initiator,
                responder,
            },
        );
        Ok(())
    }

    pub fn get(&self, header: &str) -> Option<&DialoguePair<P>> {
        self.pairs.get(header)
    }

    pub fn dialogue(&self, header: &str, role: Role) -> Option<&Dialogue<P>> {
        self.get(header).map(|pair| pair.get(role))
    }

    pub fn contains(&self, header: &str) -> bool {
        self.pairs.contains_key(header)
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.pairs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<P: 'static> Default for DialogueRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}
