//! Dialogue graphs and the builders used to describe them.

use super::{ControlPacket, DialogueError, DialogueGraphError, State};
use rustc_hash::FxHashSet;
use serde::{de::DeserializeOwned, Serialize};
use std::{any::type_name, collections::BTreeMap, fmt::Display, sync::Arc};

/// Identifies a step within one [`Dialogue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepId(pub(super) usize);

impl StepId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What every callable in a dialogue is given: the last packet received, the
/// walk's session state and the protocol running the walk.
pub struct Turn<'a, P> {
    pub data: Option<&'a str>,
    pub state: &'a mut State,
    pub protocol: &'a P,
}

impl<'a, P> Turn<'a, P> {
    /// The last packet received, or [`DialogueError::NoData`] if nothing has
    /// been received yet.
    pub fn data(&self) -> Result<&'a str, DialogueError> {
        self.data.ok_or(DialogueError::NoData)
    }

    /// Decodes the last packet received as a `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, DialogueError> {
        let data = self.data()?;
        serde_json::from_str(data).map_err(|e| DialogueError::Decode {
            schema: type_name::<T>(),
            got: data.to_owned(),
            reason: e.to_string(),
        })
    }
}

/// Computes the packet a reply step sends.
pub type Compose<P> =
    Arc<dyn Fn(&mut Turn<'_, P>) -> Result<String, DialogueError> + Send + Sync>;
/// Decides whether an expect step accepts a packet.
pub type Predicate<P> = Arc<dyn Fn(&mut Turn<'_, P>) -> bool + Send + Sync>;
/// A side effect run after a step succeeds.
pub type Action<P> = Arc<dyn Fn(&mut Turn<'_, P>) -> Result<(), DialogueError> + Send + Sync>;
/// Names the branch a fork step takes.
pub type Selector<P> = Arc<dyn Fn(&mut Turn<'_, P>) -> &'static str + Send + Sync>;

/// What a reply step sends.
pub enum Payload<P> {
    Literal(String),
    Compose(Compose<P>),
}

/// What an expect step accepts.
pub enum Expectation<P> {
    /// Exactly this packet.
    Literal(String),
    /// Any packet that decodes as the named type.
    Schema {
        name: &'static str,
        check: fn(&str) -> Result<(), String>,
    },
    /// Any packet the predicate accepts.
    Predicate(Predicate<P>),
}

fn decodes_as<T: DeserializeOwned>(data: &str) -> Result<(), String> {
    serde_json::from_str::<T>(data)
        .map(drop)
        .map_err(|e| e.to_string())
}

impl<P> Expectation<P> {
    pub(super) fn check(&self, turn: &mut Turn<'_, P>) -> Result<(), DialogueError> {
        let data = turn.data()?;
        match self {
            Expectation::Literal(expected) if expected == data => Ok(()),
            Expectation::Literal(expected) => Err(DialogueError::Unexpected {
                expected: expected.clone(),
                got: data.to_owned(),
            }),
            Expectation::Schema { name, check } => {
                check(data).map_err(|reason| DialogueError::Decode {
                    schema: *name,
                    got: data.to_owned(),
                    reason,
                })
            }
            Expectation::Predicate(predicate) => {
                if predicate(turn) {
                    Ok(())
                } else {
                    Err(DialogueError::Rejected(data.to_owned()))
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    Reply,
    Expect,
    Fork,
}

/// A single step in a dialogue graph.
pub enum Step<P> {
    /// Sends one packet, then moves on.
    Reply {
        payload: Payload<P>,
        actions: Vec<Action<P>>,
        next: Option<StepId>,
    },
    /// Waits for one packet, validates it, runs its actions, then moves on.
    Expect {
        expectation: Expectation<P>,
        actions: Vec<Action<P>>,
        next: Option<StepId>,
    },
    /// Moves to the branch its selector names.
    Fork {
        selector: Selector<P>,
        branches: BTreeMap<&'static str, StepId>,
    },
}

impl<P> Step<P> {
    fn reply(payload: Payload<P>) -> Self {
        Step::Reply {
            payload,
            actions: Vec::new(),
            next: None,
        }
    }

    fn expect(expectation: Expectation<P>) -> Self {
        Step::Expect {
            expectation,
            actions: Vec::new(),
            next: None,
        }
    }

    pub fn kind(&self) -> StepKind {
        match self {
            Step::Reply { .. } => StepKind::Reply,
            Step::Expect { .. } => StepKind::Expect,
            Step::Fork { .. } => StepKind::Fork,
        }
    }

    /// The single successor of a reply or expect step.
    pub fn next(&self) -> Option<StepId> {
        match self {
            Step::Reply { next, .. } | Step::Expect { next, .. } => *next,
            Step::Fork { .. } => None,
        }
    }

    /// Every step this one can move to.
    pub fn links(&self) -> Vec<StepId> {
        match self {
            Step::Reply { next, .. } | Step::Expect { next, .. } => next.iter().copied().collect(),
            Step::Fork { branches, .. } => branches.values().copied().collect(),
        }
    }

    fn set_next(&mut self, step: StepId) {
        match self {
            Step::Reply { next, .. } | Step::Expect { next, .. } => *next = Some(step),
            Step::Fork { .. } => {}
        }
    }

    fn actions_mut(&mut self) -> Option<&mut Vec<Action<P>>> {
        match self {
            Step::Reply { actions, .. } | Step::Expect { actions, .. } => Some(actions),
            Step::Fork { .. } => None,
        }
    }
}

/// One party's side of a request/response exchange.
///
/// Steps are stored in an arena and refer to each other by [`StepId`], so a
/// fork can loop back to any earlier step.
pub struct Dialogue<P> {
    header: String,
    steps: Vec<Step<P>>,
    root: Option<StepId>,
}

impl<P: 'static> Dialogue<P> {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            steps: Vec::new(),
            root: None,
        }
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn root(&self) -> Option<StepId> {
        self.root
    }

    pub fn step(&self, id: StepId) -> Option<&Step<P>> {
        self.steps.get(id.0)
    }

    /// The number of steps in the graph.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Starts the dialogue with a step sending the header. Replaces any steps
    /// defined before.
    pub fn send_header(&mut self) -> StepBuilder<'_, P> {
        let header = self.header.clone();
        self.start(Step::reply(Payload::Literal(header)))
    }

    /// Starts the dialogue with a step expecting the header. Replaces any
    /// steps defined before.
    pub fn accept_header(&mut self) -> StepBuilder<'_, P> {
        let header = self.header.clone();
        self.start(Step::expect(Expectation::Literal(header)))
    }

    fn start(&mut self, step: Step<P>) -> StepBuilder<'_, P> {
        self.steps.clear();
        let id = self.push(step);
        self.root = Some(id);
        StepBuilder { dialogue: self, id }
    }

    fn push(&mut self, step: Step<P>) -> StepId {
        self.steps.push(step);
        StepId(self.steps.len() - 1)
    }

    /// The number of reply and expect steps on the straight path from the
    /// root, stopping at the first fork, the end, or a step already counted.
    pub fn walk_length(&self) -> usize {
        let mut seen = FxHashSet::default();
        let mut current = self.root;
        let mut length = 0;
        while let Some(id) = current {
            if !seen.insert(id) {
                break;
            }
            match self.step(id) {
                Some(step @ (Step::Reply { .. } | Step::Expect { .. })) => {
                    length += 1;
                    current = step.next();
                }
                Some(Step::Fork { .. }) | None => break,
            }
        }
        length
    }

    /// Checks that every link points at a step and every fork has somewhere
    /// to go. Returns the kind of the root step.
    pub(super) fn validate(&self) -> Result<StepKind, DialogueGraphError> {
        let root = self
            .root
            .ok_or_else(|| DialogueGraphError::MissingRoot(self.header.clone()))?;
        let root_kind = self
            .step(root)
            .ok_or(DialogueGraphError::MissingStep(root))?
            .kind();
        for (index, step) in self.steps.iter().enumerate() {
            let from = StepId(index);
            if let Step::Fork { branches, .. } = step {
                if branches.is_empty() {
                    return Err(DialogueGraphError::EmptyFork(from));
                }
            }
            if let Some(to) = step.links().into_iter().find(|to| to.0 >= self.steps.len()) {
                return Err(DialogueGraphError::DanglingLink { from, to });
            }
        }
        Ok(root_kind)
    }
}

/// Adds steps to a dialogue. Implemented by [`StepBuilder`], which appends
/// after an existing step, and by [`Branch`], which starts a fork branch.
pub trait Chain<'d, P: 'static>: Sized {
    /// Adds `step` at this point in the graph.
    fn attach(self, step: Step<P>) -> StepBuilder<'d, P>;

    /// Sends a literal packet.
    fn reply(self, packet: impl Into<String>) -> StepBuilder<'d, P> {
        self.attach(Step::reply(Payload::Literal(packet.into())))
    }

    /// Sends an acknowledgement packet.
    fn acknowledge(self) -> StepBuilder<'d, P> {
        self.reply(ControlPacket::Acknowledgement.as_str())
    }

    /// Sends whatever `compose` returns when the step runs.
    fn reply_with<F>(self, compose: F) -> StepBuilder<'d, P>
    where
        F: Fn(&mut Turn<'_, P>) -> Result<String, DialogueError> + Send + Sync + 'static,
    {
        self.attach(Step::reply(Payload::Compose(Arc::new(compose))))
    }

    /// Sends `value` encoded as a JSON document, fields in declaration order.
    fn reply_json<T>(self, value: T) -> StepBuilder<'d, P>
    where
        T: Serialize + Send + Sync + 'static,
    {
        self.reply_with(move |_| {
            serde_json::to_string(&value).map_err(|e| DialogueError::Encode(e.to_string()))
        })
    }

    /// Waits for exactly this packet.
    fn expect(self, packet: impl Into<String>) -> StepBuilder<'d, P> {
        self.attach(Step::expect(Expectation::Literal(packet.into())))
    }

    /// Waits for an acknowledgement packet.
    fn expect_acknowledgement(self) -> StepBuilder<'d, P> {
        self.expect(ControlPacket::Acknowledgement.as_str())
    }

    /// Waits for a packet that decodes as a `T`.
    fn expect_schema<T: DeserializeOwned>(self) -> StepBuilder<'d, P> {
        self.attach(Step::expect(Expectation::Schema {
            name: type_name::<T>(),
            check: decodes_as::<T>,
        }))
    }

    /// Waits for a packet `predicate` accepts.
    fn expect_with<F>(self, predicate: F) -> StepBuilder<'d, P>
    where
        F: Fn(&mut Turn<'_, P>) -> bool + Send + Sync + 'static,
    {
        self.attach(Step::expect(Expectation::Predicate(Arc::new(predicate))))
    }

    /// Branches on whatever key `selector` returns when the step runs.
    fn fork<F>(self, selector: F) -> ForkBuilder<'d, P>
    where
        F: Fn(&mut Turn<'_, P>) -> &'static str + Send + Sync + 'static,
    {
        let StepBuilder { dialogue, id } = self.attach(Step::Fork {
            selector: Arc::new(selector),
            branches: BTreeMap::new(),
        });
        ForkBuilder { dialogue, id }
    }
}

/// Points at a reply or expect step of a dialogue under construction.
pub struct StepBuilder<'d, P> {
    dialogue: &'d mut Dialogue<P>,
    id: StepId,
}

impl<'d, P: 'static> StepBuilder<'d, P> {
    /// The step being built, for forks that loop back to it.
    pub fn id(&self) -> StepId {
        self.id
    }

    /// Runs `action` after the step succeeds. Actions run in the order they
    /// were added and an error from any of them fails the walk.
    pub fn then<F>(self, action: F) -> Self
    where
        F: Fn(&mut Turn<'_, P>) -> Result<(), DialogueError> + Send + Sync + 'static,
    {
        if let Some(actions) = self.dialogue.steps[self.id.0].actions_mut() {
            actions.push(Arc::new(action));
        }
        self
    }

    /// Like [`then`](Self::then), but hands `action` the received packet
    /// decoded as a `T`.
    pub fn then_decoded<T, F>(self, action: F) -> Self
    where
        T: DeserializeOwned + 'static,
        F: Fn(T, &mut Turn<'_, P>) -> Result<(), DialogueError> + Send + Sync + 'static,
    {
        self.then(move |turn| {
            let value = turn.decode::<T>()?;
            action(value, turn)
        })
    }
}

impl<'d, P: 'static> Chain<'d, P> for StepBuilder<'d, P> {
    fn attach(self, step: Step<P>) -> StepBuilder<'d, P> {
        let next = self.dialogue.push(step);
        self.dialogue.steps[self.id.0].set_next(next);
        StepBuilder {
            dialogue: self.dialogue,
            id: next,
        }
    }
}

/// Points at a fork step of a dialogue under construction.
pub struct ForkBuilder<'d, P> {
    dialogue: &'d mut Dialogue<P>,
    id: StepId,
}

impl<'d, P: 'static> ForkBuilder<'d, P> {
    pub fn id(&self) -> StepId {
        self.id
    }

    /// Starts a new branch taken when the selector returns `key`.
    pub fn branch(&mut self, key: &'static str) -> Branch<'_, P> {
        Branch {
            dialogue: &mut *self.dialogue,
            fork: self.id,
            key,
        }
    }

    /// Sends the walk to an existing step when the selector returns `key`.
    pub fn branch_to(&mut self, key: &'static str, target: StepId) -> &mut Self {
        if let Step::Fork { branches, .. } = &mut self.dialogue.steps[self.id.0] {
            branches.insert(key, target);
        }
        self
    }
}

/// The start of a fork branch.
pub struct Branch<'d, P> {
    dialogue: &'d mut Dialogue<P>,
    fork: StepId,
    key: &'static str,
}

impl<'d, P: 'static> Chain<'d, P> for Branch<'d, P> {
    fn attach(self, step: Step<P>) -> StepBuilder<'d, P> {
        let id = self.dialogue.push(step);
        if let Step::Fork { branches, .. } = &mut self.dialogue.steps[self.fork.0] {
            branches.insert(self.key, id);
        }
        StepBuilder {
            dialogue: self.dialogue,
            id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_link_steps() {
        let mut dialogue = Dialogue::<()>::new("handshake");
        dialogue.send_header().expect_acknowledgement().reply("done");
        assert_eq!(dialogue.len(), 3);
        assert_eq!(dialogue.walk_length(), 3);
        let root = dialogue.root().unwrap();
        assert_eq!(dialogue.step(root).unwrap().kind(), StepKind::Reply);
        let second = dialogue.step(root).unwrap().next().unwrap();
        assert_eq!(dialogue.step(second).unwrap().kind(), StepKind::Expect);
    }

    #[test]
    fn header_roots_replace_earlier_steps() {
        let mut dialogue = Dialogue::<()>::new("handshake");
        dialogue.send_header().reply("one").reply("two");
        dialogue.accept_header();
        assert_eq!(dialogue.len(), 1);
        assert_eq!(dialogue.validate(), Ok(StepKind::Expect));
    }

    #[test]
    fn forks_can_loop() {
        let mut dialogue = Dialogue::<()>::new("loop");
        let top = dialogue.send_header().expect_acknowledgement();
        let top_id = top.id();
        let mut fork = top.fork(|_| "again");
        fork.branch_to("again", top_id);
        fork.branch("done").reply("bye");
        // The fork stops the count: header, acknowledgement.
        assert_eq!(dialogue.walk_length(), 2);
        assert_eq!(dialogue.validate(), Ok(StepKind::Reply));
    }

    #[test]
    fn validation_finds_structural_defects() {
        let mut dialogue = Dialogue::<()>::new("broken");
        assert_eq!(
            dialogue.validate(),
            Err(DialogueGraphError::MissingRoot("broken".into()))
        );

        dialogue.send_header().fork(|_| "nowhere");
        assert_eq!(
            dialogue.validate(),
            Err(DialogueGraphError::EmptyFork(StepId(1)))
        );

        dialogue
            .send_header()
            .fork(|_| "nowhere")
            .branch_to("nowhere", StepId(42));
        assert_eq!(
            dialogue.validate(),
            Err(DialogueGraphError::DanglingLink {
                from: StepId(1),
                to: StepId(42)
            })
        );
    }

    #[test]
    fn expectations_check_packets() {
        let mut state = State::new();
        let mut turn = Turn {
            data: Some("{\"a\":1}"),
            state: &mut state,
            protocol: &(),
        };
        assert!(Expectation::<()>::Literal("{\"a\":1}".into())
            .check(&mut turn)
            .is_ok());
        assert!(matches!(
            Expectation::<()>::Literal("ok".into()).check(&mut turn),
            Err(DialogueError::Unexpected { .. })
        ));
        let schema = Expectation::<()>::Schema {
            name: "u32",
            check: decodes_as::<u32>,
        };
        assert!(matches!(
            schema.check(&mut turn),
            Err(DialogueError::Decode { schema: "u32", .. })
        ));
        fn is_object(turn: &mut Turn<'_, ()>) -> bool {
            turn.data.map_or(false, |data| data.starts_with('{'))
        }
        let predicate = Expectation::<()>::Predicate(Arc::new(is_object));
        assert!(predicate.check(&mut turn).is_ok());
    }
}
