use super::{
    Action, Dialogue, DialogueError, DialogueGraphError, DialogueRegistry, Payload, Role, State,
    Step, Turn,
};
use crate::{
    connection::{Endpoint, Packet},
    logging::dialogue_event,
};
use std::time::Duration;

/// How a successful walk ended.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WalkSummary {
    /// The number of steps executed, forks included.
    pub steps: usize,
    /// The last packet received, if any.
    pub last: Option<String>,
}

/// Executes dialogue graphs against endpoints.
///
/// Expect steps wait for as long as the endpoint can still deliver a packet.
/// With a read timeout set, a wait that runs longer than that fails the walk
/// with [`DialogueError::Timeout`] instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct Walker {
    read_timeout: Option<Duration>,
}

impl Walker {
    pub fn new() -> Self {
        Default::default()
    }

    /// Gives up on an expect step after waiting `timeout` for a packet.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// Looks up the dialogue registered for the endpoint's header and walks
    /// the side given by `role` with fresh session state.
    pub async fn run<P: Sync + 'static>(
        &self,
        registry: &DialogueRegistry<P>,
        role: Role,
        endpoint: &Endpoint,
        protocol: &P,
    ) -> Result<WalkSummary, DialogueError> {
        let header = endpoint.header();
        let outcome = match registry.dialogue(header, role) {
            Some(dialogue) => {
                self.walk(dialogue, endpoint, protocol, &mut State::new())
                    .await
            }
            None => Err(DialogueError::UnknownHeader(header.to_owned())),
        };
        dialogue_event(endpoint.owner(), header, role, &outcome);
        outcome
    }

    /// Walks `dialogue` from its root, performing one endpoint operation per
    /// reply or expect step, until a step with no successor finishes.
    pub async fn walk<P: Sync + 'static>(
        &self,
        dialogue: &Dialogue<P>,
        endpoint: &Endpoint,
        protocol: &P,
        state: &mut State,
    ) -> Result<WalkSummary, DialogueError> {
        let mut current = Some(
            dialogue
                .root()
                .ok_or_else(|| DialogueGraphError::MissingRoot(dialogue.header().to_owned()))?,
        );
        let mut last: Option<String> = None;
        let mut steps = 0;

        while let Some(id) = current {
            let step = dialogue
                .step(id)
                .ok_or(DialogueGraphError::MissingStep(id))?;
            steps += 1;
            current = match step {
                Step::Reply {
                    payload,
                    actions,
                    next,
                } => {
                    let mut turn = Turn {
                        data: last.as_deref(),
                        state: &mut *state,
                        protocol,
                    };
                    let packet = match payload {
                        Payload::Literal(packet) => packet.clone(),
                        Payload::Compose(compose) => compose(&mut turn)?,
                    };
                    endpoint.write(packet)?;
                    run_actions(actions, &mut turn)?;
                    *next
                }
                Step::Expect {
                    expectation,
                    actions,
                    next,
                } => {
                    last = Some(self.receive(endpoint).await?);
                    let mut turn = Turn {
                        data: last.as_deref(),
                        state: &mut *state,
                        protocol,
                    };
                    expectation.check(&mut turn)?;
                    run_actions(actions, &mut turn)?;
                    *next
                }
                Step::Fork { selector, branches } => {
                    let mut turn = Turn {
                        data: last.as_deref(),
                        state: &mut *state,
                        protocol,
                    };
                    let key = selector(&mut turn);
                    let branch = branches
                        .get(key)
                        .ok_or_else(|| DialogueGraphError::UnknownBranch {
                            step: id,
                            key: key.to_owned(),
                        })?;
                    Some(*branch)
                }
            };
        }

        Ok(WalkSummary { steps, last })
    }

    async fn receive(&self, endpoint: &Endpoint) -> Result<String, DialogueError> {
        let packet = match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, endpoint.read())
                .await
                .map_err(|_| DialogueError::Timeout(limit))?,
            None => endpoint.read().await,
        };
        match packet {
            Some(Packet::Data(data)) => Ok(data),
            Some(Packet::Close) => Err(DialogueError::Closed),
            None => Err(DialogueError::NoData),
        }
    }
}

fn run_actions<P>(actions: &[Action<P>], turn: &mut Turn<'_, P>) -> Result<(), DialogueError> {
    actions.iter().try_for_each(|action| action(&mut *turn))
}
