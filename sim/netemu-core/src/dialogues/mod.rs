//! The dialogues every [`StandardProtocol`] node speaks.

use crate::{
    dialogue::{DialogueGraphError, DialogueRegistry},
    protocols::StandardProtocol,
};

mod handshake;
pub use handshake::handshake;

mod node_list;
pub use node_list::{request_node_list, NodeList};

/// Introduces the initiator to the responder.
pub const HANDSHAKE: &str = "handshake";
/// Asks the responder for the peers it knows of.
pub const REQUEST_NODE_LIST: &str = "request_node_list";

/// Registers every standard dialogue pair.
pub fn register_standard(
    registry: &mut DialogueRegistry<StandardProtocol>,
) -> Result<(), DialogueGraphError> {
    let (initiator, responder) = handshake();
    registry.register(initiator, responder)?;
    let (initiator, responder) = request_node_list();
    registry.register(initiator, responder)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_dialogues_register() {
        let mut registry = DialogueRegistry::new();
        register_standard(&mut registry).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(HANDSHAKE));
        assert!(registry.contains(REQUEST_NODE_LIST));
        assert_eq!(
            register_standard(&mut registry),
            Err(DialogueGraphError::DuplicateHeader(HANDSHAKE.into()))
        );
    }
}
