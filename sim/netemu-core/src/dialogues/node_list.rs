use super::REQUEST_NODE_LIST;
use crate::{
    dialogue::{Chain, Dialogue, DialogueError},
    protocols::{PeerRecord, StandardProtocol},
};
use serde::{Deserialize, Serialize};

/// The reply to a node list request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeList {
    pub peers: Vec<PeerRecord>,
}

/// The initiator asks for a node list and merges it into its own. The
/// responder sends the peers it knows of together with its own record.
pub fn request_node_list() -> (Dialogue<StandardProtocol>, Dialogue<StandardProtocol>) {
    let mut initiator = Dialogue::<StandardProtocol>::new(REQUEST_NODE_LIST);
    initiator
        .send_header()
        .expect_schema::<NodeList>()
        .then_decoded(|list: NodeList, turn| {
            turn.protocol.merge(list.peers);
            Ok(())
        });

    let mut responder = Dialogue::<StandardProtocol>::new(REQUEST_NODE_LIST);
    responder.accept_header().reply_with(|turn| {
        let mut peers = turn.protocol.known_peers();
        peers.push(turn.protocol.descriptor());
        serde_json::to_string(&NodeList { peers }).map_err(|e| DialogueError::Encode(e.to_string()))
    });

    (initiator, responder)
}
