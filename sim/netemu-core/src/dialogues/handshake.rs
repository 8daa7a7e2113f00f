use super::HANDSHAKE;
use crate::{
    dialogue::{Chain, Dialogue, DialogueError},
    protocols::{PeerRecord, StandardProtocol},
};

/// The initiator sends the header and, once acknowledged, its own record. The
/// responder remembers the record.
pub fn handshake() -> (Dialogue<StandardProtocol>, Dialogue<StandardProtocol>) {
    let mut initiator = Dialogue::<StandardProtocol>::new(HANDSHAKE);
    initiator
        .send_header()
        .expect_acknowledgement()
        .reply_with(|turn| {
            serde_json::to_string(&turn.protocol.descriptor())
                .map_err(|e| DialogueError::Encode(e.to_string()))
        });

    let mut responder = Dialogue::<StandardProtocol>::new(HANDSHAKE);
    responder
        .accept_header()
        .acknowledge()
        .expect_schema::<PeerRecord>()
        .then_decoded(|record: PeerRecord, turn| {
            turn.protocol.remember(record);
            Ok(())
        });

    (initiator, responder)
}
