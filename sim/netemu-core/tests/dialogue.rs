//! Walks of dialogue pairs over simulated connections.

use netemu_core::{
    connection::Packet,
    dialogue::{
        Chain, Dialogue, DialogueError, DialogueGraphError, DialogueRegistry, Role, State, Walker,
    },
    latency::Latency,
    Address, Endpoint, NetworkConfig, Transport,
};
use serde::{Deserialize, Serialize};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

fn transport() -> Arc<Transport> {
    Transport::new(Latency::seeded(NetworkConfig::default(), 0xBAD5EED).unwrap())
}

/// Creates an open pair between nodes 0 and 1.
fn pair(transport: &Arc<Transport>, header: &str) -> (Endpoint, Endpoint) {
    let (a, b) = transport.create(Address::new(0), Address::new(1), header);
    a.open().unwrap();
    (a, b)
}

fn handshake_registry() -> DialogueRegistry<()> {
    let mut initiator = Dialogue::new("handshake");
    initiator.send_header().expect_acknowledgement();
    let mut responder = Dialogue::new("handshake");
    responder.accept_header().acknowledge();
    let mut registry = DialogueRegistry::new();
    registry.register(initiator, responder).unwrap();
    registry
}

#[tokio::test(start_paused = true)]
async fn handshake_completes() {
    let transport = transport();
    let registry = handshake_registry();
    let (a, b) = pair(&transport, "handshake");
    let walker = Walker::new();

    let (initiator, responder) = tokio::join!(
        walker.run(&registry, Role::Initiator, &a, &()),
        walker.run(&registry, Role::Responder, &b, &()),
    );

    let initiator = initiator.unwrap();
    assert_eq!(initiator.steps, 2);
    assert_eq!(initiator.last.as_deref(), Some("ok"));
    assert_eq!(responder.unwrap().last.as_deref(), Some("handshake"));
}

#[tokio::test(start_paused = true)]
async fn substituted_payload_fails_the_walk() {
    let transport = transport();
    let registry = handshake_registry();
    let (a, b) = pair(&transport, "handshake");
    a.write("something else").unwrap();

    let error = Walker::new()
        .run(&registry, Role::Responder, &b, &())
        .await
        .unwrap_err();
    match error {
        DialogueError::Unexpected { expected, got } => {
            assert_eq!(expected, "handshake");
            assert_eq!(got, "something else");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(a.try_read(), None);
}

#[tokio::test(start_paused = true)]
async fn unregistered_header_is_reported() {
    let transport = transport();
    let registry = handshake_registry();
    let (a, _b) = pair(&transport, "mystery");
    let error = Walker::new()
        .run(&registry, Role::Initiator, &a, &())
        .await
        .unwrap_err();
    assert!(matches!(error, DialogueError::UnknownHeader(header) if header == "mystery"));
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Point {
    x: i32,
    y: i32,
}

#[tokio::test(start_paused = true)]
async fn schema_expectations_decode_packets() {
    let transport = transport();
    let (a, b) = pair(&transport, "point");

    let mut initiator = Dialogue::<()>::new("point");
    initiator
        .send_header()
        .expect_acknowledgement()
        .reply_json(Point { x: 3, y: -4 });
    let mut responder = Dialogue::<()>::new("point");
    responder
        .accept_header()
        .acknowledge()
        .expect_schema::<Point>()
        .then_decoded(|point: Point, turn| {
            turn.state.insert("norm", point.x.abs() + point.y.abs())?;
            Ok(())
        });

    let walker = Walker::new();
    let (mut sender, mut state) = (State::new(), State::new());
    let (sent, received) = tokio::join!(
        walker.walk(&initiator, &a, &(), &mut sender),
        walker.walk(&responder, &b, &(), &mut state),
    );
    sent.unwrap();
    assert_eq!(received.unwrap().last.as_deref(), Some(r#"{"x":3,"y":-4}"#));
    assert_eq!(state.get::<i32>("norm"), Ok(7));
}

#[tokio::test(start_paused = true)]
async fn schema_mismatch_is_a_decode_error() {
    let transport = transport();
    let (a, b) = pair(&transport, "point");
    let mut responder = Dialogue::<()>::new("point");
    responder.accept_header().expect_schema::<Point>();

    a.write("point").unwrap();
    transport.drain().await;
    a.write(r#"{"x":1}"#).unwrap();

    let error = Walker::new()
        .walk(&responder, &b, &(), &mut State::new())
        .await
        .unwrap_err();
    assert!(matches!(error, DialogueError::Decode { got, .. } if got == r#"{"x":1}"#));
}

#[tokio::test(start_paused = true)]
async fn predicates_accept_and_reject() {
    let transport = transport();
    let mut responder = Dialogue::<()>::new("number");
    responder
        .accept_header()
        .expect_with(|turn| turn.data.map_or(false, |data| data.parse::<u32>().is_ok()));

    for (payload, accepted) in [("12", true), ("twelve", false)] {
        let (a, b) = pair(&transport, "number");
        a.write("number").unwrap();
        transport.drain().await;
        a.write(payload).unwrap();
        let outcome = Walker::new()
            .walk(&responder, &b, &(), &mut State::new())
            .await;
        match outcome {
            Ok(summary) => {
                assert!(accepted);
                assert_eq!(summary.last.as_deref(), Some(payload));
            }
            Err(DialogueError::Rejected(got)) => {
                assert!(!accepted);
                assert_eq!(got, payload);
            }
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }
}

/// Remembers every number it was sent.
#[derive(Default)]
struct Counter {
    seen: Mutex<Vec<u32>>,
}

#[tokio::test(start_paused = true)]
async fn forks_loop_until_done() {
    const ROUNDS: u32 = 3;

    let mut initiator = Dialogue::<Counter>::new("count");
    let number = initiator
        .send_header()
        .expect_acknowledgement()
        .reply_with(|turn| {
            let n: u32 = turn.state.get_or("n", 0)?;
            turn.state.insert("n", n + 1)?;
            Ok(n.to_string())
        });
    let number_id = number.id();
    let mut fork = number.expect_acknowledgement().fork(|turn| {
        if turn.state.get::<u32>("n").unwrap_or(0) < ROUNDS {
            "more"
        } else {
            "done"
        }
    });
    fork.branch_to("more", number_id);
    fork.branch("done").reply("bye").expect_acknowledgement();

    let mut responder = Dialogue::<Counter>::new("count");
    let incoming = responder
        .accept_header()
        .acknowledge()
        .expect_with(|turn| turn.data.is_some())
        .then(|turn| {
            if let Ok(n) = turn.data()?.parse() {
                turn.protocol.seen.lock().unwrap().push(n);
            }
            Ok(())
        });
    let incoming_id = incoming.id();
    let mut fork = incoming.fork(|turn| match turn.data {
        Some("bye") => "done",
        _ => "number",
    });
    fork.branch("done").acknowledge();
    fork.branch("number")
        .acknowledge()
        .fork(|_| "again")
        .branch_to("again", incoming_id);

    let mut registry = DialogueRegistry::new();
    registry.register(initiator, responder).unwrap();

    let transport = transport();
    let (a, b) = pair(&transport, "count");
    let (alice, bob) = (Counter::default(), Counter::default());
    let walker = Walker::new();
    let (sent, received) = tokio::join!(
        walker.run(&registry, Role::Initiator, &a, &alice),
        walker.run(&registry, Role::Responder, &b, &bob),
    );

    // Header, acknowledgement, three rounds of number, acknowledgement and
    // fork, then goodbye and its acknowledgement.
    assert_eq!(sent.unwrap().steps, 2 + 3 * 3 + 2);
    assert_eq!(received.unwrap().steps, 2 + 3 * 4 + 3);
    assert_eq!(*bob.seen.lock().unwrap(), vec![0, 1, 2]);
    assert!(alice.seen.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unknown_fork_key_fails_the_walk() {
    let transport = transport();
    let (a, _b) = pair(&transport, "lost");
    let mut dialogue = Dialogue::<()>::new("lost");
    dialogue
        .send_header()
        .fork(|_| "nowhere")
        .branch("somewhere")
        .reply("hi");

    let error = Walker::new()
        .walk(&dialogue, &a, &(), &mut State::new())
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        DialogueError::Graph(DialogueGraphError::UnknownBranch { key, .. }) if key == "nowhere"
    ));
}

#[tokio::test(start_paused = true)]
async fn callback_errors_fail_the_walk() {
    let transport = transport();
    let (a, b) = pair(&transport, "boom");
    let mut responder = Dialogue::<()>::new("boom");
    responder
        .accept_header()
        .then(|_| Err(DialogueError::Callback("boom".into())));

    a.write("boom").unwrap();
    let error = Walker::new()
        .walk(&responder, &b, &(), &mut State::new())
        .await
        .unwrap_err();
    assert!(matches!(error, DialogueError::Callback(message) if message == "boom"));
}

#[tokio::test(start_paused = true)]
async fn peer_closing_mid_dialogue_is_a_disconnect() {
    let transport = transport();
    let mut initiator = Dialogue::<()>::new("more");
    initiator.send_header().expect_acknowledgement();
    let mut responder = Dialogue::<()>::new("more");
    responder.accept_header().acknowledge().expect("more please");
    let mut registry = DialogueRegistry::new();
    registry.register(initiator, responder).unwrap();

    let (a, b) = pair(&transport, "more");
    let walker = Walker::new();
    let (sent, received) = tokio::join!(
        async {
            let summary = walker.run(&registry, Role::Initiator, &a, &()).await;
            a.close();
            summary
        },
        walker.run(&registry, Role::Responder, &b, &()),
    );

    sent.unwrap();
    let error = received.unwrap_err();
    assert!(matches!(error, DialogueError::Closed));
    assert!(error.is_disconnect());
}

#[tokio::test(start_paused = true)]
async fn closing_locally_unblocks_the_walk() {
    let transport = transport();
    let registry = handshake_registry();
    let (_a, b) = pair(&transport, "handshake");

    let walker = Walker::new();
    let (received, ()) = tokio::join!(
        walker.run(&registry, Role::Responder, &b, &()),
        async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            b.close();
        },
    );
    assert!(matches!(received, Err(DialogueError::NoData)));
}

#[tokio::test(start_paused = true)]
async fn read_timeout_fails_a_silent_walk() {
    let transport = transport();
    let registry = handshake_registry();
    let (_a, b) = pair(&transport, "handshake");
    let walker = Walker::new().with_read_timeout(Duration::from_secs(1));
    let error = walker
        .run(&registry, Role::Responder, &b, &())
        .await
        .unwrap_err();
    assert!(matches!(error, DialogueError::Timeout(limit) if limit == Duration::from_secs(1)));
    assert!(!error.is_disconnect());
}

#[tokio::test(start_paused = true)]
async fn close_is_out_of_band() {
    let transport = transport();
    let (a, b) = pair(&transport, "close");
    // The literal text of a close is ordinary data.
    a.write("close").unwrap();
    transport.drain().await;
    a.close();
    transport.drain().await;
    assert_eq!(b.try_read(), Some(Packet::Data("close".into())));
    assert_eq!(b.try_read(), Some(Packet::Close));
}
