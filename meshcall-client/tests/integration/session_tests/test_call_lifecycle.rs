use meshcall_client::{EndReason, MeshEvent, Session, SessionConfig, SessionEvent};
use meshcall_relay::{AppState, RelayConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::integration::init_tracing;
use crate::utils::{
    MockTransportFactory, StaticMediaSource, TransportCall, wait_for_session_event, wait_until,
};

async fn start_relay() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("No local address");
    tokio::spawn(meshcall_relay::serve(
        listener,
        AppState::new(RelayConfig::default()),
    ));
    addr
}

fn session_config(addr: SocketAddr, name: &str) -> SessionConfig {
    SessionConfig::new(format!("ws://{}/ws", addr), "ABC123", name)
}

#[tokio::test]
async fn test_two_sessions_connect_through_the_relay() {
    init_tracing();
    let addr = start_relay().await;

    let alice_media = StaticMediaSource::new();
    let (alice_factory, _alice_created) = MockTransportFactory::new("alice");
    let alice = Session::start(
        session_config(addr, "alice"),
        &alice_media,
        Arc::new(alice_factory.clone()),
    )
    .await
    .unwrap();
    let mut alice_events = alice.subscribe();

    let (bob_factory, _bob_created) = MockTransportFactory::new("bob");
    let bob = Session::start(
        session_config(addr, "bob"),
        &StaticMediaSource::new(),
        Arc::new(bob_factory.clone()),
    )
    .await
    .unwrap();
    let mut bob_events = bob.subscribe();

    wait_until(|| alice.active_peers() == 1 && bob.active_peers() == 1).await;

    let alice_link = alice_factory.created()[0].clone();
    let bob_link = bob_factory.created()[0].clone();
    assert_eq!(&alice_link.remote, bob.participant_id());
    assert_eq!(&bob_link.remote, alice.participant_id());

    // The greater id offers, the other side answers.
    let (offerer, answerer) = if alice.participant_id() > bob.participant_id() {
        (&alice_link, &bob_link)
    } else {
        (&bob_link, &alice_link)
    };
    assert!(offerer.has_call(&TransportCall::CreateOffer));
    assert!(!offerer.has_call(&TransportCall::CreateAnswer));
    assert!(answerer.has_call(&TransportCall::CreateAnswer));
    assert!(!answerer.has_call(&TransportCall::CreateOffer));

    wait_until(|| {
        !alice_link.applied_candidates().is_empty() && !bob_link.applied_candidates().is_empty()
    })
    .await;

    alice.toggle_camera(false);
    assert!(!alice.is_video_enabled());
    assert!(alice.is_audio_enabled());
    alice.toggle_microphone(false);
    assert!(!alice.is_audio_enabled());

    let alice_id = alice.participant_id().clone();
    let captured = alice_media.issued().unwrap();
    alice.end_call().await.unwrap();

    assert!(captured.is_stopped());
    assert!(alice_link.is_closed());
    wait_for_session_event(&mut alice_events, |e| {
        matches!(e, SessionEvent::Ended(EndReason::Left))
    })
    .await;

    wait_for_session_event(&mut bob_events, |e| {
        matches!(e, SessionEvent::Mesh(MeshEvent::PeerRemoved { peer }) if *peer == alice_id)
    })
    .await;
    assert_eq!(bob.active_peers(), 0);
    wait_until(|| bob_link.is_closed()).await;

    bob.end_call().await.unwrap();
}

#[tokio::test]
async fn test_late_joiner_links_with_everyone() {
    init_tracing();
    let addr = start_relay().await;

    let mut sessions = Vec::new();
    let mut factories = Vec::new();
    for name in ["alice", "bob", "carol"] {
        let (factory, created) = MockTransportFactory::new(name);
        let session = Session::start(
            session_config(addr, name),
            &StaticMediaSource::new(),
            Arc::new(factory.clone()),
        )
        .await
        .unwrap();
        sessions.push(session);
        factories.push((factory, created));
    }

    wait_until(|| sessions.iter().all(|s| s.active_peers() == 2)).await;

    for (session, (factory, _)) in sessions.iter().zip(&factories) {
        let peers = session.peers().await.unwrap();
        assert_eq!(peers.len(), 2);
        assert_eq!(factory.created().len(), 2);
    }
}
