use meshcall_client::MeshEvent;
use std::time::Duration;

use crate::integration::{init_tracing, mesh_config, start_manual_mesh};
use crate::utils::{joined, pid, recv_within, wait_for_event, wait_for_removed, wait_until};

#[tokio::test(start_paused = true)]
async fn test_peer_is_dropped_after_the_reconnect_budget() {
    init_tracing();
    let mut fx = start_manual_mesh("p2", mesh_config(Duration::from_secs(1), 2));

    fx.deliver(joined("p1"));
    let mut transports = Vec::new();
    for _ in 0..3 {
        let transport = fx.next_transport().await;
        transport.fail().await;
        transports.push(transport);
    }

    let gave_up = wait_for_event(&mut fx.events, |e| matches!(e, MeshEvent::PeerGaveUp { .. })).await;
    assert_eq!(gave_up.peer(), &pid("p1"));
    wait_for_removed(&mut fx.events, "p1").await;

    wait_until(|| transports.iter().all(|t| t.is_closed())).await;
    assert!(recv_within(&mut fx.created, Duration::from_secs(30)).await.is_none());
    assert!(fx.mesh.peers().await.unwrap().is_empty());
    assert_eq!(fx.factory.created().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_a_peer_that_returns_gets_a_fresh_budget() {
    init_tracing();
    let mut fx = start_manual_mesh("p2", mesh_config(Duration::from_secs(1), 0));

    fx.deliver(joined("p1"));
    fx.next_transport().await.fail().await;
    wait_for_event(&mut fx.events, |e| matches!(e, MeshEvent::PeerGaveUp { .. })).await;

    fx.deliver(joined("p1"));
    let transport = fx.next_transport().await;
    assert_eq!(transport.remote, pid("p1"));
    assert_eq!(fx.mesh.peers().await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_lost_signaling_gives_up_without_retrying() {
    init_tracing();
    let mut fx = start_manual_mesh("p2", mesh_config(Duration::from_secs(1), 3));
    fx.signaling.disconnect();

    // p2 offers to p1, and the offer cannot be sent.
    fx.deliver(joined("p1"));
    fx.next_transport().await;

    let gave_up = wait_for_event(&mut fx.events, |e| matches!(e, MeshEvent::PeerGaveUp { .. })).await;
    assert_eq!(gave_up.peer(), &pid("p1"));
    assert!(recv_within(&mut fx.created, Duration::from_secs(30)).await.is_none());
    assert!(fx.mesh.peers().await.unwrap().is_empty());
}
