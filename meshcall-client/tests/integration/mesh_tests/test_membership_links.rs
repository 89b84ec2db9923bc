use meshcall_client::{MeshConfig, MeshEvent};
use meshcall_core::{NegotiationRole, SdpKind};
use std::collections::BTreeSet;

use crate::integration::{init_tracing, start_mesh};
use crate::utils::{
    QUIET_PERIOD, joined, membership, next_description, pid, recv_within, wait_for_event,
};

#[tokio::test]
async fn test_snapshot_opens_one_link_per_other_member() {
    init_tracing();
    let mut fx = start_mesh("p5", MeshConfig::default());

    // The local id in the snapshot is skipped.
    fx.deliver(membership(&["p1", "p9", "p5"]));

    let first = fx.next_transport().await;
    let second = fx.next_transport().await;
    let remotes: BTreeSet<_> = [first.remote.clone(), second.remote.clone()].into();
    assert_eq!(remotes, [pid("p1"), pid("p9")].into());
    assert!(recv_within(&mut fx.created, QUIET_PERIOD).await.is_none());

    let peers = fx.mesh.peers().await.unwrap();
    assert_eq!(peers.len(), 2);
    assert_eq!(peers[0].info.id, pid("p1"));
    assert_eq!(peers[0].info.username, "user-p1");
    assert_eq!(peers[0].role, NegotiationRole::Initiator);
    assert_eq!(peers[1].info.id, pid("p9"));
    assert_eq!(peers[1].role, NegotiationRole::Responder);
}

#[tokio::test]
async fn test_only_the_greater_id_sends_an_offer() {
    init_tracing();
    let mut fx = start_mesh("p5", MeshConfig::default());

    fx.deliver(membership(&["p1", "p9"]));

    let (to, offer) = next_description(&mut fx.sent, "offer").await;
    assert_eq!(to, pid("p1"));
    assert_eq!(offer.kind, SdpKind::Offer);

    tokio::time::sleep(QUIET_PERIOD).await;
    assert_eq!(fx.signaling.sent_to("offer", &pid("p1")).await.len(), 1);
    assert!(fx.signaling.sent_to("offer", &pid("p9")).await.is_empty());
}

#[tokio::test]
async fn test_tie_break_is_lexicographic() {
    init_tracing();
    // "p10" < "p9" as strings, so p9 offers to p10.
    let mut fx = start_mesh("p9", MeshConfig::default());

    fx.deliver(joined("p10"));

    let (to, _) = next_description(&mut fx.sent, "offer").await;
    assert_eq!(to, pid("p10"));
}

#[tokio::test]
async fn test_repeated_arrival_keeps_a_single_link() {
    init_tracing();
    let mut fx = start_mesh("p1", MeshConfig::default());

    fx.deliver(joined("p2"));
    fx.deliver(joined("p2"));
    fx.deliver(membership(&["p2"]));

    fx.next_transport().await;
    assert!(recv_within(&mut fx.created, QUIET_PERIOD).await.is_none());
    assert_eq!(fx.mesh.peers().await.unwrap().len(), 1);

    let added = wait_for_event(&mut fx.events, |e| matches!(e, MeshEvent::PeerAdded { .. })).await;
    assert_eq!(added.peer(), &pid("p2"));
}

#[tokio::test]
async fn test_snapshot_with_only_self_opens_nothing() {
    init_tracing();
    let mut fx = start_mesh("p1", MeshConfig::default());

    fx.deliver(membership(&["p1"]));
    fx.deliver(membership(&[]));

    assert!(recv_within(&mut fx.created, QUIET_PERIOD).await.is_none());
    assert!(fx.mesh.peers().await.unwrap().is_empty());
    assert_eq!(fx.mesh.active_peers(), 0);
}
