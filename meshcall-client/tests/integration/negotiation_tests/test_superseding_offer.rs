use meshcall_client::MeshConfig;
use meshcall_core::SdpKind;

use crate::integration::{init_tracing, start_mesh};
use crate::utils::{
    TransportCall, candidate_from, joined, next_description, offer_from, pid, wait_for_connected,
    wait_until,
};

#[tokio::test]
async fn test_new_offer_after_negotiation_rebuilds_the_link() {
    init_tracing();
    let mut fx = start_mesh("p1", MeshConfig::default());

    fx.deliver(joined("p2"));
    let first = fx.next_transport().await;
    fx.deliver(offer_from("p2", "p1", "offer-1"));
    next_description(&mut fx.sent, "answer").await;
    wait_for_connected(&mut fx.events, "p2").await;

    // The remote side restarted its link.
    fx.deliver(offer_from("p2", "p1", "offer-2"));

    let second = fx.next_transport().await;
    assert_eq!(second.remote, pid("p2"));
    let (to, _) = next_description(&mut fx.sent, "answer").await;
    assert_eq!(to, pid("p2"));

    wait_until(|| first.is_closed()).await;
    assert_eq!(first.count(&TransportCall::SetRemote(SdpKind::Offer)), 1);
    wait_until(|| second.has_call(&TransportCall::SetLocal(SdpKind::Answer))).await;

    // The old link stops being counted; the new one is counted once it connects.
    wait_for_connected(&mut fx.events, "p2").await;
    assert_eq!(fx.mesh.active_peers(), 1);
}

#[tokio::test]
async fn test_candidates_after_a_new_offer_reach_the_new_link() {
    init_tracing();
    let mut fx = start_mesh("p1", MeshConfig::default());

    fx.deliver(joined("p2"));
    let first = fx.next_transport().await;
    fx.deliver(offer_from("p2", "p1", "offer-1"));
    next_description(&mut fx.sent, "answer").await;
    wait_for_connected(&mut fx.events, "p2").await;

    // The restarted remote trickles right behind its offer.
    fx.deliver(offer_from("p2", "p1", "offer-2"));
    fx.deliver(candidate_from("p2", "p1", "c-new"));

    let second = fx.next_transport().await;
    next_description(&mut fx.sent, "answer").await;
    wait_until(|| second.applied_candidates() == vec!["c-new".to_owned()]).await;
    assert!(first.applied_candidates().is_empty());
}
