use meshcall_core::{ParticipantId, ParticipantInfo, RoomId, SignalMessage};
use std::collections::BTreeSet;

use crate::integration::{create_test_rooms, init_tracing};
use crate::utils::{MockSignalingOutput, ids};

/// Replays what a client would believe: its join snapshot, then every
/// arrival and departure delivered after it.
async fn derived_view(
    signaling: &MockSignalingOutput,
    participant_id: &ParticipantId,
) -> BTreeSet<ParticipantId> {
    let mut view = BTreeSet::new();

    for msg in signaling.messages_for(participant_id).await {
        match msg {
            SignalMessage::RoomMembership { users } => {
                view = users.into_iter().map(|u| u.id).collect();
            }
            SignalMessage::ParticipantJoined { user } => {
                assert!(
                    view.insert(user.id.clone()),
                    "{} was announced twice to {}",
                    user.id,
                    participant_id
                );
            }
            SignalMessage::ParticipantLeft { participant_id: gone } => {
                assert!(
                    view.remove(&gone),
                    "{} left without being known to {}",
                    gone,
                    participant_id
                );
            }
            _ => {}
        }
    }

    view
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interleaved_joins_and_disconnects_keep_views_consistent() {
    init_tracing();
    let (rooms, signaling) = create_test_rooms();
    let room = RoomId::from("busy");

    let mut tasks = Vec::new();
    for i in 0..24 {
        let rooms = rooms.clone();
        let room = room.clone();
        tasks.push(tokio::spawn(async move {
            let id = ParticipantId::from(format!("p{:02}", i));
            rooms
                .join(ParticipantInfo::new(id.clone(), "guest"), room)
                .await;
            tokio::task::yield_now().await;
            if i % 3 == 0 {
                rooms.disconnect(&id).await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let members: BTreeSet<ParticipantId> = ids(&rooms.members(&room).await).into_iter().collect();
    assert_eq!(members.len(), 16);

    for member in &members {
        let mut expected = members.clone();
        expected.remove(member);

        assert_eq!(
            derived_view(&signaling, member).await,
            expected,
            "view of {} diverged from the room",
            member
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_everyone_leaving_concurrently_discards_room() {
    init_tracing();
    let (rooms, _signaling) = create_test_rooms();
    let room = RoomId::from("short-lived");

    for i in 0..10 {
        let id = ParticipantId::from(format!("p{}", i));
        rooms.join(ParticipantInfo::new(id, "guest"), room.clone()).await;
    }

    let mut tasks = Vec::new();
    for i in 0..10 {
        let rooms = rooms.clone();
        tasks.push(tokio::spawn(async move {
            rooms
                .disconnect(&ParticipantId::from(format!("p{}", i)))
                .await;
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert!(!rooms.contains_room(&room));
    assert!(rooms.members(&room).await.is_empty());
}
