use crate::room::Room;
use crate::signaling::SignalingOutput;
use dashmap::DashMap;
use meshcall_core::{ParticipantId, ParticipantInfo, RoomId, SignalMessage};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Registry of live rooms and of which room each participant is in.
///
/// Membership changes of a room run under that room's mutex, so snapshots,
/// joins and departures of one room are totally ordered. A room switch holds
/// both rooms' mutexes (taken in room-id order) for the whole move.
///
/// Operations for one participant are expected to be issued sequentially by
/// its connection task; the registry does not order them against each other.
#[derive(Clone)]
pub struct RoomManager {
    rooms: Arc<DashMap<RoomId, Arc<Mutex<Room>>>>,
    locations: Arc<DashMap<ParticipantId, RoomId>>,
    signaling: Arc<dyn SignalingOutput>,
}

impl RoomManager {
    pub fn new(signaling: Arc<dyn SignalingOutput>) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            locations: Arc::new(DashMap::new()),
            signaling,
        }
    }

    /// Moves `user` into `room_id`, leaving its current room in the same step.
    ///
    /// The joiner receives the snapshot of the other members, then everybody
    /// else in the room receives `user_joined`. Members of the room left
    /// behind receive `user_left`.
    pub async fn join(&self, user: ParticipantInfo, room_id: RoomId) {
        let previous = self.room_of(&user.id);

        if previous.as_ref() == Some(&room_id) {
            self.resend_snapshot(&user.id, &room_id).await;
            return;
        }

        loop {
            let target = self.room_handle(&room_id);
            let source = previous
                .as_ref()
                .and_then(|id| self.rooms.get(id).map(|r| (id.clone(), r.value().clone())));

            let (mut target_guard, source_guard) = match &source {
                None => (target.lock().await, None),
                Some((source_id, source_room)) => {
                    let (t, s) = lock_pair(&target, &room_id, source_room, source_id).await;
                    (t, Some(s))
                }
            };

            if target_guard.is_closed() {
                debug!("Room {} was discarded while joining, retrying", room_id);
                continue;
            }

            if let (Some(mut source_guard), Some((_, source_room))) = (source_guard, &source) {
                self.leave_locked(&mut source_guard, source_room, &user.id)
                    .await;
            }

            info!(
                "Participant {} ({}) joined room {}",
                user.id, user.username, room_id
            );

            target_guard.insert(user.clone());
            self.locations.insert(user.id.clone(), room_id.clone());

            let users = target_guard.others(&user.id);
            let recipients: Vec<ParticipantId> = users.iter().map(|u| u.id.clone()).collect();

            self.signaling
                .send_to(&user.id, SignalMessage::RoomMembership { users })
                .await;
            self.signaling
                .broadcast(&recipients, SignalMessage::ParticipantJoined { user })
                .await;

            return;
        }
    }

    /// Removes the participant from its room, if any.
    pub async fn disconnect(&self, participant_id: &ParticipantId) {
        let Some((_, room_id)) = self.locations.remove(participant_id) else {
            return;
        };
        let Some(room) = self.rooms.get(&room_id).map(|r| r.value().clone()) else {
            return;
        };

        let mut guard = room.lock().await;
        self.leave_locked(&mut guard, &room, participant_id).await;
    }

    pub fn room_of(&self, participant_id: &ParticipantId) -> Option<RoomId> {
        self.locations
            .get(participant_id)
            .map(|entry| entry.value().clone())
    }

    /// True when both participants are currently in the same room.
    pub fn share_room(&self, a: &ParticipantId, b: &ParticipantId) -> bool {
        match (self.room_of(a), self.room_of(b)) {
            (Some(ra), Some(rb)) => ra == rb,
            _ => false,
        }
    }

    /// Current members of a room; empty when the room does not exist.
    pub async fn members(&self, room_id: &RoomId) -> Vec<ParticipantInfo> {
        let Some(room) = self.rooms.get(room_id).map(|r| r.value().clone()) else {
            return Vec::new();
        };
        room.lock().await.all()
    }

    pub fn contains_room(&self, room_id: &RoomId) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    fn room_handle(&self, room_id: &RoomId) -> Arc<Mutex<Room>> {
        self.rooms
            .entry(room_id.clone())
            .or_insert_with(|| {
                info!("Creating new room: {}", room_id);
                Arc::new(Mutex::new(Room::new(room_id.clone())))
            })
            .clone()
    }

    async fn resend_snapshot(&self, participant_id: &ParticipantId, room_id: &RoomId) {
        let Some(room) = self.rooms.get(room_id).map(|r| r.value().clone()) else {
            return;
        };
        let users = room.lock().await.others(participant_id);
        debug!(
            "Participant {} re-joined room {}, resending snapshot",
            participant_id, room_id
        );
        self.signaling
            .send_to(participant_id, SignalMessage::RoomMembership { users })
            .await;
    }

    async fn leave_locked(
        &self,
        room: &mut Room,
        handle: &Arc<Mutex<Room>>,
        participant_id: &ParticipantId,
    ) {
        if room.remove(participant_id).is_none() {
            return;
        }
        info!("Participant {} left room {}", participant_id, room.id());

        if room.is_empty() {
            room.close();
            self.rooms
                .remove_if(room.id(), |_, current| Arc::ptr_eq(current, handle));
            info!("Room {} is empty, discarding", room.id());
            return;
        }

        self.signaling
            .broadcast(
                &room.member_ids(),
                SignalMessage::ParticipantLeft {
                    participant_id: participant_id.clone(),
                },
            )
            .await;
    }
}

/// Locks two distinct rooms in room-id order, returning (target, source).
async fn lock_pair<'a>(
    target: &'a Mutex<Room>,
    target_id: &RoomId,
    source: &'a Mutex<Room>,
    source_id: &RoomId,
) -> (MutexGuard<'a, Room>, MutexGuard<'a, Room>) {
    if source_id < target_id {
        let s = source.lock().await;
        let t = target.lock().await;
        (t, s)
    } else {
        let t = target.lock().await;
        let s = source.lock().await;
        (t, s)
    }
}
