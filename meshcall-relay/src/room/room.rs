use meshcall_core::{ParticipantId, ParticipantInfo, RoomId};
use std::collections::HashMap;

/// Membership of one room. Always accessed under the room's mutex.
#[derive(Debug)]
pub struct Room {
    id: RoomId,
    members: HashMap<ParticipantId, ParticipantInfo>,
    closed: bool,
}

impl Room {
    pub fn new(id: RoomId) -> Self {
        Self {
            id,
            members: HashMap::new(),
            closed: false,
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    /// Adds or replaces a member. Returns true when the member is new.
    pub fn insert(&mut self, info: ParticipantInfo) -> bool {
        self.members.insert(info.id.clone(), info).is_none()
    }

    pub fn remove(&mut self, participant_id: &ParticipantId) -> Option<ParticipantInfo> {
        self.members.remove(participant_id)
    }

    pub fn contains(&self, participant_id: &ParticipantId) -> bool {
        self.members.contains_key(participant_id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Everybody except `participant_id`, ordered by id.
    pub fn others(&self, participant_id: &ParticipantId) -> Vec<ParticipantInfo> {
        let mut users: Vec<ParticipantInfo> = self
            .members
            .values()
            .filter(|info| &info.id != participant_id)
            .cloned()
            .collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        users
    }

    /// Every member, ordered by id.
    pub fn all(&self) -> Vec<ParticipantInfo> {
        let mut users: Vec<ParticipantInfo> = self.members.values().cloned().collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        users
    }

    pub fn member_ids(&self) -> Vec<ParticipantId> {
        self.members.keys().cloned().collect()
    }

    /// A closed room has been dropped from the registry; joiners that still
    /// hold a handle to it must look the room up again.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
