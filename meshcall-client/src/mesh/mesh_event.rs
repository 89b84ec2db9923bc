use crate::media::RemoteTrack;
use crate::mesh::LinkState;
use crate::transport::ConnectionState;
use meshcall_core::{NegotiationRole, ParticipantId, ParticipantInfo};

/// Mesh changes published to every subscriber.
#[derive(Debug, Clone)]
pub enum MeshEvent {
    PeerAdded {
        info: ParticipantInfo,
        role: NegotiationRole,
    },
    PeerStateChanged {
        peer: ParticipantId,
        state: LinkState,
    },
    /// First time the current link reaches `Connected`.
    PeerConnected {
        peer: ParticipantId,
    },
    TransportStateChanged {
        peer: ParticipantId,
        state: ConnectionState,
    },
    RemoteTrack {
        peer: ParticipantId,
        track: RemoteTrack,
    },
    PeerRemoved {
        peer: ParticipantId,
    },
    /// Reconnection budget exhausted; the peer is removed right after.
    PeerGaveUp {
        peer: ParticipantId,
        reason: String,
    },
}

impl MeshEvent {
    pub fn peer(&self) -> &ParticipantId {
        match self {
            MeshEvent::PeerAdded { info, .. } => &info.id,
            MeshEvent::PeerStateChanged { peer, .. }
            | MeshEvent::PeerConnected { peer }
            | MeshEvent::TransportStateChanged { peer, .. }
            | MeshEvent::RemoteTrack { peer, .. }
            | MeshEvent::PeerRemoved { peer }
            | MeshEvent::PeerGaveUp { peer, .. } => peer,
        }
    }
}

/// Point-in-time view of one peer.
#[derive(Debug, Clone)]
pub struct PeerSummary {
    pub info: ParticipantInfo,
    pub role: NegotiationRole,
    pub state: LinkState,
    pub tracks: Vec<RemoteTrack>,
}
