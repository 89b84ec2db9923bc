use crate::media::RemoteTrack;
use meshcall_core::IceCandidate;

/// Connection state reported by a peer transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    /// Transient; ICE may still recover on its own.
    Disconnected,
    Failed,
    Closed,
}

/// Events a transport emits towards the link that owns it.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Local candidate that has to reach the remote side through signaling.
    CandidateGenerated(IceCandidate),

    StateChanged(ConnectionState),

    /// Remote media arrived on this connection.
    TrackAdded(RemoteTrack),
}
