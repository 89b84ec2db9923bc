use crate::mesh::PeerSummary;
use meshcall_core::SignalMessage;
use tokio::sync::oneshot;

/// Commands from the session into the mesh coordinator.
#[derive(Debug)]
pub enum MeshCommand {
    /// Inbound message from the signaling channel.
    Signal(SignalMessage),
    Peers {
        reply: oneshot::Sender<Vec<PeerSummary>>,
    },
    /// Close every link and cancel pending reconnects.
    Leave {
        done: oneshot::Sender<()>,
    },
}
