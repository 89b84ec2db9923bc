/// Lifecycle of the link to one remote participant.
///
/// `Idle -> Negotiating -> Connected`, with `Failed -> Reconnecting -> Idle`
/// when a link is rebuilt. A link that gives up is removed instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Negotiating,
    Connected,
    Failed,
    Reconnecting,
}

impl LinkState {
    pub fn is_connected(self) -> bool {
        self == LinkState::Connected
    }
}
