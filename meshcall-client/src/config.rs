use crate::error::{ClientError, Result};
use meshcall_core::RoomId;
use std::time::Duration;

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 3;
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_EVENT_CAPACITY: usize = 256;
pub const MAX_DISPLAY_NAME_LEN: usize = 64;

/// Mesh recovery and fan-out settings.
#[derive(Debug, Clone)]
pub struct MeshConfig {
    /// Wait between a link failure and its replacement.
    pub reconnect_delay: Duration,
    /// Consecutive failures tolerated before a peer is dropped.
    pub max_reconnect_attempts: u32,
    pub event_capacity: usize,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Relay endpoint, e.g. `ws://localhost:3001/ws`.
    pub signaling_url: String,
    pub room_id: RoomId,
    pub display_name: String,
    /// Bound on connect plus welcome.
    pub join_timeout: Duration,
    pub mesh: MeshConfig,
}

impl SessionConfig {
    pub fn new(
        signaling_url: impl Into<String>,
        room_id: impl Into<RoomId>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            signaling_url: signaling_url.into(),
            room_id: room_id.into(),
            display_name: display_name.into(),
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            mesh: MeshConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.signaling_url.starts_with("ws://") || self.signaling_url.starts_with("wss://")) {
            return Err(ClientError::InvalidConfig(format!(
                "signaling url must be ws:// or wss://, got {}",
                self.signaling_url
            )));
        }
        if self.room_id.is_empty() {
            return Err(ClientError::InvalidConfig("room id is empty".into()));
        }
        if self.display_name.trim().is_empty() {
            return Err(ClientError::InvalidConfig("display name is empty".into()));
        }
        if self.display_name.chars().count() > MAX_DISPLAY_NAME_LEN {
            return Err(ClientError::InvalidConfig(format!(
                "display name exceeds {MAX_DISPLAY_NAME_LEN} characters"
            )));
        }
        Ok(())
    }
}
