use anyhow::{Result, bail};
use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 100_000_000;
pub const DEFAULT_KEEPALIVE_INTERVAL_SECS: u64 = 25;
pub const DEFAULT_KEEPALIVE_TIMEOUT_SECS: u64 = 60;

/// Relay settings. Every flag can also come from the environment.
#[derive(Debug, Clone, Parser)]
#[command(name = "meshcall-relay", about = "Signaling relay for mesh video calls")]
pub struct RelayConfig {
    /// Address to listen on.
    #[arg(long, env = "MESHCALL_HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// Port to listen on.
    #[arg(long, env = "MESHCALL_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Largest accepted WebSocket message, in bytes.
    #[arg(long, env = "MESHCALL_MAX_MESSAGE_SIZE", default_value_t = DEFAULT_MAX_MESSAGE_SIZE)]
    pub max_message_size: usize,

    /// Seconds between keepalive pings.
    #[arg(
        long,
        env = "MESHCALL_KEEPALIVE_INTERVAL_SECS",
        default_value_t = DEFAULT_KEEPALIVE_INTERVAL_SECS
    )]
    pub keepalive_interval_secs: u64,

    /// Seconds of silence after which a channel is considered dead.
    #[arg(
        long,
        env = "MESHCALL_KEEPALIVE_TIMEOUT_SECS",
        default_value_t = DEFAULT_KEEPALIVE_TIMEOUT_SECS
    )]
    pub keepalive_timeout_secs: u64,
}

impl RelayConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }

    pub fn keepalive_timeout(&self) -> Duration {
        Duration::from_secs(self.keepalive_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.keepalive_interval_secs == 0 {
            bail!("keepalive interval must be at least one second");
        }
        if self.keepalive_timeout_secs < self.keepalive_interval_secs {
            bail!(
                "keepalive timeout ({}s) must not be shorter than the interval ({}s)",
                self.keepalive_timeout_secs,
                self.keepalive_interval_secs
            );
        }
        if self.max_message_size == 0 {
            bail!("max message size must be positive");
        }
        Ok(())
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            keepalive_interval_secs: DEFAULT_KEEPALIVE_INTERVAL_SECS,
            keepalive_timeout_secs: DEFAULT_KEEPALIVE_TIMEOUT_SECS,
        }
    }
}
