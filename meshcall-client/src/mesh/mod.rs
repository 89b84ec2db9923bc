mod link_state;
mod mesh_command;
mod mesh_coordinator;
mod mesh_event;
mod peer_link;

pub use link_state::*;
pub use mesh_command::*;
pub use mesh_coordinator::*;
pub use mesh_event::*;
