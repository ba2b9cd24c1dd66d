//! WebSocket relay core.
//!
//! `protocol` defines the wire frames, `registry` tracks the live connection
//! set, `relay` serializes persist-then-broadcast, and `handler` drives one
//! socket from accept to teardown.

mod handler;
mod protocol;
mod registry;
mod relay;


pub use handler::handle_socket;
pub use protocol::{ClientMessage, ServerMessage};
pub use registry::{ConnectionRegistry, ConnectionSender};
pub use relay::{RelayHandle, spawn_relay_engine};
