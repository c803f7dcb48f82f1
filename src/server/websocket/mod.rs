//! WebSocket infrastructure for the push channel.

pub mod connection;
pub mod handler;
pub mod messages;

pub use connection::{SendError, SessionRegistry};
pub use handler::ws_handler;
pub use messages::{msg_types, system, ClientMessage, ServerMessage};
