//! Line-framed TCP/Unix endpoint: configuration, connections, envelopes,
//! routing, and the per-connection handler.

pub mod config;
pub mod connection;
mod handler;
pub mod message;
pub mod module;
pub mod router;

pub use config::NetConfig;
pub use connection::{BoxedStream, Connection, ConnectionId};
pub use handler::PING_DATA;
pub use message::{MessageError, RequestMessage, ResponseMessage, REMOTE_ADDR_KEY};
pub use module::{NetEndpoint, TYPE};
pub use router::{RouteEntry, RouteRegistry};
