//! `RuleGo` Net: a line-framed TCP/Unix socket endpoint that routes frames to
//! rule chains by regular expression.

pub mod network;

pub use network::{NetConfig, NetEndpoint, RequestMessage, ResponseMessage};
