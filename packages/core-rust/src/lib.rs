//! `RuleGo` Core: rule messages, framework configuration, and endpoint contracts.

pub mod config;
pub mod endpoint;
pub mod types;

pub use config::{Configuration, Logger, RuleConfig, TracingLogger};
pub use endpoint::{
    BaseEndpoint, Endpoint, EndpointBase, EndpointError, Exchange, Headers, Message,
    RouteProcessor, Router,
};
pub use types::{DataType, Metadata, RuleMsg};
