use std::io;

/// Errors surfaced synchronously by endpoint lifecycle and routing calls.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("router can not be nil")]
    NilRouter,
    #[error("invalid router pattern {expr:?}: {source}")]
    InvalidPattern {
        expr: String,
        #[source]
        source: regex::Error,
    },
    /// The id is still reported so callers can refer to the existing entry.
    #[error("duplicate router {id} ({expr:?})")]
    DuplicateRouter { id: String, expr: String },
    #[error("router: {id} not found")]
    RouterNotFound { id: String },
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    #[error("unsupported protocol: {protocol}")]
    UnsupportedProtocol { protocol: String },
    #[error("failed to bind {protocol} listener on {address}: {source}")]
    Bind {
        protocol: String,
        address: String,
        #[source]
        source: io::Error,
    },
    #[error("endpoint already started")]
    AlreadyStarted,
    #[error("accept loop failed: {0}")]
    AcceptLoop(String),
}

impl EndpointError {
    /// Returns the router id carried by duplicate and not-found errors.
    #[must_use]
    pub fn router_id(&self) -> Option<&str> {
        match self {
            Self::DuplicateRouter { id, .. } | Self::RouterNotFound { id } => Some(id),
            _ => None,
        }
    }
}
