//! Endpoint contracts: the seam between transports and rule chains.
//!
//! An endpoint terminates some external input (a socket, a broker
//! subscription), wraps each unit of input in an [`Exchange`], and hands it
//! to the [`Router`]s whose `from` expression matches.

pub mod base;
pub mod error;
pub mod message;
pub mod router;

pub use base::{BaseEndpoint, EndpointBase};
pub use error::EndpointError;
pub use message::{Exchange, Headers, Message};
pub use router::{RouteProcessor, Router};

use async_trait::async_trait;

use crate::config::{Configuration, RuleConfig};

/// Prefix shared by all endpoint type names.
pub const ENDPOINT_TYPE_PREFIX: &str = "endpoint/";

/// Lifecycle and routing API an endpoint exposes to the framework.
///
/// `init` runs once before `start`. `start` and `close` are driven by a
/// single owner; router mutation may happen concurrently with traffic.
#[async_trait]
pub trait Endpoint: Send + Sync {
    fn endpoint_type(&self) -> &'static str;

    /// Identity used by the owning pool for lookup.
    fn id(&self) -> String;

    /// Merges `configuration` into the endpoint's structured config.
    ///
    /// # Errors
    ///
    /// Returns `EndpointError::Config` if a recognised key has the wrong type.
    fn init(
        &mut self,
        rule_config: RuleConfig,
        configuration: &Configuration,
    ) -> Result<(), EndpointError>;

    /// Binds the transport and begins accepting input in the background.
    ///
    /// # Errors
    ///
    /// Returns the bind failure; the endpoint stays stopped.
    async fn start(&self) -> Result<(), EndpointError>;

    /// Stops accepting input. Closing a stopped endpoint is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport reported one while shutting down.
    async fn close(&self) -> Result<(), EndpointError>;

    /// Closes the endpoint, discarding any close error.
    async fn destroy(&self) {
        let _ = self.close().await;
    }

    /// Registers `router` and returns its id.
    ///
    /// # Errors
    ///
    /// Fails on a missing router, an invalid `from` expression, or an id that
    /// is already registered. The registry is unchanged on failure.
    fn add_router(&self, router: Option<Router>) -> Result<String, EndpointError>;

    /// Removes the router with `router_id`.
    ///
    /// # Errors
    ///
    /// Returns `EndpointError::RouterNotFound` if no such router exists.
    fn remove_router(&self, router_id: &str) -> Result<(), EndpointError>;
}
