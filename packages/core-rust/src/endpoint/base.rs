use async_trait::async_trait;

use super::message::Exchange;
use super::router::Router;

/// Behaviour every endpoint shares regardless of transport.
///
/// Endpoints hold one of these and delegate router-id assignment and route
/// invocation to it, so the framework can swap in instrumented variants.
#[async_trait]
pub trait EndpointBase: Send + Sync {
    /// Assigns a generated id to `router` if it has none, and returns the id.
    fn check_and_set_router_id(&self, router: &mut Router) -> String {
        if router.id().is_empty() {
            router.set_id(generate_router_id());
        }
        router.id().to_string()
    }

    /// Runs `router`'s pipeline against `exchange`.
    async fn do_process(&self, router: &Router, exchange: &mut Exchange) {
        router.processor().process(exchange).await;
    }
}

/// Default capability object with the stock behaviour.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaseEndpoint;

impl EndpointBase for BaseEndpoint {}

fn generate_router_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
