use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::message::Exchange;

/// The processing pipeline a route hands matched exchanges to.
///
/// Invoked inline on the connection's worker. It may read `in_msg` and write
/// `out_msg`; it must not hold on to the exchange after returning.
#[async_trait]
pub trait RouteProcessor: Send + Sync {
    async fn process(&self, exchange: &mut Exchange);
}

/// Binding of a source expression to a processing pipeline.
///
/// The meaning of `from` is up to the endpoint. For the net endpoint it is a
/// regular expression over frame bytes, and empty matches everything.
#[derive(Clone)]
pub struct Router {
    id: String,
    from: String,
    processor: Arc<dyn RouteProcessor>,
}

impl Router {
    /// Creates a router without an id. The endpoint assigns one on add.
    #[must_use]
    pub fn new(from: impl Into<String>, processor: Arc<dyn RouteProcessor>) -> Self {
        Self {
            id: String::new(),
            from: from.into(),
            processor,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    #[must_use]
    pub fn from_expr(&self) -> &str {
        &self.from
    }

    #[must_use]
    pub fn processor(&self) -> &Arc<dyn RouteProcessor> {
        &self.processor
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("id", &self.id)
            .field("from", &self.from)
            .finish_non_exhaustive()
    }
}
