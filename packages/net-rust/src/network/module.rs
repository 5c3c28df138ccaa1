//! Net endpoint with explicit lifecycle.
//!
//! `new()` allocates the route registry, `init()` merges configuration,
//! `start()` binds the listener and spawns the accept loop, and `close()`
//! stops it. Routes may be added and removed at any point, including while
//! connections are being served.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rulego_core::{
    BaseEndpoint, Configuration, Endpoint, EndpointBase, EndpointError, Router, RuleConfig,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::config::NetConfig;
use super::connection::BoxedStream;
use super::handler::{serve_connection, HandlerContext};
use super::router::{compile_pattern, RouteEntry, RouteRegistry};

/// Component type name of the net endpoint.
pub const TYPE: &str = "endpoint/net";

/// Pause after a failed accept so a persistent error (e.g. fd exhaustion)
/// does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Listening socket of a started endpoint.
enum BoundListener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix {
        listener: tokio::net::UnixListener,
        path: std::path::PathBuf,
    },
}

impl BoundListener {
    async fn bind(config: &NetConfig) -> Result<Self, EndpointError> {
        let address = config.bind_address();
        let bind_err = |source: io::Error| EndpointError::Bind {
            protocol: config.protocol.clone(),
            address: address.clone(),
            source,
        };

        match config.protocol.as_str() {
            "tcp" => Ok(Self::Tcp(
                TcpListener::bind(&address).await.map_err(bind_err)?,
            )),
            family @ ("tcp4" | "tcp6") => {
                let want_v4 = family == "tcp4";
                let addr = tokio::net::lookup_host(&address)
                    .await
                    .map_err(bind_err)?
                    .find(|addr| addr.is_ipv4() == want_v4)
                    .ok_or_else(|| {
                        bind_err(io::Error::new(
                            io::ErrorKind::AddrNotAvailable,
                            format!("no {family} address for {address}"),
                        ))
                    })?;
                Ok(Self::Tcp(TcpListener::bind(addr).await.map_err(bind_err)?))
            }
            #[cfg(unix)]
            "unix" => {
                let path = std::path::PathBuf::from(&config.server);
                let listener = tokio::net::UnixListener::bind(&path).map_err(bind_err)?;
                Ok(Self::Unix { listener, path })
            }
            other => Err(EndpointError::UnsupportedProtocol {
                protocol: other.to_string(),
            }),
        }
    }

    async fn accept(&self) -> io::Result<(BoxedStream, String)> {
        match self {
            Self::Tcp(listener) => {
                let (stream, addr) = listener.accept().await?;
                Ok((Box::new(stream), addr.to_string()))
            }
            #[cfg(unix)]
            Self::Unix { listener, .. } => {
                let (stream, addr) = listener.accept().await?;
                let remote = addr
                    .as_pathname()
                    .map_or_else(|| "@".to_string(), |p| p.display().to_string());
                Ok((Box::new(stream), remote))
            }
        }
    }

    fn local_addr(&self) -> String {
        match self {
            Self::Tcp(listener) => listener
                .local_addr()
                .map_or_else(|_| String::new(), |addr| addr.to_string()),
            #[cfg(unix)]
            Self::Unix { path, .. } => path.display().to_string(),
        }
    }
}

#[cfg(unix)]
impl Drop for BoundListener {
    fn drop(&mut self) {
        if let Self::Unix { path, .. } = self {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Running accept loop and the means to stop it.
struct ListenerHandle {
    local_addr: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Line-framed stream endpoint that routes frames by regular expression.
pub struct NetEndpoint {
    config: NetConfig,
    rule_config: RuleConfig,
    base: Arc<dyn EndpointBase>,
    routes: Arc<RouteRegistry>,
    listener: Mutex<Option<ListenerHandle>>,
}

impl NetEndpoint {
    /// Creates a stopped endpoint with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(NetConfig::default())
    }

    #[must_use]
    pub fn with_config(config: NetConfig) -> Self {
        Self {
            config,
            rule_config: RuleConfig::default(),
            base: Arc::new(BaseEndpoint),
            routes: Arc::new(RouteRegistry::new()),
            listener: Mutex::new(None),
        }
    }

    /// Replaces the shared endpoint behaviour (router ids, route invocation).
    #[must_use]
    pub fn with_base(mut self, base: Arc<dyn EndpointBase>) -> Self {
        self.base = base;
        self
    }

    #[must_use]
    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    /// Address the listener is bound to, while started.
    ///
    /// Differs from the configured address when port 0 was requested.
    #[must_use]
    pub fn local_addr(&self) -> Option<String> {
        self.listener
            .lock()
            .as_ref()
            .map(|handle| handle.local_addr.clone())
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.listener.lock().is_some()
    }

    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn route_ids(&self) -> Vec<String> {
        self.routes.ids()
    }

    fn printf(&self, args: std::fmt::Arguments<'_>) {
        self.rule_config.printf(args);
    }
}

impl Default for NetEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NetEndpoint {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.get_mut().take() {
            handle.cancel.cancel();
        }
    }
}

#[async_trait]
impl Endpoint for NetEndpoint {
    fn endpoint_type(&self) -> &'static str {
        TYPE
    }

    fn id(&self) -> String {
        self.config.server.clone()
    }

    fn init(
        &mut self,
        rule_config: RuleConfig,
        configuration: &Configuration,
    ) -> Result<(), EndpointError> {
        self.config = self.config.merge(configuration)?;
        self.rule_config = rule_config;
        Ok(())
    }

    async fn start(&self) -> Result<(), EndpointError> {
        if self.is_started() {
            return Err(EndpointError::AlreadyStarted);
        }

        let listener = BoundListener::bind(&self.config).await?;
        let local_addr = listener.local_addr();
        self.printf(format_args!("started server on {}", self.config.server));

        let ctx = Arc::new(HandlerContext {
            config: self.config.clone(),
            rule_config: self.rule_config.clone(),
            routes: Arc::clone(&self.routes),
            base: Arc::clone(&self.base),
        });
        let cancel = CancellationToken::new();
        let task = tokio::spawn(accept_loop(listener, ctx, cancel.clone()));

        *self.listener.lock() = Some(ListenerHandle {
            local_addr,
            cancel,
            task,
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), EndpointError> {
        let Some(handle) = self.listener.lock().take() else {
            return Ok(());
        };
        handle.cancel.cancel();
        handle
            .task
            .await
            .map_err(|err| EndpointError::AcceptLoop(err.to_string()))
    }

    fn add_router(&self, router: Option<Router>) -> Result<String, EndpointError> {
        let mut router = router.ok_or(EndpointError::NilRouter)?;
        let pattern = compile_pattern(router.from_expr())?;
        self.base.check_and_set_router_id(&mut router);
        self.routes.insert(RouteEntry::new(router, pattern))
    }

    fn remove_router(&self, router_id: &str) -> Result<(), EndpointError> {
        self.routes.remove(router_id).map(|_| ())
    }
}

async fn accept_loop(listener: BoundListener, ctx: Arc<HandlerContext>, cancel: CancellationToken) {
    loop {
        let accepted = tokio::select! {
            () = cancel.cancelled() => {
                ctx.printf(format_args!("net endpoint stop"));
                return;
            }
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, remote_addr)) => {
                ctx.printf(format_args!("new connection from: {remote_addr}"));
                debug!(remote_addr = %remote_addr, "connection accepted");
                tokio::spawn(serve_connection(Arc::clone(&ctx), stream, remote_addr));
            }
            Err(err) => {
                ctx.printf(format_args!("accept: {err}"));
                warn!(error = %err, "accept failed");
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
            }
        }
    }
}
