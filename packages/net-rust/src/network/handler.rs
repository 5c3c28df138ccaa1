//! Per-connection read loop: framing, idle timeout, heartbeat filtering and
//! dispatch to matching routes.
//!
//! ```text
//! reading ──frame──▶ dispatch ──▶ reading
//!    │
//!    ├─ idle timer fired ─────────┐
//!    ├─ read error / EOF ─────────┼──▶ closed
//!    └─ panic in frame handling ──┘
//! ```

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::RefCell;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Once};

use bytes::Bytes;
use futures_util::{FutureExt, StreamExt};
use rulego_core::{EndpointBase, Exchange, Message, RuleConfig};
use tokio::io::ReadHalf;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead};
use tracing::{debug, trace};

use super::config::NetConfig;
use super::connection::{BoxedStream, Connection};
use super::message::{LogFn, RequestMessage, ResponseMessage, REMOTE_ADDR_KEY};
use super::router::RouteRegistry;

thread_local! {
    static PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_TRACE_HOOK: Once = Once::new();

/// Chains a panic hook that records where the panic happened, and the stack
/// when `RUST_BACKTRACE` enables capture, for the catching handler to log.
fn install_panic_trace_hook() {
    PANIC_TRACE_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let location = info
                .location()
                .map_or_else(|| "unknown location".to_string(), ToString::to_string);
            let backtrace = Backtrace::capture();
            let trace = match backtrace.status() {
                BacktraceStatus::Captured => format!("panicked at {location}\n{backtrace}"),
                _ => format!(
                    "panicked at {location} (set RUST_BACKTRACE=1 for a stack trace)"
                ),
            };
            PANIC_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

fn take_panic_trace() -> String {
    PANIC_TRACE
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_else(|| "panic location unavailable".to_string())
}

/// Frame payload that keeps a connection alive without being dispatched.
pub const PING_DATA: &[u8] = b"ping";

/// State shared by all connection handlers of one started endpoint.
pub(crate) struct HandlerContext {
    pub(crate) config: NetConfig,
    pub(crate) rule_config: RuleConfig,
    pub(crate) routes: Arc<RouteRegistry>,
    pub(crate) base: Arc<dyn EndpointBase>,
}

impl HandlerContext {
    pub(crate) fn printf(&self, args: fmt::Arguments<'_>) {
        self.rule_config.printf(args);
    }

    fn log_fn(&self) -> LogFn {
        let rule_config = self.rule_config.clone();
        Arc::new(move |args: fmt::Arguments<'_>| rule_config.printf(args))
    }
}

enum ReadOutcome {
    Frame(Bytes),
    DeadlineExceeded,
    IdleExpired,
    Failed(AnyDelimiterCodecError),
    Eof,
}

impl From<Option<Result<Bytes, AnyDelimiterCodecError>>> for ReadOutcome {
    fn from(next: Option<Result<Bytes, AnyDelimiterCodecError>>) -> Self {
        match next {
            Some(Ok(frame)) => Self::Frame(frame),
            Some(Err(err)) => Self::Failed(err),
            None => Self::Eof,
        }
    }
}

struct ClientHandler {
    ctx: Arc<HandlerContext>,
    conn: Arc<Connection>,
    frames: FramedRead<ReadHalf<BoxedStream>, AnyDelimiterCodec>,
}

/// Serves one accepted connection until it closes.
///
/// Any panic raised while handling frames is caught here, logged, and ends
/// only this connection.
pub(crate) async fn serve_connection(
    ctx: Arc<HandlerContext>,
    stream: BoxedStream,
    remote_addr: String,
) {
    install_panic_trace_hook();
    let (conn, reader) = Connection::new(stream, remote_addr);
    let codec = AnyDelimiterCodec::new_with_max_length(
        b"\n".to_vec(),
        b"\n".to_vec(),
        ctx.config.frame_limit(),
    );
    let handler = ClientHandler {
        ctx: Arc::clone(&ctx),
        conn: Arc::clone(&conn),
        frames: FramedRead::new(reader, codec),
    };

    if let Err(panic) = AssertUnwindSafe(handler.run()).catch_unwind().await {
        ctx.printf(format_args!(
            "net endpoint handler err :\n{} (connection {} from {})\n{}",
            panic_message(panic.as_ref()),
            conn.id(),
            conn.remote_addr(),
            take_panic_trace()
        ));
    }
    conn.close().await;
}

impl ClientHandler {
    async fn run(mut self) {
        let read_deadline = self.ctx.config.idle_timeout();
        let idle_deadline = self.ctx.config.idle_deadline();
        let idle = tokio::time::sleep(idle_deadline);
        tokio::pin!(idle);

        loop {
            let outcome = match read_deadline {
                Some(deadline) => {
                    tokio::select! {
                        () = &mut idle => ReadOutcome::IdleExpired,
                        next = tokio::time::timeout(deadline, self.frames.next()) => {
                            next.map_or(ReadOutcome::DeadlineExceeded, ReadOutcome::from)
                        }
                    }
                }
                None => ReadOutcome::from(self.frames.next().await),
            };

            let frame = match outcome {
                ReadOutcome::Frame(frame) => frame,
                // Not fatal on its own; the idle timer decides when to give up.
                ReadOutcome::DeadlineExceeded => continue,
                ReadOutcome::IdleExpired => {
                    debug!(connection = %self.conn.id(), "idle timeout expired");
                    break;
                }
                ReadOutcome::Failed(err) => {
                    debug!(connection = %self.conn.id(), error = %err, "read failed");
                    break;
                }
                ReadOutcome::Eof => break,
            };

            if read_deadline.is_some() {
                idle.set(tokio::time::sleep(idle_deadline));
            }

            let frame = trim_cr(frame);
            if frame.as_ref() == PING_DATA {
                trace!(connection = %self.conn.id(), "heartbeat");
                continue;
            }
            self.dispatch(frame.to_vec()).await;
        }

        self.on_disconnect().await;
    }

    async fn dispatch(&self, frame: Vec<u8>) {
        let mut request = RequestMessage::new(Some(Arc::clone(&self.conn)), frame);
        if let Some(msg) = request.get_msg() {
            msg.metadata.put_value(REMOTE_ADDR_KEY, self.conn.remote_addr());
        }
        let response =
            ResponseMessage::new(Some(Arc::clone(&self.conn)), Some(self.ctx.log_fn()));
        let routes = self.ctx.routes.matching(request.body());
        let mut exchange = Exchange::new(Box::new(request), Box::new(response));

        trace!(
            connection = %self.conn.id(),
            matched = routes.len(),
            "dispatching frame"
        );
        for entry in routes {
            self.ctx.base.do_process(entry.router(), &mut exchange).await;
        }
    }

    async fn on_disconnect(&self) {
        self.conn.close().await;
        self.ctx
            .printf(format_args!("onDisconnect:{}", self.conn.remote_addr()));
    }
}

fn trim_cr(frame: Bytes) -> Bytes {
    match frame.last() {
        Some(b'\r') => frame.slice(..frame.len() - 1),
        _ => frame,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
