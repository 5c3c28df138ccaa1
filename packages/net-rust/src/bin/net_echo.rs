//! Echo server over the net endpoint.
//!
//! Every frame matching `--pattern` is written back to its sender, newline
//! terminated. Send `ping` to keep an idle connection open.

use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use rulego_core::{Endpoint, Exchange, RouteProcessor, Router, RuleConfig, TracingLogger};
use rulego_net::NetEndpoint;
use serde_json::{json, Map};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "net-echo")]
#[command(about = "Echo line-framed messages received on a TCP or Unix socket", long_about = None)]
struct Cli {
    /// Bind address, `host:port` or a socket path for `unix`.
    #[arg(short, long, env = "NET_ECHO_SERVER", default_value = ":6335")]
    server: String,

    /// One of tcp, tcp4, tcp6, unix.
    #[arg(short, long, env = "NET_ECHO_PROTOCOL", default_value = "tcp")]
    protocol: String,

    /// Idle read timeout in seconds; 0 disables it.
    #[arg(short, long, default_value_t = 60)]
    read_timeout: u64,

    /// Only echo frames matching this regex. Empty matches everything.
    #[arg(long, default_value = "")]
    pattern: String,
}

struct Echo;

#[async_trait]
impl RouteProcessor for Echo {
    async fn process(&self, exchange: &mut Exchange) {
        let from = exchange.in_msg.from();
        if let Some(msg) = exchange.in_msg.get_msg() {
            tracing::info!(from = %from, id = %msg.id, data = %msg.data, "echo");
        }
        let mut body = exchange.in_msg.body().to_vec();
        body.push(b'\n');
        exchange.out_msg.set_body(body).await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rulego=info,rulego_net=debug,net_echo=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut configuration = Map::new();
    configuration.insert("protocol".into(), json!(cli.protocol));
    configuration.insert("server".into(), json!(cli.server));
    configuration.insert("readTimeout".into(), json!(cli.read_timeout));

    let mut endpoint = NetEndpoint::new();
    endpoint.init(
        RuleConfig::new().with_logger(Arc::new(TracingLogger)),
        &configuration,
    )?;
    let router_id = endpoint.add_router(Some(Router::new(cli.pattern, Arc::new(Echo))))?;
    endpoint.start().await?;
    tracing::info!(
        router_id = %router_id,
        local_addr = %endpoint.local_addr().unwrap_or_default(),
        "net-echo ready"
    );

    tokio::signal::ctrl_c().await?;
    endpoint.close().await?;
    Ok(())
}
