//! esgate - SigV4 signing proxy for Amazon OpenSearch / Elasticsearch
//! Service.
//!
//! Binds a local HTTP listener and forwards every request to one fixed
//! IAM-protected domain, attaching an AWS Signature Version 4 header set so
//! clients never hold AWS credentials themselves.
//!
//! # Usage
//!
//! ```text
//! esgate search-mydomain.us-east-1.es.amazonaws.com
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `BIND_ADDRESS` | `127.0.0.1` | Bind address |
//! | `PORT` | `9200` | Bind port |
//! | `ENDPOINT` | *(required unless given as argument)* | Upstream endpoint |
//! | `REGION` | *(inferred from hostname)* | AWS region |
//! | `LIMIT` | `10mb` | Request body size limit |
//! | `HEALTH_PATH` | *(disabled)* | Health-check path |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

mod cli;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use esgate_auth::CredentialCache;
use esgate_proxy::config::{BasicAuth, ProxyConfig, UpstreamTarget, parse_size_limit};
use esgate_proxy::{ForwardingEngine, GatewayService};

use crate::cli::Cli;

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` value.
fn init_tracing() -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
        EnvFilter::try_new(&level).with_context(|| format!("invalid log level filter: {level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}

/// Build the runtime configuration from the parsed command line.
fn build_config(cli: &Cli) -> Result<ProxyConfig> {
    let basic_auth = match (&cli.user, &cli.password) {
        (Some(user), Some(password)) => Some(BasicAuth {
            user: user.clone(),
            password: password.clone(),
        }),
        (Some(_), None) | (None, Some(_)) => {
            warn!("both --user and --password are required to enable basic auth; gate disabled");
            None
        }
        (None, None) => None,
    };

    Ok(ProxyConfig {
        body_limit: parse_size_limit(&cli.limit)?,
        health_path: cli.health_path.clone(),
        basic_auth,
        ..ProxyConfig::default()
    })
}

/// Run the accept loop, serving connections until a shutdown signal is
/// received.
async fn serve(listener: TcpListener, service: GatewayService) -> Result<()> {
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal, draining connections");
    };

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let svc = service.clone();
                let conn = http.serve_connection(TokioIo::new(stream), svc);
                let conn = graceful.watch(conn.into_owned());

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        error!(peer_addr = %peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = &mut shutdown => {
                info!("shutting down gracefully");
                break;
            }
        }
    }

    // Wait for in-flight requests to complete.
    graceful.shutdown().await;
    info!("all connections drained, exiting");

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing()?;

    let endpoint = cli
        .endpoint
        .clone()
        .context("upstream endpoint is required (argument or ENDPOINT environment variable)")?;
    let target = UpstreamTarget::parse(&endpoint, cli.region.as_deref())?;
    let config = build_config(&cli)?;

    let credentials = CredentialCache::default_chain()?;
    // Resolve once up front: starting without any reachable credential
    // source is a fatal configuration error, not a per-request one.
    credentials
        .resolve()
        .await
        .context("cannot resolve AWS credentials (environment, shared profile, or metadata)")?;

    let engine = ForwardingEngine::new(target.clone(), &config)?;
    let gateway = GatewayService::new(config.clone(), credentials, engine);

    let addr: SocketAddr = format!("{}:{}", cli.bind_address, cli.port)
        .parse()
        .with_context(|| format!("invalid bind address: {}:{}", cli.bind_address, cli.port))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(
        %addr,
        upstream = %target.origin(),
        region = %target.region,
        version = env!("CARGO_PKG_VERSION"),
        "esgate listening",
    );
    if let Some(path) = &config.health_path {
        info!(path = %path, "health endpoint enabled");
    }
    if config.basic_auth.is_some() {
        info!("basic auth gate enabled");
    }

    serve(listener, gateway).await
}
