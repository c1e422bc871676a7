// Copyright 2026 The Chatrelay Project
// SPDX-License-Identifier: Apache-2.0

use axum::serve::ListenerExt;
use chatrelay::cache;
use chatrelay::config::{self, EnvSource};
use chatrelay::proxy;
use chatrelay::stream::SessionLimits;
use chatrelay::upstream::{HttpUpstreamClient, UpstreamClient};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chatrelay", about = "Streaming chat completion relay")]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0", env = "HOST")]
    host: IpAddr,

    /// Port to listen on
    #[arg(long, default_value_t = 3001, env = "PORT")]
    port: u16,
}

#[tokio::main]
async fn main() {
    // Must run before anything reads the environment.
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match dotenv {
        Ok(path) => tracing::info!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "failed to read .env"),
    }

    let cli = Cli::parse();
    let addr = SocketAddr::new(cli.host, cli.port);
    tracing::info!(%addr, "chatrelay starting");

    let config = match config::load_config(&EnvSource) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("failed to load config: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(?config, "config loaded");

    let upstream: Option<Arc<dyn UpstreamClient>> = match &config.api_key {
        Some(key) => match HttpUpstreamClient::new(
            &config.upstream_url,
            key,
            &config.model,
            config.connect_timeout,
        ) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                tracing::error!("failed to build upstream client: {e}");
                std::process::exit(1);
            }
        },
        None => {
            tracing::warn!(
                var = config::API_KEY_VAR,
                "API key not set, chat requests will fail"
            );
            None
        }
    };

    let cache = cache::connect_cache(config.redis_url.as_deref(), config.cache_ttl).await;
    let limits = SessionLimits {
        idle_timeout: config.idle_timeout,
        session_timeout: config.session_timeout,
    };

    let state = proxy::AppState::new(upstream, cache, limits);
    let app = proxy::build_router(state, &config.cors_origins);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(%addr, "failed to bind: {e}");
            std::process::exit(1);
        }
    };
    let listener = listener.tap_io(|tcp| {
        if let Err(e) = tcp.set_nodelay(true) {
            tracing::warn!("failed to set TCP_NODELAY: {e}");
        }
    });

    tracing::info!(%addr, "chatrelay listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("server error: {e}");
        std::process::exit(1);
    }
    tracing::info!("chatrelay stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
