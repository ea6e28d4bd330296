//! livekit-events server entry point.
//!
//! Loads configuration, connects the optional Redis relay and serves the
//! webhook and WebSocket endpoints until Ctrl-C or SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use livekit_events::api;
use livekit_events::app_state::AppState;
use livekit_events::config::{CliArgs, HubConfig};
use livekit_events::domain::Hub;
use livekit_events::relay::{EventSink, RedisSink, Relay};
use livekit_events::webhook::{EventVerifier, TokenVerifier, TrustList};
use livekit_events::ws::SessionSupervisor;

/// Upper bound on how long shutdown waits for sessions to close.
const SESSION_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let cli = CliArgs::parse();
    let config = HubConfig::load(&cli).context("invalid configuration")?;

    // Initialize tracing
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    if config.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(addr = %config.listen_addr, "starting livekit-events");

    // External relay is optional and never fatal
    let relay = match &config.relay {
        Some(relay_config) => match RedisSink::connect(relay_config).await {
            Ok(sink) => Some(Relay::start(
                Arc::new(sink) as Arc<dyn EventSink>,
                relay_config.channel_name.clone(),
                config.relay_queue_capacity,
            )),
            Err(e) => {
                tracing::error!(error = %e, "redis relay unavailable, relay disabled");
                None
            }
        },
        None => None,
    };

    let trust_list = TrustList::new(config.trusted_upstreams.clone());
    if trust_list.is_enabled() {
        tracing::info!(trusted = ?trust_list.entries(), "origin filter enabled");
    }

    // Build application state
    let hub = Arc::new(Hub::new(config.subscriber_queue_capacity, relay));
    let sessions = SessionSupervisor::new(Duration::from_millis(
        config.subscriber_write_timeout_ms,
    ));
    let app_state = AppState {
        hub: Arc::clone(&hub),
        verifier: Arc::new(TokenVerifier::new(&config.api_key, &config.api_secret))
            as Arc<dyn EventVerifier>,
        trust_list: Arc::new(trust_list),
        sessions: sessions.clone(),
    };

    let app = api::build_router(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Evict everyone, then let the session loops send their close frames
    let closed = hub.shutdown().await;
    if !sessions.drain(SESSION_DRAIN_TIMEOUT).await {
        tracing::warn!(
            remaining = sessions.active(),
            "sessions still open at shutdown deadline"
        );
    }
    tracing::info!(subscribers = closed, "server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
