//! EventPigeon server binary.
//!
//! Starts an axum HTTP server with structured logging, opens the event log,
//! optionally runs the console subscriber, and shuts down gracefully on
//! SIGTERM/SIGINT.

use std::net::SocketAddr;
use std::time::Duration;

use pigeon_log::{EventLog, LogSettings};
use pigeon_server::{app, background, config, AppState};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("PIGEON_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration; the server cannot start without valid config");

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    let pool = pigeon_db::create_pool(&config.database.path, config.database.runtime_settings())
        .expect("failed to create database pool; check database.path in config");

    let log = EventLog::open(
        pool,
        LogSettings {
            max_recent_limit: config.log.max_recent_limit,
        },
    )
    .await
    .expect("failed to open event log");

    let shutdown = CancellationToken::new();

    let subscriber = config.subscriber.enabled.then(|| {
        tokio::spawn(background::start_console_subscriber(
            log.clone(),
            config.subscriber.from_start,
            Duration::from_millis(config.subscriber.retry_delay_ms),
            shutdown.child_token(),
        ))
    });

    let state = AppState::new(log, config.log.default_recent_limit, shutdown.clone());
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, "starting eventpigeon server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address; is another process using this port?");

    let signal_token = shutdown.clone();
    axum::serve(listener, app(state))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            signal_token.cancel();
        })
        .await
        .expect("server error");

    shutdown.cancel();
    if let Some(handle) = subscriber {
        if let Err(e) = handle.await {
            tracing::error!("console subscriber join error: {}", e);
        }
    }

    tracing::info!("eventpigeon server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
