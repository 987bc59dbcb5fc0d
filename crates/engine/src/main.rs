//! Grimbox Engine - server-authoritative runtime for turn-based grid RPGs
//!
//! The engine owns all world state. Clients connect over a single HTTP
//! endpoint: JSON-RPC on `POST /rpc`, the event stream on `GET /ws`.
//! Configuration comes entirely from the environment; SIGINT/SIGTERM
//! trigger graceful shutdown with a final snapshot.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use grimbox_engine::config::AppConfig;
use grimbox_engine::http;
use grimbox_engine::state::Engine;

/// Exit codes: 0 normal, 1 config/startup failure, 2 forced kill after
/// the shutdown timeout.
const EXIT_OK: u8 = 0;
const EXIT_STARTUP_FAILURE: u8 = 1;
const EXIT_FORCED: u8 = 2;

fn main() -> ExitCode {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err:#}");
            return ExitCode::from(EXIT_STARTUP_FAILURE);
        }
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("grimbox_engine={0},grimbox_domain={0},tower_http=warn", config.log_level)
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!(%err, "failed to start runtime");
            return ExitCode::from(EXIT_STARTUP_FAILURE);
        }
    };
    ExitCode::from(runtime.block_on(run(config)))
}

async fn run(config: AppConfig) -> u8 {
    tracing::info!("Starting Grimbox Engine");
    tracing::info!("  port: {}", config.server_port);
    tracing::info!("  data dir: {}", config.data_dir.display());
    tracing::info!("  persistence: {}", config.persistence.enabled);

    // snapshot load or bootstrap, bounded by the bootstrap deadline
    let engine =
        match tokio::time::timeout(config.bootstrap_timeout, Engine::new(config.clone())).await {
            Ok(Ok(engine)) => engine,
            Ok(Err(err)) => {
                tracing::error!(%err, "startup failed");
                return EXIT_STARTUP_FAILURE;
            }
            Err(_) => {
                tracing::error!("bootstrap exceeded its deadline");
                return EXIT_STARTUP_FAILURE;
            }
        };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = engine.spawn_background_tasks(shutdown_rx);
    tracing::info!("Background workers started");

    let app = http::router(engine.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], engine.config.server_port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%err, %addr, "failed to bind");
            return EXIT_STARTUP_FAILURE;
        }
    };
    tracing::info!("Listening on {addr}");
    engine.mark_ready();

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    if let Err(err) = server.await {
        tracing::error!(%err, "server error");
    }

    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);
    tokio::time::sleep(engine.config.shutdown_grace_period).await;

    // the whole teardown shares the shutdown deadline; the final
    // snapshot's retries are bounded by it rather than a fresh budget
    let code = match tokio::time::timeout(engine.config.shutdown_timeout, teardown(&engine, workers))
        .await
    {
        Ok(()) => EXIT_OK,
        Err(_) => {
            tracing::error!("shutdown timed out; forcing exit");
            EXIT_FORCED
        }
    };
    tracing::info!("Goodbye");
    code
}

async fn teardown(engine: &Arc<Engine>, workers: Vec<tokio::task::JoinHandle<()>>) {
    // save-on-shutdown is mandatory when persistence is enabled; if every
    // retry fails the snapshot is abandoned loudly and shutdown continues
    if let Err(err) = engine.save().await {
        tracing::error!(%err, "FINAL SNAPSHOT FAILED; world state was not persisted");
    }

    for session in engine.sessions.iter_sessions() {
        engine.end_session(&session, "server shutting down").await;
    }
    for worker in workers {
        worker.abort();
    }
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "failed to install SIGINT handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => tracing::error!(%err, "failed to install SIGTERM handler"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
