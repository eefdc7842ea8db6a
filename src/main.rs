//! newsroom-pulse binary entrypoint.
//! Loads config, starts the channel scheduler and serves the HTTP surface.

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use newsroom_pulse::{api, config::PulseConfig, metrics::Metrics, PulseRuntime};

const ENV_BIND: &str = "PULSE_BIND";
const DEFAULT_BIND: &str = "127.0.0.1:8080";

/// Compact logs by default; `PULSE_LOG_JSON=1` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("scheduler=info,alert=info,channel=info,content=info,config=info,warn")
    });

    let json = std::env::var("PULSE_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler failed");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = PulseConfig::load_or_default();
    let metrics = match Metrics::init() {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!(error = ?e, "metrics disabled");
            None
        }
    };

    let runtime = PulseRuntime::new(config);
    let handle = runtime.start();

    let mut app = api::create_router(runtime.app_state(handle.ledger()));
    if let Some(m) = &metrics {
        app = app.merge(m.router());
    }

    let addr = std::env::var(ENV_BIND).unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, channels = ?runtime.config.channels, "newsroom-pulse listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    handle.stop().await;
    Ok(())
}
