// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Pitch Guard Service
//!
//! HTTP gate in front of the abuse-prevention engine. The content
//! platform calls a check endpoint before each pitch creation, edit or
//! vote and proceeds only on `200`.
//!
//! ## Configuration
//!
//! Bootstrap settings come from environment variables:
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8080)
//! - `SETTINGS_FILE`: JSON file of `antispam.*` policy keys (default: built-in defaults)
//! - `STORE_TIMEOUT_MS`: Bound on each ledger call (default: 250)
//! - `REQUEST_TIMEOUT_MS`: Bound on each request (default: 2000)
//! - `RECORDER_CAPACITY`: Background write queue size (default: 1024)
//! - `RECORDER_ENQUEUE_WAIT_MS`: How long a full queue may block (default: 25)
//! - `CONFIG_REFRESH_SECS`: Policy settings refresh interval (default: 60)
//! - `SWEEP_INTERVAL_SECS`: Penalty sweep / retention interval (default: 300)
//! - `TRUSTED_PROXIES`: Comma-separated proxy addresses whose forwarding headers are honoured (default: none)

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pitch_guard::{
    clock::SystemClock,
    config::Config,
    evaluator::{Ledgers, PolicyEvaluator},
    handlers::{router, AppState},
    maintenance::spawn_maintenance,
    metrics::Metrics,
    recorder::Recorder,
    settings::{self, ConfigSource, JsonFileSource, StaticSource},
    store::MemoryStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Config::from_env();
    info!(
        bind_addr = %config.bind_addr,
        settings_file = ?config.settings_file,
        store_timeout_ms = config.engine.store_timeout_ms,
        recorder_capacity = config.recorder.capacity,
        "Starting pitch guard"
    );

    let source: Arc<dyn ConfigSource> = match &config.settings_file {
        Some(path) => Arc::new(JsonFileSource::new(path)),
        None => Arc::new(StaticSource::new()),
    };
    let live = settings::bootstrap(source).await;

    let metrics = Arc::new(Metrics::new()?);
    let ledgers = Ledgers::in_memory(MemoryStore::new());
    let clock = Arc::new(SystemClock);

    let evaluator = PolicyEvaluator::new(ledgers.clone(), live.clone(), metrics.clone())
        .with_clock(clock.clone())
        .with_store_timeout(config.engine.store_timeout());

    let (recorder, _worker) = Recorder::spawn(
        ledgers.clone(),
        metrics.clone(),
        config.recorder.capacity,
        config.recorder.enqueue_wait(),
        config.engine.store_timeout(),
    );

    let _maintenance = spawn_maintenance(
        ledgers,
        live,
        clock,
        config.maintenance.sweep_interval(),
        config.maintenance.config_refresh(),
    );

    let state = Arc::new(AppState {
        evaluator,
        recorder: recorder.clone(),
        metrics,
        config: config.clone(),
    });
    let app = router(state);

    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown requested");
    })
    .await?;

    recorder.flush().await;
    info!("Pending writes flushed");

    Ok(())
}
