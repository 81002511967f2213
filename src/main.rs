mod api;
mod broker;
mod bus;
mod command;
mod config;
mod context;
mod decoder;
mod error;
mod model;
mod normalizer;
mod persistence;
mod pipeline;
mod shadow;
mod warmup;
mod watchdog;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::api::domain::AppState;
use crate::config::Config;
use crate::context::domain::AppContext;
use crate::watchdog::domain::WatchdogConfig;

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    config::init_tracing(&config);

    info!(environment = %config.environment, "starting racksense-middleware");

    let ctx = AppContext::new(config).await;

    // Leaves-first construction (§2, reverse order at shutdown): shadow
    // and bus already exist via AppContext; start the outbound command
    // path before anything that might request a command.
    let outbound_tx = broker::logic::start_broker(ctx.bus.clone(), ctx.config.broker.clone());
    command::logic::start_command_builder(ctx.bus.clone(), outbound_tx);

    pipeline::logic::start_pipeline(ctx.bus.clone(), ctx.shadow.clone(), (*ctx.config).clone());

    watchdog::logic::start_watchdog(
        ctx.shadow.clone(),
        ctx.bus.clone(),
        WatchdogConfig {
            check_interval: ctx.config.normalizer.check_interval,
            heartbeat_timeout: ctx.config.normalizer.heartbeat_timeout,
            emit_status_change_event: false,
        },
    );

    if let Some(repo) = ctx.repository.clone() {
        persistence::logic::start_persistence(ctx.bus.clone(), repo, (*ctx.config).clone());
    }

    let state = AppState {
        shadow: ctx.shadow.clone(),
        bus: ctx.bus.clone(),
        config: (*ctx.config).clone(),
        started_at: Instant::now(),
        db_healthy: Arc::new(AtomicBool::new(ctx.repository.is_some())),
        broker_healthy: Arc::new(AtomicBool::new(true)),
        repository: ctx.repository.clone(),
    };

    let app = api::logic::router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], ctx.config.api_server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind API server port");

    info!(%addr, "API server and push stream listening");

    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!(error = %e, "API server exited with error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }
}
