//! JIT access API composition root.

#![forbid(unsafe_code)]

mod api_config;
mod api_router;
mod chat;
mod dto;
mod error;
mod handlers;
mod middleware;
mod state;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use jit_application::{NoopReconcileTrigger, ReconcileTrigger};
use jit_core::AppError;
use jit_infrastructure::AccessStack;
use jit_infrastructure::config::{WorkerMode, std_duration};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    let config = api_config::load_config()?;
    api_config::init_tracing(&config.log);

    let stack = AccessStack::build(&config).await?;
    let shutdown = CancellationToken::new();
    let mut background = JoinSet::new();

    let trigger: Arc<dyn ReconcileTrigger> = match config.worker.mode {
        WorkerMode::Embedded => {
            let holder_id = format!("jit-api-{}", uuid::Uuid::new_v4());
            let controller = stack.controller(holder_id);
            let trigger: Arc<dyn ReconcileTrigger> = Arc::new(controller.trigger());

            let sweeper = stack.sweeper(trigger.clone());
            let sweep_interval = std_duration(config.worker.sweep_interval);
            let call_timeout = std_duration(config.worker.external_call_timeout);
            let controller_shutdown = shutdown.clone();
            background.spawn(async move { controller.run(controller_shutdown).await });
            let sweeper_shutdown = shutdown.clone();
            background.spawn(async move {
                sweeper
                    .run(sweep_interval, call_timeout, sweeper_shutdown)
                    .await
            });
            info!("reconcile controller and sweeper embedded");
            trigger
        }
        WorkerMode::Dedicated => Arc::new(NoopReconcileTrigger),
    };

    let signing_secret = config.slack.signing_secret.clone().unwrap_or_default();
    let app_state = AppState::build(&stack, trigger, signing_secret.as_str())?;
    let app = api_router::build_router(app_state, std_duration(config.server.write_timeout));

    let address = api_config::socket_address(&config.server)?;
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Fatal(format!("failed to bind {address}: {error}")))?;

    info!(%address, mode = ?config.worker.mode, "jit-api listening");
    let server_shutdown = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            server_shutdown.cancel();
        })
        .await;

    shutdown.cancel();
    while let Some(joined) = background.join_next().await {
        if let Err(error) = joined {
            warn!(error = %error, "background task ended abnormally");
        }
    }

    served.map_err(|error| AppError::Internal(format!("server error: {error}")))?;
    info!("jit-api stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(error = %error, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                warn!(error = %error, "failed to listen for SIGTERM");
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
    info!("shutdown requested");
}
