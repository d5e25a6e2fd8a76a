//! JIT access reconcile worker runtime.

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use jit_application::ReconcileTrigger;
use jit_core::AppError;
use jit_infrastructure::config::{ConfigTarget, LogFormat, resolve_config_path, std_duration};
use jit_infrastructure::{AccessStack, JitConfig};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    let config = load_config()?;
    init_tracing(&config);

    let stack = AccessStack::build(&config).await?;
    let worker_id = env::var("JIT_WORKER_ID")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| format!("jit-worker-{}", uuid::Uuid::new_v4()));

    let controller = stack.controller(worker_id.as_str());
    let trigger: Arc<dyn ReconcileTrigger> = Arc::new(controller.trigger());
    let sweeper = stack.sweeper(trigger);
    let shutdown = CancellationToken::new();

    info!(
        worker_id = %worker_id,
        concurrency = config.worker.concurrency,
        resync_interval_secs = config.worker.resync_interval.as_seconds(),
        sweep_interval_secs = config.worker.sweep_interval.as_seconds(),
        leases = stack.leases.is_some(),
        "jit-worker started"
    );

    let sweep_interval = std_duration(config.worker.sweep_interval);
    let call_timeout = std_duration(config.worker.external_call_timeout);
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(error = %error, "failed to listen for ctrl-c");
            return;
        }
        info!("shutdown requested");
        signal_shutdown.cancel();
    });

    tokio::join!(
        controller.run(shutdown.clone()),
        sweeper.run(sweep_interval, call_timeout, shutdown.clone()),
    );

    info!(worker_id = %worker_id, "jit-worker stopped");
    Ok(())
}

fn load_config() -> Result<JitConfig, AppError> {
    let args = env::args().skip(1).collect::<Vec<_>>();
    let vars = env::vars().collect::<HashMap<_, _>>();
    let path = resolve_config_path(&args, &vars);

    let config = JitConfig::load(path.as_deref(), vars)?;
    config.validate(ConfigTarget::Worker)?;
    Ok(config)
}

fn init_tracing(config: &JitConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log.level.as_str()));

    match config.log.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .init(),
    }
}
