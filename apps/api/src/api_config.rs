use std::collections::HashMap;
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use jit_core::AppError;
use jit_infrastructure::JitConfig;
use jit_infrastructure::config::{
    ConfigTarget, LogConfig, LogFormat, ServerConfig, resolve_config_path,
};
use tracing_subscriber::EnvFilter;

/// Loads `--config`/`JIT_CONFIG`, applies `JIT_*` overrides and validates for the API.
pub fn load_config() -> Result<JitConfig, AppError> {
    let args = env::args().skip(1).collect::<Vec<_>>();
    let vars = env::vars().collect::<HashMap<_, _>>();
    let path = resolve_config_path(&args, &vars);

    let config = JitConfig::load(path.as_deref(), vars)?;
    config.validate(ConfigTarget::Api)?;
    Ok(config)
}

pub fn socket_address(server: &ServerConfig) -> Result<SocketAddr, AppError> {
    let host = IpAddr::from_str(&server.host).map_err(|error| {
        AppError::Fatal(format!("invalid server.host '{}': {error}", server.host))
    })?;
    Ok(SocketAddr::from((host, server.port)))
}

pub fn init_tracing(log: &LogConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log.level.as_str()));

    match log.format {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_address_rejects_hostnames() {
        let server = ServerConfig {
            host: "127.0.0.1".to_owned(),
            port: 9090,
            ..ServerConfig::default()
        };
        assert_eq!(
            socket_address(&server).ok(),
            Some(SocketAddr::from(([127, 0, 0, 1], 9090)))
        );

        let named = ServerConfig {
            host: "localhost".to_owned(),
            ..server
        };
        assert!(matches!(socket_address(&named), Err(AppError::Fatal(_))));
    }
}
