use std::{env, str::FromStr};

use crate::{dispatcher::DispatcherConfig, Result, SimpleJsonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = SimpleJsonError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(SimpleJsonError::Config(format!(
                "LOG_FORMAT must be 'compact' or 'json', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Path the protocol endpoints are served under, e.g. `/` or `/grafana`.
    pub mount_path: String,
    pub log_format: LogFormat,
    pub enable_cors: bool,
    pub dispatcher: DispatcherConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            mount_path: "/".to_string(),
            log_format: LogFormat::Compact,
            enable_cors: true,
            dispatcher: DispatcherConfig::default(),
        }
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SimpleJsonError::Config(format!(
            "{} must be a boolean, got '{}'",
            name, value
        ))),
    }
}

fn normalize_mount_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source; `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(host) = lookup("HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("PORT") {
            config.port = port.parse().map_err(|e| {
                SimpleJsonError::Config(format!(
                    "PORT must be a port number, got '{}': {}",
                    port, e
                ))
            })?;
        }
        if let Some(path) = lookup("MOUNT_PATH") {
            config.mount_path = normalize_mount_path(&path);
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            config.log_format = format.parse()?;
        }
        if let Some(cors) = lookup("ENABLE_CORS") {
            config.enable_cors = parse_bool("ENABLE_CORS", &cors)?;
        }
        if let Some(parallel) = lookup("PARALLEL_TARGETS") {
            config.dispatcher.parallel_targets = parse_bool("PARALLEL_TARGETS", &parallel)?;
        }

        Ok(config)
    }

    /// Host and port for the listener. The host may be a name such as `localhost`;
    /// it is resolved when the socket is bound.
    pub fn bind_addr(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }
}
