use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{config::LogFormat, Result, SimpleJsonError};

const DEFAULT_FILTER: &str = "grafana_simplejson=info,simplejson_sample=info,tower_http=info";

/// Sets up the logging subscriber for the application.
///
/// `RUST_LOG` overrides the default filter.
pub fn init_logger(format: LogFormat) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = match format {
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_level(true)
                    .with_ansi(true)
                    .compact(),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true),
            )
            .try_init(),
    };

    installed.map_err(|e| SimpleJsonError::Internal(format!("Failed to initialize logger: {}", e)))
}
