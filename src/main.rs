use std::sync::Arc;

use grafana_simplejson::{
    api, logging, sample::SampleDataSource, Config, Dispatcher, Result, SimpleJsonError,
};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = logging::init_logger(config.log_format) {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(config).await {
        error!(error = %e, "Server exited with an error");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<()> {
    let dispatcher = Dispatcher::new(Arc::new(SampleDataSource::new()), config.dispatcher);
    let app = api::app(dispatcher, &config);

    let (host, port) = config.bind_addr();
    info!(
        host,
        port,
        mount_path = %config.mount_path,
        parallel_targets = config.dispatcher.parallel_targets,
        "Starting SimpleJson sample datasource"
    );

    let listener = TcpListener::bind((host, port))
        .await
        .map_err(|e| SimpleJsonError::Internal(format!("Failed to bind to address: {}", e)))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| SimpleJsonError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}
