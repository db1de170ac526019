use std::process;
use std::sync::Arc;

use passivo::config::{ConfigError, ServerConfig};
use passivo::service::ArchiveService;
use passivo::{PASSIVO_VERSION, logging, transport};

fn usage() {
    eprintln!("Usage: passivo-server [--host <addr>] [--port <port>] [--data-dir <dir>]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --host <addr>              Bind address [default: 0.0.0.0]");
    eprintln!("  --port <port>              Listen port [default: 5000]");
    eprintln!("  --data-dir <dir>           Directory for the slot ledger and records [default: in memory]");
    eprintln!("  --deployment <label>       Label reported by /health-check");
    eprintln!("  --await-explicit-shutdown  Ignore SIGTERM; stop on SIGINT or POST /shutdown");
    eprintln!();
    eprintln!("Environment: PASSIVO_HOST, PASSIVO_PORT, PASSIVO_DATA_DIR, PASSIVO_DEPLOYMENT,");
    eprintln!("             PASSIVO_AWAIT_EXPLICIT_SHUTDOWN, PASSIVO_LOG, RUST_LOG, LOG_FORMAT");
}

fn load_config() -> Result<ServerConfig, ConfigError> {
    let args: Vec<String> = std::env::args().collect();
    ServerConfig::from_env()?.with_args(&args)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match load_config() {
        Ok(config) => config,
        Err(ConfigError::Help) => {
            usage();
            process::exit(0);
        }
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!();
            usage();
            process::exit(2);
        }
    };

    logging::init_tracing();
    tracing::info!(
        version = PASSIVO_VERSION,
        data_dir = ?config.data_dir,
        "Starting passivo"
    );

    let service = Arc::new(ArchiveService::from_config(&config)?);
    transport::serve(config, service).await
}
