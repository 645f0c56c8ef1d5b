use std::env;

use abi::Config;
use anyhow::Result;
use parking_service::{init_logger, ParkingService};
use tokio::net::TcpListener;
use tracing::{info, warn};

const DEFAULT_CONFIG: &str = "fixtures/config.yml";

#[tokio::main]
async fn main() -> Result<()> {
    let filename = env::args()
        .nth(1)
        .or_else(|| env::var("PARKING_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config = Config::load(&filename)?;
    let _guard = init_logger(&config.log)?;

    let service = ParkingService::from_config(&config).await?;

    let addr = config.server.listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, config = %filename, "parking service listening");

    axum::serve(listener, service.router())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("parking service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
