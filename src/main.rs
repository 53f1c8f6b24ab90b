use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;

use nodpi_proxy::config::Config;
use nodpi_proxy::logging;
use nodpi_proxy::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    logging::init_diagnostic_logger(config.verbose);

    eprintln!("nodpi-proxy starting on {}", config.bind_addr());
    if config.no_blacklist {
        eprintln!("blacklist disabled: every CONNECT payload will be fragmented");
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_handle = shutdown.clone();
    ctrlc::set_handler(move || {
        log::info!("received interrupt, shutting down");
        shutdown_handle.store(true, Ordering::Relaxed);
    })
    .context("failed to install signal handler")?;

    server::run(config, shutdown).await.context("proxy server exited with an error")?;

    eprintln!("nodpi-proxy stopped");
    Ok(())
}
