//! Listener/supervisor: accepts connections, spawns handler tasks, reaps
//! completed ones on a fixed cadence, and drives the stats reporter.
//!
//! The accept loop never blocks on handler progress — every accepted socket
//! is immediately handed to its own task. Completed handler tasks are
//! drained from a [`tokio::task::JoinSet`] every 60 seconds; this bounds
//! memory under steady-state churn without requiring the accept loop itself
//! to track individual task handles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinSet;

use crate::blacklist::Blacklist;
use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::handler;
use crate::logging::{AccessLog, ErrorLog};
use crate::registry::Registry;
use crate::stats;

const REAP_INTERVAL: Duration = Duration::from_secs(60);

/// Runs the proxy until `shutdown` is flipped to `true`.
pub async fn run(config: Config, shutdown: Arc<AtomicBool>) -> Result<()> {
    // Always loaded, even under `--no-blacklist`: a missing/unreadable
    // blacklist file is a fatal configuration error regardless of whether
    // the loaded patterns end up consulted. `no_blacklist` only changes
    // whether the handler checks `contains_any` before fragmenting.
    let blacklist = Arc::new(Blacklist::load(&config.blacklist_path).await?);

    let registry = Arc::new(Registry::new());
    let access_log = Arc::new(AccessLog::new(config.log_access.clone()));
    let error_log = Arc::new(ErrorLog::new(config.log_error.clone(), config.verbose));

    let listener = TcpListener::bind(config.bind_addr())
        .await
        .map_err(|e| ProxyError::Config(format!("failed to bind {}: {e}", config.bind_addr())))?;

    log::info!("listening on {}", config.bind_addr());
    if !blacklist.is_empty() {
        log::info!("loaded {} blacklist pattern(s)", blacklist.len());
    }

    let stats_task = tokio::spawn(stats::run(registry.clone(), config.quiet));

    let mut handlers: JoinSet<()> = JoinSet::new();
    let mut reap_interval = tokio::time::interval(REAP_INTERVAL);
    let mut shutdown_poll = tokio::time::interval(Duration::from_millis(200));

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, peer)) => {
                        let registry = registry.clone();
                        let blacklist = blacklist.clone();
                        let access_log = access_log.clone();
                        let error_log = error_log.clone();
                        let no_blacklist = config.no_blacklist;
                        handlers.spawn(async move {
                            handler::handle_connection(socket, peer, registry, blacklist, no_blacklist, access_log, error_log).await;
                        });
                    }
                    Err(e) => {
                        log::error!("accept failed: {e}");
                    }
                }
            }
            _ = reap_interval.tick() => {
                while handlers.try_join_next().is_some() {}
                log::debug!("reaped handler tasks; {} connection(s) still live", registry.live_count().await);
            }
            _ = shutdown_poll.tick() => {
                // Wakes the select loop regularly so a shutdown request
                // observed between accepts doesn't wait for the next
                // connection to arrive.
            }
        }
    }

    log::info!("shutting down, waiting for {} in-flight connection(s)", handlers.len());
    handlers.shutdown().await;
    stats_task.abort();

    Ok(())
}
