//! The TCP accept loop: bootstraps the store, binds the listener, and
//! spawns one task per accepted connection.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::Config;
use crate::metrics::MetricsSink;
use crate::session;
use crate::store::QueueStore;

/// Runs the broker until `SIGINT`. Returns the metrics collected over the
/// process lifetime so the caller can dump them to stdout on shutdown.
pub async fn run(config: Config) -> anyhow::Result<Arc<MetricsSink>> {
    let metrics = Arc::new(MetricsSink::new());

    info!(dir = %config.working_dir.display(), "recovering queues from working directory");
    let store = Arc::new(QueueStore::load(&config.working_dir).await?);

    let listener = TcpListener::bind(config.bind_addr()).await?;
    info!(addr = %config.bind_addr(), "listening");

    // Tracks in-flight session tasks so shutdown can wait for them to drain
    // without forcing cancellation: sessions run to completion or until
    // their sockets close.
    let (done_tx, mut done_rx) = mpsc::channel::<()>(1);

    loop {
        tokio::select! {
            biased;

            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested, no longer accepting new connections");
                break;
            }

            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, peer)) => {
                        info!(%peer, "accepted connection");
                        let store = store.clone();
                        let metrics = metrics.clone();
                        let done_tx = done_tx.clone();
                        tokio::spawn(async move {
                            session::run_session(socket, store, metrics).await;
                            drop(done_tx);
                        });
                    }
                    Err(error) => {
                        warn!(%error, "accept error");
                    }
                }
            }
        }
    }

    drop(done_tx);
    // All sender clones are held by in-flight session tasks; once every one
    // of them finishes and drops its clone, the channel closes and `recv`
    // returns `None`.
    while done_rx.recv().await.is_some() {}

    Ok(metrics)
}
