//! minik8s Node Agent
//!
//! Applies pod lifecycle events to the local container runtime.
//!
//! ## Architecture
//!
//! - **Event Source**: Newline-delimited JSON `PodEvent`s on stdin, standing in
//!   for the control-plane watch stream
//! - **Reconciler**: Turns events into pod worker manager calls
//! - **Pod Worker Manager**: One serialized worker per pod
//! - **Runtime**: Abstracts container operations (mock for now)

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use minik8s_node_agent::config::Config;
use minik8s_node_agent::reconciler::{PodEvent, Reconciler};
use minik8s_node_agent::runtime::MockRuntime;
use minik8s_node_agent::worker::PodWorkerManager;

/// Events buffered between stdin and the reconciler.
const EVENT_BUFFER: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first so it can pick the default log level
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(
        node_name = %config.node_name,
        queue_capacity = config.worker.queue_capacity,
        max_attempts = config.reconciler.max_attempts,
        "Starting minik8s node agent"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Create the runtime (mock for now)
    let runtime = Arc::new(MockRuntime::new().with_delay(config.mock_runtime_delay));

    let manager = Arc::new(PodWorkerManager::new(runtime, config.worker.clone()));

    let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
    let reader_handle = tokio::spawn(read_events(BufReader::new(tokio::io::stdin()), event_tx));

    let reconciler = Reconciler::new(Arc::clone(&manager), config.reconciler.clone());
    let reconciler_handle =
        tokio::spawn(async move { reconciler.run(event_rx, shutdown_rx).await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            let _ = shutdown_tx.send(true);
        }
        result = reader_handle => {
            match result {
                Ok(Ok(())) => info!("Event source finished"),
                Ok(Err(e)) => error!(error = %e, "Event source error"),
                Err(e) => error!(error = %e, "Event source task panicked"),
            }
        }
    }

    match reconciler_handle.await {
        Ok(stats) => info!(applied = stats.applied, dropped = stats.dropped, "Reconciler exited"),
        Err(e) => warn!(error = %e, "Reconciler task failed"),
    }

    // Let every worker finish what it already accepted
    manager.shutdown().await;

    info!("Node agent shutdown complete");
    Ok(())
}

/// Forward newline-delimited JSON pod events until EOF.
async fn read_events<R>(reader: R, events: mpsc::Sender<PodEvent>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<PodEvent>(line) {
            Ok(event) => {
                if events.send(event).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!(error = %e, "Ignoring malformed pod event"),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_events_skips_malformed_lines() {
        let input = b"{\"type\":\"containers_gone\",\"pod_uid\":\"p1\"}\n\nnot json\n";
        let (tx, mut rx) = mpsc::channel(4);

        read_events(&input[..], tx).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.pod_uid().as_str(), "p1");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_read_events_reports_read_error() {
        let input: &[u8] = b"\xff\xfe\n";
        let (tx, _rx) = mpsc::channel(4);

        let result = read_events(input, tx).await;
        assert!(result.is_err());
    }
}
