//! Streaming interface for interactive passes.
//!
//! A pass started through [`scan_stream`] yields one record per processed
//! device as it happens, then always a total and a done marker. Nothing
//! runs until the stream is first polled.

use std::sync::Arc;

use futures::stream::{self, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use slam_core::ScanEvent;

use crate::network::NetworkSource;
use crate::reconcile::Reconciler;

/// Which pass an interactive scan runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ScanMode {
    /// Liveness sweep with discovery and offline tracking.
    Discover,
    /// Port sweep of every device on file.
    Ports,
}

pub fn scan_stream(
    engine: Arc<Reconciler>,
    network: Arc<dyn NetworkSource>,
    mode: ScanMode,
) -> impl Stream<Item = ScanEvent> + Send + 'static {
    stream::once(async move {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            let total = match network.current().await {
                Some(ctx) => {
                    let outcome = match mode {
                        ScanMode::Discover => engine.liveness_pass(&ctx, Some(&tx)).await,
                        ScanMode::Ports => engine.port_pass(&ctx, Some(&tx)).await,
                    };
                    match outcome {
                        Ok(summary) => summary.reported,
                        Err(e) => {
                            // Setup failures happen before any record is produced.
                            tracing::error!(network = %ctx.identity, ?mode, error = %e, "Interactive pass failed");
                            0
                        }
                    }
                }
                None => {
                    tracing::info!(?mode, "No network identity, nothing to scan");
                    0
                }
            };
            let _ = tx.send(ScanEvent::total(total)).await;
            let _ = tx.send(ScanEvent::done()).await;
        });
        ReceiverStream::new(rx)
    })
    .flatten()
}
