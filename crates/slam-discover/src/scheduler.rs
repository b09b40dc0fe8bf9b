//! Background pass scheduling.
//!
//! Runs the liveness loop and the port loop on their own tokio tasks, each
//! ticking at its configured interval. A semaphore limits how many passes
//! run at once; a cancellation token stops both loops.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::DiscoverConfig;
use crate::network::NetworkSource;
use crate::reconcile::Reconciler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    Liveness,
    Ports,
}

/// Owns the periodic background passes.
pub struct PassScheduler {
    config: DiscoverConfig,
    engine: Arc<Reconciler>,
    network: Arc<dyn NetworkSource>,
    concurrency: Arc<Semaphore>,
}

impl PassScheduler {
    pub fn new(
        config: DiscoverConfig,
        engine: Arc<Reconciler>,
        network: Arc<dyn NetworkSource>,
    ) -> Self {
        let concurrency = Arc::new(Semaphore::new(config.max_concurrent_passes.max(1)));
        Self {
            config,
            engine,
            network,
            concurrency,
        }
    }

    /// Run the enabled loops until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut loops = Vec::new();
        if self.config.liveness_enabled() {
            loops.push((PassKind::Liveness, self.config.liveness_interval()));
        } else {
            tracing::info!("Liveness loop disabled");
        }
        if self.config.port_scan {
            loops.push((PassKind::Ports, self.config.port_interval()));
        } else {
            tracing::info!("Port loop disabled");
        }

        let mut handles = Vec::new();
        for (kind, period) in loops {
            let engine = self.engine.clone();
            let network = self.network.clone();
            let semaphore = self.concurrency.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                run_pass_loop(kind, period, engine, network, semaphore, cancel).await;
            }));
        }

        tracing::info!(loop_count = handles.len(), "Scheduler started");

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Pass loop panicked");
            }
        }
        tracing::info!("Scheduler stopped");
    }
}

async fn run_pass_loop(
    kind: PassKind,
    period: Duration,
    engine: Arc<Reconciler>,
    network: Arc<dyn NetworkSource>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
) {
    // The first pass runs one period after start, not at start.
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(ctx) = network.current().await else {
            tracing::info!(?kind, "Not connected to an identifiable network, skipping pass");
            continue;
        };

        let permit = tokio::select! {
            _ = cancel.cancelled() => break,
            permit = semaphore.clone().acquire_owned() => permit,
        };
        let Ok(_permit) = permit else {
            tracing::error!(?kind, "Pass semaphore closed");
            break;
        };

        tracing::info!(?kind, network = %ctx.identity, "Scheduled pass triggered");
        let pass = async {
            match kind {
                PassKind::Liveness => engine.liveness_pass(&ctx, None).await,
                PassKind::Ports => engine.port_pass(&ctx, None).await,
            }
        };
        let outcome = tokio::select! {
            _ = cancel.cancelled() => break,
            outcome = pass => outcome,
        };
        if let Err(e) = outcome {
            tracing::error!(?kind, network = %ctx.identity, error = %e, "Scheduled pass failed");
        }
    }
    tracing::info!(?kind, "Pass loop stopped");
}
