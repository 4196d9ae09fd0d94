//! Periodic maintenance: expiry sweeps, broker health probes and cancel
//! reconciliation
//!
//! One task per kind, so runs of the same kind never overlap; tasks stop
//! on the shared shutdown signal.

use crate::engine::TradingEngine;
use crate::lifecycle::is_market_hours;
use services_common::Clock;
use services_common::constants::scheduler;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Task cadences, seconds
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Expiration sweep interval
    pub expiry_sweep_secs: u64,
    /// Broker health probe interval
    pub health_probe_secs: u64,
    /// Cancel reconciler interval
    pub cancel_reconcile_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            expiry_sweep_secs: scheduler::EXPIRY_SWEEP_SECS,
            health_probe_secs: scheduler::HEALTH_PROBE_SECS,
            cancel_reconcile_secs: scheduler::CANCEL_RECONCILE_SECS,
        }
    }
}

/// Single-owner dispatcher for the engine's periodic work
pub struct EngineScheduler {
    engine: Arc<TradingEngine>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    shutdown: broadcast::Sender<()>,
}

impl EngineScheduler {
    /// Build a scheduler over `engine`
    #[must_use]
    pub fn new(engine: Arc<TradingEngine>, clock: Arc<dyn Clock>, config: SchedulerConfig) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            engine,
            clock,
            config,
            shutdown,
        }
    }

    /// Spawn the three maintenance tasks
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        vec![
            self.spawn_expiry_sweep(),
            self.spawn_health_probe(),
            self.spawn_cancel_reconciler(),
        ]
    }

    /// Stop every task after its current run
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    fn spawn_expiry_sweep(&self) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let clock = Arc::clone(&self.clock);
        let mut shutdown = self.shutdown.subscribe();
        let period = Duration::from_secs(self.config.expiry_sweep_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if !is_market_hours(clock.now()) {
                            debug!("expiry sweep skipped outside market hours");
                            continue;
                        }
                        if let Err(error) = engine.expire_orders().await {
                            warn!(%error, "expiration sweep failed");
                        }
                    }
                    _ = shutdown.recv() => {
                        info!("expiry sweep task stopping");
                        break;
                    }
                }
            }
        })
    }

    fn spawn_health_probe(&self) -> JoinHandle<()> {
        let gateway = self.engine.gateway();
        let mut shutdown = self.shutdown.subscribe();
        let period = Duration::from_secs(self.config.health_probe_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let healthy = gateway.probe_health().await;
                        debug!(healthy, "broker health probe finished");
                    }
                    _ = shutdown.recv() => {
                        info!("health probe task stopping");
                        break;
                    }
                }
            }
        })
    }

    fn spawn_cancel_reconciler(&self) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let mut shutdown = self.shutdown.subscribe();
        let period = Duration::from_secs(self.config.cancel_reconcile_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(error) = engine.reconcile_cancels().await {
                            warn!(%error, "cancel reconciliation failed");
                        }
                    }
                    _ = shutdown.recv() => {
                        info!("cancel reconciler task stopping");
                        break;
                    }
                }
            }
        })
    }
}
