//! Trading service entry point
//!
//! Wires the lifecycle engine against the broker registry, the paper
//! connectors and either the PostgreSQL or the in-memory order store, then
//! runs the maintenance scheduler until ctrl-c.

use broker_connector::{
    AlwaysLinkedAuth, BrokerGateway, BrokerRegistry, GatewayConfig, PaperBroker,
};
use execution_router::{RouterConfig, SmartOrderRouter};
use oms::persistence::PgOrderRepository;
use oms::scheduler::{EngineScheduler, SchedulerConfig};
use oms::{EngineConfig, InMemoryOrderRepository, OpenRiskGate, OrderRepository, TradingEngine};
use services_common::{Clock, LabelSchema, MetricsRegistry, SystemClock};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SERVICE_NAME: &str = "oms";

// BSD-style exit codes
const EX_CONFIG: i32 = 64;
const EX_UNAVAILABLE: i32 = 69;
const EX_SOFTWARE: i32 = 70;

/// Paper connector acknowledgment latency
const PAPER_LATENCY_MS: u64 = 10;

#[derive(Debug)]
enum StartupError {
    Config(String),
    External(String),
    Internal(String),
}

impl StartupError {
    const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => EX_CONFIG,
            Self::External(_) => EX_UNAVAILABLE,
            Self::Internal(_) => EX_SOFTWARE,
        }
    }
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(detail) => write!(f, "configuration error: {detail}"),
            Self::External(detail) => write!(f, "external service unavailable: {detail}"),
            Self::Internal(detail) => write!(f, "internal error: {detail}"),
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    info!("starting trading service v{}", env!("CARGO_PKG_VERSION"));

    if let Err(startup_error) = run().await {
        error!(%startup_error, "service failed");
        std::process::exit(startup_error.exit_code());
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{SERVICE_NAME}=info,broker_connector=info,execution_router=info").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, StartupError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| StartupError::Config(format!("invalid value '{raw}' for {key}"))),
        Err(_) => Ok(default),
    }
}

struct ServiceConfig {
    engine: EngineConfig,
    router: RouterConfig,
    gateway: GatewayConfig,
    scheduler: SchedulerConfig,
}

fn load_config() -> Result<ServiceConfig, StartupError> {
    let mut engine = EngineConfig::default();
    engine.max_notional_ticks = env_parse("MAX_NOTIONAL_INR", 10_000_000i64)?
        .checked_mul(services_common::constants::fixed_point::SCALE_4)
        .ok_or_else(|| StartupError::Config("MAX_NOTIONAL_INR too large".to_string()))?;
    engine.sla.place_ms = env_parse("SLA_PLACE_MS", engine.sla.place_ms)?;
    engine.sla.modify_ms = env_parse("SLA_MODIFY_MS", engine.sla.modify_ms)?;
    engine.sla.cancel_ms = env_parse("SLA_CANCEL_MS", engine.sla.cancel_ms)?;
    engine.cancel_reconcile_age_secs =
        env_parse("CANCEL_RECONCILE_AGE_SECS", engine.cancel_reconcile_age_secs)?;

    let mut router = RouterConfig::default();
    router.primary_broker = env_string("PRIMARY_BROKER", &router.primary_broker);
    router.fallback_broker = env_string("FALLBACK_BROKER", &router.fallback_broker);
    router.large_order_units = env_parse("LARGE_ORDER_THRESHOLD", router.large_order_units)?;
    router.max_single_order_units =
        env_parse("MAX_SINGLE_ORDER_QUANTITY", router.max_single_order_units)?;

    let mut gateway = GatewayConfig::default();
    gateway.submit_timeout_ms = env_parse("BROKER_SUBMIT_TIMEOUT_MS", gateway.submit_timeout_ms)?;
    gateway.cancel_timeout_ms = env_parse("BROKER_CANCEL_TIMEOUT_MS", gateway.cancel_timeout_ms)?;
    gateway.breaker.failure_threshold =
        env_parse("CIRCUIT_FAILURE_THRESHOLD", gateway.breaker.failure_threshold)?;
    gateway.breaker.open_duration_ms =
        env_parse("CIRCUIT_OPEN_DURATION_MS", gateway.breaker.open_duration_ms)?;

    let mut scheduler = SchedulerConfig::default();
    scheduler.expiry_sweep_secs = env_parse("EXPIRY_SWEEP_SECS", scheduler.expiry_sweep_secs)?;
    scheduler.health_probe_secs = env_parse("HEALTH_PROBE_SECS", scheduler.health_probe_secs)?;
    scheduler.cancel_reconcile_secs =
        env_parse("CANCEL_RECONCILE_SECS", scheduler.cancel_reconcile_secs)?;

    Ok(ServiceConfig {
        engine,
        router,
        gateway,
        scheduler,
    })
}

async fn run() -> Result<(), StartupError> {
    let config = load_config()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let registry = Arc::new(BrokerRegistry::indian_default(Arc::clone(&clock)));
    let gateway = Arc::new(BrokerGateway::new(
        Arc::clone(&registry),
        config.gateway,
        Arc::clone(&clock),
    ));
    for broker in registry.brokers() {
        gateway.attach(Arc::new(PaperBroker::new(
            &broker,
            Duration::from_millis(PAPER_LATENCY_MS),
        )));
    }

    let metrics = Arc::new(MetricsRegistry::new(LabelSchema::trading_default(
        registry.brokers(),
    )));
    let router = Arc::new(SmartOrderRouter::new(
        config.router,
        Arc::clone(&registry),
        Arc::clone(&gateway),
        Arc::new(AlwaysLinkedAuth),
        Arc::clone(&metrics),
    ));

    let repository: Arc<dyn OrderRepository> = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            info!("using PostgreSQL order store");
            Arc::new(
                PgOrderRepository::connect(&url)
                    .await
                    .map_err(|e| StartupError::External(e.to_string()))?,
            )
        }
        Err(_) => {
            info!("DATABASE_URL not set, using in-memory order store");
            Arc::new(InMemoryOrderRepository::new())
        }
    };

    let engine = Arc::new(TradingEngine::new(
        config.engine,
        repository,
        Arc::new(OpenRiskGate),
        router,
        Arc::clone(&gateway),
        registry,
        metrics,
        Arc::clone(&clock),
    ));
    engine
        .recover()
        .await
        .map_err(|e| StartupError::Internal(e.to_string()))?;

    let scheduler = EngineScheduler::new(Arc::clone(&engine), clock, config.scheduler);
    let tasks = scheduler.start();
    info!("trading service ready");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| StartupError::Internal(e.to_string()))?;
    info!("shutdown signal received");

    scheduler.shutdown();
    for task in tasks {
        let _ = task.await;
    }
    info!("trading service stopped");
    Ok(())
}
