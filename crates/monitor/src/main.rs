//! VOC monitor - edge-deployed predictive monitoring agent
//!
//! Subscribes to the sensor telemetry subject, predicts each reading from
//! its own lag history using the newest trained artifact, watches rolling
//! accuracy for concept drift, and retrains out-of-band when it degrades.

use anyhow::{Context, Result};
use futures::StreamExt;
use monitor_lib::{
    controller::Controller,
    health::{components, HealthRegistry},
    observability::{MonitorMetrics, StructuredLogger},
    persistence::StatePersistence,
    predictor::{ModelHandle, ModelStore},
    retrain::RetrainOrchestrator,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const MONITOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// First retry delay for startup model loading; doubles up to the cap.
const LOAD_RETRY_INITIAL: Duration = Duration::from_secs(1);
const LOAD_RETRY_MAX: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting voc-monitor");

    let config = config::MonitorConfig::load()?;
    info!(device_name = %config.device_name, subject = %config.subject, "Monitor configured");

    let metrics = MonitorMetrics::new();
    let logger = StructuredLogger::new(&config.device_name);

    // The service must not begin consuming telemetry without a model;
    // retry with capped backoff until an artifact loads.
    let model = load_model_with_backoff(&config).await;
    metrics.set_model_version(&model.version());
    logger.log_startup(MONITOR_VERSION, &model.version());

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register(components::INGESTOR).await;
    health_registry.register(components::PREDICTOR).await;
    health_registry.register(components::RETRAINER).await;
    health_registry.register(components::PERSISTENCE).await;

    let controller = Arc::new(Controller::new(
        config.controller_config(),
        Arc::clone(&model) as Arc<dyn ModelStore>,
        RetrainOrchestrator::new(config.retrain_config()),
        StatePersistence::new(&config.state_path),
        metrics.clone(),
        logger.clone(),
    ));

    // Start health and metrics server
    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        Arc::clone(&controller),
    ));
    tokio::spawn(api::serve(config.api_port, app_state));

    // Subscribe to the telemetry subject
    let client = async_nats::connect(config.nats_url.as_str())
        .await
        .with_context(|| format!("Failed to connect to NATS at {}", config.nats_url))?;
    let mut subscription = client
        .subscribe(config.subject.clone())
        .await
        .with_context(|| format!("Failed to subscribe to {}", config.subject))?;

    health_registry.set_ready(true).await;
    info!(subject = %config.subject, "Consuming telemetry");

    loop {
        tokio::select! {
            maybe_message = subscription.next() => {
                match maybe_message {
                    Some(message) => controller.on_message(&message.payload),
                    None => {
                        warn!("Telemetry subscription closed");
                        health_registry
                            .set_unhealthy(components::INGESTOR, "subscription closed")
                            .await;
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                logger.log_shutdown("SIGINT received");
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}

async fn load_model_with_backoff(config: &config::MonitorConfig) -> Arc<ModelHandle> {
    let mut delay = LOAD_RETRY_INITIAL;
    loop {
        match ModelHandle::load_latest(&config.model_dir, &config.model_name, config.n_lags) {
            Ok(handle) => return Arc::new(handle),
            Err(e) => {
                warn!(
                    error = %e,
                    retry_in_secs = delay.as_secs(),
                    "No usable model artifact yet; run the trainer first"
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(LOAD_RETRY_MAX);
            }
        }
    }
}
