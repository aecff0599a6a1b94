//! Controller library for the VOC predictive monitor
//!
//! This crate provides the core functionality for:
//! - Telemetry ingestion and lag-feature windowing
//! - Local ONNX inference with hot-swappable model artifacts
//! - Rolling-RMSE drift detection
//! - Closed-loop retraining orchestration
//! - Durable operational-state snapshots
//! - Health checks and observability

pub mod controller;
pub mod drift;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod persistence;
pub mod predictor;
pub mod retrain;
pub mod window;

pub use controller::{Controller, ControllerConfig, ControllerStatus};
pub use error::MonitorError;
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{MonitorMetrics, StructuredLogger};
