//! Error kinds for the monitor controller
//!
//! Every kind below is absorbed at the ingestion boundary; none escapes
//! `Controller::on_message` as an unhandled failure.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// Inbound payload could not be parsed into a `Reading`.
    #[error("malformed telemetry payload: {reason}")]
    Parse { reason: String },

    /// The model rejected the feature vector.
    #[error("inference rejected feature vector: {reason}")]
    Inference { reason: String },

    /// No usable model artifact could be loaded from the artifact store.
    #[error("failed to load model from {dir}: {reason}")]
    ModelLoad { dir: PathBuf, reason: String },

    /// The external training job failed to launch, exited nonzero, or
    /// exceeded its deadline.
    #[error("retraining job failed: {reason}")]
    RetrainJob { reason: String },

    /// Operational state snapshot could not be written or read.
    #[error("state persistence failed: {reason}")]
    Persistence { reason: String },
}

impl MonitorError {
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }

    pub fn inference(reason: impl Into<String>) -> Self {
        Self::Inference {
            reason: reason.into(),
        }
    }

    pub fn model_load(dir: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ModelLoad {
            dir: dir.into(),
            reason: reason.into(),
        }
    }

    pub fn retrain_job(reason: impl Into<String>) -> Self {
        Self::RetrainJob {
            reason: reason.into(),
        }
    }

    pub fn persistence(reason: impl Into<String>) -> Self {
        Self::Persistence {
            reason: reason.into(),
        }
    }
}
