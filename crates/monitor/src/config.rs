//! Monitor configuration

use anyhow::{bail, Result};
use monitor_lib::controller::ControllerConfig;
use monitor_lib::retrain::RetrainConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Monitor configuration, loaded from the environment with prefix `MONITOR`.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Device name for structured log events
    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// API server port for health/metrics/status
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// NATS server URL
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// Telemetry subject to subscribe to
    #[serde(default = "default_subject")]
    pub subject: String,

    /// Lag window size; must match the training collaborator's convention
    #[serde(default = "default_n_lags")]
    pub n_lags: usize,

    /// Error window capacity
    #[serde(default = "default_prediction_buffer_size")]
    pub prediction_buffer_size: usize,

    /// Rolling RMSE above which retraining is requested
    #[serde(default = "default_retrain_threshold_rmse")]
    pub retrain_threshold_rmse: f64,

    /// Prediction pairs required before drift is evaluated
    #[serde(default = "default_drift_min_samples")]
    pub drift_min_samples: usize,

    /// Quiet period after a finished retrain, in seconds
    #[serde(default = "default_retrain_cooldown_secs")]
    pub retrain_cooldown_secs: u64,

    /// Training job deadline in seconds; 0 lets the job run unbounded
    #[serde(default = "default_retrain_timeout_secs")]
    pub retrain_timeout_secs: u64,

    /// Directory holding model artifacts
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// Artifact name prefix shared with the trainer
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Interpreter for the training script
    #[serde(default = "default_python_bin")]
    pub python_bin: String,

    /// The training script itself
    #[serde(default = "default_train_script")]
    pub train_script: PathBuf,

    /// Shared historical dataset the trainer reads
    #[serde(default = "default_dataset_path")]
    pub dataset_path: PathBuf,

    /// Operational state snapshot file
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
}

fn default_device_name() -> String {
    std::env::var("DEVICE_NAME").unwrap_or_else(|_| "edge-device".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_nats_url() -> String {
    "nats://127.0.0.1:4222".to_string()
}

fn default_subject() -> String {
    "sensors.voc".to_string()
}

fn default_n_lags() -> usize {
    5
}

fn default_prediction_buffer_size() -> usize {
    50
}

fn default_retrain_threshold_rmse() -> f64 {
    10.0
}

fn default_drift_min_samples() -> usize {
    1
}

fn default_retrain_cooldown_secs() -> u64 {
    300
}

fn default_retrain_timeout_secs() -> u64 {
    900
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_model_name() -> String {
    "voc_predictor".to_string()
}

fn default_python_bin() -> String {
    "python3".to_string()
}

fn default_train_script() -> PathBuf {
    PathBuf::from("cloud/train.py")
}

fn default_dataset_path() -> PathBuf {
    PathBuf::from("data/raw.csv")
}

fn default_state_path() -> PathBuf {
    PathBuf::from("state/monitor_state.json")
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            api_port: default_api_port(),
            nats_url: default_nats_url(),
            subject: default_subject(),
            n_lags: default_n_lags(),
            prediction_buffer_size: default_prediction_buffer_size(),
            retrain_threshold_rmse: default_retrain_threshold_rmse(),
            drift_min_samples: default_drift_min_samples(),
            retrain_cooldown_secs: default_retrain_cooldown_secs(),
            retrain_timeout_secs: default_retrain_timeout_secs(),
            model_dir: default_model_dir(),
            model_name: default_model_name(),
            python_bin: default_python_bin(),
            train_script: default_train_script(),
            dataset_path: default_dataset_path(),
            state_path: default_state_path(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from the environment.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("MONITOR"))
            .build()?;

        let config: MonitorConfig = config.try_deserialize().unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.n_lags < 1 {
            bail!("n_lags must be at least 1");
        }
        if self.prediction_buffer_size < 1 {
            bail!("prediction_buffer_size must be at least 1");
        }
        if !(self.retrain_threshold_rmse >= 0.0) {
            bail!("retrain_threshold_rmse must be a non-negative number");
        }
        Ok(())
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            n_lags: self.n_lags,
            prediction_buffer_size: self.prediction_buffer_size,
            retrain_threshold_rmse: self.retrain_threshold_rmse,
            drift_min_samples: self.drift_min_samples,
            retrain_cooldown: Duration::from_secs(self.retrain_cooldown_secs),
            model_dir: self.model_dir.clone(),
        }
    }

    pub fn retrain_config(&self) -> RetrainConfig {
        RetrainConfig {
            python_bin: self.python_bin.clone(),
            train_script: self.train_script.clone(),
            dataset_path: self.dataset_path.clone(),
            timeout: match self.retrain_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_trainer_layout() {
        let config = MonitorConfig::default();
        assert_eq!(config.n_lags, 5);
        assert_eq!(config.model_name, "voc_predictor");
        assert_eq!(config.train_script, PathBuf::from("cloud/train.py"));
        assert_eq!(config.dataset_path, PathBuf::from("data/raw.csv"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_means_unbounded() {
        let config = MonitorConfig {
            retrain_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.retrain_config().timeout.is_none());
    }

    #[test]
    fn test_invalid_window_sizes_rejected() {
        let config = MonitorConfig {
            n_lags: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = MonitorConfig {
            prediction_buffer_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
