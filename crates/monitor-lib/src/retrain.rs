//! Out-of-band retraining job execution
//!
//! The training collaborator is an external script run against the shared
//! historical dataset. The job executes as a child process inside a spawned
//! task so a many-second training run never blocks message handling; only
//! the trigger decision and the post-completion reload touch the
//! controller's critical section.

use crate::error::MonitorError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{info, warn};

/// Longest stderr excerpt carried into a job-failure error.
const STDERR_TAIL_CHARS: usize = 500;

/// Configuration for the external training job.
#[derive(Debug, Clone)]
pub struct RetrainConfig {
    /// Interpreter used to run the training script.
    pub python_bin: String,
    /// The training script itself.
    pub train_script: PathBuf,
    /// Shared historical dataset the script reads; implicit job input.
    pub dataset_path: PathBuf,
    /// Kill the job after this long; `None` lets it run to completion.
    pub timeout: Option<Duration>,
}

impl Default for RetrainConfig {
    fn default() -> Self {
        Self {
            python_bin: "python3".to_string(),
            train_script: PathBuf::from("cloud/train.py"),
            dataset_path: PathBuf::from("data/raw.csv"),
            timeout: Some(Duration::from_secs(900)),
        }
    }
}

/// Spawns and supervises the external training job.
pub struct RetrainOrchestrator {
    config: RetrainConfig,
}

impl RetrainOrchestrator {
    pub fn new(config: RetrainConfig) -> Self {
        Self { config }
    }

    pub fn train_script(&self) -> &Path {
        &self.config.train_script
    }

    /// Run the training job to completion. Exit code zero is success;
    /// anything else, a launch error, or a deadline overrun is a
    /// `RetrainJob` error carrying the stderr tail where available.
    pub async fn run_job(&self) -> Result<(), MonitorError> {
        info!(
            script = %self.config.train_script.display(),
            dataset = %self.config.dataset_path.display(),
            "Launching training job"
        );

        let mut child = Command::new(&self.config.python_bin)
            .arg(&self.config.train_script)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                MonitorError::retrain_job(format!(
                    "failed to launch {}: {e}",
                    self.config.train_script.display()
                ))
            })?;

        // Drain stderr concurrently so a chatty child can't fill the pipe
        // and stall against wait().
        let mut stderr_pipe = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut captured = String::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_string(&mut captured).await;
            }
            captured
        });

        let status = match self.config.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        timeout_secs = limit.as_secs(),
                        "Training job exceeded deadline, killing"
                    );
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    stderr_task.abort();
                    return Err(MonitorError::retrain_job(format!(
                        "timed out after {}s",
                        limit.as_secs()
                    )));
                }
            },
            None => child.wait().await,
        };

        let status = status
            .map_err(|e| MonitorError::retrain_job(format!("failed waiting for job: {e}")))?;
        let captured = stderr_task.await.unwrap_or_default();

        if status.success() {
            info!("Training job finished successfully");
            Ok(())
        } else {
            let tail = stderr_tail(&captured);
            Err(MonitorError::retrain_job(format!(
                "exited with {status}{tail}"
            )))
        }
    }
}

fn stderr_tail(captured: &str) -> String {
    let trimmed = captured.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let start = trimmed
        .char_indices()
        .rev()
        .nth(STDERR_TAIL_CHARS - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    format!("; stderr: {}", &trimmed[start..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orchestrator(bin: &str, arg: &str, timeout: Option<Duration>) -> RetrainOrchestrator {
        RetrainOrchestrator::new(RetrainConfig {
            python_bin: bin.to_string(),
            train_script: PathBuf::from(arg),
            dataset_path: PathBuf::from("data/raw.csv"),
            timeout,
        })
    }

    #[tokio::test]
    async fn test_zero_exit_is_success() {
        let job = orchestrator("true", "cloud/train.py", None);
        assert!(job.run_job().await.is_ok());
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_job_error() {
        let job = orchestrator("false", "cloud/train.py", None);
        let err = job.run_job().await.unwrap_err();
        assert!(matches!(err, MonitorError::RetrainJob { .. }));
    }

    #[tokio::test]
    async fn test_launch_failure_is_job_error() {
        let job = orchestrator("/nonexistent/python3", "cloud/train.py", None);
        let err = job.run_job().await.unwrap_err();
        assert!(matches!(err, MonitorError::RetrainJob { .. }));
    }

    #[tokio::test]
    async fn test_deadline_overrun_kills_the_job() {
        let job = orchestrator("sleep", "5", Some(Duration::from_millis(100)));
        let err = job.run_job().await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("timed out"), "was: {message}");
    }

    #[test]
    fn test_stderr_tail_is_bounded() {
        let long = "x".repeat(2000);
        let tail = stderr_tail(&long);
        assert!(tail.len() <= STDERR_TAIL_CHARS + 20);
        assert!(stderr_tail("  ").is_empty());
    }

    #[test]
    fn test_default_config_matches_trainer_layout() {
        let config = RetrainConfig::default();
        assert_eq!(config.train_script, PathBuf::from("cloud/train.py"));
        assert_eq!(config.dataset_path, PathBuf::from("data/raw.csv"));
    }
}
