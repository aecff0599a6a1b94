//! The online inference controller
//!
//! One controller instance owns all mutable operational state and is
//! constructed once per process. Broker callbacks may arrive on any thread;
//! every mutation happens inside the single critical section entered at
//! `on_message`, which is never held across an await. The external training
//! job is the one exception: it runs in a spawned task, and only the trigger
//! decision and the post-completion reload re-enter the lock.

use crate::drift::{DriftBreach, DriftMonitor};
use crate::error::MonitorError;
use crate::models::{AuditCounters, PersistedState, Reading, RetrainState};
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::persistence::StatePersistence;
use crate::predictor::ModelStore;
use crate::retrain::RetrainOrchestrator;
use crate::window::{ErrorWindow, FeatureWindow};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Tunables for the controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Lag window size; must match the trainer's lag convention.
    pub n_lags: usize,
    /// Error window capacity.
    pub prediction_buffer_size: usize,
    /// Rolling RMSE above this requests retraining.
    pub retrain_threshold_rmse: f64,
    /// Pairs required before drift is evaluated.
    pub drift_min_samples: usize,
    /// Quiet period after a finished job before drift may re-trigger.
    pub retrain_cooldown: Duration,
    /// Directory holding model artifacts.
    pub model_dir: PathBuf,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            n_lags: 5,
            prediction_buffer_size: 50,
            retrain_threshold_rmse: 10.0,
            drift_min_samples: 1,
            retrain_cooldown: Duration::from_secs(300),
            model_dir: PathBuf::from("models"),
        }
    }
}

struct ControllerState {
    features: FeatureWindow,
    errors: ErrorWindow,
    retrain: RetrainState,
    counters: AuditCounters,
    cooldown_until: Option<Instant>,
}

/// Point-in-time view of the controller for the status API.
#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub model_version: String,
    pub retrain_state: RetrainState,
    pub rolling_rmse: Option<f64>,
    pub warmed_up: bool,
    pub counters: AuditCounters,
}

pub struct Controller {
    config: ControllerConfig,
    model: Arc<dyn ModelStore>,
    drift: DriftMonitor,
    retrainer: Arc<RetrainOrchestrator>,
    persistence: StatePersistence,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
    state: Mutex<ControllerState>,
}

impl Controller {
    /// Build a controller, restoring audit counters from the last snapshot
    /// when one exists. A snapshot persisted mid-retrain is normalized back
    /// to idle: the job did not survive the restart, and a stuck
    /// in-progress flag would block every future retrain.
    pub fn new(
        config: ControllerConfig,
        model: Arc<dyn ModelStore>,
        retrainer: RetrainOrchestrator,
        persistence: StatePersistence,
        metrics: MonitorMetrics,
        logger: StructuredLogger,
    ) -> Self {
        let mut counters = AuditCounters::default();
        match persistence.load() {
            Ok(Some(snapshot)) => {
                if snapshot.retrain_state == RetrainState::InProgress {
                    warn!("Snapshot recorded a retrain in progress; resetting to idle after restart");
                }
                if snapshot.model_version != model.version() {
                    info!(
                        persisted = %snapshot.model_version,
                        active = %model.version(),
                        "Active model differs from last snapshot"
                    );
                }
                counters = snapshot.counters;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to restore state snapshot, starting fresh"),
        }

        let drift = DriftMonitor::new(config.retrain_threshold_rmse, config.drift_min_samples);
        let state = ControllerState {
            features: FeatureWindow::new(config.n_lags),
            errors: ErrorWindow::new(config.prediction_buffer_size),
            retrain: RetrainState::Idle,
            counters,
            cooldown_until: None,
        };

        let controller = Self {
            config,
            model,
            drift,
            retrainer: Arc::new(retrainer),
            persistence,
            metrics,
            logger,
            state: Mutex::new(state),
        };

        // Re-stamp the snapshot so the normalized retrain flag and the
        // active model identity survive an immediate restart.
        {
            let st = controller.lock_state();
            controller.persist_locked(&st);
        }
        controller
    }

    /// Ingestion entry point, invoked once per broker message. This is a
    /// closed failure domain: parse, inference, persistence, and retrain
    /// errors are absorbed, counted, and logged here, never propagated.
    pub fn on_message(self: &Arc<Self>, payload: &[u8]) {
        let reading = match Reading::from_payload(payload) {
            Ok(reading) => reading,
            Err(e) => {
                warn!(error = %e, "Dropping unparseable telemetry message");
                self.metrics.inc_parse_errors();
                self.lock_state().counters.parse_errors += 1;
                return;
            }
        };

        let mut st = self.lock_state();
        st.counters.messages += 1;
        self.metrics.inc_messages();

        // The lag vector is built from the history *before* this reading so
        // lag 1 is the immediately preceding value, matching the trainer.
        if let Some(lags) = st.features.vector() {
            let started = Instant::now();
            let predicted = match self.model.predict(&lags) {
                Ok(predicted) => predicted,
                Err(e) => {
                    warn!(error = %e, "Dropping message after inference failure");
                    st.counters.inference_errors += 1;
                    self.metrics.inc_inference_errors();
                    return;
                }
            };
            self.metrics
                .observe_inference_latency(started.elapsed().as_secs_f64());
            st.counters.predictions += 1;
            self.metrics.inc_predictions();

            debug!(
                actual = reading.voc_ppb,
                predicted = predicted,
                timestamp = %reading.timestamp,
                "Prediction completed"
            );

            st.errors.push(reading.voc_ppb, predicted);
            if let Some(rmse) = st.errors.rolling_rmse() {
                self.metrics.set_rolling_rmse(rmse);
            }

            if let Some(breach) = self.drift.evaluate(&st.errors) {
                self.maybe_trigger_retrain(&mut st, &breach);
            }
        }

        st.features.push(reading.voc_ppb);
    }

    /// Transition idle → in-progress and launch the job. A no-op while a
    /// job is already in flight or inside the post-completion cooldown.
    fn maybe_trigger_retrain(self: &Arc<Self>, st: &mut ControllerState, breach: &DriftBreach) {
        if st.retrain == RetrainState::InProgress {
            debug!(rmse = breach.rmse, "Drift breach while retrain already in progress");
            return;
        }
        if let Some(until) = st.cooldown_until {
            if Instant::now() < until {
                debug!(rmse = breach.rmse, "Drift breach inside retrain cooldown");
                return;
            }
        }

        self.logger
            .log_drift_breach(breach.rmse, breach.threshold, breach.samples);
        st.retrain = RetrainState::InProgress;
        st.counters.retrains_triggered += 1;
        self.metrics.inc_retrains_triggered();
        self.persist_locked(st);

        self.logger
            .log_retrain_started(&self.retrainer.train_script().display().to_string());
        let ctrl = Arc::clone(self);
        let retrainer = Arc::clone(&self.retrainer);
        tokio::spawn(async move {
            let outcome = retrainer.run_job().await;
            ctrl.finish_retrain(outcome);
        });
    }

    /// Completion path for the retraining task. The retrain flag always
    /// returns to idle here, success or failure, so a failed job can never
    /// lock out future retrains.
    pub fn finish_retrain(&self, outcome: Result<(), MonitorError>) {
        let mut st = self.lock_state();
        match outcome {
            Ok(()) => {
                let old_version = self.model.version();
                match self.model.reload(&self.config.model_dir) {
                    Ok(new_version) => {
                        st.errors.clear();
                        st.counters.retrains_completed += 1;
                        self.metrics.inc_retrains_completed();
                        self.metrics.set_model_version(&new_version);
                        self.logger.log_retrain_finished(true, "");
                        self.logger.log_model_swap(&old_version, &new_version);
                    }
                    Err(e) => {
                        warn!(error = %e, "Reload after retrain failed, keeping previous model");
                        st.counters.retrains_failed += 1;
                        self.metrics.inc_retrains_failed();
                        self.logger.log_retrain_finished(false, &e.to_string());
                    }
                }
            }
            Err(e) => {
                st.counters.retrains_failed += 1;
                self.metrics.inc_retrains_failed();
                self.logger.log_retrain_finished(false, &e.to_string());
            }
        }
        st.retrain = RetrainState::Idle;
        st.cooldown_until = Some(Instant::now() + self.config.retrain_cooldown);
        self.persist_locked(&st);
    }

    /// Point-in-time snapshot for the status endpoint.
    pub fn status(&self) -> ControllerStatus {
        let st = self.lock_state();
        ControllerStatus {
            model_version: self.model.version(),
            retrain_state: st.retrain,
            rolling_rmse: st.errors.rolling_rmse(),
            warmed_up: st.features.is_ready(),
            counters: st.counters.clone(),
        }
    }

    pub fn retrain_state(&self) -> RetrainState {
        self.lock_state().retrain
    }

    fn persist_locked(&self, st: &ControllerState) {
        let snapshot = PersistedState {
            model_version: self.model.version(),
            retrain_state: st.retrain,
            counters: st.counters.clone(),
        };
        if let Err(e) = self.persistence.store(&snapshot) {
            warn!(error = %e, "Failed to persist state snapshot");
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ControllerState> {
        // A poisoned lock means a panic elsewhere; ingestion keeps going on
        // the last consistent state.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
