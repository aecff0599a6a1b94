//! Drift detection over rolling prediction accuracy
//!
//! Sustained degradation shows up as rolling RMSE climbing past a fixed
//! threshold. The monitor itself only decides; the controller owns the
//! retrain-state transition and the job spawn.

use crate::window::ErrorWindow;

/// Details of a threshold breach, for logging and the trigger decision.
#[derive(Debug, Clone)]
pub struct DriftBreach {
    pub rmse: f64,
    pub threshold: f64,
    pub samples: usize,
}

/// Decides when rolling accuracy has degraded enough to request retraining.
#[derive(Debug)]
pub struct DriftMonitor {
    threshold: f64,
    min_samples: usize,
}

impl DriftMonitor {
    /// `min_samples` gates evaluation during the small-sample portion of the
    /// error window, where the RMSE estimate is noisy. The floor is 1, which
    /// preserves single-breach triggering.
    pub fn new(threshold: f64, min_samples: usize) -> Self {
        Self {
            threshold,
            min_samples: min_samples.max(1),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// A single breach is sufficient once `min_samples` pairs are resident.
    pub fn evaluate(&self, window: &ErrorWindow) -> Option<DriftBreach> {
        if window.len() < self.min_samples {
            return None;
        }
        let rmse = window.rolling_rmse()?;
        if rmse > self.threshold {
            Some(DriftBreach {
                rmse,
                threshold: self.threshold,
                samples: window.len(),
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_breach_below_threshold() {
        let monitor = DriftMonitor::new(10.0, 1);
        let mut window = ErrorWindow::new(10);
        window.push(100.0, 95.0);
        assert!(monitor.evaluate(&window).is_none());
    }

    #[test]
    fn test_breach_above_threshold() {
        let monitor = DriftMonitor::new(10.0, 1);
        let mut window = ErrorWindow::new(10);
        window.push(100.0, 0.0);
        let breach = monitor.evaluate(&window).unwrap();
        assert!(breach.rmse > 10.0);
        assert_eq!(breach.threshold, 10.0);
        assert_eq!(breach.samples, 1);
    }

    #[test]
    fn test_empty_window_never_breaches() {
        let monitor = DriftMonitor::new(0.0, 1);
        let window = ErrorWindow::new(10);
        assert!(monitor.evaluate(&window).is_none());
    }

    #[test]
    fn test_min_samples_gates_noisy_estimates() {
        let monitor = DriftMonitor::new(10.0, 3);
        let mut window = ErrorWindow::new(10);
        window.push(1000.0, 0.0);
        window.push(1000.0, 0.0);
        assert!(monitor.evaluate(&window).is_none());
        window.push(1000.0, 0.0);
        assert!(monitor.evaluate(&window).is_some());
    }

    #[test]
    fn test_exact_threshold_is_not_a_breach() {
        let monitor = DriftMonitor::new(4.0, 1);
        let mut window = ErrorWindow::new(10);
        window.push(10.0, 14.0);
        window.push(10.0, 6.0);
        // rolling RMSE is exactly 4.0; the contract is strictly greater-than
        assert!(monitor.evaluate(&window).is_none());
    }

    #[test]
    fn test_min_samples_floor_is_one() {
        let monitor = DriftMonitor::new(1.0, 0);
        let mut window = ErrorWindow::new(10);
        window.push(100.0, 0.0);
        assert!(monitor.evaluate(&window).is_some());
    }
}
