//! ONNX inference and model artifact management
//!
//! Loads the newest trained artifact from the model directory using tract
//! and serves scalar predictions from the lag vector. The active plan is
//! swapped atomically on reload: a prediction already in flight finishes
//! against the plan it cloned, and every later call sees the new one.

use crate::error::MonitorError;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tract_onnx::prelude::*;
use tracing::{debug, info};

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Artifact file extension produced by the training collaborator.
const ARTIFACT_EXT: &str = "onnx";

/// Seam between the controller and the inference engine. Lets tests drive
/// the controller with a scripted model.
pub trait ModelStore: Send + Sync {
    /// Predict the current target from the lag vector.
    fn predict(&self, lags: &[f64]) -> Result<f64, MonitorError>;

    /// Swap in the newest artifact from `dir`; returns the new version.
    fn reload(&self, dir: &Path) -> Result<String, MonitorError>;

    /// Identity of the active artifact (its file stem).
    fn version(&self) -> String;
}

#[derive(Debug)]
struct LoadedModel {
    plan: TractModel,
    version: String,
    checksum: String,
}

/// The active inference model plus its artifact identity.
#[derive(Debug)]
pub struct ModelHandle {
    inner: RwLock<Arc<LoadedModel>>,
    model_name: String,
    n_lags: usize,
}

impl ModelHandle {
    /// Load the artifact with the lexicographically greatest name from
    /// `dir`. The trainer embeds a fixed-width timestamp in each name, so
    /// greatest-name selection is newest-artifact selection.
    pub fn load_latest(dir: &Path, model_name: &str, n_lags: usize) -> Result<Self, MonitorError> {
        let loaded = load_artifact(dir, model_name, n_lags)?;
        info!(
            version = %loaded.version,
            checksum = %loaded.checksum,
            "Model loaded"
        );
        Ok(Self {
            inner: RwLock::new(Arc::new(loaded)),
            model_name: model_name.to_string(),
            n_lags,
        })
    }

    pub fn n_lags(&self) -> usize {
        self.n_lags
    }

    pub fn checksum(&self) -> String {
        self.current().checksum.clone()
    }

    fn current(&self) -> Arc<LoadedModel> {
        let guard = self
            .inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }
}

impl ModelStore for ModelHandle {
    fn predict(&self, lags: &[f64]) -> Result<f64, MonitorError> {
        validate_lags(lags, self.n_lags)?;
        let model = self.current();

        let data: Vec<f32> = lags.iter().map(|v| *v as f32).collect();
        let input: Tensor = tract_ndarray::Array2::from_shape_vec((1, self.n_lags), data)
            .map_err(|e| MonitorError::inference(e.to_string()))?
            .into();

        let result = model
            .plan
            .run(tvec!(input.into()))
            .map_err(|e| MonitorError::inference(e.to_string()))?;
        let output = result
            .first()
            .ok_or_else(|| MonitorError::inference("model produced no output"))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| MonitorError::inference(e.to_string()))?;
        let value = view
            .iter()
            .next()
            .copied()
            .ok_or_else(|| MonitorError::inference("model output tensor is empty"))?;

        debug!(predicted = value, version = %model.version, "Inference completed");
        Ok(value as f64)
    }

    fn reload(&self, dir: &Path) -> Result<String, MonitorError> {
        // Build the replacement fully before taking the write lock so no
        // caller can observe a partially-constructed handle.
        let loaded = load_artifact(dir, &self.model_name, self.n_lags)?;
        let version = loaded.version.clone();
        info!(
            version = %version,
            checksum = %loaded.checksum,
            "Model reloaded"
        );
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(loaded);
        Ok(version)
    }

    fn version(&self) -> String {
        self.current().version.clone()
    }
}

fn validate_lags(lags: &[f64], n_lags: usize) -> Result<(), MonitorError> {
    if lags.len() != n_lags {
        return Err(MonitorError::inference(format!(
            "expected {} lag values, got {}",
            n_lags,
            lags.len()
        )));
    }
    if let Some(bad) = lags.iter().find(|v| !v.is_finite()) {
        return Err(MonitorError::inference(format!(
            "non-finite lag value {bad}"
        )));
    }
    Ok(())
}

fn load_artifact(dir: &Path, model_name: &str, n_lags: usize) -> Result<LoadedModel, MonitorError> {
    let path = select_latest_artifact(dir, model_name)?;
    let bytes = fs::read(&path).map_err(|e| {
        MonitorError::model_load(dir, format!("unreadable artifact {}: {e}", path.display()))
    })?;
    let checksum = hex::encode(Sha256::digest(&bytes));

    let plan = tract_onnx::onnx()
        .model_for_read(&mut std::io::Cursor::new(&bytes))
        .and_then(|m| m.with_input_fact(0, f32::fact([1, n_lags]).into()))
        .and_then(|m| m.into_optimized())
        .and_then(|m| m.into_runnable())
        .map_err(|e| MonitorError::model_load(dir, format!("{}: {e}", path.display())))?;

    let version = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();

    Ok(LoadedModel {
        plan,
        version,
        checksum,
    })
}

/// Pick the artifact whose name sorts greatest among files matching
/// `<model_name>-v*.onnx`.
fn select_latest_artifact(dir: &Path, model_name: &str) -> Result<PathBuf, MonitorError> {
    let prefix = format!("{model_name}-v");
    let suffix = format!(".{ARTIFACT_EXT}");

    let entries =
        fs::read_dir(dir).map_err(|e| MonitorError::model_load(dir, e.to_string()))?;

    let mut best: Option<(String, PathBuf)> = None;
    for entry in entries {
        let entry = entry.map_err(|e| MonitorError::model_load(dir, e.to_string()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(&prefix) || !name.ends_with(&suffix) {
            continue;
        }
        if best.as_ref().map(|(b, _)| name > *b).unwrap_or(true) {
            best = Some((name, entry.path()));
        }
    }

    best.map(|(_, path)| path).ok_or_else(|| {
        MonitorError::model_load(dir, format!("no {prefix}*{suffix} artifact found"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_select_latest_by_lexicographic_name() {
        let dir = TempDir::new().unwrap();
        for name in [
            "voc_predictor-v20250101_090000.onnx",
            "voc_predictor-v20250102_090000.onnx",
            "voc_predictor-v20241231_235959.onnx",
        ] {
            fs::write(dir.path().join(name), b"stub").unwrap();
        }

        let path = select_latest_artifact(dir.path(), "voc_predictor").unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "voc_predictor-v20250102_090000.onnx"
        );
    }

    #[test]
    fn test_select_ignores_other_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("voc_predictor-v20250101_090000.onnx"), b"x").unwrap();
        fs::write(dir.path().join("other_model-v20990101_000000.onnx"), b"x").unwrap();
        fs::write(dir.path().join("voc_predictor-v20990101_000000.tmp"), b"x").unwrap();

        let path = select_latest_artifact(dir.path(), "voc_predictor").unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "voc_predictor-v20250101_090000.onnx"
        );
    }

    #[test]
    fn test_empty_directory_is_a_load_error() {
        let dir = TempDir::new().unwrap();
        let err = select_latest_artifact(dir.path(), "voc_predictor").unwrap_err();
        assert!(matches!(err, MonitorError::ModelLoad { .. }));
    }

    #[test]
    fn test_missing_directory_is_a_load_error() {
        let err = select_latest_artifact(Path::new("/nonexistent/models"), "voc_predictor")
            .unwrap_err();
        assert!(matches!(err, MonitorError::ModelLoad { .. }));
    }

    #[test]
    fn test_unparseable_artifact_is_a_load_error() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("voc_predictor-v20250101_090000.onnx"),
            b"definitely not onnx",
        )
        .unwrap();

        let err = ModelHandle::load_latest(dir.path(), "voc_predictor", 5).unwrap_err();
        assert!(matches!(err, MonitorError::ModelLoad { .. }));
    }

    #[test]
    fn test_lag_validation_rejects_wrong_length() {
        let err = validate_lags(&[1.0, 2.0], 5).unwrap_err();
        assert!(matches!(err, MonitorError::Inference { .. }));
    }

    #[test]
    fn test_lag_validation_rejects_non_finite() {
        let err = validate_lags(&[1.0, f64::NAN, 3.0], 3).unwrap_err();
        assert!(matches!(err, MonitorError::Inference { .. }));
        assert!(validate_lags(&[1.0, 2.0, 3.0], 3).is_ok());
    }
}
