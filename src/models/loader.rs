//! Model loader: turns configured model specs into scoring models.
//!
//! Loading is all-or-nothing. A missing or unreadable model aborts startup
//! rather than shrinking the ensemble, since a smaller ensemble would feed the
//! meta-learner a vector it was never trained on.

use crate::error::{Result, ScoringError};
use crate::models::linear::LogisticModel;
use crate::models::onnx::OnnxModel;
use crate::models::scorer::{InputShape, ProbabilityModel};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Serialized model format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    /// ONNX graph run through ONNX Runtime
    #[default]
    Onnx,
    /// JSON logistic-regression coefficients
    Logistic,
}

/// One constituent model of the ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Name used in the meta-feature schema (e.g. `XGBoost`, `LSTM`)
    pub name: String,
    /// File path, relative to the models directory unless absolute
    pub path: String,
    #[serde(default)]
    pub format: ModelFormat,
    /// Reshape applied to the flat feature vector before scoring
    #[serde(default)]
    pub input_shape: InputShape,
}

impl ModelSpec {
    pub fn onnx(name: &str, path: &str, input_shape: InputShape) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            format: ModelFormat::Onnx,
            input_shape,
        }
    }

    pub fn logistic(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            format: ModelFormat::Logistic,
            input_shape: InputShape::Flat,
        }
    }

    pub fn resolve_path(&self, models_dir: &Path) -> PathBuf {
        let path = Path::new(&self.path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            models_dir.join(path)
        }
    }
}

/// Loader for scoring models
pub struct ModelLoader {
    /// Number of intra-op threads per ONNX session
    onnx_threads: usize,
    runtime_ready: bool,
}

impl ModelLoader {
    /// Create a new model loader with default settings (1 thread)
    pub fn new() -> Self {
        Self::with_threads(1)
    }

    /// Create a new model loader with the given ONNX thread count
    pub fn with_threads(onnx_threads: usize) -> Self {
        Self {
            onnx_threads: onnx_threads.max(1),
            runtime_ready: false,
        }
    }

    /// Initialise ONNX Runtime on first use, so logistic-only ensembles never need it.
    fn ensure_runtime(&mut self) -> Result<()> {
        if !self.runtime_ready {
            ort::init().commit().map_err(|e| ScoringError::ModelLoad {
                model: "onnxruntime".to_string(),
                path: String::new(),
                reason: e.to_string(),
            })?;
            info!(onnx_threads = self.onnx_threads, "ONNX Runtime initialized");
            self.runtime_ready = true;
        }
        Ok(())
    }

    /// Load a single model file
    pub fn load_model(
        &mut self,
        spec: &ModelSpec,
        models_dir: &Path,
    ) -> Result<Arc<dyn ProbabilityModel>> {
        let path = spec.resolve_path(models_dir);

        let model: Arc<dyn ProbabilityModel> = match spec.format {
            ModelFormat::Onnx => {
                self.ensure_runtime()?;
                Arc::new(OnnxModel::load(
                    &path,
                    &spec.name,
                    spec.input_shape,
                    self.onnx_threads,
                )?)
            }
            ModelFormat::Logistic => {
                if spec.input_shape != InputShape::Flat {
                    return Err(ScoringError::ModelLoad {
                        model: spec.name.clone(),
                        path: path.display().to_string(),
                        reason: "logistic models take flat input only".to_string(),
                    });
                }
                info!(model = %spec.name, path = %path.display(), "Loading logistic model");
                Arc::new(LogisticModel::load(&path, &spec.name)?)
            }
        };

        Ok(model)
    }

    /// Load every model in order; any failure aborts.
    pub fn load_all<P: AsRef<Path>>(
        &mut self,
        models_dir: P,
        specs: &[ModelSpec],
    ) -> Result<Vec<Arc<dyn ProbabilityModel>>> {
        let models_dir = models_dir.as_ref();

        if specs.is_empty() {
            return Err(ScoringError::ModelLoad {
                model: String::new(),
                path: models_dir.display().to_string(),
                reason: "no base models configured".to_string(),
            });
        }

        let mut seen = HashSet::new();
        if let Some(dup) = specs.iter().find(|s| !seen.insert(s.name.as_str())) {
            return Err(ScoringError::ModelLoad {
                model: dup.name.clone(),
                path: dup.path.clone(),
                reason: "model name configured more than once".to_string(),
            });
        }

        let models = specs
            .iter()
            .map(|spec| self.load_model(spec, models_dir))
            .collect::<Result<Vec<_>>>()?;

        info!(
            count = models.len(),
            "Loaded {} models from {}",
            models.len(),
            models_dir.display()
        );

        Ok(models)
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_logistic(dir: &Path, file: &str, weights: Vec<f64>) {
        LogisticModel::new("tmp", weights, 0.0)
            .save(dir.join(file))
            .unwrap();
    }

    #[test]
    fn test_load_all_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        write_logistic(dir.path(), "b.json", vec![1.0, 2.0]);
        write_logistic(dir.path(), "a.json", vec![3.0, 4.0]);

        let specs = vec![
            ModelSpec::logistic("Second", "b.json"),
            ModelSpec::logistic("First", "a.json"),
        ];

        let models = ModelLoader::new().load_all(dir.path(), &specs).unwrap();
        let names: Vec<&str> = models.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["Second", "First"]);
    }

    #[test]
    fn test_missing_model_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_logistic(dir.path(), "a.json", vec![1.0]);

        let specs = vec![
            ModelSpec::logistic("A", "a.json"),
            ModelSpec::logistic("Missing", "missing.json"),
        ];

        let err = ModelLoader::new().load_all(dir.path(), &specs).err().unwrap();
        assert!(matches!(err, ScoringError::ModelLoad { ref model, .. } if model == "Missing"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_logistic(dir.path(), "a.json", vec![1.0]);

        let specs = vec![
            ModelSpec::logistic("A", "a.json"),
            ModelSpec::logistic("A", "a.json"),
        ];

        assert!(ModelLoader::new().load_all(dir.path(), &specs).is_err());
    }

    #[test]
    fn test_empty_ensemble_rejected() {
        assert!(ModelLoader::new().load_all("models", &[]).is_err());
    }

    #[test]
    fn test_resolve_path() {
        let spec = ModelSpec::onnx("CNN", "dl/CNN.onnx", InputShape::Flat);
        assert_eq!(
            spec.resolve_path(Path::new("models")),
            PathBuf::from("models/dl/CNN.onnx")
        );

        let spec = ModelSpec::onnx("CNN", "/abs/CNN.onnx", InputShape::Flat);
        assert_eq!(spec.resolve_path(Path::new("models")), PathBuf::from("/abs/CNN.onnx"));
    }
}
