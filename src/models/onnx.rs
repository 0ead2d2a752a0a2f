//! ONNX Runtime-backed classifiers.
//!
//! Handles the two output layouts the exported models use: a probability
//! tensor (tree ensembles exported with `zipmap=False`, Keras sigmoid heads)
//! and `seq(map(int64, float))` (sklearn/LightGBM exports with zipmap).

use crate::error::{Result, ScoringError};
use crate::models::scorer::{check_probability, InputShape, ProbabilityModel};
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionOutputs};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use std::fmt::Display;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

fn load_error(name: &str, path: &Path, reason: impl Display) -> ScoringError {
    ScoringError::ModelLoad {
        model: name.to_string(),
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// A loaded ONNX classifier.
pub struct OnnxModel {
    name: String,
    /// `Session::run` needs `&mut`, so concurrent callers take turns per model.
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    shape: InputShape,
}

impl OnnxModel {
    /// Load an ONNX model from file. The runtime must already be initialised.
    pub fn load<P: AsRef<Path>>(
        path: P,
        name: &str,
        shape: InputShape,
        intra_threads: usize,
    ) -> Result<Self> {
        let path = path.as_ref();

        info!(
            model = %name,
            path = %path.display(),
            threads = intra_threads,
            shape = ?shape,
            "Loading ONNX model"
        );

        if !path.exists() {
            return Err(load_error(name, path, "model file not found"));
        }

        let session = Session::builder()
            .map_err(|e| load_error(name, path, e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| load_error(name, path, e))?
            .with_intra_threads(intra_threads)
            .map_err(|e| load_error(name, path, e))?
            .commit_from_file(path)
            .map_err(|e| load_error(name, path, e))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| load_error(name, path, "model declares no inputs"))?;

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob") || o.name.contains("output"))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .ok_or_else(|| load_error(name, path, "model declares no outputs"))?;

        info!(
            model = %name,
            input = %input_name,
            output = %output_name,
            "Model loaded successfully"
        );

        Ok(Self {
            name: name.to_string(),
            session: Mutex::new(session),
            input_name,
            output_name,
            shape,
        })
    }

    pub fn shape(&self) -> InputShape {
        self.shape
    }

    fn run(&self, flat: Vec<f32>, batch: usize, width: usize) -> Result<Vec<f64>> {
        let dims = self.shape.tensor_dims(batch, width)?;
        let input = Tensor::from_array((dims, flat)).map_err(|e| {
            ScoringError::model(&self.name, format!("failed to create input tensor: {e}"))
        })?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| ScoringError::model(&self.name, format!("session lock poisoned: {e}")))?;

        let outputs = session
            .run(ort::inputs![&self.input_name => input])
            .map_err(|e| ScoringError::model(&self.name, e))?;

        let probabilities = self.extract_probabilities(&outputs, batch)?;

        probabilities
            .into_iter()
            .map(|p| check_probability(&self.name, p))
            .collect()
    }

    /// Class-1 probabilities from the preferred output, else any non-label output.
    fn extract_probabilities(&self, outputs: &SessionOutputs, batch: usize) -> Result<Vec<f64>> {
        if let Some(output) = outputs.get(self.output_name.as_str()) {
            if let Some(probabilities) = self.try_extract(&output, batch)? {
                return Ok(probabilities);
            }
        }

        for (name, output) in outputs.iter() {
            if name.contains("label") {
                continue;
            }
            if let Some(probabilities) = self.try_extract(&output, batch)? {
                debug!(model = %self.name, output = %name, "Extracted from fallback output");
                return Ok(probabilities);
            }
        }

        Err(ScoringError::model(
            &self.name,
            "no output holds class probabilities",
        ))
    }

    fn try_extract(&self, output: &DynValue, batch: usize) -> Result<Option<Vec<f64>>> {
        if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
            let dims: Vec<i64> = shape.iter().copied().collect();
            return probabilities_from_tensor(&self.name, &dims, data, batch).map(Some);
        }

        let dtype = output.dtype();
        if DynSequenceValueType::can_downcast(&dtype) {
            return self.probabilities_from_sequence_map(output, batch).map(Some);
        }

        Ok(None)
    }

    /// One `map(int64, float)` per row, keyed by class id.
    fn probabilities_from_sequence_map(&self, output: &DynValue, batch: usize) -> Result<Vec<f64>> {
        let allocator = Allocator::default();

        let sequence = output
            .downcast_ref::<DynSequenceValueType>()
            .map_err(|e| {
                ScoringError::model(&self.name, format!("failed to downcast to sequence: {e}"))
            })?;

        let maps = sequence
            .try_extract_sequence::<DynMapValueType>(&allocator)
            .map_err(|e| ScoringError::model(&self.name, e))?;

        if maps.len() != batch {
            return Err(ScoringError::model(
                &self.name,
                format!("expected {} probability maps, got {}", batch, maps.len()),
            ));
        }

        maps.iter()
            .map(|map| {
                let pairs = map
                    .try_extract_key_values::<i64, f32>()
                    .map_err(|e| ScoringError::model(&self.name, e))?;
                class_one_probability(&pairs)
                    .ok_or_else(|| ScoringError::model(&self.name, "no class probability in map"))
            })
            .collect()
    }
}

/// Class-1 probability from `(class_id, probability)` pairs.
fn class_one_probability(pairs: &[(i64, f32)]) -> Option<f64> {
    if let Some((_, p)) = pairs.iter().find(|(class, _)| *class == 1) {
        return Some(*p as f64);
    }
    pairs
        .iter()
        .find(|(class, _)| *class == 0)
        .map(|(_, p)| 1.0 - *p as f64)
}

/// Class-1 probabilities from a tensor output.
///
/// `[batch, 2+]` reads column 1, `[batch, 1]` and `[batch]` read the single
/// value per row, and a bare `[2]` is treated as one row of class scores.
fn probabilities_from_tensor(
    model: &str,
    dims: &[i64],
    data: &[f32],
    batch: usize,
) -> Result<Vec<f64>> {
    let unexpected = || {
        ScoringError::model(
            model,
            format!("unexpected output shape {:?} for batch of {}", dims, batch),
        )
    };

    match dims {
        [rows, classes] if *rows as usize == batch && *classes >= 2 => {
            let classes = *classes as usize;
            Ok((0..batch).map(|i| data[i * classes + 1] as f64).collect())
        }
        [rows, 1] if *rows as usize == batch => {
            Ok(data[..batch].iter().map(|&p| p as f64).collect())
        }
        [len] if *len as usize == batch => Ok(data[..batch].iter().map(|&p| p as f64).collect()),
        [2] if batch == 1 => Ok(vec![data[1] as f64]),
        _ => Err(unexpected()),
    }
}

impl ProbabilityModel for OnnxModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_width(&self) -> Option<usize> {
        self.shape.element_count()
    }

    fn predict_proba(&self, features: &[f32]) -> Result<f64> {
        let probabilities = self.run(features.to_vec(), 1, features.len())?;
        probabilities
            .first()
            .copied()
            .ok_or_else(|| ScoringError::model(&self.name, "empty output"))
    }

    fn predict_proba_batch(&self, rows: &[Vec<f32>]) -> Result<Vec<f64>> {
        let Some(first) = rows.first() else {
            return Ok(Vec::new());
        };
        let width = first.len();
        if let Some(pos) = rows.iter().position(|r| r.len() != width) {
            return Err(ScoringError::validation(format!(
                "batch row {} has {} features, row 0 has {}",
                pos,
                rows[pos].len(),
                width
            )));
        }

        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        self.run(flat, rows.len(), width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_class_tensor_reads_column_one() {
        let data = [0.9, 0.1, 0.3, 0.7];
        let probs = probabilities_from_tensor("xgb", &[2, 2], &data, 2).unwrap();
        assert!((probs[0] - 0.1).abs() < 1e-6);
        assert!((probs[1] - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_sigmoid_head_tensor() {
        let probs = probabilities_from_tensor("lstm", &[1, 1], &[0.25], 1).unwrap();
        assert_eq!(probs, vec![0.25]);

        let probs = probabilities_from_tensor("lstm", &[3], &[0.1, 0.2, 0.3], 3).unwrap();
        assert_eq!(probs.len(), 3);
    }

    #[test]
    fn test_bare_class_vector() {
        let probs = probabilities_from_tensor("rf", &[2], &[0.6, 0.4], 1).unwrap();
        assert!((probs[0] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_unexpected_shape_is_error() {
        let err = probabilities_from_tensor("cnn", &[1, 5, 6], &[0.0; 30], 1).unwrap_err();
        assert!(matches!(err, ScoringError::Model { .. }));

        assert!(probabilities_from_tensor("rf", &[3, 2], &[0.0; 6], 2).is_err());
    }

    #[test]
    fn test_class_one_probability() {
        assert_eq!(class_one_probability(&[(0, 0.75), (1, 0.25)]), Some(0.25));
        assert_eq!(class_one_probability(&[(0, 0.75)]), Some(0.25));
        assert_eq!(class_one_probability(&[(2, 0.5)]), None);
    }

    #[test]
    fn test_load_missing_file() {
        let err = OnnxModel::load("/nonexistent/CNN.onnx", "CNN", InputShape::Flat, 1)
            .err()
            .unwrap();
        assert!(matches!(err, ScoringError::ModelLoad { .. }));
    }
}
