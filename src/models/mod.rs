//! Scoring models: the probability seam, its implementations and loading

pub mod inference;
pub mod linear;
pub mod loader;
pub mod onnx;
pub mod scorer;

pub use inference::{InferenceEngine, PredictionResult};
pub use linear::LogisticModel;
pub use loader::{ModelFormat, ModelLoader, ModelSpec};
pub use onnx::OnnxModel;
pub use scorer::{InputShape, ProbabilityModel};
