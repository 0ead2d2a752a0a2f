//! Stacking ensemble: meta-feature assembly, threshold tuning, decisions and
//! the persisted artifact that ties a meta-learner to its threshold.

pub mod artifact;
pub mod assembler;
pub mod decision;
pub mod evaluation;
pub mod threshold;
pub mod trainer;

pub use artifact::{MetaLearner, StackingArtifact};
pub use assembler::{MetaFeatureAssembler, MetaFeatures};
pub use decision::{Decided, Scored};
pub use evaluation::ClassificationReport;
pub use threshold::{precision_recall_curve, select_threshold, ThresholdSelection};
pub use trainer::{MetaLearnerTrainer, TrainerConfig, TrainingOutcome};
