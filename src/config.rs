//! Configuration management for the stacking scoring service

use crate::models::loader::ModelSpec;
use crate::models::scorer::InputShape;
use crate::schema::{credit_card_columns, FeatureSchema};
use crate::stacking::trainer::TrainerConfig;
use crate::types::alert::RiskLevelThresholds;
use anyhow::{bail, Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// How a request is scored
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InferenceStrategy {
    /// Base/DL models -> meta-learner -> tuned threshold
    #[default]
    Stacking,
    /// One model scores the record directly; no decision is made
    Single,
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub schema: SchemaConfig,
    pub models: ModelsConfig,
    pub scoring: ScoringConfig,
    pub detection: DetectionConfig,
    pub pipeline: PipelineConfig,
    pub training: TrainingConfig,
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject scoring requests arrive on
    pub request_subject: String,
    /// Queue group shared by all service instances
    pub queue_group: String,
    /// Subject for outgoing fraud alerts
    pub alert_subject: String,
}

/// Input feature schema
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaConfig {
    /// Ordered input columns the base models were trained on
    pub columns: Vec<String>,
}

impl SchemaConfig {
    pub fn feature_schema(&self) -> Result<FeatureSchema> {
        FeatureSchema::new(self.columns.clone()).context("Invalid [schema] columns")
    }
}

/// Constituent models configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// Directory model paths are resolved against
    pub models_dir: String,
    /// Number of intra-op threads per ONNX session (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
    /// Base and DL models, in meta-feature order
    pub base: Vec<ModelSpec>,
}

fn default_onnx_threads() -> usize {
    1
}

impl ModelsConfig {
    pub fn find(&self, name: &str) -> Option<&ModelSpec> {
        self.base.iter().find(|spec| spec.name == name)
    }
}

/// Scoring mode configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub strategy: InferenceStrategy,
    /// Stacking artifact (meta-learner + threshold)
    pub artifact: String,
    /// Name of the model used by the single strategy; must be listed in `models.base`
    #[serde(default)]
    pub single_model: Option<String>,
}

/// Alert configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Risk level bands applied to flagged scores
    pub risk_levels: RiskLevelThresholds,
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Maximum requests scored concurrently
    pub workers: usize,
    /// Seconds between metrics summaries (0 disables the reporter)
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: u64,
}

fn default_metrics_interval() -> u64 {
    30
}

/// Meta-learner training configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    /// Label column in the training CSV
    #[serde(default = "default_label_column")]
    pub label_column: String,
    /// Fraction of rows held out for threshold tuning
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub meta_learner: TrainerConfig,
}

fn default_label_column() -> String {
    crate::data::DEFAULT_LABEL_COLUMN.to_string()
}

fn default_test_fraction() -> f64 {
    0.3
}

fn default_seed() -> u64 {
    42
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl LoggingConfig {
    /// Install the global `tracing` subscriber. `RUST_LOG` overrides `level`.
    pub fn init(&self) -> Result<()> {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .with_context(|| format!("Invalid log level '{}'", self.level))?;
        let builder = tracing_subscriber::fmt().with_env_filter(filter);

        match self.format.as_str() {
            "json" => builder.json().try_init(),
            "pretty" => builder.pretty().try_init(),
            other => bail!("Unknown log format '{}' (expected json or pretty)", other),
        }
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
    }
}

impl AppConfig {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load from the path given as the first CLI argument, else the default path
    pub fn load_from_args() -> Result<Self> {
        match std::env::args().nth(1) {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        let config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would only fail later, mid-request.
    pub fn validate(&self) -> Result<()> {
        self.schema.feature_schema()?;

        if self.pipeline.workers == 0 {
            bail!("pipeline.workers must be at least 1");
        }

        let bands = &self.detection.risk_levels;
        if !(0.0 <= bands.medium
            && bands.medium <= bands.high
            && bands.high <= bands.critical
            && bands.critical <= 1.0)
        {
            bail!(
                "risk levels must satisfy 0 <= medium <= high <= critical <= 1 (got {}, {}, {})",
                bands.medium,
                bands.high,
                bands.critical
            );
        }

        if self.scoring.strategy == InferenceStrategy::Single {
            let name = self
                .scoring
                .single_model
                .as_deref()
                .context("scoring.single_model is required for the single strategy")?;
            if self.models.find(name).is_none() {
                bail!("scoring.single_model '{}' is not listed in models.base", name);
            }
        }

        Ok(())
    }

    pub fn models_dir(&self) -> PathBuf {
        PathBuf::from(&self.models.models_dir)
    }

    /// Artifact path; relative paths are taken from the working directory.
    pub fn artifact_path(&self) -> PathBuf {
        PathBuf::from(&self.scoring.artifact)
    }
}

impl Default for AppConfig {
    /// Stacking over five tree/linear base learners plus the CNN and LSTM scorers.
    fn default() -> Self {
        let base = ["DecisionTree", "RandomForest", "LogisticRegression", "XGBoost", "LightGBM"]
            .into_iter()
            .map(|name| {
                let path = format!("models2deploy-td-mlmodels/{}_model.onnx", name);
                ModelSpec::onnx(name, &path, InputShape::Flat)
            })
            .chain([
                ModelSpec::onnx(
                    "CNN",
                    "models2deploy-dl/CNN.onnx",
                    InputShape::Grid {
                        rows: 5,
                        cols: 6,
                        channels: 1,
                    },
                ),
                ModelSpec::onnx(
                    "LSTM",
                    "models2deploy-dl/LSTM.onnx",
                    InputShape::Sequence {
                        steps: 30,
                        channels: 1,
                    },
                ),
            ])
            .collect();

        Self {
            nats: NatsConfig {
                url: "nats://localhost:4222".to_string(),
                request_subject: "scoring.requests".to_string(),
                queue_group: "stacking-scorers".to_string(),
                alert_subject: "fraud.alerts".to_string(),
            },
            schema: SchemaConfig {
                columns: credit_card_columns(),
            },
            models: ModelsConfig {
                models_dir: "models".to_string(),
                onnx_threads: default_onnx_threads(),
                base,
            },
            scoring: ScoringConfig {
                strategy: InferenceStrategy::Stacking,
                artifact: "models/stacking-model-dl/stacking_model_random_forest_dl.json"
                    .to_string(),
                single_model: Some("LSTM".to_string()),
            },
            detection: DetectionConfig {
                risk_levels: RiskLevelThresholds::default(),
            },
            pipeline: PipelineConfig {
                workers: 4,
                metrics_interval_secs: default_metrics_interval(),
            },
            training: TrainingConfig {
                label_column: default_label_column(),
                test_fraction: default_test_fraction(),
                seed: default_seed(),
                meta_learner: TrainerConfig::default(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.nats.url, "nats://localhost:4222");
        assert_eq!(config.scoring.strategy, InferenceStrategy::Stacking);
        assert_eq!(config.models.base.len(), 7);
        assert_eq!(config.models.base[5].name, "CNN");
        assert_eq!(config.models.base[6].input_shape.element_count(), Some(30));
        assert_eq!(config.schema.columns.len(), 30);
        assert_eq!(config.training.test_fraction, 0.3);
        assert_eq!(config.training.seed, 42);
        config.validate().unwrap();
    }

    #[test]
    fn test_load_from_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[nats]
url = "nats://nats:4222"
request_subject = "score"
queue_group = "scorers"
alert_subject = "alerts"

[schema]
columns = ["V1", "V2", "Amount"]

[models]
models_dir = "/srv/models"

[[models.base]]
name = "XGBoost"
path = "XGBoost_model.onnx"

[[models.base]]
name = "LSTM"
path = "LSTM.onnx"
input_shape = {{ kind = "sequence", steps = 3, channels = 1 }}

[[models.base]]
name = "LR"
path = "lr.json"
format = "logistic"

[scoring]
strategy = "single"
artifact = "stacking.json"
single_model = "LSTM"

[detection.risk_levels]
medium = 0.4
high = 0.6
critical = 0.8

[pipeline]
workers = 8

[logging]
level = "debug"
format = "pretty"
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.nats.queue_group, "scorers");
        assert_eq!(config.models.onnx_threads, 1);
        assert_eq!(config.models.base.len(), 3);
        assert_eq!(
            config.models.base[1].input_shape,
            InputShape::Sequence {
                steps: 3,
                channels: 1
            }
        );
        assert_eq!(config.models.base[2].format, crate::models::loader::ModelFormat::Logistic);
        assert_eq!(config.scoring.strategy, InferenceStrategy::Single);
        assert_eq!(config.pipeline.metrics_interval_secs, 30);
        // Omitted section falls back to defaults
        assert_eq!(config.training.label_column, "Class");
    }

    #[test]
    fn test_single_strategy_needs_known_model() {
        let mut config = AppConfig::default();
        config.scoring.strategy = InferenceStrategy::Single;
        config.scoring.single_model = Some("GRU".to_string());
        assert!(config.validate().is_err());

        config.scoring.single_model = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unordered_risk_levels() {
        let mut config = AppConfig::default();
        config.detection.risk_levels.high = 0.95;
        assert!(config.validate().is_err());
    }
}
