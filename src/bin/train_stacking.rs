//! Meta-learner training
//!
//! Fits the stacking meta-learner on a labelled CSV using the configured base
//! models, tunes the F1-optimal threshold on a stratified holdout and writes
//! the artifact the scoring service loads.
//!
//! Usage: train_stacking <data.csv> [config.toml] [artifact.json] [model_name]

use anyhow::{bail, Context, Result};
use fraud_stacking_pipeline::{
    config::{AppConfig, DEFAULT_CONFIG_PATH},
    data::LabeledRows,
    models::{InputShape, ModelLoader},
    stacking::{MetaFeatureAssembler, MetaLearnerTrainer},
    FeatureExtractor,
};
use std::path::PathBuf;
use tracing::info;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let Some(data_path) = args.get(1) else {
        bail!("usage: train_stacking <data.csv> [config.toml] [artifact.json] [model_name]");
    };
    let config_path = args.get(2).map(String::as_str).unwrap_or(DEFAULT_CONFIG_PATH);

    let config = AppConfig::load_from_path(config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;
    config.logging.init()?;

    let output = args
        .get(3)
        .map(PathBuf::from)
        .unwrap_or_else(|| config.artifact_path());
    let includes_dl = config
        .models
        .base
        .iter()
        .any(|spec| spec.input_shape != InputShape::Flat);
    let model_name = args.get(4).cloned().unwrap_or_else(|| {
        if includes_dl {
            "Stacking_LR_DL_model".to_string()
        } else {
            "Stacking_LR_model".to_string()
        }
    });

    info!(
        data = %data_path,
        output = %output.display(),
        model_name = %model_name,
        "Starting meta-learner training"
    );

    let schema = config.schema.feature_schema()?;
    let extractor = FeatureExtractor::new(schema.clone());
    let data = LabeledRows::from_csv(data_path, &extractor, &config.training.label_column)?;
    let (train, holdout) =
        data.stratified_split(config.training.test_fraction, config.training.seed)?;
    info!(
        train_rows = train.len(),
        train_positives = train.positives(),
        holdout_rows = holdout.len(),
        holdout_positives = holdout.positives(),
        "Stratified split"
    );

    let mut loader = ModelLoader::with_threads(config.models.onnx_threads);
    let base = loader
        .load_all(config.models_dir(), &config.models.base)
        .context("Failed to load base models")?;
    let assembler = MetaFeatureAssembler::new(schema, base)?;

    let trainer = MetaLearnerTrainer::new(config.training.meta_learner.clone());
    let outcome = trainer.train(&model_name, &assembler, &train, &holdout)?;

    info!("Holdout classification report:\n{}", outcome.report);
    outcome.artifact.save(&output)?;

    info!(
        path = %output.display(),
        threshold = outcome.selection.threshold,
        f1 = outcome.selection.f1,
        "Training complete"
    );

    Ok(())
}
