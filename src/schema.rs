//! Named, ordered column schemas.
//!
//! Two schemas pin the column order between training and serving:
//! [`FeatureSchema`] for the raw input vector fed to every base model, and
//! [`MetaSchema`] for the meta-feature vector fed to the meta-learner. Both are
//! persisted inside the stacking artifact and compared on load.

use crate::error::{Result, ScoringError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Name of the derived hour column.
pub const HOUR_OF_DAY: &str = "hour_of_day";

/// Raw elapsed-seconds column the hour is derived from.
pub const TIME: &str = "Time";

/// Column order used by the credit-card models: `V1..V28`, `Amount`, `hour_of_day`.
pub fn credit_card_columns() -> Vec<String> {
    (1..=28)
        .map(|i| format!("V{}", i))
        .chain(["Amount".to_string(), HOUR_OF_DAY.to_string()])
        .collect()
}

fn check_columns(kind: &str, columns: &[String]) -> Result<()> {
    if columns.is_empty() {
        return Err(ScoringError::validation(format!("{} schema has no columns", kind)));
    }
    let mut seen = HashSet::with_capacity(columns.len());
    for column in columns {
        if column.trim().is_empty() {
            return Err(ScoringError::validation(format!(
                "{} schema contains an empty column name",
                kind
            )));
        }
        if !seen.insert(column.as_str()) {
            return Err(ScoringError::validation(format!(
                "{} schema contains duplicate column '{}'",
                kind, column
            )));
        }
    }
    Ok(())
}

fn compare_columns(kind: &str, expected: &[String], actual: &[String]) -> Result<()> {
    if expected.len() != actual.len() {
        return Err(ScoringError::schema_mismatch(format!(
            "{} schema has {} columns, expected {}",
            kind,
            actual.len(),
            expected.len()
        )));
    }
    if let Some((pos, (e, a))) = expected
        .iter()
        .zip(actual)
        .enumerate()
        .find(|(_, (e, a))| e != a)
    {
        return Err(ScoringError::schema_mismatch(format!(
            "{} column {} is '{}', expected '{}'",
            kind, pos, a, e
        )));
    }
    Ok(())
}

/// Ordered input columns shared by every base model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct FeatureSchema {
    columns: Vec<String>,
}

impl FeatureSchema {
    pub fn new(columns: Vec<String>) -> Result<Self> {
        check_columns("feature", &columns)?;
        Ok(Self { columns })
    }

    pub fn credit_card() -> Self {
        Self {
            columns: credit_card_columns(),
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Check a flat vector against this schema: exact width, finite values.
    pub fn validate_vector(&self, features: &[f32]) -> Result<()> {
        if features.len() != self.columns.len() {
            return Err(ScoringError::validation(format!(
                "feature vector has {} values, schema expects {}",
                features.len(),
                self.columns.len()
            )));
        }
        if let Some(pos) = features.iter().position(|v| !v.is_finite()) {
            return Err(ScoringError::validation(format!(
                "feature '{}' is not a finite number",
                self.columns[pos]
            )));
        }
        Ok(())
    }

    /// Fail unless `other` has the same columns in the same order.
    pub fn ensure_matches(&self, other: &FeatureSchema) -> Result<()> {
        compare_columns("feature", &self.columns, &other.columns)
    }
}

impl TryFrom<Vec<String>> for FeatureSchema {
    type Error = ScoringError;

    fn try_from(columns: Vec<String>) -> Result<Self> {
        Self::new(columns)
    }
}

impl From<FeatureSchema> for Vec<String> {
    fn from(schema: FeatureSchema) -> Self {
        schema.columns
    }
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::credit_card()
    }
}

/// Ordered constituent model names; position `i` of a meta-feature vector is
/// the class-1 probability of model `i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct MetaSchema {
    models: Vec<String>,
}

impl MetaSchema {
    pub fn new(models: Vec<String>) -> Result<Self> {
        check_columns("meta-feature", &models)?;
        Ok(Self { models })
    }

    pub fn width(&self) -> usize {
        self.models.len()
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn validate_vector(&self, meta: &[f32]) -> Result<()> {
        if meta.len() != self.models.len() {
            return Err(ScoringError::schema_mismatch(format!(
                "meta-feature vector has {} values, ensemble has {} models",
                meta.len(),
                self.models.len()
            )));
        }
        Ok(())
    }

    pub fn ensure_matches(&self, other: &MetaSchema) -> Result<()> {
        compare_columns("meta-feature", &self.models, &other.models)
    }
}

impl TryFrom<Vec<String>> for MetaSchema {
    type Error = ScoringError;

    fn try_from(models: Vec<String>) -> Result<Self> {
        Self::new(models)
    }
}

impl From<MetaSchema> for Vec<String> {
    fn from(schema: MetaSchema) -> Self {
        schema.models
    }
}
