//! Labelled training data loaded from CSV.

use crate::error::{Result, ScoringError};
use crate::feature_extractor::FeatureExtractor;
use crate::types::transaction::Transaction;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::path::Path;
use tracing::info;

/// Default label column of the credit-card dataset.
pub const DEFAULT_LABEL_COLUMN: &str = "Class";

/// Columns treated as record identifiers rather than features.
const ID_COLUMNS: [&str; 2] = ["ID", "transaction_id"];

/// Feature rows in schema order, with their binary labels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabeledRows {
    pub rows: Vec<Vec<f32>>,
    pub labels: Vec<u8>,
}

impl LabeledRows {
    pub fn new(rows: Vec<Vec<f32>>, labels: Vec<u8>) -> Result<Self> {
        if rows.len() != labels.len() {
            return Err(ScoringError::validation(format!(
                "{} rows but {} labels",
                rows.len(),
                labels.len()
            )));
        }
        Ok(Self { rows, labels })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|&&l| l == 1).count()
    }

    /// Read a CSV whose header names the schema columns and `label_column`.
    ///
    /// Each row goes through the same [`FeatureExtractor`] used at serving
    /// time, so `hour_of_day` is derived from `Time` identically.
    pub fn from_csv<P: AsRef<Path>>(
        path: P,
        extractor: &FeatureExtractor,
        label_column: &str,
    ) -> Result<Self> {
        let path = path.as_ref();
        let csv_err = |e: csv::Error| {
            ScoringError::validation(format!("{}: {}", path.display(), e))
        };

        let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
        let headers = reader.headers().map_err(csv_err)?.clone();
        let label_idx = headers
            .iter()
            .position(|h| h == label_column)
            .ok_or_else(|| {
                ScoringError::validation(format!(
                    "{} has no label column '{}'",
                    path.display(),
                    label_column
                ))
            })?;

        let mut data = LabeledRows::default();
        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(csv_err)?;
            // header is line 1
            let at = |msg: String| ScoringError::validation(format!("line {}: {}", line + 2, msg));

            let mut tx = Transaction::default();
            let mut label = None;
            for (idx, (header, raw)) in headers.iter().zip(record.iter()).enumerate() {
                let raw = raw.trim();
                if idx == label_idx {
                    label = Some(parse_label(raw).map_err(at)?);
                } else if ID_COLUMNS.contains(&header) {
                    tx.transaction_id = Some(raw.to_string());
                } else {
                    let value: f64 = raw
                        .parse()
                        .map_err(|_| {
                            at(format!("'{}' is not a number in column '{}'", raw, header))
                        })?;
                    tx.insert(header, value);
                }
            }

            let label = label.ok_or_else(|| at("row has no label".to_string()))?;
            let features = extractor.extract(&tx).map_err(|e| at(e.to_string()))?;
            data.rows.push(features);
            data.labels.push(label);
        }

        info!(
            path = %path.display(),
            rows = data.len(),
            positives = data.positives(),
            "Loaded labelled data"
        );

        Ok(data)
    }

    /// Split into (train, test), preserving the class ratio in both parts.
    ///
    /// Each class contributes `round(n * test_fraction)` rows to the test
    /// split, chosen by a shuffle seeded with `seed`.
    pub fn stratified_split(&self, test_fraction: f64, seed: u64) -> Result<(Self, Self)> {
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(ScoringError::validation(format!(
                "test fraction {} must be in (0, 1)",
                test_fraction
            )));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut train_idx = Vec::new();
        let mut test_idx = Vec::new();

        for class in [0u8, 1] {
            let mut indices: Vec<usize> = self
                .labels
                .iter()
                .enumerate()
                .filter(|(_, &l)| l == class)
                .map(|(i, _)| i)
                .collect();
            indices.shuffle(&mut rng);

            let n_test = (indices.len() as f64 * test_fraction).round() as usize;
            test_idx.extend_from_slice(&indices[..n_test]);
            train_idx.extend_from_slice(&indices[n_test..]);
        }

        train_idx.sort_unstable();
        test_idx.sort_unstable();

        if train_idx.is_empty() || test_idx.is_empty() {
            return Err(ScoringError::validation(format!(
                "{} rows are too few to split with test fraction {}",
                self.len(),
                test_fraction
            )));
        }

        Ok((self.select(&train_idx), self.select(&test_idx)))
    }

    fn select(&self, indices: &[usize]) -> Self {
        Self {
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }
}

fn parse_label(raw: &str) -> std::result::Result<u8, String> {
    let trimmed = raw.trim_matches('"');
    match trimmed.parse::<f64>() {
        Ok(v) if v == 0.0 => Ok(0),
        Ok(v) if v == 1.0 => Ok(1),
        _ => Err(format!("label '{}' is not 0 or 1", raw)),
    }
}
