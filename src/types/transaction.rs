//! Transaction records as received from callers

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single transaction to score: named numeric features plus an optional id.
///
/// Field order in the incoming JSON carries no meaning; the feature extractor
/// places each value by name according to the configured schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Caller-supplied record identifier, echoed back on the response
    #[serde(default, alias = "ID", skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,

    /// Feature name to value
    #[serde(flatten)]
    pub features: BTreeMap<String, f64>,
}

impl Transaction {
    /// Create an anonymous transaction from feature pairs
    pub fn from_features<I, K>(features: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        Self {
            transaction_id: None,
            features: features.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn with_id(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.features.get(name).copied()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.features.insert(name.into(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_flat_record() {
        let json = r#"{"ID": "tx_42", "V1": -1.35, "Amount": 149.62, "hour_of_day": 3}"#;
        let tx: Transaction = serde_json::from_str(json).unwrap();

        assert_eq!(tx.transaction_id.as_deref(), Some("tx_42"));
        assert_eq!(tx.get("V1"), Some(-1.35));
        assert_eq!(tx.get("hour_of_day"), Some(3.0));
        assert_eq!(tx.features.len(), 3);
    }

    #[test]
    fn test_rejects_non_numeric_feature() {
        let json = r#"{"V1": "abc"}"#;
        assert!(serde_json::from_str::<Transaction>(json).is_err());
    }

    #[test]
    fn test_serialization() {
        let tx = Transaction::from_features([("V1", 0.5), ("Amount", 10.0)]).with_id("tx_1");

        let json = serde_json::to_string(&tx).unwrap();
        let deserialized: Transaction = serde_json::from_str(&json).unwrap();

        assert_eq!(tx, deserialized);
    }
}
