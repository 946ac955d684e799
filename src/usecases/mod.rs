//! Usecases: named detection rules
//!
//! A usecase supplies a detection query, a mapper turning query hits into
//! [`Alert`]s, and the threshold configuration used to deduplicate them.
//! How a usecase is obtained (definition file, compiled-in plugin) is hidden
//! behind [`UsecaseLoader`].

pub mod definition;
pub mod loader;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::alerts::{Alert, AlertField};
use crate::store::TimeBound;

pub use definition::{DefinitionUsecase, FieldMapping, ValueSource};
pub use loader::{usecase_key, DirectoryLoader, UsecaseLoader, UsecaseRegistry};

/// Detection query: target index and backend DSL body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub index: String,
    #[serde(default = "match_all")]
    pub body: Value,
}

fn match_all() -> Value {
    serde_json::json!({ "query": { "match_all": {} } })
}

/// Lookback window and comparison key for deduplication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Threshold {
    #[serde(default = "default_gte")]
    pub gte: TimeBound,
    #[serde(default = "TimeBound::now")]
    pub lte: TimeBound,
    /// Empty means every alert is new
    #[serde(default)]
    pub fields: Vec<AlertField>,
}

fn default_gte() -> TimeBound {
    TimeBound::Millis(0)
}

impl Default for Threshold {
    fn default() -> Self {
        Self {
            gte: default_gte(),
            lte: TimeBound::now(),
            fields: Vec::new(),
        }
    }
}

/// Plugin contract every usecase implements
pub trait Usecase: Send + Sync {
    fn name(&self) -> &str;

    fn query(&self) -> &QuerySpec;

    fn threshold(&self) -> &Threshold;

    /// Display values attached to alerts read back from the write-back index
    fn extra_values(&self) -> Vec<String> {
        Vec::new()
    }

    /// Turn one query hit (`_source`) into an alert
    fn map_hit(&self, hit: &Value) -> Result<Alert, MapError>;
}

#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("Hit has no value at {0}")]
    MissingField(String),

    #[error("Hit value at {path} is not a scalar: {value}")]
    NotScalar { path: String, value: String },
}

#[derive(Debug, thiserror::Error)]
pub enum UsecaseError {
    #[error("Usecase not found: {0}")]
    NotFound(String),

    #[error("Invalid usecase name: {0}")]
    InvalidName(String),

    #[error("Cannot read usecase {name}: {reason}")]
    Read { name: String, reason: String },

    #[error("Invalid usecase definition {name}: {reason}")]
    Definition { name: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_defaults() {
        let threshold: Threshold = serde_json::from_str("{}").unwrap();
        assert_eq!(threshold, Threshold::default());
        assert_eq!(threshold.gte, TimeBound::Millis(0));
        assert_eq!(threshold.lte, TimeBound::now());
        assert!(threshold.fields.is_empty());
    }

    #[test]
    fn test_threshold_fields_must_be_persisted_fields() {
        let ok: Threshold =
            serde_json::from_str(r#"{ "gte": "now-1d", "fields": ["attacker_ip", "target_user"] }"#)
                .unwrap();
        assert_eq!(ok.fields, vec![AlertField::AttackerIp, AlertField::TargetUser]);

        assert!(serde_json::from_str::<Threshold>(r#"{ "fields": ["@timestamp"] }"#).is_err());
        assert!(serde_json::from_str::<Threshold>(r#"{ "fields": ["extra_values"] }"#).is_err());
    }

    #[test]
    fn test_query_body_default() {
        let query: QuerySpec = serde_json::from_str(r#"{ "index": "logs-*" }"#).unwrap();
        assert_eq!(query.body, match_all());
    }
}
