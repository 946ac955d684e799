//! Declarative usecases read from JSON definitions
//!
//! ```json
//! {
//!   "name": "ssh-bruteforce",
//!   "query": { "index": "auth-*", "body": { "query": { "match": { "event": "fail" } } } },
//!   "threshold": { "gte": "now-1d/d", "lte": "now", "fields": ["attacker_ip", "target_user"] },
//!   "mapping": { "human_time": "@timestamp", "attacker_ip": "source.ip", "target_user": "user.name" },
//!   "description": "SSH brute force",
//!   "extra_values": ["ssh", { "field": "session.id" }]
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{MapError, QuerySpec, Threshold, Usecase, UsecaseError};
use crate::alerts::Alert;

/// Where alert fields are read from in a hit's `_source`.
///
/// Paths are dotted; a literal dotted key wins over nested lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub human_time: String,
    #[serde(default)]
    pub attacker_ip: Option<String>,
    #[serde(default)]
    pub target_ip: Option<String>,
    #[serde(default)]
    pub target_user: Option<String>,
    #[serde(default)]
    pub alert_desc: Option<String>,
}

/// Extra display value: a literal, or a lookup into the hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueSource {
    Literal(String),
    Field { field: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefinitionUsecase {
    pub name: String,
    pub query: QuerySpec,
    #[serde(default)]
    pub threshold: Threshold,
    pub mapping: FieldMapping,
    /// Alert description used when the mapping has no `alert_desc` path
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub extra_values: Vec<ValueSource>,
}

impl DefinitionUsecase {
    pub fn from_json(name: &str, content: &str) -> Result<Self, UsecaseError> {
        let definition: Self =
            serde_json::from_str(content).map_err(|e| UsecaseError::Definition {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        if definition.name.trim().is_empty() {
            return Err(UsecaseError::Definition {
                name: name.to_string(),
                reason: "empty usecase name".to_string(),
            });
        }
        Ok(definition)
    }
}

impl Usecase for DefinitionUsecase {
    fn name(&self) -> &str {
        &self.name
    }

    fn query(&self) -> &QuerySpec {
        &self.query
    }

    fn threshold(&self) -> &Threshold {
        &self.threshold
    }

    fn extra_values(&self) -> Vec<String> {
        self.extra_values
            .iter()
            .filter_map(|source| match source {
                ValueSource::Literal(value) => Some(value.clone()),
                ValueSource::Field { .. } => None,
            })
            .collect()
    }

    fn map_hit(&self, hit: &Value) -> Result<Alert, MapError> {
        let human_time = lookup(hit, &self.mapping.human_time)?
            .ok_or_else(|| MapError::MissingField(self.mapping.human_time.clone()))?;

        let optional = |path: &Option<String>| -> Result<Option<String>, MapError> {
            match path {
                Some(path) => lookup(hit, path),
                None => Ok(None),
            }
        };

        let mut alert = Alert::new(self.name.clone(), human_time);
        if let Some(ip) = optional(&self.mapping.attacker_ip)? {
            alert = alert.with_attacker_ip(ip);
        }
        if let Some(ip) = optional(&self.mapping.target_ip)? {
            alert = alert.with_target_ip(ip);
        }
        if let Some(user) = optional(&self.mapping.target_user)? {
            alert = alert.with_target_user(user);
        }
        match optional(&self.mapping.alert_desc)? {
            Some(desc) => alert = alert.with_alert_desc(desc),
            None => {
                if let Some(desc) = &self.description {
                    alert = alert.with_alert_desc(desc.clone());
                }
            }
        }

        let mut extra = Vec::with_capacity(self.extra_values.len());
        for source in &self.extra_values {
            match source {
                ValueSource::Literal(value) => extra.push(value.clone()),
                ValueSource::Field { field } => {
                    extra.push(lookup(hit, field)?.unwrap_or_default());
                }
            }
        }
        Ok(alert.with_extra_values(extra))
    }
}

/// Read a dotted path from a hit as a string.
///
/// Missing values and nulls give `Ok(None)`. Arrays yield their first element.
pub fn lookup(hit: &Value, path: &str) -> Result<Option<String>, MapError> {
    let value = match hit.get(path) {
        Some(value) => Some(value),
        None => path
            .split('.')
            .try_fold(hit, |node, key| node.get(key)),
    };

    let value = match value {
        Some(Value::Array(items)) => items.first(),
        other => other,
    };

    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(MapError::NotScalar {
            path: path.to_string(),
            value: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertField, UNKNOWN_IP};
    use serde_json::json;

    const SSH: &str = r#"{
        "name": "ssh-bruteforce",
        "query": { "index": "auth-*", "body": { "query": { "match": { "event": "fail" } } } },
        "threshold": { "gte": "now-1d/d", "fields": ["attacker_ip", "target_user"] },
        "mapping": {
            "human_time": "@timestamp",
            "attacker_ip": "source.ip",
            "target_user": "user.name"
        },
        "description": "SSH brute force",
        "extra_values": ["ssh", { "field": "session.id" }]
    }"#;

    #[test]
    fn test_parse_definition() {
        let uc = DefinitionUsecase::from_json("ssh-bruteforce", SSH).unwrap();
        assert_eq!(uc.name(), "ssh-bruteforce");
        assert_eq!(uc.query().index, "auth-*");
        assert_eq!(
            uc.threshold().fields,
            vec![AlertField::AttackerIp, AlertField::TargetUser]
        );
        assert_eq!(uc.extra_values(), vec!["ssh".to_string()]);
    }

    #[test]
    fn test_map_hit() {
        let uc = DefinitionUsecase::from_json("ssh-bruteforce", SSH).unwrap();
        let hit = json!({
            "@timestamp": "2024-01-01T00:00:00Z",
            "source": { "ip": "10.0.0.1" },
            "user": { "name": "root" },
            "session": { "id": 42 }
        });

        let alert = uc.map_hit(&hit).unwrap();
        assert_eq!(alert.name(), "ssh-bruteforce");
        assert_eq!(alert.human_time(), "2024-01-01T00:00:00Z");
        assert_eq!(alert.attacker_ip(), "10.0.0.1");
        assert_eq!(alert.target_ip(), UNKNOWN_IP);
        assert_eq!(alert.target_user(), "root");
        assert_eq!(alert.alert_desc(), "SSH brute force");
        assert_eq!(alert.extra_values(), ["ssh".to_string(), "42".to_string()]);
    }

    #[test]
    fn test_map_hit_missing_human_time() {
        let uc = DefinitionUsecase::from_json("ssh-bruteforce", SSH).unwrap();
        let result = uc.map_hit(&json!({ "source": { "ip": "10.0.0.1" } }));
        assert!(matches!(result, Err(MapError::MissingField(path)) if path == "@timestamp"));
    }

    #[test]
    fn test_lookup() {
        let hit = json!({
            "source.ip": "1.1.1.1",
            "source": { "ip": "2.2.2.2", "ports": [22, 2222] },
            "tags": { "list": ["a"] },
            "nested": { "obj": { "x": 1 } },
            "empty": null
        });
        assert_eq!(lookup(&hit, "source.ip").unwrap().as_deref(), Some("1.1.1.1"));
        assert_eq!(lookup(&hit, "source.ports").unwrap().as_deref(), Some("22"));
        assert_eq!(lookup(&hit, "tags.list").unwrap().as_deref(), Some("a"));
        assert_eq!(lookup(&hit, "empty").unwrap(), None);
        assert_eq!(lookup(&hit, "missing.path").unwrap(), None);
        assert!(lookup(&hit, "nested.obj").is_err());
    }

    #[test]
    fn test_invalid_definitions() {
        let unknown_field = r#"{
            "name": "uc", "query": { "index": "i" },
            "threshold": { "fields": ["hostname"] },
            "mapping": { "human_time": "t" }
        }"#;
        assert!(matches!(
            DefinitionUsecase::from_json("uc", unknown_field),
            Err(UsecaseError::Definition { .. })
        ));

        let no_mapping = r#"{ "name": "uc", "query": { "index": "i" } }"#;
        assert!(DefinitionUsecase::from_json("uc", no_mapping).is_err());

        let blank_name = r#"{ "name": " ", "query": { "index": "i" }, "mapping": { "human_time": "t" } }"#;
        assert!(DefinitionUsecase::from_json("uc", blank_name).is_err());
    }
}
