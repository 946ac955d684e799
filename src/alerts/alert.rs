//! Alert record and its wire-line serialization

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sentinel address meaning "unknown"
pub const UNKNOWN_IP: &str = "0.0.0.0";

/// Fixed prefix of every wire line (syslog priority + offense tag)
pub const WIRE_PREFIX: &str = "<133>[qradar-offense]";

/// Document key holding the creation timestamp
pub const TIMESTAMP_KEY: &str = "@timestamp";

/// Persisted alert fields that can take part in a threshold comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertField {
    Name,
    HumanTime,
    AttackerIp,
    TargetIp,
    TargetUser,
    AlertDesc,
}

impl AlertField {
    pub const ALL: [AlertField; 6] = [
        AlertField::Name,
        AlertField::HumanTime,
        AlertField::AttackerIp,
        AlertField::TargetIp,
        AlertField::TargetUser,
        AlertField::AlertDesc,
    ];

    /// Document key for this field
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertField::Name => "name",
            AlertField::HumanTime => "human_time",
            AlertField::AttackerIp => "attacker_ip",
            AlertField::TargetIp => "target_ip",
            AlertField::TargetUser => "target_user",
            AlertField::AlertDesc => "alert_desc",
        }
    }
}

impl fmt::Display for AlertField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertField {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AlertField::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| DocumentError::UnknownField(s.to_string()))
    }
}

/// One detected event.
///
/// Built once, either from a usecase hit or from a stored document, and not
/// mutated afterwards. `extra_values` are display-only and never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    timestamp: DateTime<Utc>,
    name: String,
    human_time: String,
    attacker_ip: String,
    target_ip: String,
    target_user: String,
    alert_desc: String,
    extra_values: Vec<String>,
}

impl Alert {
    /// Create an alert stamped with the current UTC time
    pub fn new(name: impl Into<String>, human_time: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            name: name.into(),
            human_time: human_time.into(),
            attacker_ip: UNKNOWN_IP.to_string(),
            target_ip: UNKNOWN_IP.to_string(),
            target_user: String::new(),
            alert_desc: String::new(),
            extra_values: Vec::new(),
        }
    }

    pub fn with_attacker_ip(mut self, ip: impl Into<String>) -> Self {
        self.attacker_ip = ip.into();
        self
    }

    pub fn with_target_ip(mut self, ip: impl Into<String>) -> Self {
        self.target_ip = ip.into();
        self
    }

    pub fn with_target_user(mut self, user: impl Into<String>) -> Self {
        self.target_user = user.into();
        self
    }

    pub fn with_alert_desc(mut self, desc: impl Into<String>) -> Self {
        self.alert_desc = desc.into();
        self
    }

    pub fn with_extra_values(mut self, values: Vec<String>) -> Self {
        self.extra_values = values;
        self
    }

    /// Override the creation timestamp (used when rehydrating stored alerts)
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn human_time(&self) -> &str {
        &self.human_time
    }

    pub fn attacker_ip(&self) -> &str {
        &self.attacker_ip
    }

    pub fn target_ip(&self) -> &str {
        &self.target_ip
    }

    pub fn target_user(&self) -> &str {
        &self.target_user
    }

    pub fn alert_desc(&self) -> &str {
        &self.alert_desc
    }

    pub fn extra_values(&self) -> &[String] {
        &self.extra_values
    }

    /// Value of a persisted field
    pub fn field(&self, field: AlertField) -> &str {
        match field {
            AlertField::Name => &self.name,
            AlertField::HumanTime => &self.human_time,
            AlertField::AttackerIp => &self.attacker_ip,
            AlertField::TargetIp => &self.target_ip,
            AlertField::TargetUser => &self.target_user,
            AlertField::AlertDesc => &self.alert_desc,
        }
    }

    /// Format the alert as a single syslog line.
    ///
    /// Field values are written as-is; a `]` inside a value is not escaped.
    pub fn to_wire_line(&self) -> String {
        let mut line = format!(
            "{} [{}] [{}] [{}] [{}] [{}] [{}]",
            WIRE_PREFIX,
            self.alert_desc,
            self.human_time,
            self.attacker_ip,
            self.target_ip,
            self.target_user,
            self.name,
        );
        for value in &self.extra_values {
            line.push_str(" [");
            line.push_str(value);
            line.push(']');
        }
        line
    }

    /// Flat document written to the write-back index
    pub fn to_document(&self) -> Value {
        let mut doc = Map::new();
        doc.insert(
            TIMESTAMP_KEY.to_string(),
            Value::String(self.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        );
        for field in AlertField::ALL {
            doc.insert(
                field.as_str().to_string(),
                Value::String(self.field(field).to_string()),
            );
        }
        Value::Object(doc)
    }

    /// Rebuild an alert from a stored document.
    ///
    /// Missing string fields take the same defaults as [`Alert::new`].
    pub fn from_document(doc: &Value, extra_values: Vec<String>) -> Result<Self, DocumentError> {
        let obj = doc.as_object().ok_or(DocumentError::NotAnObject)?;

        let raw_ts = obj
            .get(TIMESTAMP_KEY)
            .and_then(Value::as_str)
            .ok_or(DocumentError::MissingTimestamp)?;
        let timestamp = parse_timestamp(raw_ts)
            .ok_or_else(|| DocumentError::InvalidTimestamp(raw_ts.to_string()))?;

        let text = |field: AlertField| -> Result<Option<String>, DocumentError> {
            match obj.get(field.as_str()) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::String(s)) => Ok(Some(s.clone())),
                Some(other) => Err(DocumentError::InvalidField {
                    field: field.as_str(),
                    value: other.to_string(),
                }),
            }
        };

        let name = text(AlertField::Name)?.ok_or(DocumentError::MissingField("name"))?;
        let human_time = text(AlertField::HumanTime)?.unwrap_or_default();

        let mut alert = Alert::new(name, human_time)
            .with_timestamp(timestamp)
            .with_extra_values(extra_values);
        if let Some(ip) = text(AlertField::AttackerIp)? {
            alert = alert.with_attacker_ip(ip);
        }
        if let Some(ip) = text(AlertField::TargetIp)? {
            alert = alert.with_target_ip(ip);
        }
        if let Some(user) = text(AlertField::TargetUser)? {
            alert = alert.with_target_user(user);
        }
        if let Some(desc) = text(AlertField::AlertDesc)? {
            alert = alert.with_alert_desc(desc);
        }
        Ok(alert)
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire_line())
    }
}

// Older documents were written with a naive ISO-8601 timestamp (no offset).
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Errors converting between alerts and stored documents
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Document is not a JSON object")]
    NotAnObject,

    #[error("Document has no @timestamp field")]
    MissingTimestamp,

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Document has no {0} field")]
    MissingField(&'static str),

    #[error("Field {field} is not a string: {value}")]
    InvalidField { field: &'static str, value: String },

    #[error("Unknown alert field: {0}")]
    UnknownField(String),
}
