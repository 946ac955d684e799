//! In-process backend holding documents per index.
//!
//! Understands the subset of the query DSL the engine emits itself:
//! `match_all`, `bool.filter` made of `term` and `range` clauses, `from` and
//! `size`. Documents come back in insertion order; `sort` is ignored. Range
//! bounds are resolved when they are epoch milliseconds, RFC 3339 dates,
//! `now` or `now-<n><unit>` (units `s m h d w`, optional `/d` rounding).
//! As in Elasticsearch, `/d` rounds `gte` down to the start of the day and
//! `lte` up to its last millisecond. Any other expression, or an offset
//! outside chrono's range, leaves that side of the range open.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::RwLock;
use serde_json::Value;

use super::{BackendError, SearchBackend};
use crate::alerts::alert::parse_timestamp;

#[derive(Debug, Default)]
pub struct MemoryBackend {
    indices: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace an index's content
    pub fn load(&self, index: &str, documents: Vec<Value>) {
        self.indices.write().insert(index.to_string(), documents);
    }

    /// All documents in an index, in insertion order
    pub fn documents(&self, index: &str) -> Vec<Value> {
        self.indices.read().get(index).cloned().unwrap_or_default()
    }

    pub fn count(&self, index: &str) -> usize {
        self.indices.read().get(index).map(Vec::len).unwrap_or(0)
    }
}

#[async_trait]
impl SearchBackend for MemoryBackend {
    async fn search(&self, index: &str, body: &Value) -> Result<Vec<Value>, BackendError> {
        let indices = self.indices.read();
        let Some(documents) = indices.get(index) else {
            return Err(BackendError::RemoteError(format!(
                "index_not_found_exception: {}",
                index
            )));
        };

        let now = Utc::now();
        let clauses = filter_clauses(body);
        let from = body
            .get("from")
            .and_then(Value::as_u64)
            .map(|f| f as usize)
            .unwrap_or(0);
        let size = body
            .get("size")
            .and_then(Value::as_u64)
            .map(|s| s as usize)
            .unwrap_or(usize::MAX);

        Ok(documents
            .iter()
            .filter(|doc| clauses.iter().all(|clause| clause_matches(clause, doc, now)))
            .skip(from)
            .take(size)
            .cloned()
            .collect())
    }

    async fn index_document(&self, index: &str, document: &Value) -> Result<(), BackendError> {
        self.indices
            .write()
            .entry(index.to_string())
            .or_default()
            .push(document.clone());
        Ok(())
    }
}

fn filter_clauses(body: &Value) -> Vec<Value> {
    match body.pointer("/query/bool/filter") {
        Some(Value::Array(clauses)) => clauses.clone(),
        Some(clause @ Value::Object(_)) => vec![clause.clone()],
        _ => Vec::new(),
    }
}

fn clause_matches(clause: &Value, doc: &Value, now: DateTime<Utc>) -> bool {
    if let Some(Value::Object(term)) = clause.get("term") {
        return term.iter().all(|(field, expected)| {
            let expected = expected.get("value").unwrap_or(expected);
            doc.get(field) == Some(expected)
        });
    }
    if let Some(Value::Object(range)) = clause.get("range") {
        return range.iter().all(|(field, bounds)| {
            let Some(value) = doc.get(field).and_then(document_time) else {
                return false;
            };
            let lower = bounds.get("gte").and_then(|b| resolve_bound(b, now, Rounding::Down));
            let upper = bounds.get("lte").and_then(|b| resolve_bound(b, now, Rounding::Up));
            lower.map_or(true, |lo| value >= lo) && upper.map_or(true, |hi| value <= hi)
        });
    }
    tracing::debug!(clause = %clause, "Unsupported filter clause ignored");
    true
}

fn document_time(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

/// Direction of `/d` rounding: down for lower bounds, up for upper bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    Down,
    Up,
}

/// Resolve a range bound to an absolute time
pub fn resolve_bound(
    bound: &Value,
    now: DateTime<Utc>,
    rounding: Rounding,
) -> Option<DateTime<Utc>> {
    match bound {
        Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Value::String(s) => {
            if s.starts_with("now") {
                resolve_date_math(s, now, rounding)
            } else {
                parse_timestamp(s)
            }
        }
        _ => None,
    }
}

fn resolve_date_math(
    expr: &str,
    now: DateTime<Utc>,
    rounding: Rounding,
) -> Option<DateTime<Utc>> {
    let rest = expr.strip_prefix("now")?;
    let (offset, round_day) = match rest.strip_suffix("/d") {
        Some(offset) => (offset, true),
        None => (rest, false),
    };

    let mut at = now;
    if !offset.is_empty() {
        let (sign, amount) = match offset.as_bytes()[0] {
            b'-' => (-1, &offset[1..]),
            b'+' => (1, &offset[1..]),
            _ => return None,
        };
        let unit = amount.chars().last()?;
        let n: i64 = amount[..amount.len() - unit.len_utf8()].parse().ok()?;
        let step = match unit {
            's' => Duration::try_seconds(n)?,
            'm' => Duration::try_minutes(n)?,
            'h' => Duration::try_hours(n)?,
            'd' => Duration::try_days(n)?,
            'w' => Duration::try_weeks(n)?,
            _ => return None,
        };
        at = if sign < 0 {
            at.checked_sub_signed(step)?
        } else {
            at.checked_add_signed(step)?
        };
    }

    if round_day {
        let start = at.date_naive().and_hms_opt(0, 0, 0)?.and_utc();
        at = match rounding {
            Rounding::Down => start,
            Rounding::Up => start
                .checked_add_signed(Duration::days(1))?
                .checked_sub_signed(Duration::milliseconds(1))?,
        };
    }
    Some(at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn history_query(name: &str, gte: Value, lte: Value) -> Value {
        json!({
            "query": { "bool": { "filter": [
                { "term": { "name": name } },
                { "range": { "@timestamp": { "gte": gte, "lte": lte } } }
            ] } }
        })
    }

    #[tokio::test]
    async fn test_index_and_search() {
        let backend = MemoryBackend::new();
        backend
            .index_document("alerts", &json!({ "name": "uc1", "@timestamp": "2024-01-01T00:00:00Z" }))
            .await
            .unwrap();
        backend
            .index_document("alerts", &json!({ "name": "uc2", "@timestamp": "2024-01-01T00:00:00Z" }))
            .await
            .unwrap();

        let hits = backend
            .search("alerts", &history_query("uc1", json!(0), json!("now")))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["name"], "uc1");

        let all = backend.search("alerts", &json!({ "query": { "match_all": {} } })).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_range_filter() {
        let backend = MemoryBackend::new();
        let recent = (Utc::now() - Duration::hours(1)).to_rfc3339();
        backend.load(
            "alerts",
            vec![
                json!({ "name": "uc1", "@timestamp": "2020-01-01T00:00:00Z" }),
                json!({ "name": "uc1", "@timestamp": recent.clone() }),
            ],
        );

        let hits = backend
            .search("alerts", &history_query("uc1", json!("now-1d"), json!("now")))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["@timestamp"], json!(recent));
    }

    #[tokio::test]
    async fn test_size_and_missing_index() {
        let backend = MemoryBackend::new();
        backend.load("events", vec![json!({ "a": 1 }), json!({ "a": 2 }), json!({ "a": 3 })]);

        let hits = backend.search("events", &json!({ "size": 2 })).await.unwrap();
        assert_eq!(hits.len(), 2);

        assert!(backend.search("nope", &json!({})).await.is_err());
    }

    #[test]
    fn test_resolve_bound() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 15, 30, 0).unwrap();

        let down = |b: Value| resolve_bound(&b, now, Rounding::Down);

        assert_eq!(down(json!("now")), Some(now));
        assert_eq!(down(json!(0)), Some(Utc.timestamp_millis_opt(0).unwrap()));
        assert_eq!(
            down(json!("now-1d/d")),
            Some(Utc.with_ymd_and_hms(2024, 5, 9, 0, 0, 0).unwrap())
        );
        assert_eq!(
            down(json!("now-90m")),
            Some(Utc.with_ymd_and_hms(2024, 5, 10, 14, 0, 0).unwrap())
        );
        assert_eq!(
            down(json!("2024-01-01T00:00:00Z")),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(down(json!("now-1M")), None);
        assert_eq!(down(json!(true)), None);
    }

    #[test]
    fn test_resolve_bound_out_of_range() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 15, 30, 0).unwrap();
        assert_eq!(resolve_bound(&json!("now-999999999999999d"), now, Rounding::Down), None);
        assert_eq!(resolve_bound(&json!("now+999999999999999w"), now, Rounding::Up), None);
        assert_eq!(resolve_bound(&json!("now-300000000d"), now, Rounding::Down), None);
    }

    #[test]
    fn test_day_rounding_follows_range_side() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 15, 30, 0).unwrap();
        assert_eq!(
            resolve_bound(&json!("now/d"), now, Rounding::Down),
            Some(Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap())
        );
        assert_eq!(
            resolve_bound(&json!("now/d"), now, Rounding::Up),
            Some(Utc.with_ymd_and_hms(2024, 5, 10, 23, 59, 59).unwrap() + Duration::milliseconds(999))
        );
    }

    #[tokio::test]
    async fn test_huge_offset_leaves_range_open() {
        let backend = MemoryBackend::new();
        backend.load("alerts", vec![json!({ "name": "uc1", "@timestamp": "2020-01-01T00:00:00Z" })]);

        let hits = backend
            .search("alerts", &history_query("uc1", json!("now-999999999999999d"), json!("now")))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_from_and_size_page() {
        let backend = MemoryBackend::new();
        backend.load("events", (0..5).map(|i| json!({ "n": i })).collect());

        let page = backend.search("events", &json!({ "from": 3, "size": 10 })).await.unwrap();
        assert_eq!(page, vec![json!({ "n": 3 }), json!({ "n": 4 })]);
    }
}
