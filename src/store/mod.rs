//! Write-back index of raised alerts
//!
//! Every alert that gets raised is written here. The same index is the
//! history source for threshold deduplication.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::alerts::alert::{DocumentError, TIMESTAMP_KEY};
use crate::alerts::Alert;
use crate::backend::{BackendError, SearchBackend};

/// One side of a time range, passed to the backend untouched.
///
/// Either epoch milliseconds or a date / date-math expression such as
/// `now-1d/d`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeBound {
    Millis(i64),
    Expr(String),
}

impl TimeBound {
    pub fn now() -> Self {
        TimeBound::Expr("now".to_string())
    }

    pub fn to_json(&self) -> Value {
        match self {
            TimeBound::Millis(ms) => json!(ms),
            TimeBound::Expr(expr) => json!(expr),
        }
    }
}

impl fmt::Display for TimeBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeBound::Millis(ms) => write!(f, "{}", ms),
            TimeBound::Expr(expr) => f.write_str(expr),
        }
    }
}

impl FromStr for TimeBound {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.parse::<i64>() {
            Ok(ms) => TimeBound::Millis(ms),
            Err(_) => TimeBound::Expr(s.to_string()),
        })
    }
}

/// Default number of past alerts fetched per history request
pub const DEFAULT_HISTORY_PAGE_SIZE: usize = 1_000;

/// Alert store backed by one index of a [`SearchBackend`]
pub struct AlertStore<'a> {
    backend: &'a dyn SearchBackend,
    index: String,
    page_size: usize,
}

impl<'a> AlertStore<'a> {
    pub fn new(backend: &'a dyn SearchBackend, index: impl Into<String>) -> Self {
        Self {
            backend,
            index: index.into(),
            page_size: DEFAULT_HISTORY_PAGE_SIZE,
        }
    }

    /// Number of alerts requested per page by [`AlertStore::find`]. Zero is
    /// raised to one.
    pub fn with_history_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    /// Persist one alert
    pub async fn write(&self, alert: &Alert) -> Result<(), StoreError> {
        tracing::info!(usecase = %alert.name(), index = %self.index, "Indexing alert");
        self.backend
            .index_document(&self.index, &alert.to_document())
            .await
            .map_err(StoreError::Backend)
    }

    /// Alerts previously written for `usecase_name` with a timestamp in `[gte, lte]`.
    ///
    /// Pages through the whole window, oldest first. A document that cannot
    /// be read back fails the whole lookup, and so does any failed page.
    pub async fn find(
        &self,
        usecase_name: &str,
        gte: &TimeBound,
        lte: &TimeBound,
    ) -> Result<Vec<Alert>, StoreError> {
        tracing::info!(
            usecase = %usecase_name,
            gte = %gte,
            lte = %lte,
            "Running write-back index search"
        );
        let mut alerts = Vec::new();
        loop {
            let from = alerts.len();
            let body = history_query(usecase_name, gte, lte, from, self.page_size);
            let hits = self
                .backend
                .search(&self.index, &body)
                .await
                .map_err(StoreError::Backend)?;

            let page_len = hits.len();
            for hit in &hits {
                let alert = Alert::from_document(hit, Vec::new()).map_err(StoreError::Document)?;
                alerts.push(alert);
            }
            if page_len < self.page_size {
                break;
            }
            tracing::debug!(
                usecase = %usecase_name,
                fetched = alerts.len(),
                "Fetching next history page"
            );
        }
        Ok(alerts)
    }
}

/// Query selecting one page of a usecase's alerts inside a time range
pub fn history_query(
    usecase_name: &str,
    gte: &TimeBound,
    lte: &TimeBound,
    from: usize,
    size: usize,
) -> Value {
    json!({
        "from": from,
        "size": size,
        "sort": [{ (TIMESTAMP_KEY): "asc" }],
        "query": {
            "bool": {
                "filter": [
                    { "term": { "name": usecase_name } },
                    { "range": { (TIMESTAMP_KEY): { "gte": gte.to_json(), "lte": lte.to_json() } } }
                ]
            }
        }
    })
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Backend error: {0}")]
    Backend(#[source] BackendError),

    #[error("Stored alert unreadable: {0}")]
    Document(#[source] DocumentError),
}
