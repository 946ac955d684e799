//! Usecase execution: query, deduplicate, then persist / dump / notify

use std::io::Write;

use crate::alerts::{filter_new, Alert, Notifier};
use crate::backend::{BackendError, SearchBackend};
use crate::store::{AlertStore, StoreError, TimeBound};
use crate::usecases::Usecase;

/// Per-run toggles. The three output actions are independent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Skip threshold filtering
    pub nofilter: bool,
    /// Write raised alerts to the write-back index
    pub index: bool,
    /// Print wire lines to the output
    pub dump: bool,
    /// Send wire lines to the syslog collector
    pub notify: bool,
}

/// Outcome counters of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub matched: usize,
    pub raised: usize,
    pub indexed: usize,
    pub write_failures: usize,
    pub notified: usize,
    pub notify_failures: usize,
}

pub struct Runner<'a> {
    backend: &'a dyn SearchBackend,
    store: AlertStore<'a>,
    notifier: Notifier,
}

impl<'a> Runner<'a> {
    pub fn new(backend: &'a dyn SearchBackend, store: AlertStore<'a>, notifier: Notifier) -> Self {
        Self {
            backend,
            store,
            notifier,
        }
    }

    pub fn store(&self) -> &AlertStore<'a> {
        &self.store
    }

    /// Run the usecase query and map every hit to an alert.
    ///
    /// Hits the usecase cannot map are logged and skipped.
    pub async fn collect(&self, usecase: &dyn Usecase) -> Result<Vec<Alert>, RunError> {
        let query = usecase.query();
        tracing::info!(usecase = %usecase.name(), index = %query.index, "Running search");

        let hits = self
            .backend
            .search(&query.index, &query.body)
            .await
            .map_err(RunError::Query)?;

        let mut alerts = Vec::with_capacity(hits.len());
        for hit in &hits {
            match usecase.map_hit(hit) {
                Ok(alert) => alerts.push(alert),
                Err(e) => tracing::warn!(
                    usecase = %usecase.name(),
                    error = %e,
                    "Skipping unmappable hit"
                ),
            }
        }
        Ok(alerts)
    }

    /// Alerts of this run that should be raised.
    ///
    /// With `nofilter`, every matched alert. Otherwise the ones without a
    /// threshold match in the usecase's lookback window. A failed history
    /// lookup fails the run.
    pub async fn execute(
        &self,
        usecase: &dyn Usecase,
        nofilter: bool,
    ) -> Result<Vec<Alert>, RunError> {
        let results = self.collect(usecase).await?;
        self.filter(usecase, results, nofilter).await
    }

    async fn filter(
        &self,
        usecase: &dyn Usecase,
        results: Vec<Alert>,
        nofilter: bool,
    ) -> Result<Vec<Alert>, RunError> {
        if nofilter {
            tracing::warn!(usecase = %usecase.name(), "Threshold filtering is disabled");
            return Ok(results);
        }

        tracing::info!(usecase = %usecase.name(), "Filtering results set by thresholds");
        let threshold = usecase.threshold();
        let history = self
            .store
            .find(usecase.name(), &threshold.gte, &threshold.lte)
            .await
            .map_err(RunError::History)?;

        tracing::info!(
            usecase = %usecase.name(),
            new = results.len(),
            past = history.len(),
            "Comparing new result batch with past batch"
        );
        Ok(filter_new(results, &history, &threshold.fields).collect())
    }

    /// Execute the usecase and handle each raised alert in order.
    ///
    /// Write and notification failures are logged and counted; they never
    /// stop the remaining alerts.
    pub async fn run<W: Write>(
        &self,
        usecase: &dyn Usecase,
        options: RunOptions,
        out: &mut W,
    ) -> Result<RunReport, RunError> {
        let results = self.collect(usecase).await?;
        let matched = results.len();
        let alerts = self.filter(usecase, results, options.nofilter).await?;
        let mut report = RunReport {
            matched,
            raised: alerts.len(),
            ..RunReport::default()
        };

        for alert in &alerts {
            if options.index {
                match self.store.write(alert).await {
                    Ok(()) => report.indexed += 1,
                    Err(e) => {
                        report.write_failures += 1;
                        tracing::error!(
                            usecase = %alert.name(),
                            error = %e,
                            "Failed to index alert"
                        );
                    }
                }
            }

            let line = alert.to_wire_line();
            if options.dump {
                writeln!(out, "{}", line).map_err(|e| RunError::Output(e.to_string()))?;
            }
            if options.notify {
                match self.notifier.send(&line).await {
                    Ok(()) => report.notified += 1,
                    Err(e) => {
                        report.notify_failures += 1;
                        tracing::warn!(error = %e, "Cannot send alert");
                    }
                }
            }
        }

        tracing::info!(
            usecase = %usecase.name(),
            matched = report.matched,
            raised = report.raised,
            indexed = report.indexed,
            notified = report.notified,
            "Run complete"
        );
        Ok(report)
    }

    /// Alerts this usecase raised within `[gte, lte]`, with its display values
    pub async fn find(
        &self,
        usecase: &dyn Usecase,
        gte: &TimeBound,
        lte: &TimeBound,
    ) -> Result<Vec<Alert>, RunError> {
        let extra = usecase.extra_values();
        let alerts = self
            .store
            .find(usecase.name(), gte, lte)
            .await
            .map_err(RunError::History)?;
        Ok(alerts
            .into_iter()
            .map(|alert| alert.with_extra_values(extra.clone()))
            .collect())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Detection query failed: {0}")]
    Query(#[source] BackendError),

    #[error("Alert history lookup failed: {0}")]
    History(#[source] StoreError),

    #[error("Output error: {0}")]
    Output(String),
}
