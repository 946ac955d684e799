//! Threshold-based deduplication of freshly matched alerts
//!
//! A new alert is a duplicate when some historical alert carries the same
//! value on *every* threshold field. Matching on only part of the fields is
//! not enough to suppress it. An empty field list disables deduplication.

use super::alert::{Alert, AlertField};

/// Yield the alerts of `new_batch` that have no full threshold match in
/// `historical_batch`, in their original order.
///
/// Comparison is exact string equality per field. The first historical alert
/// matching on all fields ends the scan for a candidate.
pub fn filter_new<'a, I>(
    new_batch: I,
    historical_batch: &'a [Alert],
    threshold_fields: &'a [AlertField],
) -> impl Iterator<Item = Alert> + 'a
where
    I: IntoIterator<Item = Alert>,
    I::IntoIter: 'a,
{
    new_batch
        .into_iter()
        .filter(move |alert| match find_match(alert, historical_batch, threshold_fields) {
            Some(past) => {
                tracing::debug!(
                    usecase = %alert.name(),
                    human_time = %alert.human_time(),
                    matched_at = %past.timestamp(),
                    "Threshold match found, discarding alert"
                );
                false
            }
            None => true,
        })
}

/// First historical alert equal to `alert` on all `fields`.
///
/// Always `None` for an empty field list.
pub fn find_match<'h>(
    alert: &Alert,
    historical_batch: &'h [Alert],
    fields: &[AlertField],
) -> Option<&'h Alert> {
    if fields.is_empty() {
        return None;
    }
    historical_batch
        .iter()
        .find(|past| matched_fields(alert, past, fields) == fields.len())
}

/// Number of `fields` with equal values in both alerts
pub fn matched_fields(alert: &Alert, past: &Alert, fields: &[AlertField]) -> usize {
    fields
        .iter()
        .filter(|&&field| alert.field(field) == past.field(field))
        .count()
}
