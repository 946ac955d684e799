//! Alerts: records, deduplication and notification
//!
//! Matched events become [`Alert`]s, are filtered against previously raised
//! alerts by [`filter_new`], and are forwarded as syslog lines by the
//! [`Notifier`].

pub mod alert;
pub mod dedup;
pub mod notifier;

pub use alert::{Alert, AlertField, DocumentError, UNKNOWN_IP};
pub use dedup::{filter_new, find_match};
pub use notifier::{Notifier, NotifierError};
