//! siemapp: usecase-driven alerting on top of Elasticsearch
//!
//! Runs named detection queries ("usecases"), turns their hits into alerts,
//! drops the ones already raised within a lookback window, writes the rest
//! to a write-back index and forwards them as syslog lines.
//!
//! # Example
//!
//! ```no_run
//! use siemapp::alerts::{filter_new, Alert, AlertField};
//!
//! let new_batch = vec![Alert::new("uc1", "2024-01-01T00:00:00Z").with_attacker_ip("1.2.3.4")];
//! let history = vec![Alert::new("uc1", "2023-12-31T23:00:00Z").with_attacker_ip("1.2.3.4")];
//!
//! let raised: Vec<Alert> = filter_new(new_batch, &history, &[AlertField::AttackerIp]).collect();
//! assert!(raised.is_empty());
//! ```

pub mod alerts;
pub mod backend;
pub mod config;
pub mod runner;
pub mod store;
pub mod usecases;

// Re-export commonly used types
pub use alerts::{filter_new, Alert, AlertField, Notifier};
pub use backend::{BackendError, ElasticClient, MemoryBackend, SearchBackend};
pub use config::{Config, ConfigError};
pub use runner::{RunError, RunOptions, RunReport, Runner};
pub use store::{AlertStore, StoreError, TimeBound};
pub use usecases::{DirectoryLoader, Usecase, UsecaseLoader, UsecaseRegistry};
