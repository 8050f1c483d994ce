pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod service;
pub mod store;

pub use config::AppConfig;
pub use error::{AuditError, ConfigError, ResolutionError, Result};
pub use service::{evaluate, Auditor, BatchAuditor, RateEngine, TolerancePolicy};
pub use store::{load_dataset, RateCardDataset, RateCardSnapshot, RateCardStore};
