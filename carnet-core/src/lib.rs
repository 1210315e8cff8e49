pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod logging;
pub mod notion;
pub mod reconcile;
pub mod report;

pub use config::Config;
pub use error::SyncError;
pub use reconcile::{BatchReport, CatalogReport, Reconciler};
