//! pubrecon core: researcher identities, publication records, reports, config and storage.

pub mod config;
pub mod error;
pub mod models;
pub mod storage;

pub use config::AppConfig;
pub use error::{CoreError, Result};
pub use models::*;

pub use storage::{IdentityStore, MemoryStore, ReportStore, SqliteStore};
