//! # tuple-migrate
//!
//! Schema-driven translation of legacy database rows into a new schema.
//!
//! A declarative matching model describes target tuples, how each column is
//! filled from the source (matches, references, value remappings) and how
//! tuples nest. The translator walks that tree for every source row and
//! inserts the resulting rows, with:
//!
//! - **Transactional root trees**: a savepoint per root row, committed when
//!   the whole tree succeeded
//! - **Resumable runs** via a process checkpoint (file or MySQL table)
//! - **Tree limits** for translating in batches
//! - **Default-value DSL**: `TOP`, `NOW`, `SKIP`, `AI`, `AI_SKIP_TRUE/FALSE`,
//!   `CURRn`, `ALL`, `EQUALS` and `>>` alternatives
//!
//! ## Example
//!
//! ```rust,no_run
//! use tuple_migrate::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> tuple_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let result = Orchestrator::new(config).run().await?;
//!     println!("Inserted {} rows ({})", result.rows_inserted, result.outcome);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod state;
pub mod translate;

// Re-exports for convenient access
pub use config::{Config, DatabaseConfig, StateBackend, TranslationConfig};
pub use core::{Dao, SqlValue};
pub use drivers::MysqlDao;
pub use error::{MigrateError, Result};
pub use model::{MatchingModel, PreparedModel, TupleTree};
pub use orchestrator::{HealthCheckResult, Orchestrator};
pub use state::{FileProcessStore, ProcessRecord, ProcessStatus, ProcessStore};
pub use translate::{TranslationOptions, TranslationOutcome, TranslationResult, Translator};
