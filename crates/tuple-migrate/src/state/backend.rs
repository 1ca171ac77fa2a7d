//! Process store trait.
//!
//! The translator writes its checkpoint through [`ProcessStore`] without
//! knowing where it lands:
//!
//! - **File**: `FileProcessStore` in `mod.rs`
//! - **MySQL**: `MysqlProcessStore` in `mysql_db.rs`
//! - **Memory**: `MemoryProcessStore` in `memory.rs`

use async_trait::async_trait;

use super::{ProcessRecord, ProcessStatus};
use crate::error::{MigrateError, Result};

/// Persistence for the translation checkpoint.
///
/// Writes must be durable on return and independent of the target
/// database transaction: a rollback of the target never undoes a record.
#[async_trait]
pub trait ProcessStore: Send + Sync {
    /// Prepare the storage (directories, schema). Idempotent.
    async fn init(&self) -> Result<()>;

    /// Read the current record, or [`ProcessRecord::initial`] when none exists.
    async fn load(&self) -> Result<ProcessRecord>;

    /// Overwrite the current record.
    async fn record(&self, record: &ProcessRecord) -> Result<()>;

    /// Get the backend type name for logging.
    fn backend_type(&self) -> &'static str;
}

/// Convert a status to its stored representation.
pub fn status_to_str(status: ProcessStatus) -> &'static str {
    match status {
        ProcessStatus::Reset => "RESET",
        ProcessStatus::Paused => "PAUSED",
        ProcessStatus::Completed => "COMPLETED",
        ProcessStatus::Failed => "FAILED",
    }
}

/// Parse a stored status (case-insensitive).
pub fn str_to_status(s: &str) -> Result<ProcessStatus> {
    match s.trim().to_ascii_uppercase().as_str() {
        "RESET" => Ok(ProcessStatus::Reset),
        "PAUSED" => Ok(ProcessStatus::Paused),
        "COMPLETED" => Ok(ProcessStatus::Completed),
        "FAILED" => Ok(ProcessStatus::Failed),
        _ => Err(MigrateError::State(format!("Invalid process status: {}", s))),
    }
}
