//! In-memory process store.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{ProcessRecord, ProcessStore};
use crate::error::{MigrateError, Result};

/// Keeps every record written, newest last. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryProcessStore {
    history: Mutex<Vec<ProcessRecord>>,
}

impl MemoryProcessStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose current record is `record`.
    pub fn with_record(record: ProcessRecord) -> Self {
        Self {
            history: Mutex::new(vec![record]),
        }
    }

    /// Every record written so far, oldest first.
    pub fn history(&self) -> Vec<ProcessRecord> {
        self.history
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ProcessStore for MemoryProcessStore {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn load(&self) -> Result<ProcessRecord> {
        let history = self
            .history
            .lock()
            .map_err(|_| MigrateError::State("process history lock poisoned".into()))?;
        Ok(history.last().cloned().unwrap_or_else(ProcessRecord::initial))
    }

    async fn record(&self, record: &ProcessRecord) -> Result<()> {
        self.history
            .lock()
            .map_err(|_| MigrateError::State("process history lock poisoned".into()))?
            .push(record.clone());
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
