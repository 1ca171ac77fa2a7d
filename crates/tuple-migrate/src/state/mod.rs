//! Process checkpoint for resuming a translation.
//!
//! The checkpoint is a single [`ProcessRecord`]: the number of root trees
//! finished so far, when it was written and the run status. Backends:
//!
//! - [`FileProcessStore`]: JSON file (this module)
//! - [`mysql_db::MysqlProcessStore`]: a table on the target server
//! - [`memory::MemoryProcessStore`]: in-process, keeps every write

pub mod backend;
pub mod memory;
pub mod mysql_db;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{MigrateError, Result};

pub use backend::ProcessStore;
pub use memory::MemoryProcessStore;
pub use mysql_db::MysqlProcessStore;

type HmacSha256 = Hmac<Sha256>;

/// Status of the last write to the process record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProcessStatus {
    Reset,
    Paused,
    Completed,
    Failed,
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(backend::status_to_str(*self))
    }
}

/// The persisted checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    /// Root trees finished so far; the next run starts at this curr index.
    pub last_stop_point: u64,

    /// When the record was written.
    pub timestamp: DateTime<Utc>,

    pub status: ProcessStatus,

    /// Hash of the matching model the record was written under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_hash: Option<String>,

    /// HMAC-SHA256 over the record, keyed with the model hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hmac: Option<String>,
}

impl ProcessRecord {
    pub fn new(last_stop_point: u64, status: ProcessStatus) -> Self {
        Self {
            last_stop_point,
            timestamp: Utc::now(),
            status,
            model_hash: None,
            hmac: None,
        }
    }

    /// The record of a process that never ran: `{0, now, RESET}`.
    pub fn initial() -> Self {
        Self::new(0, ProcessStatus::Reset)
    }

    pub fn with_model_hash(mut self, hash: impl Into<String>) -> Self {
        self.model_hash = Some(hash.into());
        self
    }

    /// Whether a run should pick up from this record rather than start over.
    pub fn is_resumable(&self) -> bool {
        self.last_stop_point > 0
            && matches!(self.status, ProcessStatus::Paused | ProcessStatus::Failed)
    }

    /// Fail when resuming this record under a different matching model.
    pub fn validate_model(&self, model_hash: &str) -> Result<()> {
        match &self.model_hash {
            Some(hash) if self.is_resumable() && hash != model_hash => {
                Err(MigrateError::ModelChanged {
                    last_stop_point: self.last_stop_point,
                })
            }
            _ => Ok(()),
        }
    }

    fn compute_hmac(&self, key: &str) -> Result<String> {
        let mut unsigned = self.clone();
        unsigned.hmac = None;

        let content = serde_json::to_string(&unsigned)?;
        let mut mac = HmacSha256::new_from_slice(key.as_bytes())
            .map_err(|e| MigrateError::State(format!("Failed to create HMAC: {}", e)))?;
        mac.update(content.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Load a record file. A missing file yields [`ProcessRecord::initial`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::initial());
        }
        let content = std::fs::read_to_string(path)?;
        let record: Self = serde_json::from_str(&content)?;

        if let (Some(stored), Some(key)) = (&record.hmac, &record.model_hash) {
            if stored != &record.compute_hmac(key)? {
                return Err(MigrateError::State(format!(
                    "Process file {} failed its integrity check (HMAC mismatch)",
                    path.display()
                )));
            }
        }
        Ok(record)
    }

    /// Write the record to `path` atomically (temp file, then rename).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut signed = self.clone();
        signed.hmac = match &self.model_hash {
            Some(key) => Some(self.compute_hmac(key)?),
            None => None,
        };

        let content = serde_json::to_string_pretty(&signed)?;
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, path)?;
        Ok(())
    }
}

/// Process record kept in a JSON file.
#[derive(Debug, Clone)]
pub struct FileProcessStore {
    path: PathBuf,
}

impl FileProcessStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ProcessStore for FileProcessStore {
    async fn init(&self) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    async fn load(&self) -> Result<ProcessRecord> {
        ProcessRecord::load(&self.path)
    }

    async fn record(&self, record: &ProcessRecord) -> Result<()> {
        record.save(&self.path)
    }

    fn backend_type(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, NamedTempFile};

    #[test]
    fn test_record_save_load() {
        let record = ProcessRecord::new(12, ProcessStatus::Paused).with_model_hash("abc123");
        let file = NamedTempFile::new().unwrap();
        record.save(file.path()).unwrap();

        let loaded = ProcessRecord::load(file.path()).unwrap();
        assert_eq!(loaded.last_stop_point, 12);
        assert_eq!(loaded.status, ProcessStatus::Paused);
        assert_eq!(loaded.model_hash.as_deref(), Some("abc123"));
        assert!(loaded.hmac.is_some());
    }

    #[test]
    fn test_missing_file_is_initial() {
        let dir = tempdir().unwrap();
        let record = ProcessRecord::load(dir.path().join("process.json")).unwrap();
        assert_eq!(record.last_stop_point, 0);
        assert_eq!(record.status, ProcessStatus::Reset);
    }

    #[test]
    fn test_record_json_format() {
        let record = ProcessRecord::new(3, ProcessStatus::Completed);
        let file = NamedTempFile::new().unwrap();
        record.save(file.path()).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        assert!(content.contains('\n'), "record should be pretty-printed");
        assert!(content.contains("\"status\": \"COMPLETED\""));
        assert!(content.contains("\"last_stop_point\": 3"));
        assert!(!content.contains("hmac"), "unsigned without a model hash");
    }

    #[test]
    fn test_tampered_record_is_rejected() {
        let record = ProcessRecord::new(5, ProcessStatus::Failed).with_model_hash("hash");
        let file = NamedTempFile::new().unwrap();
        record.save(file.path()).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        std::fs::write(
            file.path(),
            content.replace("\"last_stop_point\": 5", "\"last_stop_point\": 50"),
        )
        .unwrap();

        let err = ProcessRecord::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("integrity check"));
    }

    #[test]
    fn test_validate_model() {
        let paused = ProcessRecord::new(4, ProcessStatus::Paused).with_model_hash("a");
        assert!(paused.validate_model("a").is_ok());
        assert!(matches!(
            paused.validate_model("b"),
            Err(MigrateError::ModelChanged { last_stop_point: 4 })
        ));

        // Completed or never-started records carry nothing to resume.
        let completed = ProcessRecord::new(0, ProcessStatus::Completed).with_model_hash("a");
        assert!(completed.validate_model("b").is_ok());
        let unhashed = ProcessRecord::new(4, ProcessStatus::Paused);
        assert!(unhashed.validate_model("b").is_ok());
    }

    #[tokio::test]
    async fn test_file_store() {
        let dir = tempdir().unwrap();
        let store = FileProcessStore::new(dir.path().join("state").join("process.json"));
        store.init().await.unwrap();
        assert_eq!(store.load().await.unwrap().status, ProcessStatus::Reset);

        store
            .record(&ProcessRecord::new(7, ProcessStatus::Paused))
            .await
            .unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.last_stop_point, 7);
        assert_eq!(store.backend_type(), "file");
    }
}
