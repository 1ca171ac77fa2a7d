//! MySQL-backed process store.
//!
//! Keeps the process record in the `_tuple_migrate` database of the target
//! server. The store has its own pool, so checkpoint writes commit
//! independently of the translation transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mysql_async::prelude::*;
use mysql_async::{params, Pool, Row as MySqlRow, Value};

use crate::core::SqlValue;
use crate::drivers::mysql::convert_value;
use crate::error::{MigrateError, Result};
use crate::state::backend::{status_to_str, str_to_status, ProcessStore};
use crate::state::ProcessRecord;

/// Name of the process this store tracks; one row per process.
const DEFAULT_PROCESS: &str = "default";

/// MySQL process store.
pub struct MysqlProcessStore {
    pool: Pool,
    schema: String,
    process: String,
}

impl MysqlProcessStore {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            schema: "_tuple_migrate".to_string(),
            process: DEFAULT_PROCESS.to_string(),
        }
    }

    async fn conn(&self, context: &str) -> Result<mysql_async::Conn> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| MigrateError::database(e, context.to_string()))
    }

    /// Create the state database and table.
    pub async fn init_schema(&self) -> Result<()> {
        let mut conn = self.conn("getting MySQL process state connection").await?;

        let sql = format!("CREATE DATABASE IF NOT EXISTS `{}`", self.schema);
        conn.query_drop(&sql)
            .await
            .map_err(|e| MigrateError::database(e, "creating MySQL process state schema"))?;

        let sql = format!(
            "CREATE TABLE IF NOT EXISTS `{}`.`process_state` (
                process VARCHAR(100) NOT NULL,
                last_stop_point BIGINT UNSIGNED NOT NULL DEFAULT 0,
                status VARCHAR(20) NOT NULL,
                model_hash VARCHAR(100),
                recorded_at DATETIME(6) NOT NULL,
                PRIMARY KEY (process)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
            self.schema
        );
        conn.query_drop(&sql)
            .await
            .map_err(|e| MigrateError::database(e, "creating MySQL process_state table"))?;

        Ok(())
    }

    /// Upsert the record of this process.
    pub async fn save(&self, record: &ProcessRecord) -> Result<()> {
        let mut conn = self.conn("getting MySQL connection for process save").await?;

        let sql = format!(
            "INSERT INTO `{}`.`process_state`
             (process, last_stop_point, status, model_hash, recorded_at)
             VALUES (:process, :last_stop_point, :status, :model_hash, :recorded_at)
             ON DUPLICATE KEY UPDATE
                last_stop_point = VALUES(last_stop_point),
                status = VALUES(status),
                model_hash = VALUES(model_hash),
                recorded_at = VALUES(recorded_at)",
            self.schema
        );
        let params = params! {
            "process" => &self.process,
            "last_stop_point" => record.last_stop_point,
            "status" => status_to_str(record.status),
            "model_hash" => &record.model_hash,
            "recorded_at" => record.timestamp.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        };

        conn.exec_drop(&sql, params)
            .await
            .map_err(|e| MigrateError::database(e, "saving MySQL process state"))?;
        Ok(())
    }

    /// Load the record of this process, if any was written.
    pub async fn load_record(&self) -> Result<Option<ProcessRecord>> {
        let mut conn = self.conn("getting MySQL connection for process load").await?;

        let sql = format!(
            "SELECT last_stop_point, status, model_hash, recorded_at
             FROM `{}`.`process_state`
             WHERE process = ?",
            self.schema
        );
        let row: Option<MySqlRow> = conn
            .exec_first(&sql, (self.process.as_str(),))
            .await
            .map_err(|e| MigrateError::database(e, "loading MySQL process state"))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let last_stop_point: u64 = row
            .get::<Option<u64>, _>("last_stop_point")
            .flatten()
            .unwrap_or(0);
        let status: String = row.get("status").unwrap_or_default();
        let model_hash: Option<String> = row.get::<Option<String>, _>("model_hash").flatten();
        let timestamp = match convert_value(row.get::<Value, _>("recorded_at").unwrap_or(Value::NULL)) {
            SqlValue::DateTime(dt) => DateTime::from_naive_utc_and_offset(dt, Utc),
            _ => Utc::now(),
        };

        Ok(Some(ProcessRecord {
            last_stop_point,
            timestamp,
            status: str_to_status(&status)?,
            model_hash,
            hmac: None,
        }))
    }
}

#[async_trait]
impl ProcessStore for MysqlProcessStore {
    async fn init(&self) -> Result<()> {
        self.init_schema().await
    }

    async fn load(&self) -> Result<ProcessRecord> {
        Ok(self
            .load_record()
            .await?
            .unwrap_or_else(ProcessRecord::initial))
    }

    async fn record(&self, record: &ProcessRecord) -> Result<()> {
        self.save(record).await
    }

    fn backend_type(&self) -> &'static str {
        "mysql"
    }
}
