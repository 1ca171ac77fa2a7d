//! `Dao` implementation over a single MySQL connection.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::NaiveDate;
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, Row as MySqlRow, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::core::{Dao, Row, SqlValue};
use crate::drivers::common::SslMode;
use crate::error::{MigrateError, Result};

/// Savepoint marking the start of the current root tree.
const SAVEPOINT: &str = "tuple_tree";

/// Which side of the translation a DAO serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaoRole {
    /// Read-only legacy database.
    Source,
    /// Database receiving the inserts, inside an explicit transaction.
    Target,
}

impl std::fmt::Display for DaoRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DaoRole::Source => f.write_str("source"),
            DaoRole::Target => f.write_str("target"),
        }
    }
}

struct Session {
    conn: Option<Conn>,
    has_savepoint: bool,
}

impl Session {
    fn conn(&mut self, role: DaoRole) -> Result<&mut Conn> {
        self.conn.as_mut().ok_or_else(|| {
            MigrateError::database("connection already closed", format!("MySQL {}", role))
        })
    }
}

/// MySQL DAO holding one dedicated connection.
pub struct MysqlDao {
    pool: Pool,
    session: Mutex<Session>,
    role: DaoRole,
    label: String,
}

/// Build connection options from configuration.
pub fn connection_opts(config: &DatabaseConfig, ssl: bool) -> Result<Opts> {
    let ssl_mode = SslMode::parse(&config.ssl_mode)?;
    let constraints = PoolConstraints::new(1, 2).unwrap_or_default();
    let builder = OptsBuilder::default()
        .ip_or_hostname(config.host.clone())
        .tcp_port(config.port)
        .db_name(Some(config.database.clone()))
        .user(Some(config.user.clone()))
        .pass(Some(config.password.clone()))
        .ssl_opts(if ssl { ssl_mode.ssl_opts() } else { None })
        .pool_opts(PoolOpts::default().with_constraints(constraints));
    Ok(Opts::from(builder))
}

impl MysqlDao {
    /// Open the source connection.
    pub async fn source(config: &DatabaseConfig) -> Result<Self> {
        Self::connect(config, DaoRole::Source).await
    }

    /// Open the target connection with autocommit disabled.
    pub async fn target(config: &DatabaseConfig) -> Result<Self> {
        Self::connect(config, DaoRole::Target).await
    }

    pub async fn connect(config: &DatabaseConfig, role: DaoRole) -> Result<Self> {
        let label = format!("{}:{}/{}", config.host, config.port, config.database);
        let (pool, mut conn) = open_with_fallback(config, &role.to_string()).await?;

        conn.query_drop("SELECT 1")
            .await
            .map_err(|e| MigrateError::database(e, format!("testing MySQL {} connection", role)))?;
        if role == DaoRole::Target {
            conn.query_drop("SET autocommit = 0")
                .await
                .map_err(|e| MigrateError::database(e, "disabling autocommit on MySQL target"))?;
        }

        info!("Connected to MySQL {}: {}", role, label);

        Ok(Self {
            pool,
            session: Mutex::new(Session {
                conn: Some(conn),
                has_savepoint: false,
            }),
            role,
            label,
        })
    }

    /// Round-trip a trivial query, returning the latency.
    pub async fn ping(&self) -> Result<Duration> {
        let started = Instant::now();
        let mut session = self.session.lock().await;
        session
            .conn(self.role)?
            .query_drop("SELECT 1")
            .await
            .map_err(|e| MigrateError::database(e, format!("pinging MySQL {}", self.role)))?;
        Ok(started.elapsed())
    }

    async fn run(&self, sql: &str, context: &str) -> Result<()> {
        let mut session = self.session.lock().await;
        session
            .conn(self.role)?
            .query_drop(sql)
            .await
            .map_err(|e| MigrateError::database(e, format!("{} on MySQL {}", context, self.role)))
    }
}

/// Open a pool checked with one connection, for callers that manage their
/// own connections (the process store).
pub async fn open_pool(config: &DatabaseConfig, purpose: &str) -> Result<Pool> {
    let (pool, conn) = open_with_fallback(config, purpose).await?;
    drop(conn);
    Ok(pool)
}

/// Connect with TLS per `ssl_mode`; `prefer` retries in plain TCP.
async fn open_with_fallback(config: &DatabaseConfig, purpose: &str) -> Result<(Pool, Conn)> {
    let ssl_mode = SslMode::parse(&config.ssl_mode)?;
    match open(config, ssl_mode.ssl_opts().is_some()).await {
        Ok(opened) => Ok(opened),
        Err(e) if ssl_mode.allows_plain_fallback() => {
            warn!(
                "TLS connection to MySQL {} {}:{} failed ({}), retrying without TLS",
                purpose, config.host, config.port, e
            );
            open(config, false).await
        }
        Err(e) => Err(e),
    }
}

async fn open(config: &DatabaseConfig, ssl: bool) -> Result<(Pool, Conn)> {
    let pool = Pool::new(connection_opts(config, ssl)?);
    match pool.get_conn().await {
        Ok(conn) => Ok((pool, conn)),
        Err(e) => {
            let _ = pool.disconnect().await;
            Err(MigrateError::database(
                e,
                format!("connecting to MySQL {}:{}", config.host, config.port),
            ))
        }
    }
}

#[async_trait]
impl Dao for MysqlDao {
    async fn execute_query(&self, sql: &str) -> Result<Vec<Row>> {
        let mut session = self.session.lock().await;
        let rows: Vec<MySqlRow> = session
            .conn(self.role)?
            .exec(sql, ())
            .await
            .map_err(|e| MigrateError::database(e, format!("running query: {}", sql)))?;
        Ok(rows.into_iter().map(row_values).collect())
    }

    async fn execute_update(&self, sql: &str) -> Result<Vec<Row>> {
        let mut session = self.session.lock().await;
        let conn = session.conn(self.role)?;
        conn.query_drop(sql)
            .await
            .map_err(|e| MigrateError::database(e, format!("running insert: {}", sql)))?;
        let key = conn.last_insert_id().map(SqlValue::from).unwrap_or(SqlValue::Null);
        Ok(vec![vec![key]])
    }

    async fn set_save_point(&self) -> Result<()> {
        self.run(&format!("SAVEPOINT {}", SAVEPOINT), "setting savepoint")
            .await?;
        self.session.lock().await.has_savepoint = true;
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        self.run("COMMIT", "committing").await?;
        self.session.lock().await.has_savepoint = false;
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let has_savepoint = self.session.lock().await.has_savepoint;
        if has_savepoint {
            debug!("Rolling back MySQL {} to savepoint {}", self.role, SAVEPOINT);
            self.run(&format!("ROLLBACK TO SAVEPOINT {}", SAVEPOINT), "rolling back")
                .await
        } else {
            self.run("ROLLBACK", "rolling back").await
        }
    }

    async fn close(&self) -> Result<()> {
        let conn = {
            let mut session = self.session.lock().await;
            session.has_savepoint = false;
            session.conn.take()
        };
        let Some(mut conn) = conn else {
            return Ok(());
        };

        if self.role == DaoRole::Target {
            if let Err(e) = conn.query_drop("ROLLBACK").await {
                warn!("Failed to roll back uncommitted work on MySQL target: {}", e);
            }
        }
        conn.disconnect()
            .await
            .map_err(|e| MigrateError::database(e, format!("closing MySQL {}", self.role)))?;
        self.pool
            .clone()
            .disconnect()
            .await
            .map_err(|e| MigrateError::database(e, format!("closing MySQL {} pool", self.role)))?;
        info!("Closed MySQL {} connection {}", self.role, self.label);
        Ok(())
    }

    fn db_type(&self) -> &str {
        "mysql"
    }
}

fn row_values(mut row: MySqlRow) -> Row {
    (0..row.len())
        .map(|i| convert_value(row.take::<Value, usize>(i).unwrap_or(Value::NULL)))
        .collect()
}

/// Convert a MySQL protocol value into an [`SqlValue`].
pub fn convert_value(value: Value) -> SqlValue {
    match value {
        Value::NULL => SqlValue::Null,
        Value::Int(v) => SqlValue::Int(v),
        Value::UInt(v) => SqlValue::from(v),
        Value::Float(v) => SqlValue::Float(f64::from(v)),
        Value::Double(v) => SqlValue::Float(v),
        Value::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(text) => SqlValue::Text(text),
            Err(e) => SqlValue::Bytes(e.into_bytes()),
        },
        Value::Date(year, month, day, hour, minute, second, micros) => {
            NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
                .and_then(|date| {
                    date.and_hms_micro_opt(
                        u32::from(hour),
                        u32::from(minute),
                        u32::from(second),
                        micros,
                    )
                })
                .map(SqlValue::DateTime)
                // zero dates ('0000-00-00') have no calendar equivalent
                .unwrap_or(SqlValue::Null)
        }
        Value::Time(negative, days, hours, minutes, seconds, _) => SqlValue::Text(format!(
            "{}{:02}:{:02}:{:02}",
            if negative { "-" } else { "" },
            days * 24 + u32::from(hours),
            minutes,
            seconds
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_scalars() {
        assert_eq!(convert_value(Value::NULL), SqlValue::Null);
        assert_eq!(convert_value(Value::Int(-4)), SqlValue::Int(-4));
        assert_eq!(convert_value(Value::UInt(9)), SqlValue::Int(9));
        assert_eq!(convert_value(Value::Double(2.5)), SqlValue::Float(2.5));
        assert_eq!(
            convert_value(Value::UInt(u64::MAX)),
            SqlValue::from("18446744073709551615")
        );
        assert_eq!(
            convert_value(Value::Bytes(b"Activo".to_vec())),
            SqlValue::from("Activo")
        );
        assert_eq!(
            convert_value(Value::Bytes(vec![0xff, 0xfe])),
            SqlValue::Bytes(vec![0xff, 0xfe])
        );
    }

    #[test]
    fn test_convert_dates() {
        let value = convert_value(Value::Date(2014, 9, 5, 10, 30, 0, 0));
        assert_eq!(value.to_string(), "2014-09-05 10:30:00");
        assert_eq!(convert_value(Value::Date(0, 0, 0, 0, 0, 0, 0)), SqlValue::Null);
        assert_eq!(
            convert_value(Value::Time(false, 1, 2, 3, 4, 0)),
            SqlValue::from("26:03:04")
        );
    }

    #[test]
    fn test_connection_opts() {
        let config = DatabaseConfig {
            host: "db.local".into(),
            port: 3307,
            database: "openmrs".into(),
            user: "esaude".into(),
            password: "secret".into(),
            ssl_mode: "disable".into(),
        };
        let opts = connection_opts(&config, true).unwrap();
        assert_eq!(opts.ip_or_hostname(), "db.local");
        assert_eq!(opts.tcp_port(), 3307);
        assert_eq!(opts.db_name(), Some("openmrs"));
        assert!(opts.ssl_opts().is_none());

        let bad = DatabaseConfig {
            ssl_mode: "bogus".into(),
            ..config
        };
        assert!(connection_opts(&bad, true).is_err());
    }
}
