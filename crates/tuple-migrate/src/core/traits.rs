//! Core traits for database-agnostic translation.
//!
//! The translator talks to both databases through [`Dao`]. The source side is
//! only ever queried; the target side also receives inserts and carries the
//! per-root-tree transaction.

use async_trait::async_trait;

use crate::error::Result;
use crate::translate::normalize;

use super::value::{Row, SqlValue};

/// Data access object for one database connection.
///
/// # Transactions
///
/// A target DAO holds a single open transaction. [`set_save_point`] marks the
/// start of a root tree, [`commit`] makes everything since the last commit
/// durable and [`rollback`] discards work back to the last savepoint.
///
/// [`set_save_point`]: Dao::set_save_point
/// [`commit`]: Dao::commit
/// [`rollback`]: Dao::rollback
#[async_trait]
pub trait Dao: Send + Sync {
    /// Run a query and return every row.
    async fn execute_query(&self, sql: &str) -> Result<Vec<Row>>;

    /// Run an INSERT and return the generated primary key as `rows[0][0]`.
    async fn execute_update(&self, sql: &str) -> Result<Vec<Row>>;

    /// Mark the rollback point for the current root tree.
    async fn set_save_point(&self) -> Result<()>;

    /// Commit the open transaction.
    async fn commit(&self) -> Result<()>;

    /// Roll back to the last savepoint.
    async fn rollback(&self) -> Result<()>;

    /// Release the connection. Uncommitted work is discarded.
    async fn close(&self) -> Result<()>;

    /// Render a value as an SQL literal.
    fn cast(&self, value: &SqlValue) -> String {
        normalize::cast(value)
    }

    /// Get the database type identifier (e.g., "mysql").
    fn db_type(&self) -> &str;
}
