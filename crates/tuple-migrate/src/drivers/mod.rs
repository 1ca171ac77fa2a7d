//! Database driver implementations.
//!
//! - [`mysql`]: MySQL/MariaDB implementation of [`Dao`](crate::core::Dao)
//! - [`common`]: shared utilities (TLS modes)
//!
//! # Adding New Databases
//!
//! 1. Create a new module under `drivers/`
//! 2. Implement [`Dao`](crate::core::Dao) for its connection type
//! 3. Accept the database in `config::validation` and open it in the orchestrator

pub mod common;
pub mod mysql;

pub use common::SslMode;
pub use mysql::{DaoRole, MysqlDao};
