//! MySQL/MariaDB database driver.
//!
//! [`MysqlDao`] serves both sides of a translation: a plain connection for
//! the legacy source and a transactional one (autocommit off) for the
//! target.
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+

mod dao;

pub use dao::{connection_opts, convert_value, open_pool, DaoRole, MysqlDao};
