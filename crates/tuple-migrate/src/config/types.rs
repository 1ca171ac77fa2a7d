//! Configuration type definitions.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::translate::TranslationOptions;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Legacy database rows are read from.
    #[serde(alias = "sourceDb")]
    pub source: DatabaseConfig,

    /// Database receiving the translated rows.
    #[serde(alias = "targetDb")]
    pub target: DatabaseConfig,

    /// Translation behavior.
    pub translation: TranslationConfig,
}

/// MySQL connection settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// disable, prefer, require, verify-ca or verify-full (default: prefer).
    #[serde(default = "default_prefer", alias = "sslMode")]
    pub ssl_mode: String,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Translation run settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    /// Restart from the first root tree (default: false).
    #[serde(default, alias = "resetProcess")]
    pub reset_process: bool,

    /// Commit each finished root tree; false makes the run a dry run (default: true).
    #[serde(default = "default_true", alias = "allowCommit")]
    pub allow_commit: bool,

    /// Pause after this many root trees. Unlimited if not set.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "treeLimit")]
    pub tree_limit: Option<u64>,

    /// Matching model file (.yaml, .yml or .json).
    #[serde(alias = "matchingModel")]
    pub matching_model: PathBuf,

    /// Where the process checkpoint is kept (default: file).
    #[serde(default, alias = "stateBackend")]
    pub state_backend: StateBackend,

    /// Checkpoint file for the file backend (default: process.json).
    #[serde(default = "default_process_file", alias = "processFile")]
    pub process_file: PathBuf,
}

impl TranslationConfig {
    pub fn options(&self) -> TranslationOptions {
        TranslationOptions {
            reset_process: self.reset_process,
            allow_commit: self.allow_commit,
            tree_limit: self.tree_limit,
        }
    }
}

/// Process checkpoint backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateBackend {
    /// JSON file at `process_file`.
    #[default]
    File,

    /// `_tuple_migrate.process_state` table on the target server.
    Database,
}

// Default value functions for serde
fn default_mysql_port() -> u16 {
    3306
}

fn default_prefer() -> String {
    "prefer".to_string()
}

fn default_process_file() -> PathBuf {
    PathBuf::from("process.json")
}

fn default_true() -> bool {
    true
}
