//! Orchestrator: wires configuration, matching model, DAOs and the process
//! store into one translation run.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{Config, DatabaseConfig, StateBackend};
use crate::core::Dao;
use crate::drivers::mysql::{open_pool, DaoRole, MysqlDao};
use crate::error::Result;
use crate::model::{MatchingModel, PreparedModel};
use crate::state::{FileProcessStore, MysqlProcessStore, ProcessRecord, ProcessStore};
use crate::translate::{TranslationResult, Translator};

/// Translation orchestrator.
pub struct Orchestrator {
    config: Config,
    cancel: CancellationToken,
}

/// Result of a health check.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_error: Option<String>,
    pub healthy: bool,
}

impl Orchestrator {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Pause at the next root tree once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Load, build and validate the matching model.
    pub fn load_model(&self) -> Result<PreparedModel> {
        let path = &self.config.translation.matching_model;
        let model = MatchingModel::load(path)?.prepare()?;
        info!(
            "Matching model {:?}: {} tuples, hash {}",
            path,
            model.tree.len(),
            model.hash
        );
        Ok(model)
    }

    /// Open the configured process store.
    pub async fn open_store(&self) -> Result<Arc<dyn ProcessStore>> {
        let translation = &self.config.translation;
        let store: Arc<dyn ProcessStore> = match translation.state_backend {
            StateBackend::File => Arc::new(FileProcessStore::new(translation.process_file.clone())),
            StateBackend::Database => {
                let pool = open_pool(&self.config.target, "process store").await?;
                Arc::new(MysqlProcessStore::new(pool))
            }
        };
        info!("Using {} process store", store.backend_type());
        Ok(store)
    }

    /// Run the translation.
    pub async fn run(&self) -> Result<TranslationResult> {
        let model = self.load_model()?;
        let store = self.open_store().await?;

        info!("Connecting to source {}", self.config.source.label());
        let source = MysqlDao::source(&self.config.source).await?;
        info!("Connecting to target {}", self.config.target.label());
        let target = match MysqlDao::target(&self.config.target).await {
            Ok(target) => target,
            Err(e) => {
                if let Err(ce) = source.close().await {
                    warn!("Failed to close source: {}", ce);
                }
                return Err(e);
            }
        };

        let options = self.config.translation.options();
        if !options.allow_commit {
            warn!("allow_commit is false: no root tree will be committed");
        }

        Translator::new(model, Arc::new(source), Arc::new(target), store, options)
            .with_cancellation(self.cancel.clone())
            .execute()
            .await
    }

    /// Read the current process record.
    pub async fn status(&self) -> Result<ProcessRecord> {
        let store = self.open_store().await?;
        store.init().await?;
        store.load().await
    }

    /// Test the source and target connections.
    pub async fn health_check(&self) -> HealthCheckResult {
        let (source_connected, source_latency_ms, source_error) =
            probe(&self.config.source, DaoRole::Source).await;
        let (target_connected, target_latency_ms, target_error) =
            probe(&self.config.target, DaoRole::Target).await;

        HealthCheckResult {
            source_connected,
            source_latency_ms,
            source_error,
            target_connected,
            target_latency_ms,
            target_error,
            healthy: source_connected && target_connected,
        }
    }
}

async fn probe(config: &DatabaseConfig, role: DaoRole) -> (bool, u64, Option<String>) {
    let dao = match MysqlDao::connect(config, role).await {
        Ok(dao) => dao,
        Err(e) => return (false, 0, Some(e.to_string())),
    };
    let result = dao.ping().await;
    if let Err(e) = dao.close().await {
        warn!("Failed to close {} after health check: {}", role, e);
    }
    match result {
        Ok(latency) => (true, latency.as_millis() as u64, None),
        Err(e) => (false, 0, Some(e.to_string())),
    }
}
