//! Traversal engine: walks the tuple tree once per source row and owns the
//! root-tree transaction and the process checkpoint.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::{Dao, SqlValue};
use crate::error::{MigrateError, Result};
use crate::model::{NodeId, PreparedModel};
use crate::state::{ProcessRecord, ProcessStatus, ProcessStore};

use super::frame::{FrameRef, Frames};
use super::insert::{insert_tuple, InsertContext, TupleOutcome};
use super::query::select_currs;

/// Run switches taken from the `translation` configuration section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationOptions {
    /// Rewrite the checkpoint to 0 before starting.
    pub reset_process: bool,
    /// Commit each finished root tree. When false every tree stays uncommitted.
    pub allow_commit: bool,
    /// Pause after this many root trees.
    pub tree_limit: Option<u64>,
}

impl Default for TranslationOptions {
    fn default() -> Self {
        Self {
            reset_process: false,
            allow_commit: true,
            tree_limit: None,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationOutcome {
    /// Every root tree was processed; the checkpoint is back at 0.
    Completed,
    /// The tree limit was reached; the checkpoint holds the next tree.
    Paused,
    /// Interrupted between root trees; the checkpoint holds the next tree.
    Cancelled,
    /// The walk ended with root rows skipped, so the checkpoint was left as is.
    Incomplete,
}

impl std::fmt::Display for TranslationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TranslationOutcome::Completed => "completed",
            TranslationOutcome::Paused => "paused",
            TranslationOutcome::Cancelled => "cancelled",
            TranslationOutcome::Incomplete => "incomplete",
        };
        f.write_str(s)
    }
}

/// Summary of one `execute()` call.
#[derive(Debug, Clone, Serialize)]
pub struct TranslationResult {
    pub outcome: TranslationOutcome,

    /// Root trees finished in this run.
    pub trees_processed: u64,

    /// Rows inserted on the target, descendants included.
    pub rows_inserted: u64,

    /// Rows a match asked to skip.
    pub rows_skipped: u64,

    /// Position of the next root tree when the run stopped.
    pub process_count: u64,

    /// Root trees found on the source.
    pub total_trees: u64,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
}

impl TranslationResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Halt {
    Paused,
    Cancelled,
}

/// Mutable state of one `execute()` call.
struct RunState {
    frames: Frames,
    process_count: u64,
    tree_count: u64,
    total_trees: u64,
    first_run: bool,
    curr_tuple_id: u32,
    rows_inserted: u64,
    rows_skipped: u64,
    halt: Option<Halt>,
}

/// Translates every root tree of a prepared model from source to target.
pub struct Translator {
    model: PreparedModel,
    source: Arc<dyn Dao>,
    target: Arc<dyn Dao>,
    store: Arc<dyn ProcessStore>,
    options: TranslationOptions,
    cancel: CancellationToken,
}

impl Translator {
    pub fn new(
        model: PreparedModel,
        source: Arc<dyn Dao>,
        target: Arc<dyn Dao>,
        store: Arc<dyn ProcessStore>,
        options: TranslationOptions,
    ) -> Self {
        Self {
            model,
            source,
            target,
            store,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop at the next root tree boundary once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the translation from the stored checkpoint.
    ///
    /// On failure the target is rolled back to the savepoint of the current
    /// root tree, the checkpoint is recorded as FAILED and the error names the
    /// tuple being processed.
    pub async fn execute(&self) -> Result<TranslationResult> {
        let started_at = Utc::now();
        let timer = Instant::now();

        self.store.init().await?;
        if self.options.reset_process {
            info!("Resetting process checkpoint");
            self.record(0, ProcessStatus::Reset).await?;
        }
        let record = self.store.load().await?;
        if !self.options.reset_process {
            record.validate_model(&self.model.hash)?;
        }

        let tree = &self.model.tree;
        let mut state = RunState {
            frames: Frames::new(tree),
            process_count: record.last_stop_point,
            tree_count: 0,
            total_trees: 0,
            first_run: true,
            curr_tuple_id: tree.tuple(tree.root()).id,
            rows_inserted: 0,
            rows_skipped: 0,
            halt: None,
        };

        info!(
            "Starting translation at tree {} ({} tuples, {} process store)",
            state.process_count,
            tree.len(),
            self.store.backend_type()
        );

        if let Err(e) = self.read(&mut state, tree.root()).await {
            warn!(
                "Translation failed on tuple {}, rolling back: {}",
                state.curr_tuple_id, e
            );
            if let Err(rb) = self.target.rollback().await {
                warn!("Rollback failed: {}", rb);
            }
            if let Err(se) = self.record(state.process_count, ProcessStatus::Failed).await {
                warn!("Failed to record FAILED checkpoint: {}", se);
            }
            self.close_daos().await;
            return Err(MigrateError::translation(state.curr_tuple_id, e));
        }

        let outcome = match state.halt {
            Some(Halt::Cancelled) => TranslationOutcome::Cancelled,
            _ if state.process_count == state.total_trees => TranslationOutcome::Completed,
            Some(Halt::Paused) => TranslationOutcome::Paused,
            None => TranslationOutcome::Incomplete,
        };
        let completed_at = Utc::now();
        let duration = timer.elapsed().as_secs_f64();

        info!(
            "Translation {}: {} trees this run, {} rows inserted, {} rows skipped, at tree {}/{} ({:.1}s)",
            outcome,
            state.tree_count,
            state.rows_inserted,
            state.rows_skipped,
            state.process_count,
            state.total_trees,
            duration
        );

        Ok(TranslationResult {
            outcome,
            trees_processed: state.tree_count,
            rows_inserted: state.rows_inserted,
            rows_skipped: state.rows_skipped,
            process_count: state.process_count,
            total_trees: state.total_trees,
            started_at,
            completed_at,
            duration_seconds: duration,
        })
    }

    /// Translate every curr of `node`, recursing into its children per row.
    fn read<'a>(&'a self, state: &'a mut RunState, node: NodeId) -> BoxFuture<'a, Result<()>> {
        async move {
            let tree = &self.model.tree;
            let tuple = tree.tuple(node);
            let is_root = tree.parent(node).is_none();
            state.curr_tuple_id = tuple.id;

            let currs_sql = select_currs(&FrameRef::new(tree, &state.frames, node))?;
            debug!("Tuple {} currs: {}", tuple.id, currs_sql);
            let currs = self.source.execute_query(&currs_sql).await?;

            // The checkpoint offset applies once, to the first tree read.
            let mut start = 0;
            if state.first_run {
                start = usize::try_from(state.process_count).unwrap_or(usize::MAX);
                state.total_trees = currs.len() as u64;
                state.first_run = false;
            }

            let ctx = InsertContext {
                source: self.source.as_ref(),
                value_matches: &self.model.value_matches,
            };

            for (index, row) in currs.iter().enumerate().skip(start) {
                if is_root {
                    if self.cancel.is_cancelled() {
                        info!("Cancellation requested, pausing at tree {}", state.process_count);
                        self.record(state.process_count, ProcessStatus::Paused).await?;
                        state.halt = Some(Halt::Cancelled);
                        break;
                    }
                    self.target.set_save_point().await?;
                }
                state.curr_tuple_id = tuple.id;

                let curr = row.first().cloned().and_then(SqlValue::into_option);
                state.frames.set_curr(node, curr.clone());
                let Some(curr) = curr else {
                    debug!("Tuple {} row {}: no curr, skipping", tuple.id, index);
                    continue;
                };

                let uuid = Uuid::new_v4().to_string();
                let frame = FrameRef::new(tree, &state.frames, node);
                let insert_sql = match insert_tuple(&frame, ctx, &uuid, index).await? {
                    TupleOutcome::Inserted(sql) => sql,
                    TupleOutcome::Skipped { match_id } => {
                        warn!(
                            "Tuple {} ({}) > CURR {}: skipped by match {}",
                            tuple.id, tuple.table, curr, match_id
                        );
                        state.rows_skipped += 1;
                        continue;
                    }
                };
                debug!(
                    "{} : {} - {} > CURR : {}\n{}",
                    tuple.id, tuple.table, tuple.terminology, curr, insert_sql
                );

                let tops = self.target.execute_update(&insert_sql).await?;
                let top = tops
                    .into_iter()
                    .next()
                    .and_then(|r| r.into_iter().next())
                    .and_then(SqlValue::into_option);
                state.frames.set_top(node, top);
                state.rows_inserted += 1;

                for child in tree.children(node) {
                    self.read(state, *child).await?;
                }
                state.curr_tuple_id = tuple.id;

                if is_root {
                    if self.options.allow_commit {
                        self.target.commit().await?;
                    }
                    state.process_count += 1;
                    state.tree_count += 1;
                    debug!("Finished tree {} (curr {})", state.process_count, curr);

                    if self.options.tree_limit == Some(state.tree_count) {
                        info!(
                            "Tree limit {} reached, pausing at tree {}",
                            state.tree_count, state.process_count
                        );
                        self.record(state.process_count, ProcessStatus::Paused).await?;
                        state.halt = Some(Halt::Paused);
                        break;
                    }
                }
            }

            if is_root {
                self.close_daos().await;
                if state.process_count == state.total_trees {
                    self.record(0, ProcessStatus::Completed).await?;
                }
            }
            Ok(())
        }
        .boxed()
    }

    async fn record(&self, last_stop_point: u64, status: ProcessStatus) -> Result<()> {
        let record =
            ProcessRecord::new(last_stop_point, status).with_model_hash(self.model.hash.as_str());
        self.store.record(&record).await?;
        info!("Recorded process {} at tree {}", status, last_stop_point);
        Ok(())
    }

    async fn close_daos(&self) {
        if let Err(e) = self.target.close().await {
            warn!("Failed to close target: {}", e);
        }
        if let Err(e) = self.source.close().await {
            warn!("Failed to close source: {}", e);
        }
    }
}
