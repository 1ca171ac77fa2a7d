//! Fixtures shared by the translate tests.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::{Dao, Row, SqlValue};
use crate::error::{MigrateError, Result};
use crate::model::{Tuple, TupleTree};

/// A parent chain of `depth` tuples with ids `1..=depth`, root first.
pub fn chain_tree(depth: u32) -> TupleTree {
    let tuples = (1..=depth)
        .map(|id| Tuple {
            id,
            parent: (id > 1).then(|| id - 1),
            desc: format!("level {}", id),
            table: format!("t{}", id),
            terminology: String::new(),
            matches: Vec::new(),
            references: Vec::new(),
        })
        .collect();
    TupleTree::build(tuples).unwrap()
}

#[derive(Debug, Default)]
struct Ledger {
    queries: Vec<String>,
    committed: Vec<String>,
    pending: Vec<String>,
    savepoint: usize,
    next_key: i64,
    commits: usize,
    rollbacks: usize,
    savepoints: usize,
    closed: bool,
}

/// In-memory DAO answering queries from a script and modelling one
/// transaction with a single savepoint.
///
/// A scripted response matches when its pattern equals the selected
/// expression of the query; otherwise the longest pattern contained in the
/// query text wins. Unscripted queries return no rows.
#[derive(Debug, Default)]
pub struct ScriptedDao {
    responses: Vec<(String, Vec<Row>)>,
    failing_queries: Vec<String>,
    failing_updates: Vec<String>,
    ledger: Mutex<Ledger>,
}

impl ScriptedDao {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, pattern: &str, rows: Vec<Row>) -> Self {
        self.responses.push((pattern.to_string(), rows));
        self
    }

    /// Fail every query containing `pattern`.
    pub fn fail_query_on(mut self, pattern: &str) -> Self {
        self.failing_queries.push(pattern.to_string());
        self
    }

    /// Fail every insert containing `pattern`.
    pub fn fail_update_on(mut self, pattern: &str) -> Self {
        self.failing_updates.push(pattern.to_string());
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.ledger.lock().unwrap().queries.clone()
    }

    /// Inserts made durable by a commit.
    pub fn committed(&self) -> Vec<String> {
        self.ledger.lock().unwrap().committed.clone()
    }

    /// Inserts run since the last commit and not rolled back.
    pub fn pending(&self) -> Vec<String> {
        self.ledger.lock().unwrap().pending.clone()
    }

    pub fn commits(&self) -> usize {
        self.ledger.lock().unwrap().commits
    }

    pub fn rollbacks(&self) -> usize {
        self.ledger.lock().unwrap().rollbacks
    }

    pub fn savepoints(&self) -> usize {
        self.ledger.lock().unwrap().savepoints
    }

    pub fn is_closed(&self) -> bool {
        self.ledger.lock().unwrap().closed
    }

    fn lookup(&self, sql: &str) -> Vec<Row> {
        let selected = sql
            .strip_prefix("SELECT ")
            .and_then(|rest| rest.split(" FROM ").next());
        self.responses
            .iter()
            .find(|(pattern, _)| Some(pattern.as_str()) == selected)
            .or_else(|| {
                self.responses
                    .iter()
                    .filter(|(pattern, _)| sql.contains(pattern.as_str()))
                    .max_by_key(|(pattern, _)| pattern.len())
            })
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Dao for ScriptedDao {
    async fn execute_query(&self, sql: &str) -> Result<Vec<Row>> {
        self.ledger.lock().unwrap().queries.push(sql.to_string());
        if self.failing_queries.iter().any(|p| sql.contains(p.as_str())) {
            return Err(MigrateError::database("scripted query failure", sql));
        }
        Ok(self.lookup(sql))
    }

    async fn execute_update(&self, sql: &str) -> Result<Vec<Row>> {
        if self.failing_updates.iter().any(|p| sql.contains(p.as_str())) {
            return Err(MigrateError::database("scripted insert failure", sql));
        }
        let mut ledger = self.ledger.lock().unwrap();
        ledger.pending.push(sql.to_string());
        ledger.next_key += 1;
        Ok(vec![vec![SqlValue::Int(ledger.next_key)]])
    }

    async fn set_save_point(&self) -> Result<()> {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.savepoint = ledger.pending.len();
        ledger.savepoints += 1;
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let mut ledger = self.ledger.lock().unwrap();
        let pending = std::mem::take(&mut ledger.pending);
        ledger.committed.extend(pending);
        ledger.savepoint = 0;
        ledger.commits += 1;
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let mut ledger = self.ledger.lock().unwrap();
        let savepoint = ledger.savepoint;
        ledger.pending.truncate(savepoint);
        ledger.rollbacks += 1;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.pending.clear();
        ledger.closed = true;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "scripted"
    }
}
