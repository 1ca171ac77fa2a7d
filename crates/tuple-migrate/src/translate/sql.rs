//! Minimal SQL text builder for the statements the translator emits.
//!
//! Only what the translator needs: `SELECT .. FROM .. WHERE ..` with
//! AND-joined predicate groups, and single-row `INSERT INTO .. VALUES ..`.

use std::fmt;

/// Accumulates the clauses of one statement.
#[derive(Debug, Clone, Default)]
pub struct SqlBuilder {
    insert_table: Option<String>,
    columns: Vec<String>,
    values: Vec<String>,
    select: Vec<String>,
    from: Vec<String>,
    where_groups: Vec<Vec<String>>,
}

impl SqlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an INSERT into `table`.
    pub fn insert_into(mut self, table: impl Into<String>) -> Self {
        self.insert_table = Some(table.into());
        self
    }

    /// Add a column and its already-rendered literal to the INSERT.
    pub fn value(&mut self, column: impl Into<String>, literal: impl Into<String>) -> &mut Self {
        self.columns.push(column.into());
        self.values.push(literal.into());
        self
    }

    /// Add a select expression.
    pub fn select(&mut self, expr: impl Into<String>) -> &mut Self {
        self.select.push(expr.into());
        self
    }

    /// Add a table to the FROM list. A table already listed (compared
    /// case-insensitively) is not added twice.
    pub fn from(&mut self, table: impl Into<String>) -> &mut Self {
        let table = table.into();
        if !self.from.iter().any(|t| t.eq_ignore_ascii_case(&table)) {
            self.from.push(table);
        }
        self
    }

    /// Add a predicate to the current WHERE group. Predicates inside a group
    /// are joined with AND.
    pub fn where_clause(&mut self, predicate: impl Into<String>) -> &mut Self {
        let predicate = predicate.into();
        match self.where_groups.last_mut() {
            Some(group) => group.push(predicate),
            None => self.where_groups.push(vec![predicate]),
        }
        self
    }

    /// Close the current WHERE group; following predicates open a new one.
    /// Has no effect while the current group is empty.
    pub fn and(&mut self) -> &mut Self {
        if self.where_groups.last().is_some_and(|g| !g.is_empty()) {
            self.where_groups.push(Vec::new());
        }
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    fn write_select(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT {}", self.select.join(", "))?;
        if !self.from.is_empty() {
            write!(f, " FROM {}", self.from.join(", "))?;
        }
        let groups: Vec<String> = self
            .where_groups
            .iter()
            .filter(|g| !g.is_empty())
            .map(|g| format!("({})", g.join(" AND ")))
            .collect();
        if !groups.is_empty() {
            write!(f, " WHERE {}", groups.join(" AND "))?;
        }
        Ok(())
    }

    fn write_insert(&self, table: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            self.columns.join(", "),
            self.values.join(", ")
        )
    }
}

impl fmt::Display for SqlBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(table) = &self.insert_table {
            self.write_insert(table, f)
        } else if !self.select.is_empty() {
            self.write_select(f)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_select() {
        let mut sql = SqlBuilder::new();
        sql.select("person.person_id").from("person");
        assert_eq!(sql.to_string(), "SELECT person.person_id FROM person");
    }

    #[test]
    fn test_where_groups() {
        let mut sql = SqlBuilder::new();
        sql.select("a.id")
            .from("a")
            .from("b")
            .where_clause("a.x = 1")
            .where_clause("b.y = a.y")
            .and()
            .where_clause("b.z = 'A' OR b.z = 'B'");
        assert_eq!(
            sql.to_string(),
            "SELECT a.id FROM a, b WHERE (a.x = 1 AND b.y = a.y) AND (b.z = 'A' OR b.z = 'B')"
        );
    }

    #[test]
    fn test_from_is_deduplicated() {
        let mut sql = SqlBuilder::new();
        sql.select("obs.value").from("obs").from("OBS").from("encounter");
        assert_eq!(sql.to_string(), "SELECT obs.value FROM obs, encounter");
    }

    #[test]
    fn test_and_on_empty_group_is_noop() {
        let mut sql = SqlBuilder::new();
        sql.select("t.c").from("t").and().where_clause("t.c = 1").and();
        assert_eq!(sql.to_string(), "SELECT t.c FROM t WHERE (t.c = 1)");
    }

    #[test]
    fn test_insert() {
        let mut sql = SqlBuilder::new().insert_into("patient");
        sql.value("gender", "'M'").value("date_created", "NOW()");
        assert_eq!(
            sql.to_string(),
            "INSERT INTO patient (gender, date_created) VALUES ('M', NOW())"
        );
        assert_eq!(sql.columns().len(), 2);
    }

    #[test]
    fn test_empty_builder_renders_nothing() {
        assert_eq!(SqlBuilder::new().to_string(), "");
    }
}
