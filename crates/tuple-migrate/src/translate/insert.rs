//! Tuple Resolver: composes the INSERT for one row of a tuple.

use tracing::debug;

use crate::core::{Dao, SqlValue};
use crate::error::{MigrateError, Result};
use crate::model::token::SKIP;
use crate::model::{DefaultValue, Match, ReferencedValue, SourceColumn, ValueMatchId, ValueMatchTable, YesNo};

use super::frame::FrameRef;
use super::normalize::{cast_str, enforce};
use super::query::select_match;
use super::sql::SqlBuilder;

/// Audit columns appended to every insert.
const CREATOR_COLUMN: &str = "creator";
const CREATOR_ID: &str = "1";
const DATE_CREATED_COLUMN: &str = "date_created";
const VOIDED_COLUMN: &str = "voided";
const UUID_COLUMN: &str = "uuid";
/// Tables without a `voided` column.
const NO_VOIDED_TABLE: &str = "PROVIDER";
/// Tables without a `uuid` column.
const NO_UUID_TABLE: &str = "PATIENT";
const NOW_SQL: &str = "NOW()";

/// Result of resolving one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TupleOutcome {
    /// The INSERT to run on the target.
    Inserted(String),
    /// A match asked for the whole row to be skipped; nothing is inserted.
    Skipped { match_id: u32 },
}

/// Source access and lookup tables shared by every row.
#[derive(Clone, Copy)]
pub struct InsertContext<'a> {
    pub source: &'a dyn Dao,
    pub value_matches: &'a ValueMatchTable,
}

/// What one match contributes to the row.
enum Resolution {
    Column(String),
    Omit,
    SkipRow,
}

/// Build the INSERT for the row of `frame` driven by its current curr.
///
/// `curr_index` is the position of that curr in the tuple's curr list; a
/// match query returning several rows is read at the same position.
pub async fn insert_tuple(
    frame: &FrameRef<'_>,
    ctx: InsertContext<'_>,
    uuid: &str,
    curr_index: usize,
) -> Result<TupleOutcome> {
    let tuple = frame.tuple();
    let mut sql = SqlBuilder::new().insert_into(tuple.table.as_str());

    for m in &tuple.matches {
        if m.default_value == DefaultValue::Ai {
            continue;
        }
        let resolution = match &m.right {
            None => resolve_default(m, frame, ctx)?,
            Some(right) => resolve_selected(m, right, frame, ctx, curr_index).await?,
        };
        match resolution {
            Resolution::Column(literal) => {
                sql.value(m.left.column.as_str(), literal);
            }
            Resolution::Omit => {}
            Resolution::SkipRow => {
                debug!(
                    "Skipping row {} of tuple {} on match {}",
                    curr_index, tuple.id, m.id
                );
                return Ok(TupleOutcome::Skipped { match_id: m.id });
            }
        }
    }

    for r in &tuple.references {
        let Some(referencee) = &r.referencee else {
            continue;
        };
        if !referencee.table.eq_ignore_ascii_case(&tuple.table) {
            continue;
        }
        let literal = match &r.referenced_value {
            ReferencedValue::Top(_) => {
                let holder = std::iter::successors(frame.parent(), |f| f.parent())
                    .find(|f| f.tuple().table.eq_ignore_ascii_case(&r.referenced.table))
                    .ok_or_else(|| {
                        MigrateError::model(format!(
                            "Self reference {} of tuple {}: no enclosing tuple maps table '{}'",
                            r.id, tuple.id, r.referenced.table
                        ))
                    })?;
                let top = holder.top().ok_or_else(|| {
                    MigrateError::model(format!(
                        "Self reference {} of tuple {}: tuple {} has no generated key yet",
                        r.id,
                        tuple.id,
                        holder.tuple().id
                    ))
                })?;
                ctx.source.cast(top)
            }
            other => cast_str(&other.to_string()),
        };
        sql.value(referencee.column.as_str(), literal);
    }

    sql.value(CREATOR_COLUMN, CREATOR_ID);
    sql.value(DATE_CREATED_COLUMN, NOW_SQL);
    if !tuple.table.eq_ignore_ascii_case(NO_VOIDED_TABLE) {
        sql.value(VOIDED_COLUMN, "0");
    }
    if !tuple.table.eq_ignore_ascii_case(NO_UUID_TABLE) {
        sql.value(UUID_COLUMN, cast_str(uuid));
    }

    Ok(TupleOutcome::Inserted(sql.to_string()))
}

/// Fill a column that has no source side.
fn resolve_default(m: &Match, frame: &FrameRef<'_>, ctx: InsertContext<'_>) -> Result<Resolution> {
    let tuple_id = frame.tuple().id;
    match &m.default_value {
        DefaultValue::Top(levels) => {
            let holder = frame.ancestor(*levels).ok_or_else(|| {
                MigrateError::model(format!(
                    "Match {} of tuple {}: {} climbs above the root tuple",
                    m.id, tuple_id, m.default_value
                ))
            })?;
            let top = holder.top().ok_or_else(|| {
                MigrateError::model(format!(
                    "Match {} of tuple {}: tuple {} has no generated key yet",
                    m.id,
                    tuple_id,
                    holder.tuple().id
                ))
            })?;
            Ok(Resolution::Column(ctx.source.cast(top)))
        }
        DefaultValue::Now => Ok(Resolution::Column(NOW_SQL.to_string())),
        DefaultValue::AiSkipTrue | DefaultValue::AiSkipFalse => Err(MigrateError::model(format!(
            "Match {} of tuple {}: {} needs a source column",
            m.id, tuple_id, m.default_value
        ))),
        other => Ok(Resolution::Column(cast_str(&other.to_string()))),
    }
}

/// Fill a column from its source query.
async fn resolve_selected(
    m: &Match,
    right: &SourceColumn,
    frame: &FrameRef<'_>,
    ctx: InsertContext<'_>,
    curr_index: usize,
) -> Result<Resolution> {
    let query = select_match(m, frame)?;
    let results = ctx.source.execute_query(&query).await?;
    debug!("Match {}: {} -> {} rows", m.id, query, results.len());

    // A single row serves every curr; otherwise rows line up with the currs.
    let row_index = if results.len() > 1 { curr_index } else { 0 };
    let value = results
        .get(row_index)
        .and_then(|row| row.first())
        .cloned()
        .ok_or_else(|| MigrateError::QueryShape {
            match_id: m.id,
            query: query.clone(),
            found: results.len(),
            expected: curr_index + 1,
        })?
        .into_option();

    match (&m.default_value, value) {
        (DefaultValue::AiSkipTrue, value) => Ok(if flag(&value) {
            Resolution::SkipRow
        } else {
            Resolution::Omit
        }),
        (DefaultValue::AiSkipFalse, value) => Ok(if flag(&value) {
            Resolution::Omit
        } else {
            Resolution::SkipRow
        }),
        (DefaultValue::Skip, None) => Ok(Resolution::SkipRow),
        (DefaultValue::Now, None) => Ok(Resolution::Column(NOW_SQL.to_string())),
        (default, None) if right.is_required == YesNo::No => {
            Ok(Resolution::Column(cast_str(&default.to_string())))
        }
        (_, value) => match m.value_match_id {
            ValueMatchId::Group(group) => map_value(m, group, value.as_ref(), ctx.value_matches),
            ValueMatchId::NotApplicable => Ok(Resolution::Column(enforce(
                &m.left.datatype,
                &value.unwrap_or(SqlValue::Null),
            )?)),
        },
    }
}

fn flag(value: &Option<SqlValue>) -> bool {
    value.as_ref().is_some_and(SqlValue::as_bool)
}

/// Remap a source value through its value-match group.
fn map_value(
    m: &Match,
    group_id: u32,
    value: Option<&SqlValue>,
    value_matches: &ValueMatchTable,
) -> Result<Resolution> {
    let group = value_matches.group(group_id).ok_or_else(|| {
        MigrateError::model(format!(
            "Couldn't find value match group {} used by match {}",
            group_id, m.id
        ))
    })?;
    let source = value.map(ToString::to_string).unwrap_or_else(|| "null".to_string());
    let mapped = group.get(&source).ok_or_else(|| {
        MigrateError::model(format!(
            "Couldn't find match for value: {} in match {}",
            source, m.id
        ))
    })?;

    if mapped.trim().eq_ignore_ascii_case(SKIP) {
        Ok(Resolution::SkipRow)
    } else {
        Ok(Resolution::Column(cast_str(mapped)))
    }
}
