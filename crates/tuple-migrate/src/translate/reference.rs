//! Reference Resolver: turns a referenced-value token into the values a
//! query filters on.

use crate::error::{MigrateError, Result};
use crate::model::token::OR_SEPARATORS;
use crate::model::ReferencedValue;

use super::frame::FrameRef;
use super::normalize::cast_str;
use super::sql::SqlBuilder;

/// Which frame `CURR` (level 1) designates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrAnchor {
    /// `CURR` is the parent's curr (PK queries).
    Parent,
    /// `CURR` is the current frame's curr (match queries).
    Current,
}

impl CurrAnchor {
    fn levels(self, level: usize) -> usize {
        match self {
            CurrAnchor::Parent => level,
            CurrAnchor::Current => level - 1,
        }
    }
}

/// A resolved referenced value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// No filter.
    All,
    /// Join only.
    Equals,
    /// Alternatives the column must equal; more than one means an OR group.
    Values(Vec<String>),
}

impl Resolved {
    /// Add the value filter on `column` to `sql`. A single value becomes an
    /// equality in the current WHERE group; alternatives become their own
    /// parenthesized OR group.
    pub fn apply(&self, sql: &mut SqlBuilder, column: &str) {
        let Resolved::Values(values) = self else {
            return;
        };
        match values.as_slice() {
            [] => {}
            [single] => {
                sql.where_clause(format!("{} = {}", column, cast_str(single)));
            }
            alternatives => {
                let group = alternatives
                    .iter()
                    .map(|v| format!("{} = {}", column, cast_str(v)))
                    .collect::<Vec<_>>()
                    .join(" OR ");
                sql.and().where_clause(group).and();
            }
        }
    }
}

/// Resolve `value` against `frame`.
pub fn resolve(value: &ReferencedValue, frame: &FrameRef<'_>, anchor: CurrAnchor) -> Result<Resolved> {
    match value {
        ReferencedValue::All => Ok(Resolved::All),
        ReferencedValue::Equals => Ok(Resolved::Equals),
        ReferencedValue::Curr(level) => {
            let target = frame.ancestor(anchor.levels(*level)).ok_or_else(|| {
                MigrateError::model(format!(
                    "{} in tuple {} climbs above the root tuple",
                    value,
                    frame.tuple().id
                ))
            })?;
            let curr = target.curr().ok_or_else(|| {
                MigrateError::model(format!(
                    "{} in tuple {}: tuple {} has no current value",
                    value,
                    frame.tuple().id,
                    target.tuple().id
                ))
            })?;
            Ok(Resolved::Values(split_alternatives(&curr.to_string())))
        }
        ReferencedValue::Top(raw) | ReferencedValue::Literal(raw) => {
            Ok(Resolved::Values(split_alternatives(raw)))
        }
    }
}

/// Split `A >> B << C` into its trimmed alternatives.
fn split_alternatives(value: &str) -> Vec<String> {
    if !OR_SEPARATORS.iter().any(|sep| value.contains(sep)) {
        return vec![value.to_string()];
    }
    let [first, second] = OR_SEPARATORS;
    value
        .replace(second, first)
        .split(first)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}
