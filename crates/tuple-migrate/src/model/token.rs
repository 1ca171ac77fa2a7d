//! Tokens of the default-value and referenced-value DSL.
//!
//! Token fields in the matching model document may be written as strings or
//! bare scalars (`predecessor: 0`, `default_value: 1`); they are all read as
//! text first and then parsed here.

use std::fmt;

use serde::Deserialize;

use crate::error::{MigrateError, Result};

pub const AI: &str = "AI";
pub const AI_SKIP_TRUE: &str = "AI_SKIP_TRUE";
pub const AI_SKIP_FALSE: &str = "AI_SKIP_FALSE";
pub const SKIP: &str = "SKIP";
pub const NOW: &str = "NOW";
pub const TOP: &str = "TOP";
pub const CURR: &str = "CURR";
pub const ALL: &str = "ALL";
pub const EQUALS: &str = "EQUALS";
pub const NA: &str = "NA";
/// Value-match key used when the source value has no entry of its own.
pub const UNMATCHED: &str = "unmatched";
/// Separators that join alternative referenced values (`A >> B`).
pub const OR_SEPARATORS: [&str; 2] = [">>", "<<"];

/// Any scalar a token field may hold in YAML or JSON.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawToken {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<RawToken> for String {
    fn from(raw: RawToken) -> Self {
        match raw {
            RawToken::Null => "null".to_string(),
            RawToken::Bool(b) => b.to_string(),
            RawToken::Int(n) => n.to_string(),
            RawToken::Float(v) => v.to_string(),
            RawToken::Text(s) => s,
        }
    }
}

/// How a target column is filled when the match has no source side, or how
/// the selected source value is post-processed when it has one.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawToken")]
pub enum DefaultValue {
    /// Auto-increment column; omitted from the INSERT.
    Ai,
    /// Skip the row when the selected value is true, auto-increment otherwise.
    AiSkipTrue,
    /// Skip the row when the selected value is false, auto-increment otherwise.
    AiSkipFalse,
    /// Skip the row when the selected value is NULL.
    Skip,
    /// Current database time.
    Now,
    /// Generated PK of the n-th ancestor (`TOP` is `TOP1`).
    Top(usize),
    /// Anything else, rendered as an SQL literal.
    Literal(String),
}

impl DefaultValue {
    pub fn parse(token: &str) -> Result<Self> {
        let trimmed = token.trim();
        Ok(match trimmed {
            AI => DefaultValue::Ai,
            AI_SKIP_TRUE => DefaultValue::AiSkipTrue,
            AI_SKIP_FALSE => DefaultValue::AiSkipFalse,
            SKIP => DefaultValue::Skip,
            NOW => DefaultValue::Now,
            t if t.starts_with(TOP) => DefaultValue::Top(parse_level(TOP, t)?.unwrap_or(1)),
            _ => DefaultValue::Literal(token.to_string()),
        })
    }
}

impl Default for DefaultValue {
    fn default() -> Self {
        DefaultValue::Literal("NULL".to_string())
    }
}

impl TryFrom<RawToken> for DefaultValue {
    type Error = MigrateError;

    fn try_from(raw: RawToken) -> Result<Self> {
        DefaultValue::parse(&String::from(raw))
    }
}

impl fmt::Display for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Ai => f.write_str(AI),
            DefaultValue::AiSkipTrue => f.write_str(AI_SKIP_TRUE),
            DefaultValue::AiSkipFalse => f.write_str(AI_SKIP_FALSE),
            DefaultValue::Skip => f.write_str(SKIP),
            DefaultValue::Now => f.write_str(NOW),
            DefaultValue::Top(1) => f.write_str(TOP),
            DefaultValue::Top(n) => write!(f, "{}{}", TOP, n),
            DefaultValue::Literal(s) => f.write_str(s),
        }
    }
}

/// The value side of a reference.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawToken")]
pub enum ReferencedValue {
    /// `curr` of an enclosing frame; `CURR` is level 1, `CURR2` level 2, ...
    Curr(usize),
    /// No filter: every row of the referenced table drives the tuple.
    All,
    /// Join only, no value filter.
    Equals,
    /// Generated PK of the nearest ancestor mapped to the referenced table.
    Top(String),
    /// A literal, possibly holding alternatives joined by `>>` or `<<`.
    Literal(String),
}

impl ReferencedValue {
    pub fn parse(token: &str) -> Result<Self> {
        let trimmed = token.trim();
        Ok(match trimmed {
            ALL => ReferencedValue::All,
            EQUALS => ReferencedValue::Equals,
            t if t.starts_with(TOP) => ReferencedValue::Top(t.to_string()),
            t if is_curr_token(t) => ReferencedValue::Curr(parse_level(CURR, t)?.unwrap_or(1)),
            _ => ReferencedValue::Literal(token.to_string()),
        })
    }
}

impl TryFrom<RawToken> for ReferencedValue {
    type Error = MigrateError;

    fn try_from(raw: RawToken) -> Result<Self> {
        ReferencedValue::parse(&String::from(raw))
    }
}

impl fmt::Display for ReferencedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferencedValue::Curr(1) => f.write_str(CURR),
            ReferencedValue::Curr(n) => write!(f, "{}{}", CURR, n),
            ReferencedValue::All => f.write_str(ALL),
            ReferencedValue::Equals => f.write_str(EQUALS),
            ReferencedValue::Top(raw) | ReferencedValue::Literal(raw) => f.write_str(raw),
        }
    }
}

/// Points a match at a value-match group, or `NA`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "RawToken")]
pub enum ValueMatchId {
    #[default]
    NotApplicable,
    Group(u32),
}

impl TryFrom<RawToken> for ValueMatchId {
    type Error = MigrateError;

    fn try_from(raw: RawToken) -> Result<Self> {
        let text = String::from(raw);
        let text = text.trim();
        if text.eq_ignore_ascii_case(NA) || text.is_empty() {
            return Ok(ValueMatchId::NotApplicable);
        }
        text.parse::<u32>()
            .map(ValueMatchId::Group)
            .map_err(|_| MigrateError::model(format!("Invalid value match id: '{}'", text)))
    }
}

/// YES/NO flags of the matching model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "RawToken")]
pub enum YesNo {
    Yes,
    #[default]
    No,
}

impl YesNo {
    pub fn is_yes(self) -> bool {
        self == YesNo::Yes
    }
}

impl TryFrom<RawToken> for YesNo {
    type Error = MigrateError;

    fn try_from(raw: RawToken) -> Result<Self> {
        match String::from(raw).trim().to_ascii_uppercase().as_str() {
            "YES" | "Y" | "TRUE" => Ok(YesNo::Yes),
            "NO" | "N" | "FALSE" => Ok(YesNo::No),
            other => Err(MigrateError::model(format!(
                "Invalid YES/NO flag: '{}'",
                other
            ))),
        }
    }
}

fn is_curr_token(token: &str) -> bool {
    token
        .strip_prefix(CURR)
        .is_some_and(|rest| rest.chars().all(|c| c.is_ascii_digit()))
}

/// Parse the level suffix of `TOPn`/`CURRn`. `None` means no suffix.
fn parse_level(prefix: &str, token: &str) -> Result<Option<usize>> {
    let suffix = &token[prefix.len()..];
    if suffix.is_empty() {
        return Ok(None);
    }
    match suffix.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(Some(n)),
        _ => Err(MigrateError::model(format!(
            "Malformed token '{}': expected {} or {}n with n >= 1",
            token, prefix, prefix
        ))),
    }
}
