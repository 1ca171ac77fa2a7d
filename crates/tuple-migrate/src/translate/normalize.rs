//! Datatype normalization and SQL literal rendering.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::SqlValue;
use crate::error::{MigrateError, Result};

static NUMERIC_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-+]?\d+(\.\d+)?$").expect("numeric literal pattern"));

/// Target datatypes that need their textual form enforced before insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datatype {
    /// Decimal numbers; a comma decimal separator is rewritten to a dot.
    Double,
    /// Inserted as selected.
    Other,
}

impl Datatype {
    /// Resolve a datatype name from the matching model (case-insensitive).
    pub fn from_name(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("DOUBLE") {
            Datatype::Double
        } else {
            Datatype::Other
        }
    }
}

/// Enforce `value` into the textual form required by `datatype` and render it
/// as an SQL literal.
pub fn enforce(datatype: &str, value: &SqlValue) -> Result<String> {
    if value.is_null() {
        return Err(MigrateError::Normalization(
            "The enforced value is null".to_string(),
        ));
    }

    match Datatype::from_name(datatype) {
        Datatype::Double => {
            let enforced = enforce_double(&value.to_string())?;
            Ok(cast(&SqlValue::Float(enforced)))
        }
        Datatype::Other => Ok(cast(value)),
    }
}

fn enforce_double(value: &str) -> Result<f64> {
    let value = value.trim().replace(',', ".");
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(MigrateError::Normalization(format!(
            "Failed to enforce the argument value: {} to double",
            value
        ))),
    }
}

/// Render a value as an SQL literal: numbers bare, `NULL` as the bare token,
/// everything else single-quoted.
pub fn cast(value: &SqlValue) -> String {
    if value.is_null() {
        return "NULL".to_string();
    }
    cast_str(&value.to_string())
}

/// [`cast`] for text taken straight from the matching model.
pub fn cast_str(value: &str) -> String {
    if NUMERIC_LITERAL.is_match(value) {
        value.to_string()
    } else if value.eq_ignore_ascii_case("NULL") {
        "NULL".to_string()
    } else {
        format!("'{}'", value.replace('\'', "''"))
    }
}
