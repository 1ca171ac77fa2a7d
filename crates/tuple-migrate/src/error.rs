//! Error types for the translation library.

use thiserror::Error;

/// Exit code for configuration and matching model errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for database errors.
pub const EXIT_DATABASE_ERROR: u8 = 2;
/// Exit code for failures while translating a tuple tree.
pub const EXIT_TRANSLATION_ERROR: u8 = 3;
/// Exit code for process checkpoint errors.
pub const EXIT_STATE_ERROR: u8 = 4;
/// Exit code when the run was cancelled before a checkpoint could be written.
pub const EXIT_CANCELLED: u8 = 5;
/// Exit code for IO errors (missing files, permissions).
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for translation operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Matching model error (missing PK match, unknown value-match group,
    /// malformed default-value token, etc.)
    #[error("Model error: {0}")]
    Model(String),

    /// A match query returned fewer rows than the curr index requires.
    #[error(
        "The # of results of the query: \"{query}\" is not equal to the # of results of its CURRS. \
         Found {found} results but expected {expected} results or more. In match: {match_id}"
    )]
    QueryShape {
        match_id: u32,
        query: String,
        found: usize,
        expected: usize,
    },

    /// A value could not be enforced into its target datatype.
    #[error("Normalization error: {0}")]
    Normalization(String),

    /// Source or target database error with context
    #[error("Database error: {message}\n  Context: {context}")]
    Database { message: String, context: String },

    /// Process checkpoint store error
    #[error("Process state error: {0}")]
    State(String),

    /// The matching model changed since the checkpoint was written.
    #[error(
        "Matching model has changed since the last run (stopped at tree {last_stop_point}) - \
         cannot resume. Use --reset to start fresh."
    )]
    ModelChanged { last_stop_point: u64 },

    /// A root tree failed and was rolled back.
    #[error("An error occurred during translation/execution phase while processing tuple # {tuple_id}")]
    Translation {
        tuple_id: u32,
        #[source]
        source: Box<MigrateError>,
    },

    /// Translation was cancelled (SIGINT, etc.)
    #[error("Translation cancelled")]
    Cancelled,

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Model error
    pub fn model(message: impl Into<String>) -> Self {
        MigrateError::Model(message.into())
    }

    /// Create a Database error with context about where it occurred
    pub fn database(message: impl std::fmt::Display, context: impl Into<String>) -> Self {
        MigrateError::Database {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Wrap an error with the id of the tuple being processed when it surfaced.
    pub fn translation(tuple_id: u32, source: MigrateError) -> Self {
        MigrateError::Translation {
            tuple_id,
            source: Box::new(source),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_)
            | MigrateError::Model(_)
            | MigrateError::ModelChanged { .. }
            | MigrateError::Yaml(_) => EXIT_CONFIG_ERROR,
            MigrateError::Database { .. } => EXIT_DATABASE_ERROR,
            MigrateError::QueryShape { .. }
            | MigrateError::Normalization(_)
            | MigrateError::Translation { .. } => EXIT_TRANSLATION_ERROR,
            MigrateError::State(_) | MigrateError::Json(_) => EXIT_STATE_ERROR,
            MigrateError::Cancelled => EXIT_CANCELLED,
            MigrateError::Io(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for translation operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translation_error_names_tuple_and_cause() {
        let err = MigrateError::translation(
            12,
            MigrateError::Normalization("The enforced value is null".into()),
        );
        let detailed = err.format_detailed();
        assert!(detailed.contains("tuple # 12"));
        assert!(detailed.contains("Caused by:"));
        assert!(detailed.contains("The enforced value is null"));
    }

    #[test]
    fn test_query_shape_message() {
        let err = MigrateError::QueryShape {
            match_id: 4,
            query: "SELECT obs.value FROM obs".into(),
            found: 2,
            expected: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("Found 2 results but expected 3"));
        assert!(msg.ends_with("In match: 4"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(MigrateError::Config("x".into()).exit_code(), EXIT_CONFIG_ERROR);
        assert_eq!(MigrateError::database("boom", "ctx").exit_code(), EXIT_DATABASE_ERROR);
        assert_eq!(
            MigrateError::translation(1, MigrateError::model("x")).exit_code(),
            EXIT_TRANSLATION_ERROR
        );
        assert_eq!(MigrateError::Cancelled.exit_code(), EXIT_CANCELLED);
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(MigrateError::from(io).exit_code(), EXIT_IO_ERROR);
    }
}
