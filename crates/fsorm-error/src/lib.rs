use thiserror::Error;

/// Primary error type for fsorm operations.
///
/// Every failure surfaces synchronously to the direct caller; nothing in the
/// change-tracking layer retries. Variants carry enough context (field name,
/// field kind, type name) to produce a useful message without access to the
/// record that raised them.
#[derive(Error, Debug)]
pub enum OrmError {
    // === Constraint Errors ===
    /// A null assignment to a field declared NOT NULL.
    #[error("null is not acceptable as a value for field '{field}'")]
    NullNotAllowed { field: String },

    // === Value Errors ===
    /// A field kind rejected a value it could not parse.
    #[error("{kind}: {detail}")]
    ValueParse { kind: &'static str, detail: String },

    /// A field kind received a value of the wrong type.
    #[error("{kind}: expected {expected}, found {actual}")]
    TypeMismatch {
        kind: &'static str,
        expected: &'static str,
        actual: String,
    },

    // === Schema Errors ===
    /// No schema is registered for the host's concrete type.
    #[error("no schema registered for type '{type_name}'")]
    SchemaNotFound { type_name: String },

    /// A primary-key field is not among the record's cells.
    #[error("primary key field '{field}' is not a column of the schema")]
    MissingPrimaryKeyField { field: String },

    /// A schema declaration is inconsistent (duplicate columns, empty key).
    #[error("invalid schema: {detail}")]
    InvalidSchema { detail: String },

    // === Event Errors ===
    /// Failure reported by an event subscriber.
    #[error("subscriber for '{event}' failed: {detail}")]
    Subscriber { event: &'static str, detail: String },

    // === Configuration Errors ===
    /// Configuration could not be decoded.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    // === Internal Errors ===
    /// Internal logic error (should never happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification of an [`OrmError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A value violated a field constraint.
    Constraint,
    /// A value could not be converted by its field kind.
    Parse,
    /// Class/column metadata is missing or inconsistent.
    Schema,
    /// An event subscriber failed.
    Subscriber,
    /// Configuration could not be loaded.
    Config,
    /// Internal logic error.
    Internal,
}

impl OrmError {
    /// Classify this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NullNotAllowed { .. } => ErrorKind::Constraint,
            Self::ValueParse { .. } | Self::TypeMismatch { .. } => ErrorKind::Parse,
            Self::SchemaNotFound { .. }
            | Self::MissingPrimaryKeyField { .. }
            | Self::InvalidSchema { .. } => ErrorKind::Schema,
            Self::Subscriber { .. } => ErrorKind::Subscriber,
            Self::Config(_) => ErrorKind::Config,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the caller can likely fix this by supplying different input.
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NullNotAllowed { .. } | Self::ValueParse { .. } | Self::TypeMismatch { .. }
        )
    }

    /// Human-friendly suggestion for fixing this error.
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::NullNotAllowed { .. } => {
                Some("Assign a concrete value or declare the field nullable")
            }
            Self::SchemaNotFound { .. } => {
                Some("Register a schema for the type before tracking its instances")
            }
            Self::MissingPrimaryKeyField { .. } | Self::InvalidSchema { .. } => {
                Some("Check the column and primary key declarations of the schema")
            }
            Self::Config(_) => {
                Some("Check the configuration document for unknown or mistyped keys")
            }
            _ => None,
        }
    }

    /// Create a value parse error.
    pub fn parse(kind: &'static str, detail: impl Into<String>) -> Self {
        Self::ValueParse {
            kind,
            detail: detail.into(),
        }
    }

    /// Create a type mismatch error.
    pub fn mismatch(kind: &'static str, expected: &'static str, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            kind,
            expected,
            actual: actual.into(),
        }
    }

    /// Create a subscriber failure.
    pub fn subscriber(event: &'static str, detail: impl Into<String>) -> Self {
        Self::Subscriber {
            event,
            detail: detail.into(),
        }
    }

    /// Create an invalid schema error.
    pub fn invalid_schema(detail: impl Into<String>) -> Self {
        Self::InvalidSchema {
            detail: detail.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias using `OrmError`.
pub type Result<T> = std::result::Result<T, OrmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_not_allowed_names_field() {
        let err = OrmError::NullNotAllowed {
            field: "person.name".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "null is not acceptable as a value for field 'person.name'"
        );
        assert_eq!(err.kind(), ErrorKind::Constraint);
    }

    #[test]
    fn test_error_display_parse() {
        let err = OrmError::parse("datetime", "unknown date/time format: 'foobar'");
        assert_eq!(err.to_string(), "datetime: unknown date/time format: 'foobar'");

        let err = OrmError::mismatch("int", "integer", "text");
        assert_eq!(err.to_string(), "int: expected integer, found text");
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(OrmError::parse("int", "x").kind(), ErrorKind::Parse);
        assert_eq!(
            OrmError::SchemaNotFound {
                type_name: "Person".to_owned()
            }
            .kind(),
            ErrorKind::Schema
        );
        assert_eq!(
            OrmError::MissingPrimaryKeyField {
                field: "id".to_owned()
            }
            .kind(),
            ErrorKind::Schema
        );
        assert_eq!(OrmError::subscriber("changed", "boom").kind(), ErrorKind::Subscriber);
        assert_eq!(OrmError::internal("bug").kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_user_recoverable() {
        assert!(
            OrmError::NullNotAllowed {
                field: "a".to_owned()
            }
            .is_user_recoverable()
        );
        assert!(OrmError::mismatch("bool", "number", "text").is_user_recoverable());
        assert!(!OrmError::internal("bug").is_user_recoverable());
        assert!(!OrmError::invalid_schema("dup").is_user_recoverable());
    }

    #[test]
    fn test_suggestions() {
        assert!(
            OrmError::SchemaNotFound {
                type_name: "T".to_owned()
            }
            .suggestion()
            .is_some()
        );
        assert!(OrmError::subscriber("deleted", "x").suggestion().is_none());
    }

    #[test]
    fn test_config_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: OrmError = json_err.into();
        assert!(matches!(err, OrmError::Config(_)));
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
