//! Error types for rowmap operations.

use std::fmt;

/// The primary error type for the update pipeline.
///
/// A key that cannot be computed because one of its components is null is
/// *not* an error: it is reported as `None` by the key factories.
#[derive(Debug)]
pub enum Error {
    /// Two distinct pending writes claim the same row identity
    IdentityConflict(IdentityConflictError),
    /// A row queued for write has a null component in a key it must own
    NullKeyValue(NullKeyValueError),
    /// Key, constraint or comparer metadata is inconsistent
    Metadata(MetadataError),
    /// The write set cannot be ordered because of a foreign-key cycle
    CycleDetected {
        /// Tables involved in the cycle, in traversal order
        tables: Vec<String>,
    },
    /// Configuration errors
    Config(ConfigError),
    /// Serialization/deserialization errors
    Serde(String),
    /// Custom error with message
    Custom(String),
}

/// Raised when a second command computes a key already held by another one.
#[derive(Debug, Clone)]
pub struct IdentityConflictError {
    /// Display name of the entity type owning the row
    pub entity_type: String,
    /// Table the conflicting writes target
    pub table: String,
    /// Columns of the unique constraint, in key order
    pub key_columns: Vec<String>,
    /// Formatted key values; only present when sensitive data logging is on
    pub key_values: Option<String>,
}

/// Raised when a command is tracked under a key it cannot compute.
#[derive(Debug, Clone)]
pub struct NullKeyValueError {
    /// Display name of the entity type owning the row
    pub entity_type: String,
    /// Table the write targets
    pub table: String,
    /// First key column found holding null
    pub column: String,
}

#[derive(Debug)]
pub struct MetadataError {
    pub kind: MetadataErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataErrorKind {
    /// A unique constraint was declared without columns
    EmptyKey,
    /// Dependent and principal column counts differ
    ColumnCountMismatch,
    /// A dependent column type cannot hold the principal key type
    IncompatibleColumnType,
    /// A value comparer was declared for a different type than its column
    ComparerTypeMismatch,
    /// A referenced column does not exist
    UnknownColumn,
    /// A key column has no row buffer position, or shares one with another
    InvalidOrdinal,
    /// A command targets a table the model does not describe
    UnknownTable,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// Result type alias for rowmap operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Build a metadata error.
    pub fn metadata(kind: MetadataErrorKind, message: impl Into<String>) -> Self {
        Error::Metadata(MetadataError {
            kind,
            message: message.into(),
        })
    }

    /// Build a configuration error without a source.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            message: message.into(),
            source: None,
        })
    }

    /// Is this an identity conflict between two pending writes?
    pub fn is_identity_conflict(&self) -> bool {
        matches!(self, Error::IdentityConflict(_))
    }

    /// Get the metadata error kind, if this is a metadata error.
    pub fn metadata_kind(&self) -> Option<MetadataErrorKind> {
        match self {
            Error::Metadata(m) => Some(m.kind),
            _ => None,
        }
    }
}

impl IdentityConflictError {
    /// Format the key columns as `{'A', 'B'}`.
    pub fn formatted_columns(&self) -> String {
        let names: Vec<String> = self.key_columns.iter().map(|c| format!("'{c}'")).collect();
        format!("{{{}}}", names.join(", "))
    }
}

impl fmt::Display for IdentityConflictError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key_values {
            Some(values) => write!(
                f,
                "cannot track a write to entity type '{}' (table '{}'): another pending write \
                 already claims the key value '{}'",
                self.entity_type, self.table, values
            ),
            None => write!(
                f,
                "cannot track a write to entity type '{}' (table '{}'): another pending write \
                 already claims the same value for {}; enable sensitive data logging to see \
                 the conflicting key values",
                self.entity_type,
                self.table,
                self.formatted_columns()
            ),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::IdentityConflict(e) => write!(f, "Identity conflict: {}", e),
            Error::NullKeyValue(e) => write!(
                f,
                "Null key value: column '{}' of entity type '{}' (table '{}') is null",
                e.column, e.entity_type, e.table
            ),
            Error::Metadata(e) => write!(f, "Metadata error: {}", e.message),
            Error::CycleDetected { tables } => {
                write!(f, "Dependency cycle detected: {}", tables.join(" -> "))
            }
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(e) => e
                .source
                .as_ref()
                .map(|s| s.as_ref() as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for MetadataError {}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ConfigError {}

impl From<IdentityConflictError> for Error {
    fn from(err: IdentityConflictError) -> Self {
        Error::IdentityConflict(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(ConfigError {
            message: format!("invalid configuration document: {err}"),
            source: Some(Box::new(err)),
        })
    }
}
