//! Error types for rummage

use thiserror::Error;

/// Result type alias for rummage operations
pub type RummageResult<T> = Result<T, RummageError>;

/// Error types for query transformation and execution
#[derive(Debug, Error)]
pub enum RummageError {
    /// A spec is missing a key its operator or strategy requires
    #[error("Missing required key `{key}` in {hook} params")]
    MissingRequiredKey { hook: String, key: &'static str },

    /// A named scope has no registration on the entity
    #[error("Unknown {kind} scope `{name}` on `{entity}`")]
    UnknownScope {
        kind: &'static str,
        name: String,
        entity: String,
    },

    /// Computed-field template outside the whitelist
    #[error("Unsupported template: {0}")]
    UnsupportedTemplate(String),

    /// Search operator outside the known set
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    /// Params have the wrong shape (bad JSON type, arity, direction, ...)
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// A custom hook left one of its operations unimplemented
    #[error("Hook `{hook}` does not implement {operation}")]
    NotImplemented {
        hook: String,
        operation: &'static str,
    },

    /// A configured stage resolves to no hook
    #[error("No hook registered for stage `{0}`")]
    UnknownHook(String),

    /// Identifier or query-shape validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution error
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),
}

impl RummageError {
    /// Create a missing-key error for a hook
    pub fn missing_key(hook: impl Into<String>, key: &'static str) -> Self {
        Self::MissingRequiredKey {
            hook: hook.into(),
            key,
        }
    }

    /// Create an unknown-scope error
    pub fn unknown_scope(
        kind: &'static str,
        name: impl Into<String>,
        entity: impl Into<String>,
    ) -> Self {
        Self::UnknownScope {
            kind,
            name: name.into(),
            entity: entity.into(),
        }
    }

    /// Create an invalid-params error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParams(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a not-implemented error for a hook operation
    pub fn not_implemented(hook: impl Into<String>, operation: &'static str) -> Self {
        Self::NotImplemented {
            hook: hook.into(),
            operation,
        }
    }

    /// Whether this error comes from bad configuration or params rather than I/O.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::MissingRequiredKey { .. }
                | Self::UnknownScope { .. }
                | Self::UnsupportedTemplate(_)
                | Self::UnsupportedOperator(_)
                | Self::InvalidParams(_)
                | Self::NotImplemented { .. }
                | Self::UnknownHook(_)
        )
    }

    /// Check if this is an unknown scope error
    pub fn is_unknown_scope(&self) -> bool {
        matches!(self, Self::UnknownScope { .. })
    }

    /// Classify a tokio_postgres error (closed connections become `Connection`)
    pub fn from_db_error(err: tokio_postgres::Error) -> Self {
        if err.is_closed() {
            return Self::Connection(err.to_string());
        }
        Self::Query(err)
    }
}

impl From<serde_json::Error> for RummageError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidParams(err.to_string())
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for RummageError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}
