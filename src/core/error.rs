use thiserror::Error;

/// Which field of a rule record or packet query an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
pub enum Field {
    #[strum(serialize = "record")]
    Record,
    #[strum(serialize = "direction")]
    Direction,
    #[strum(serialize = "protocol")]
    Protocol,
    #[strum(serialize = "port")]
    Port,
    #[strum(serialize = "address")]
    Address,
}

/// Core error types for hbfw
#[derive(Debug, Error)]
pub enum Error {
    /// A rule record violates its declared shape
    ///
    /// `index` is the 1-based record (or file line) number when known.
    #[error("Malformed rule{}: {field}: {message}", index.map(|i| format!(" #{i}")).unwrap_or_default())]
    MalformedRule {
        index: Option<usize>,
        field: Field,
        message: String,
    },

    /// A packet query is outside the domain any rule can describe
    #[error("Invalid query: {field}: {message}")]
    InvalidQuery { field: Field, message: String },

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration is unusable for the requested operation
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn malformed(field: Field, message: impl Into<String>) -> Self {
        Error::MalformedRule {
            index: None,
            field,
            message: message.into(),
        }
    }

    pub(crate) fn invalid_query(field: Field, message: impl Into<String>) -> Self {
        Error::InvalidQuery {
            field,
            message: message.into(),
        }
    }

    /// Attaches a record/line number to a `MalformedRule` that has none yet.
    #[must_use]
    pub fn at_index(self, at: usize) -> Self {
        match self {
            Error::MalformedRule {
                index: None,
                field,
                message,
            } => Error::MalformedRule {
                index: Some(at),
                field,
                message,
            },
            other => other,
        }
    }

    /// Returns `true` for errors raised while building a rule set
    pub fn is_malformed_rule(&self) -> bool {
        matches!(self, Error::MalformedRule { .. })
    }

    /// Returns `true` for errors raised by a degenerate packet query
    pub fn is_invalid_query(&self) -> bool {
        matches!(self, Error::InvalidQuery { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
