use thiserror::Error;

/// Failure categories shared by every crate in the workspace.
///
/// "No documents retrieved" and citation integrity problems are deliberately
/// absent: the first is an empty result, the second is reported as data by the
/// conformance checker.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid chunk record: {0}")]
    InvalidRecord(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Encoding failed ({encoder}): {message}")]
    Encoding { encoder: String, message: String },

    #[error("Store write failed on '{collection}' after {attempts} attempt(s): {message}")]
    StoreWrite { collection: String, attempts: usize, message: String },

    #[error("Store query failed on '{collection}': {message}")]
    StoreQuery { collection: String, message: String },

    #[error("LLM invocation failed ({provider}): {message}")]
    LlmInvocation { provider: String, message: String },

    #[error("Could not parse model response: {0}")]
    ResponseParse(String),

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Coarse category of an [`Error`], cheap to copy into logs and fallback decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    Record,
    NotFound,
    Encoding,
    StoreWrite,
    StoreQuery,
    LlmInvocation,
    ResponseParse,
    Timeout,
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidConfig(_) => ErrorKind::Config,
            Error::InvalidRecord(_) | Error::Json(_) => ErrorKind::Record,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Encoding { .. } => ErrorKind::Encoding,
            Error::StoreWrite { .. } => ErrorKind::StoreWrite,
            Error::StoreQuery { .. } => ErrorKind::StoreQuery,
            Error::LlmInvocation { .. } => ErrorKind::LlmInvocation,
            Error::ResponseParse(_) => ErrorKind::ResponseParse,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    pub fn encoding(encoder: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Error::Encoding { encoder: encoder.into(), message: message.to_string() }
    }

    pub fn store_query(collection: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Error::StoreQuery { collection: collection.into(), message: message.to_string() }
    }

    pub fn llm(provider: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Error::LlmInvocation { provider: provider.into(), message: message.to_string() }
    }

    /// Transient failures are worth another attempt by callers that own a retry budget.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::StoreWrite | ErrorKind::StoreQuery | ErrorKind::Timeout | ErrorKind::Io
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_every_category() {
        assert_eq!(Error::encoding("dense", "boom").kind(), ErrorKind::Encoding);
        assert_eq!(Error::store_query("c", "down").kind(), ErrorKind::StoreQuery);
        assert_eq!(Error::ResponseParse("x".into()).kind(), ErrorKind::ResponseParse);
        assert!(Error::Timeout { operation: "search".into(), seconds: 1 }.is_transient());
        assert!(!Error::llm("gemini", "quota").is_transient());
    }
}
