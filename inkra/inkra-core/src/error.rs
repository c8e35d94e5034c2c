//! Error taxonomy shared by the lifecycle engine and its collaborators.

use std::fmt::Display;

/// Failure kinds surfaced by document operations.
///
/// The HTTP layer maps each variant to a status code; the `Display` output of
/// every variant except [`DocError::Storage`] is safe to show to callers.
#[derive(Debug, thiserror::Error)]
pub enum DocError {
    /// Bad or missing input, wrong media type, oversize upload.
    #[error("{0}")]
    Validation(String),
    /// Client IP is not on the document's whitelist.
    #[error("{0}")]
    Forbidden(String),
    /// No such live document.
    #[error("{0}")]
    NotFound(String),
    /// Document is deleted or already signed.
    #[error("{0}")]
    InvalidState(String),
    /// File or database I/O failure.
    #[error("{context}: {detail}")]
    Storage {
        context: &'static str,
        detail: String,
    },
    /// Bad credentials, missing or expired token.
    #[error("{0}")]
    Auth(String),
}

impl DocError {
    pub fn validation(msg: impl Into<String>) -> Self {
        DocError::Validation(msg.into())
    }

    pub fn not_found() -> Self {
        DocError::NotFound("Document not found".to_string())
    }

    pub fn storage(context: &'static str, err: impl Display) -> Self {
        DocError::Storage {
            context,
            detail: err.to_string(),
        }
    }

    /// Message suitable for an API response. Storage details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            DocError::Storage { context, .. } => context.to_string(),
            other => other.to_string(),
        }
    }
}

impl From<rusqlite::Error> for DocError {
    fn from(err: rusqlite::Error) -> Self {
        DocError::storage("Database error", err)
    }
}

pub type Result<T> = std::result::Result<T, DocError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_detail_is_not_public() {
        let err = DocError::storage("Could not save file", "/srv/docs/uploads: permission denied");
        assert_eq!(err.public_message(), "Could not save file");
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn user_facing_variants_pass_through() {
        assert_eq!(DocError::not_found().public_message(), "Document not found");
        assert_eq!(
            DocError::validation("File too large").public_message(),
            "File too large"
        );
    }
}
