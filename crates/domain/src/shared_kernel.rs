pub use agora_shared::*;

/// Domain errors
#[derive(thiserror::Error, Debug)]
pub enum DomainError {
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("ID is not in its proper form: {id}")]
    InvalidId { id: String },

    #[error("Post not found: {post_id}")]
    PostNotFound { post_id: PostId },

    #[error("Comment not found: {comment_id}")]
    CommentNotFound { comment_id: CommentId },

    #[error("Transaction error: {message}")]
    Transaction { message: String },

    #[error("{source}; rollback also failed: {rollback}")]
    RollbackFailed {
        source: Box<DomainError>,
        rollback: String,
    },

    #[error("Transaction exceeded its {seconds}s timeout")]
    TransactionTimeout { seconds: u64 },

    #[error("Publishing to {subject} failed: {message}")]
    Publish { subject: String, message: String },

    #[error("Infrastructure error: {message}")]
    InfrastructureError { message: String },
}

impl DomainError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn infrastructure(message: impl ToString) -> Self {
        Self::InfrastructureError {
            message: message.to_string(),
        }
    }

    /// True for errors the caller caused and should not retry.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::InvalidId { .. }
                | Self::PostNotFound { .. }
                | Self::CommentNotFound { .. }
        )
    }
}

impl From<InvalidIdError> for DomainError {
    fn from(err: InvalidIdError) -> Self {
        Self::InvalidId { id: err.0 }
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollback_failure_reports_both_errors() {
        let err = DomainError::RollbackFailed {
            source: Box::new(DomainError::infrastructure("insert failed")),
            rollback: "connection reset".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("insert failed"));
        assert!(text.contains("connection reset"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn client_errors_are_classified() {
        assert!(DomainError::from(InvalidIdError("x".into())).is_client_error());
        assert!(DomainError::validation("title", "required").is_client_error());
        assert!(!DomainError::TransactionTimeout { seconds: 1 }.is_client_error());
    }
}
