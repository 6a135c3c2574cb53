use thiserror::Error;

/// Errors returned by a table provider.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Table not found: {0}")]
    NotFound(String),
    #[error("Request rejected for '{resource}': {reason}")]
    Rejected { resource: String, reason: String },
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

/// Result type for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let error = ProviderError::NotFound("events".to_string());
        assert_eq!(error.to_string(), "Table not found: events");
    }

    #[test]
    fn test_rejected_display() {
        let error = ProviderError::Rejected {
            resource: "events".to_string(),
            reason: "table is not ACTIVE".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Request rejected for 'events': table is not ACTIVE"
        );
    }
}
