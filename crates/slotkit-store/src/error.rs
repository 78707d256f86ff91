/// Errors from store construction and configuration.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The configuration text could not be parsed.
    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),

    /// The configured domain name is empty.
    #[error("store domain must not be empty")]
    EmptyDomain,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
