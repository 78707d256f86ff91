//! Error types for typed store access.

use slotkit_codec::TransformError;
use slotkit_store::StoreError;
use thiserror::Error;

/// Errors surfaced by the diagnostic accessors.
///
/// The primary accessors never return these; they report any failure as
/// absence.
#[derive(Debug, Error)]
pub enum DefaultsError {
    /// The key's transformer could not convert the value.
    #[error("transform failed for `{name}`: {source}")]
    Transform {
        name: String,
        #[source]
        source: TransformError,
    },

    /// The underlying store could not be created.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl DefaultsError {
    pub(crate) fn transform(name: &str, source: TransformError) -> Self {
        DefaultsError::Transform {
            name: name.to_string(),
            source,
        }
    }

    /// The transformer failure behind this error, if any.
    pub fn transform_error(&self) -> Option<&TransformError> {
        match self {
            DefaultsError::Transform { source, .. } => Some(source),
            DefaultsError::Store(_) => None,
        }
    }
}

/// Convenience alias for typed store results.
pub type DefaultsResult<T> = Result<T, DefaultsError>;
