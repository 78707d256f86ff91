/// Errors produced while converting values to or from store primitives.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// The value has no representation in the store's primitive set.
    #[error("value of type {type_name} has no primitive representation")]
    Unrepresentable { type_name: &'static str },

    /// The stored primitive has the wrong shape for the requested type.
    #[error("stored {found} value cannot be read as {expected}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// The encoder rejected the value.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The decoder rejected the stored bytes.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// The byte blob is not a well-formed archive.
    #[error("malformed archive: {0}")]
    MalformedArchive(String),

    /// The archive body does not match its recorded checksum.
    #[error("archive checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// The archive records a type this process cannot decode into the requested one.
    #[error("cannot decode object of type `{found}`; expected `{expected}`")]
    UnrecognizedType { found: String, expected: String },
}

/// Convenience alias used throughout the codec crate.
pub type TransformResult<T> = std::result::Result<T, TransformError>;
