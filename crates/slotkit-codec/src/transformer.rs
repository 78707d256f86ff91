use std::fmt;

use slotkit_types::PrimitiveValue;
use tracing::debug;

use crate::error::TransformResult;

/// Identity of a transformer, independent of the value type it handles.
///
/// Keys compare by name plus this kind, never by the payload type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransformerKind {
    /// No transformation; the value is already a store primitive.
    Passthrough,
    /// Self-describing byte archive.
    Archive,
    /// JSON text stored as bytes.
    Json,
}

impl TransformerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformerKind::Passthrough => "passthrough",
            TransformerKind::Archive => "archive",
            TransformerKind::Json => "json",
        }
    }
}

impl fmt::Display for TransformerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stateless codec. Implementors are zero-sized unit structs.
pub trait Transformer: Copy + fmt::Debug + Send + Sync + 'static {
    const KIND: TransformerKind;

    fn kind(&self) -> TransformerKind {
        Self::KIND
    }
}

/// A transformer able to carry values of type `T`.
///
/// `decode(encode(v)) == v` must hold for every `v` that encodes
/// successfully.
pub trait ValueTransformer<T>: Transformer {
    /// Convert `value` into a store primitive.
    fn encode(&self, value: &T) -> TransformResult<PrimitiveValue>;

    /// Reconstruct a value from a store primitive.
    fn decode(&self, raw: &PrimitiveValue) -> TransformResult<T>;

    /// Like [`encode`](Self::encode), with failure reported as `None`.
    fn serialize(&self, value: &T) -> Option<PrimitiveValue> {
        match self.encode(value) {
            Ok(raw) => Some(raw),
            Err(e) => {
                debug!(transformer = %Self::KIND, error = %e, "serialize failed");
                None
            }
        }
    }

    /// Like [`decode`](Self::decode), with failure reported as `None`.
    fn deserialize(&self, raw: &PrimitiveValue) -> Option<T> {
        match self.decode(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(transformer = %Self::KIND, error = %e, "deserialize failed");
                None
            }
        }
    }
}
