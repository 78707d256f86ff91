use std::any::type_name;

use slotkit_types::{Primitive, PrimitiveValue};

use crate::error::{TransformError, TransformResult};
use crate::transformer::{Transformer, TransformerKind, ValueTransformer};

/// The transformer used when a key declares none.
///
/// Values are written as their native primitive and read back with a direct
/// shape check.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Passthrough;

impl Transformer for Passthrough {
    const KIND: TransformerKind = TransformerKind::Passthrough;
}

impl<T: Primitive> ValueTransformer<T> for Passthrough {
    fn encode(&self, value: &T) -> TransformResult<PrimitiveValue> {
        value.to_primitive().ok_or(TransformError::Unrepresentable {
            type_name: type_name::<T>(),
        })
    }

    fn decode(&self, raw: &PrimitiveValue) -> TransformResult<T> {
        T::from_primitive(raw).ok_or_else(|| TransformError::TypeMismatch {
            expected: type_name::<T>(),
            found: raw.kind_name(),
        })
    }
}
