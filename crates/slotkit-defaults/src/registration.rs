use std::collections::hash_map::{self, HashMap};

use slotkit_codec::ValueTransformer;
use slotkit_types::{Optionality, PrimitiveValue};
use tracing::warn;

use crate::key::{AnyKey, Key};

/// A batch of fallback values, keyed by type-erased keys.
///
/// Each typed value is serialized through its own key's transformer when it
/// is added, so the batch itself only holds primitives. Keys that alias (same
/// name and transformer) overwrite each other.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Registration {
    values: HashMap<AnyKey, PrimitiveValue>,
}

impl Registration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with<T, X>(mut self, key: &Key<T, X>, value: T) -> Self
    where
        T: Optionality,
        X: ValueTransformer<T::Innermost>,
    {
        self.insert(key, value);
        self
    }

    /// Serialize and add one fallback value.
    ///
    /// Returns `false`, leaving the batch unchanged, if the value is an empty
    /// optional or cannot be serialized.
    pub fn insert<T, X>(&mut self, key: &Key<T, X>, value: T) -> bool
    where
        T: Optionality,
        X: ValueTransformer<T::Innermost>,
    {
        let Some(inner) = value.unwrap_fully() else {
            return false;
        };
        match key.transformer().serialize(&inner) {
            Some(raw) => {
                self.values.insert(key.erase(), raw);
                true
            }
            None => {
                warn!(key = key.name(), "fallback value not serializable, skipped");
                false
            }
        }
    }

    /// Add an already-encoded fallback value.
    pub fn insert_raw(&mut self, key: AnyKey, value: PrimitiveValue) {
        self.values.insert(key, value);
    }

    pub fn get(&self, key: &AnyKey) -> Option<&PrimitiveValue> {
        self.values.get(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, AnyKey, PrimitiveValue> {
        self.values.iter()
    }
}

impl IntoIterator for Registration {
    type Item = (AnyKey, PrimitiveValue);
    type IntoIter = hash_map::IntoIter<AnyKey, PrimitiveValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl<'a> IntoIterator for &'a Registration {
    type Item = (&'a AnyKey, &'a PrimitiveValue);
    type IntoIter = hash_map::Iter<'a, AnyKey, PrimitiveValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

#[cfg(test)]
mod tests {
    use slotkit_codec::{Json, TransformerKind};

    use super::*;

    #[test]
    fn mixed_payload_types_share_one_batch() {
        let registration = Registration::new()
            .with(&Key::<i64>::new("count"), 3)
            .with(&Key::<String>::new("title"), "untitled".to_string())
            .with(&Key::<Vec<f64>, Json>::with_transformer("weights", Json), vec![0.5]);

        assert_eq!(registration.len(), 3);
        assert_eq!(
            registration.get(&AnyKey::new("count", TransformerKind::Passthrough)),
            Some(&PrimitiveValue::Int(3))
        );
        assert!(registration
            .get(&AnyKey::new("weights", TransformerKind::Json))
            .and_then(PrimitiveValue::as_bytes)
            .is_some());
    }

    #[test]
    fn aliasing_keys_overwrite() {
        let registration = Registration::new()
            .with(&Key::<i64>::new("slot"), 1)
            .with(&Key::<String>::new("slot"), "one".to_string());
        assert_eq!(registration.len(), 1);
        assert_eq!(
            registration.iter().next().map(|(_, v)| v.clone()),
            Some(PrimitiveValue::from("one"))
        );
    }

    #[test]
    fn empty_optionals_and_unencodable_values_are_skipped() {
        let mut registration = Registration::new();
        assert!(!registration.insert(&Key::<Option<i64>>::new("maybe"), None));
        assert!(!registration.insert(&Key::<u64>::new("huge"), u64::MAX));
        assert!(registration.is_empty());
    }
}
