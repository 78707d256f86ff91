//! Typed slot keys.

use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use slotkit_codec::{Passthrough, Transformer, TransformerKind};

/// A named slot carrying values of type `T` through transformer `X`.
///
/// Keys are meant to be declared once as constants:
///
/// ```
/// use slotkit_defaults::{Json, Key};
///
/// const LAUNCH_COUNT: Key<i64> = Key::new("launch_count");
/// const RECENT: Key<Vec<String>, Json> = Key::with_transformer("recent", Json);
/// ```
///
/// Equality and hashing use the name and the transformer kind only. Two keys
/// with the same name and transformer but different `T` compare equal and
/// address the same slot.
pub struct Key<T, X = Passthrough> {
    name: Cow<'static, str>,
    transformer: X,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Key<T, Passthrough> {
    pub const fn new(name: &'static str) -> Self {
        Self::with_transformer(name, Passthrough)
    }

    /// A key whose name is only known at runtime.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            transformer: Passthrough,
            _marker: PhantomData,
        }
    }
}

impl<T, X: Transformer> Key<T, X> {
    pub const fn with_transformer(name: &'static str, transformer: X) -> Self {
        Self {
            name: Cow::Borrowed(name),
            transformer,
            _marker: PhantomData,
        }
    }

    /// The same slot name routed through a different transformer.
    pub fn using<Y: Transformer>(self, transformer: Y) -> Key<T, Y> {
        Key {
            name: self.name,
            transformer,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transformer(&self) -> X {
        self.transformer
    }

    /// Drop the payload type, keeping the key's identity.
    pub fn erase(&self) -> AnyKey {
        AnyKey {
            name: self.name.clone(),
            transformer: X::KIND,
        }
    }
}

impl<T, X: Transformer> Clone for Key<T, X> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            transformer: self.transformer,
            _marker: PhantomData,
        }
    }
}

impl<T, U, X: Transformer, Y: Transformer> PartialEq<Key<U, Y>> for Key<T, X> {
    fn eq(&self, other: &Key<U, Y>) -> bool {
        self.name == other.name && X::KIND == Y::KIND
    }
}

impl<T, X: Transformer> Eq for Key<T, X> {}

impl<T, X: Transformer> Hash for Key<T, X> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        X::KIND.hash(state);
    }
}

impl<T, X: Transformer> fmt::Debug for Key<T, X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("name", &self.name)
            .field("transformer", &X::KIND)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

/// A key with its payload type erased.
///
/// Hashes and compares exactly like the [`Key`] it came from, so keys of
/// different payload types can share one collection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnyKey {
    name: Cow<'static, str>,
    transformer: TransformerKind,
}

impl AnyKey {
    pub fn new(name: impl Into<Cow<'static, str>>, transformer: TransformerKind) -> Self {
        Self {
            name: name.into(),
            transformer,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transformer(&self) -> TransformerKind {
        self.transformer
    }
}

impl<T, X: Transformer> From<&Key<T, X>> for AnyKey {
    fn from(key: &Key<T, X>) -> Self {
        key.erase()
    }
}

impl<T, X: Transformer> From<Key<T, X>> for AnyKey {
    fn from(key: Key<T, X>) -> Self {
        AnyKey {
            name: key.name,
            transformer: X::KIND,
        }
    }
}

impl fmt::Display for AnyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.transformer)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use slotkit_codec::{Archive, Json};

    use super::*;

    const COUNT: Key<i64> = Key::new("count");
    const COUNT_AS_TEXT: Key<String> = Key::new("count");
    const COUNT_JSON: Key<i64, Json> = Key::with_transformer("count", Json);

    #[test]
    fn keys_compare_by_name_and_transformer() {
        assert_eq!(COUNT, COUNT_AS_TEXT);
        assert_ne!(COUNT, COUNT_JSON);
        assert_ne!(COUNT, Key::<i64>::new("other"));
        assert_eq!(Key::<i64>::named(String::from("count")), COUNT);
    }

    #[test]
    fn differently_typed_keys_alias_in_a_heterogeneous_map() {
        let mut map: HashMap<AnyKey, &str> = HashMap::new();
        map.insert(COUNT.erase(), "int");
        map.insert(COUNT_AS_TEXT.erase(), "string");
        map.insert(COUNT_JSON.erase(), "json");

        assert_eq!(map.len(), 2);
        assert_eq!(map[&AnyKey::from(&COUNT)], "string");
        assert_eq!(map[&AnyKey::new("count", TransformerKind::Json)], "json");
    }

    #[test]
    fn typed_keys_hash_consistently() {
        let set: HashSet<Key<i64>> = [COUNT, Key::named("count"), Key::new("other")]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn using_changes_identity() {
        let archived: Key<Vec<i64>, Archive> = Key::<Vec<i64>>::named("list").using(Archive);
        assert_eq!(archived.erase().transformer(), TransformerKind::Archive);
        assert_eq!(archived.name(), "list");
    }

    #[test]
    fn display_and_debug() {
        assert_eq!(COUNT_JSON.erase().to_string(), "count (json)");
        let debug = format!("{COUNT:?}");
        assert!(debug.contains("count"));
        assert!(debug.contains("i64"));
    }
}
