//! Stripping layers of `Option` from values and types.
//!
//! A typed key may be declared over `X`, `Option<X>`, `Option<Option<X>>` and
//! so on. The store can only say "slot holds a value" or "slot is absent", so
//! every write peels all optional layers first and every read rebuilds them
//! around the decoded payload. A `Some(None)` must never reach storage as
//! "present but empty".
//!
//! Payload types opt in through [`Concrete`]; `Option` is handled by a
//! recursive impl, so the nesting depth is fixed by the static type and
//! peeling always terminates.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::time::Duration;

use bytes::Bytes;

use crate::value::PrimitiveValue;

/// Marker for a payload type that is not itself an `Option`.
///
/// Implement this (it has no items) for your own structs before using them
/// as key payloads:
///
/// ```
/// use slotkit_types::Concrete;
///
/// struct Rect { x: f64, y: f64 }
/// impl Concrete for Rect {}
/// ```
pub trait Concrete {}

/// A type wrapped in zero or more layers of `Option`.
pub trait Optionality: Sized {
    /// The type one layer down. Equal to `Self` for concrete types.
    type Wrapped;

    /// The innermost non-optional payload type.
    type Innermost: Concrete;

    /// Number of `Option` layers around [`Self::Innermost`].
    const DEPTH: usize;

    /// Peel a single layer. Concrete values come back unchanged.
    fn unwrap_once(self) -> Option<Self::Wrapped>;

    /// Peel every layer, collapsing any absence along the way.
    fn unwrap_fully(self) -> Option<Self::Innermost>;

    /// Rebuild `Self` around a present payload.
    fn wrap_fully(inner: Self::Innermost) -> Self;
}

impl<T: Concrete> Optionality for T {
    type Wrapped = T;
    type Innermost = T;
    const DEPTH: usize = 0;

    fn unwrap_once(self) -> Option<T> {
        Some(self)
    }

    fn unwrap_fully(self) -> Option<T> {
        Some(self)
    }

    fn wrap_fully(inner: T) -> T {
        inner
    }
}

impl<T: Optionality> Optionality for Option<T> {
    type Wrapped = T;
    type Innermost = T::Innermost;
    const DEPTH: usize = T::DEPTH + 1;

    fn unwrap_once(self) -> Option<T> {
        self
    }

    fn unwrap_fully(self) -> Option<T::Innermost> {
        self.and_then(T::unwrap_fully)
    }

    fn wrap_fully(inner: T::Innermost) -> Self {
        Some(T::wrap_fully(inner))
    }
}

/// Peel one optional layer off `value`.
pub fn unwrap_once<T: Optionality>(value: T) -> Option<T::Wrapped> {
    value.unwrap_once()
}

/// Peel every optional layer off `value`.
pub fn unwrap_fully<T: Optionality>(value: T) -> Option<T::Innermost> {
    value.unwrap_fully()
}

/// Number of `Option` layers in `T`.
pub const fn optional_depth<T: Optionality>() -> usize {
    T::DEPTH
}

/// Whether `T` is itself optional, decided without a value in hand.
pub const fn is_optional<T: Optionality>() -> bool {
    T::DEPTH > 0
}

/// Name of the innermost payload type of `T`.
pub fn innermost_type_name<T: Optionality>() -> &'static str {
    std::any::type_name::<T::Innermost>()
}

macro_rules! concrete {
    ($($ty:ty),* $(,)?) => {
        $(impl Concrete for $ty {})*
    };
}

concrete!(
    bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
    String, Bytes, PrimitiveValue, Duration,
);

impl<T> Concrete for Vec<T> {}
impl<T> Concrete for VecDeque<T> {}
impl<T> Concrete for BTreeSet<T> {}
impl<T, S> Concrete for HashSet<T, S> {}
impl<K, V> Concrete for BTreeMap<K, V> {}
impl<K, V, S> Concrete for HashMap<K, V, S> {}

#[cfg(feature = "chrono")]
impl<Tz: chrono::TimeZone> Concrete for chrono::DateTime<Tz> {}
#[cfg(feature = "chrono")]
impl Concrete for chrono::NaiveDate {}
#[cfg(feature = "chrono")]
impl Concrete for chrono::NaiveDateTime {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concrete_values_pass_through() {
        assert_eq!(unwrap_once(5i64), Some(5));
        assert_eq!(unwrap_fully(String::from("x")), Some("x".to_string()));
    }

    #[test]
    fn unwrap_once_peels_a_single_layer() {
        let v: Option<Option<i32>> = Some(None);
        assert_eq!(unwrap_once(v), Some(None));
    }

    #[test]
    fn wrapped_absence_collapses() {
        let v: Option<Option<Option<i32>>> = Some(Some(None));
        assert_eq!(unwrap_fully(v), None);
        let v: Option<Option<i32>> = None;
        assert_eq!(unwrap_fully(v), None);
    }

    #[test]
    fn present_payload_survives_any_depth() {
        let v: Option<Option<Option<i32>>> = Some(Some(Some(3)));
        assert_eq!(unwrap_fully(v), Some(3));
    }

    #[test]
    fn wrap_fully_rebuilds_layers() {
        let v = <Option<Option<i32>> as Optionality>::wrap_fully(7);
        assert_eq!(v, Some(Some(7)));
    }

    #[test]
    fn type_level_depth() {
        assert_eq!(optional_depth::<i32>(), 0);
        assert_eq!(optional_depth::<Option<Option<i32>>>(), 2);
        assert!(!is_optional::<Vec<Option<i32>>>());
        assert!(is_optional::<Option<String>>());
    }

    #[test]
    fn innermost_type_ignores_wrappers() {
        assert_eq!(innermost_type_name::<Option<Option<u8>>>(), "u8");
    }
}
