use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::BuildHasher;

use bytes::Bytes;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A value the underlying store persists natively.
///
/// Stores only understand this closed set of shapes. Anything richer has to
/// pass through a transformer first, which typically lands it in
/// [`PrimitiveValue::Bytes`].
#[derive(Clone, Debug, PartialEq)]
pub enum PrimitiveValue {
    /// Boolean value.
    Bool(bool),
    /// Signed integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// UTF-8 text.
    String(String),
    /// Opaque byte blob.
    Bytes(Bytes),
    /// Ordered list of values, possibly of mixed kinds.
    Array(Vec<PrimitiveValue>),
    /// String-keyed map of values, possibly of mixed kinds.
    Map(BTreeMap<String, PrimitiveValue>),
}

impl PrimitiveValue {
    /// Short name of the wire kind, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            PrimitiveValue::Bool(_) => "bool",
            PrimitiveValue::Int(_) => "int",
            PrimitiveValue::Float(_) => "float",
            PrimitiveValue::String(_) => "string",
            PrimitiveValue::Bytes(_) => "bytes",
            PrimitiveValue::Array(_) => "array",
            PrimitiveValue::Map(_) => "map",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PrimitiveValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PrimitiveValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Reads a float. Stored integers are widened.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            PrimitiveValue::Float(v) => Some(*v),
            PrimitiveValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PrimitiveValue::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PrimitiveValue::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[PrimitiveValue]> {
        match self {
            PrimitiveValue::Array(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, PrimitiveValue>> {
        match self {
            PrimitiveValue::Map(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for PrimitiveValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimitiveValue::Bool(v) => write!(f, "{v}"),
            PrimitiveValue::Int(v) => write!(f, "{v}"),
            PrimitiveValue::Float(v) => write!(f, "{v}"),
            PrimitiveValue::String(v) => write!(f, "{v:?}"),
            PrimitiveValue::Bytes(v) => write!(f, "<{}>", hex::encode(v)),
            PrimitiveValue::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            PrimitiveValue::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k:?}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for PrimitiveValue {
    fn from(v: bool) -> Self {
        PrimitiveValue::Bool(v)
    }
}

impl From<i64> for PrimitiveValue {
    fn from(v: i64) -> Self {
        PrimitiveValue::Int(v)
    }
}

impl From<f64> for PrimitiveValue {
    fn from(v: f64) -> Self {
        PrimitiveValue::Float(v)
    }
}

impl From<&str> for PrimitiveValue {
    fn from(v: &str) -> Self {
        PrimitiveValue::String(v.to_string())
    }
}

impl From<String> for PrimitiveValue {
    fn from(v: String) -> Self {
        PrimitiveValue::String(v)
    }
}

impl From<Bytes> for PrimitiveValue {
    fn from(v: Bytes) -> Self {
        PrimitiveValue::Bytes(v)
    }
}

impl From<Vec<PrimitiveValue>> for PrimitiveValue {
    fn from(v: Vec<PrimitiveValue>) -> Self {
        PrimitiveValue::Array(v)
    }
}

impl From<BTreeMap<String, PrimitiveValue>> for PrimitiveValue {
    fn from(v: BTreeMap<String, PrimitiveValue>) -> Self {
        PrimitiveValue::Map(v)
    }
}

// ---------------------------------------------------------------------------
// serde: natural (untagged) shape
// ---------------------------------------------------------------------------

impl Serialize for PrimitiveValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PrimitiveValue::Bool(v) => serializer.serialize_bool(*v),
            PrimitiveValue::Int(v) => serializer.serialize_i64(*v),
            PrimitiveValue::Float(v) => serializer.serialize_f64(*v),
            PrimitiveValue::String(v) => serializer.serialize_str(v),
            PrimitiveValue::Bytes(v) => serializer.serialize_bytes(v),
            PrimitiveValue::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            PrimitiveValue::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

/// Decode candidates, tried in declaration order.
///
/// Integers come before floats so whole numbers stay integers.
#[derive(Deserialize)]
#[serde(untagged, expecting = "a boolean, number, string, list, or map")]
enum Candidate {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    List(Vec<PrimitiveValue>),
    Map(BTreeMap<String, PrimitiveValue>),
}

impl From<Candidate> for PrimitiveValue {
    fn from(candidate: Candidate) -> Self {
        match candidate {
            Candidate::Bool(v) => PrimitiveValue::Bool(v),
            Candidate::Int(v) => PrimitiveValue::Int(v),
            // Only reached above i64::MAX; the store has no unsigned kind.
            Candidate::UInt(v) => match i64::try_from(v) {
                Ok(v) => PrimitiveValue::Int(v),
                Err(_) => PrimitiveValue::Float(v as f64),
            },
            Candidate::Float(v) => PrimitiveValue::Float(v),
            Candidate::String(v) => PrimitiveValue::String(v),
            Candidate::List(v) => PrimitiveValue::Array(v),
            Candidate::Map(v) => PrimitiveValue::Map(v),
        }
    }
}

impl<'de> Deserialize<'de> for PrimitiveValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Candidate::deserialize(deserializer).map(Into::into)
    }
}

// ---------------------------------------------------------------------------
// Native conversions
// ---------------------------------------------------------------------------

/// A Rust type the store can hold without any transformer.
///
/// `to_primitive` returns `None` when a particular value has no wire
/// representation (an unsigned integer beyond `i64::MAX`, say). `from_primitive`
/// returns `None` when the stored value has the wrong shape.
pub trait Primitive: Sized {
    fn to_primitive(&self) -> Option<PrimitiveValue>;

    fn from_primitive(raw: &PrimitiveValue) -> Option<Self>;
}

impl Primitive for bool {
    fn to_primitive(&self) -> Option<PrimitiveValue> {
        Some(PrimitiveValue::Bool(*self))
    }

    fn from_primitive(raw: &PrimitiveValue) -> Option<Self> {
        raw.as_bool()
    }
}

macro_rules! integer_primitive {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Primitive for $ty {
                fn to_primitive(&self) -> Option<PrimitiveValue> {
                    i64::try_from(*self).ok().map(PrimitiveValue::Int)
                }

                fn from_primitive(raw: &PrimitiveValue) -> Option<Self> {
                    raw.as_int().and_then(|v| <$ty>::try_from(v).ok())
                }
            }
        )*
    };
}

integer_primitive!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl Primitive for f64 {
    fn to_primitive(&self) -> Option<PrimitiveValue> {
        Some(PrimitiveValue::Float(*self))
    }

    fn from_primitive(raw: &PrimitiveValue) -> Option<Self> {
        raw.as_float()
    }
}

impl Primitive for f32 {
    fn to_primitive(&self) -> Option<PrimitiveValue> {
        Some(PrimitiveValue::Float(f64::from(*self)))
    }

    fn from_primitive(raw: &PrimitiveValue) -> Option<Self> {
        // Finite values beyond the f32 range would otherwise saturate to infinity.
        raw.as_float()
            .filter(|v| !v.is_finite() || (f64::from(f32::MIN)..=f64::from(f32::MAX)).contains(v))
            .map(|v| v as f32)
    }
}

impl Primitive for String {
    fn to_primitive(&self) -> Option<PrimitiveValue> {
        Some(PrimitiveValue::String(self.clone()))
    }

    fn from_primitive(raw: &PrimitiveValue) -> Option<Self> {
        raw.as_str().map(ToOwned::to_owned)
    }
}

impl Primitive for Bytes {
    fn to_primitive(&self) -> Option<PrimitiveValue> {
        Some(PrimitiveValue::Bytes(self.clone()))
    }

    fn from_primitive(raw: &PrimitiveValue) -> Option<Self> {
        raw.as_bytes().cloned()
    }
}

impl Primitive for PrimitiveValue {
    fn to_primitive(&self) -> Option<PrimitiveValue> {
        Some(self.clone())
    }

    fn from_primitive(raw: &PrimitiveValue) -> Option<Self> {
        Some(raw.clone())
    }
}

impl<T: Primitive> Primitive for Vec<T> {
    fn to_primitive(&self) -> Option<PrimitiveValue> {
        self.iter()
            .map(T::to_primitive)
            .collect::<Option<Vec<_>>>()
            .map(PrimitiveValue::Array)
    }

    fn from_primitive(raw: &PrimitiveValue) -> Option<Self> {
        raw.as_array()?.iter().map(T::from_primitive).collect()
    }
}

impl<T: Primitive> Primitive for BTreeMap<String, T> {
    fn to_primitive(&self) -> Option<PrimitiveValue> {
        self.iter()
            .map(|(k, v)| Some((k.clone(), v.to_primitive()?)))
            .collect::<Option<BTreeMap<_, _>>>()
            .map(PrimitiveValue::Map)
    }

    fn from_primitive(raw: &PrimitiveValue) -> Option<Self> {
        raw.as_map()?
            .iter()
            .map(|(k, v)| Some((k.clone(), T::from_primitive(v)?)))
            .collect()
    }
}

impl<T: Primitive, S: BuildHasher + Default> Primitive for HashMap<String, T, S> {
    fn to_primitive(&self) -> Option<PrimitiveValue> {
        self.iter()
            .map(|(k, v)| Some((k.clone(), v.to_primitive()?)))
            .collect::<Option<BTreeMap<_, _>>>()
            .map(PrimitiveValue::Map)
    }

    fn from_primitive(raw: &PrimitiveValue) -> Option<Self> {
        raw.as_map()?
            .iter()
            .map(|(k, v)| Some((k.clone(), T::from_primitive(v)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn decode_json(text: &str) -> serde_json::Result<PrimitiveValue> {
        serde_json::from_str(text)
    }

    // -----------------------------------------------------------------------
    // Untyped decoding order
    // -----------------------------------------------------------------------

    #[test]
    fn whole_numbers_decode_as_integers() {
        assert_eq!(decode_json("3").unwrap(), PrimitiveValue::Int(3));
        assert_eq!(decode_json("-42").unwrap(), PrimitiveValue::Int(-42));
    }

    #[test]
    fn fractional_numbers_decode_as_floats() {
        assert_eq!(decode_json("3.5").unwrap(), PrimitiveValue::Float(3.5));
        assert_eq!(decode_json("3.0").unwrap(), PrimitiveValue::Float(3.0));
    }

    #[test]
    fn unsigned_beyond_i64_becomes_float() {
        let v = decode_json("18446744073709551615").unwrap();
        assert_eq!(v.kind_name(), "float");
    }

    #[test]
    fn booleans_are_not_numbers() {
        assert_eq!(decode_json("true").unwrap(), PrimitiveValue::Bool(true));
    }

    #[test]
    fn nested_containers_decode() {
        let v = decode_json(r#"{"a":[true,1,"x"],"b":{"c":2.5}}"#).unwrap();
        let map = v.as_map().unwrap();
        assert_eq!(
            map["a"],
            PrimitiveValue::Array(vec![
                PrimitiveValue::Bool(true),
                PrimitiveValue::Int(1),
                PrimitiveValue::from("x"),
            ])
        );
        assert_eq!(map["b"].as_map().unwrap()["c"], PrimitiveValue::Float(2.5));
    }

    #[test]
    fn null_matches_no_candidate() {
        assert!(decode_json("null").is_err());
        assert!(decode_json("[1, null]").is_err());
    }

    #[test]
    fn serializes_in_natural_shape() {
        let mut map = BTreeMap::new();
        map.insert("k".to_string(), PrimitiveValue::Int(1));
        let v = PrimitiveValue::Array(vec![PrimitiveValue::Bool(false), PrimitiveValue::Map(map)]);
        assert_eq!(serde_json::to_string(&v).unwrap(), r#"[false,{"k":1}]"#);
    }

    // -----------------------------------------------------------------------
    // Native conversions
    // -----------------------------------------------------------------------

    #[test]
    fn out_of_range_integers_do_not_convert() {
        assert!(u64::MAX.to_primitive().is_none());
        assert_eq!(i8::from_primitive(&PrimitiveValue::Int(300)), None);
        assert_eq!(u32::from_primitive(&PrimitiveValue::Int(-1)), None);
    }

    #[test]
    fn floats_accept_stored_integers() {
        assert_eq!(f64::from_primitive(&PrimitiveValue::Int(2)), Some(2.0));
        assert_eq!(i64::from_primitive(&PrimitiveValue::Float(2.0)), None);
    }

    #[test]
    fn f32_rejects_values_beyond_its_range() {
        assert_eq!(f32::from_primitive(&PrimitiveValue::Float(1.5)), Some(1.5));
        assert_eq!(f32::from_primitive(&PrimitiveValue::Float(f64::from(f32::MAX))), Some(f32::MAX));
        assert_eq!(f32::from_primitive(&PrimitiveValue::Float(1e300)), None);
        assert_eq!(f32::from_primitive(&PrimitiveValue::Float(-1e300)), None);
        assert_eq!(
            f32::from_primitive(&PrimitiveValue::Float(f64::INFINITY)),
            Some(f32::INFINITY)
        );
    }

    #[test]
    fn homogeneous_list_rejects_mixed_array() {
        let mixed = PrimitiveValue::Array(vec![PrimitiveValue::Int(1), PrimitiveValue::from("two")]);
        assert_eq!(Vec::<i64>::from_primitive(&mixed), None);
        assert_eq!(Vec::<i64>::from_primitive(&PrimitiveValue::from("blob")), None);
    }

    #[test]
    fn string_map_converts() {
        let mut m = HashMap::new();
        m.insert("a".to_string(), vec![1i64, 2]);
        let raw = m.to_primitive().unwrap();
        let back: HashMap<String, Vec<i64>> = Primitive::from_primitive(&raw).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn bytes_display_as_hex() {
        let v = PrimitiveValue::Bytes(Bytes::from_static(b"\x01\xab"));
        assert_eq!(v.to_string(), "<01ab>");
    }

    proptest! {
        #[test]
        fn integers_survive_native_conversion(n in any::<i64>()) {
            let raw = n.to_primitive().unwrap();
            prop_assert_eq!(i64::from_primitive(&raw), Some(n));
        }

        #[test]
        fn string_lists_survive_json(items in proptest::collection::vec(".*", 0..8)) {
            let raw = items.to_primitive().unwrap();
            let text = serde_json::to_string(&raw).unwrap();
            let back: PrimitiveValue = serde_json::from_str(&text).unwrap();
            prop_assert_eq!(Vec::<String>::from_primitive(&back), Some(items));
        }
    }
}
