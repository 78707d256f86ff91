//! Self-describing byte archives.
//!
//! Blob layout: `[4 bytes magic][1 byte version][4 bytes CRC-32 LE][body]`,
//! where the body is a `bincode` envelope holding the archived type's name and
//! the `bincode` payload of the value. The recorded type name lets a reader
//! refuse blobs written for a type it does not know (possibly by a different
//! build of the program) instead of misinterpreting the payload.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use slotkit_types::PrimitiveValue;

use crate::error::{TransformError, TransformResult};
use crate::transformer::{Transformer, TransformerKind, ValueTransformer};

/// Leading bytes of every archive.
pub const ARCHIVE_MAGIC: [u8; 4] = *b"SKAR";

/// Current archive format version.
pub const ARCHIVE_VERSION: u8 = 1;

const HEADER_SIZE: usize = 9;

/// A type that can be stored through the [`Archive`] transformer.
///
/// The default [`archive_name`](Archivable::archive_name) is the compiler's
/// type name, which is not guaranteed stable across compiler versions.
/// Override it for values that must survive toolchain upgrades.
pub trait Archivable: Serialize + DeserializeOwned {
    fn archive_name() -> Cow<'static, str> {
        Cow::Borrowed(std::any::type_name::<Self>())
    }
}

macro_rules! archivable {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl Archivable for $ty {
                fn archive_name() -> Cow<'static, str> {
                    Cow::Borrowed($name)
                }
            }
        )*
    };
}

archivable!(
    bool => "bool", char => "char", String => "String",
    i8 => "i8", i16 => "i16", i32 => "i32", i64 => "i64",
    u8 => "u8", u16 => "u16", u32 => "u32", u64 => "u64",
    f32 => "f32", f64 => "f64",
);

impl<T: Archivable> Archivable for Vec<T> {
    fn archive_name() -> Cow<'static, str> {
        Cow::Owned(format!("Vec<{}>", T::archive_name()))
    }
}

impl<T: Archivable> Archivable for BTreeMap<String, T> {
    fn archive_name() -> Cow<'static, str> {
        Cow::Owned(format!("BTreeMap<String, {}>", T::archive_name()))
    }
}

impl<T: Archivable> Archivable for HashMap<String, T> {
    fn archive_name() -> Cow<'static, str> {
        Cow::Owned(format!("HashMap<String, {}>", T::archive_name()))
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    type_name: String,
    payload: Vec<u8>,
}

/// Byte-archival transformer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Archive;

impl Archive {
    /// Archive `value` into a self-describing blob.
    pub fn archive<T: Archivable>(value: &T) -> TransformResult<Vec<u8>> {
        let payload =
            bincode::serialize(value).map_err(|e| TransformError::Serialization(e.to_string()))?;
        let envelope = Envelope {
            type_name: T::archive_name().into_owned(),
            payload,
        };
        let body = bincode::serialize(&envelope)
            .map_err(|e| TransformError::Serialization(e.to_string()))?;

        let crc = crc32fast::hash(&body);
        let mut buf = Vec::with_capacity(HEADER_SIZE + body.len());
        buf.extend_from_slice(&ARCHIVE_MAGIC);
        buf.push(ARCHIVE_VERSION);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf.extend_from_slice(&body);
        Ok(buf)
    }

    /// Reconstruct a `T` from a blob produced by [`Archive::archive`].
    pub fn unarchive<T: Archivable>(data: &[u8]) -> TransformResult<T> {
        let envelope = open(data)?;
        let expected = T::archive_name();
        if envelope.type_name != expected {
            return Err(TransformError::UnrecognizedType {
                found: envelope.type_name,
                expected: expected.into_owned(),
            });
        }
        bincode::deserialize(&envelope.payload)
            .map_err(|e| TransformError::Deserialization(e.to_string()))
    }

    /// The type name recorded in a blob, without decoding its payload.
    pub fn archived_type_name(data: &[u8]) -> TransformResult<String> {
        open(data).map(|envelope| envelope.type_name)
    }
}

fn open(data: &[u8]) -> TransformResult<Envelope> {
    if data.len() < HEADER_SIZE {
        return Err(TransformError::MalformedArchive(format!(
            "too short: {} bytes",
            data.len()
        )));
    }
    if data[..4] != ARCHIVE_MAGIC {
        return Err(TransformError::MalformedArchive("bad magic".into()));
    }
    if data[4] != ARCHIVE_VERSION {
        return Err(TransformError::MalformedArchive(format!(
            "unsupported version {}",
            data[4]
        )));
    }
    let expected = u32::from_le_bytes([data[5], data[6], data[7], data[8]]);
    let body = &data[HEADER_SIZE..];
    let actual = crc32fast::hash(body);
    if actual != expected {
        return Err(TransformError::ChecksumMismatch { expected, actual });
    }
    bincode::deserialize(body).map_err(|e| TransformError::MalformedArchive(e.to_string()))
}

impl Transformer for Archive {
    const KIND: TransformerKind = TransformerKind::Archive;
}

impl<T: Archivable> ValueTransformer<T> for Archive {
    fn encode(&self, value: &T) -> TransformResult<PrimitiveValue> {
        Archive::archive(value).map(|blob| PrimitiveValue::Bytes(Bytes::from(blob)))
    }

    fn decode(&self, raw: &PrimitiveValue) -> TransformResult<T> {
        let data = raw.as_bytes().ok_or(TransformError::TypeMismatch {
            expected: "bytes",
            found: raw.kind_name(),
        })?;
        Archive::unarchive(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Color {
        red: f32,
        green: f32,
        blue: f32,
        alpha: f32,
    }

    impl Archivable for Color {
        fn archive_name() -> Cow<'static, str> {
            Cow::Borrowed("Color")
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Size {
        width: f64,
        height: f64,
    }

    impl Archivable for Size {}

    fn white() -> Color {
        Color {
            red: 1.0,
            green: 1.0,
            blue: 1.0,
            alpha: 1.0,
        }
    }

    #[test]
    fn archived_struct_round_trips() {
        let raw = Archive.serialize(&white()).unwrap();
        assert!(raw.as_bytes().unwrap().starts_with(&ARCHIVE_MAGIC));
        let back: Option<Color> = Archive.deserialize(&raw);
        assert_eq!(back, Some(white()));
    }

    #[test]
    fn foreign_type_is_reported_by_name() {
        let raw = Archive.serialize(&white()).unwrap();
        let err = ValueTransformer::<Size>::decode(&Archive, &raw).unwrap_err();
        match err {
            TransformError::UnrecognizedType { found, expected } => {
                assert_eq!(found, "Color");
                assert!(expected.ends_with("Size"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // The non-diagnostic path just yields absence.
        assert!(ValueTransformer::<Size>::deserialize(&Archive, &raw).is_none());
    }

    #[test]
    fn type_name_is_readable_without_decoding() {
        let blob = Archive::archive(&vec![1i32, 2, 3]).unwrap();
        assert_eq!(Archive::archived_type_name(&blob).unwrap(), "Vec<i32>");
    }

    #[test]
    fn corrupted_body_fails_checksum() {
        let mut blob = Archive::archive(&white()).unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0xff;
        assert!(matches!(
            Archive::unarchive::<Color>(&blob),
            Err(TransformError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn truncated_and_foreign_blobs_are_malformed() {
        assert!(matches!(
            Archive::unarchive::<Color>(b"SKA"),
            Err(TransformError::MalformedArchive(_))
        ));
        assert!(matches!(
            Archive::unarchive::<Color>(b"NOPE\x01\x00\x00\x00\x00"),
            Err(TransformError::MalformedArchive(_))
        ));
    }

    #[test]
    fn non_blob_primitive_is_a_mismatch() {
        let raw = PrimitiveValue::Int(1);
        assert!(matches!(
            ValueTransformer::<Color>::decode(&Archive, &raw),
            Err(TransformError::TypeMismatch { expected: "bytes", .. })
        ));
    }

    proptest! {
        #[test]
        fn archived_strings_round_trip(s in ".*") {
            let blob = Archive::archive(&s).unwrap();
            prop_assert_eq!(Archive::unarchive::<String>(&blob).unwrap(), s);
        }
    }
}
