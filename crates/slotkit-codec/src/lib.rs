//! Value transformers for slotkit.
//!
//! A transformer converts a typed Rust value into a [`PrimitiveValue`] the
//! store can persist, and back. Every typed key carries exactly one
//! transformer, chosen when the key is declared.
//!
//! # Transformers
//!
//! - [`Passthrough`] -- the value already is a store primitive
//! - [`Archive`] -- self-describing, checksummed byte archive (`bincode`)
//! - [`Json`] -- structured text via `serde_json`, stored as a byte blob
//!
//! # Failure Model
//!
//! Transformers never panic. The diagnostic [`ValueTransformer::encode`] and
//! [`ValueTransformer::decode`] return a [`TransformError`] describing what
//! went wrong; the [`ValueTransformer::serialize`] and
//! [`ValueTransformer::deserialize`] forms used on the hot path collapse any
//! failure to `None`.
//!
//! [`PrimitiveValue`]: slotkit_types::PrimitiveValue

pub mod archive;
pub mod error;
pub mod json;
pub mod passthrough;
pub mod transformer;

pub use archive::{Archivable, Archive, ARCHIVE_MAGIC, ARCHIVE_VERSION};
pub use error::{TransformError, TransformResult};
pub use json::Json;
pub use passthrough::Passthrough;
pub use transformer::{Transformer, TransformerKind, ValueTransformer};
