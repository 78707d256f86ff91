//! Foundation types for slotkit.
//!
//! Every slot in an underlying key-value store holds exactly one
//! [`PrimitiveValue`]: a boolean, integer, float, string, byte blob, or an
//! array/map built from those. This is the narrow waist the rest of the
//! workspace is built around; typed keys and transformers convert richer
//! Rust values into it and back.
//!
//! # Key Types
//!
//! - [`PrimitiveValue`] -- the wire-level union the store natively persists
//! - [`Primitive`] -- conversion between native Rust types and [`PrimitiveValue`]
//! - [`Optionality`] -- peels any number of `Option` layers off a value or type
//! - [`Concrete`] -- marker for payload types that are not themselves optional

pub mod optional;
pub mod value;

pub use optional::{
    innermost_type_name, is_optional, optional_depth, unwrap_fully, unwrap_once, Concrete,
    Optionality,
};
pub use value::{Primitive, PrimitiveValue};
