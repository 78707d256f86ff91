//! The underlying key-value store boundary for slotkit.
//!
//! Typed access is layered on top of an untyped, string-keyed store that
//! holds [`PrimitiveValue`]s. This crate defines that boundary and ships an
//! in-memory backend.
//!
//! # Layers
//!
//! A store exposes two value layers per slot name:
//!
//! - the **persistent domain** -- real writes made by the program
//! - the **registration domain** -- lower-priority fallbacks consulted only
//!   when the persistent domain has no value for the slot
//!
//! Reads always see the effective value: persistent first, then fallback.
//!
//! # Watching
//!
//! [`RawStore::raw_watch`] registers a callback for one slot name. Callbacks
//! receive a [`RawChange`] with the effective old/new values, happen after the
//! write they report, and carry no guarantee about which thread they run on.
//!
//! # Backends
//!
//! - [`InMemoryStore`] -- `HashMap`-based store for tests and embedding
//!
//! [`PrimitiveValue`]: slotkit_types::PrimitiveValue

pub mod config;
pub mod error;
pub mod memory;
pub mod traits;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStore;
pub use traits::{RawChange, RawStore, WatchCallback, WatchId, WatchOptions};
