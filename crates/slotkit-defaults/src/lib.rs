//! Strongly-typed access to a key-value settings store.
//!
//! Values live in an untyped [`RawStore`] as [`PrimitiveValue`]s. A [`Key`]
//! names a slot and fixes, at compile time, the payload type and the
//! transformer used to encode it:
//!
//! ```
//! use slotkit_defaults::{Defaults, Json, Key, Registration};
//!
//! const VOLUME: Key<i64> = Key::new("volume");
//! const HISTORY: Key<Vec<String>, Json> = Key::with_transformer("history", Json);
//!
//! let defaults = Defaults::new();
//! defaults.register(Registration::new().with(&VOLUME, 5));
//! assert_eq!(defaults.get_or_default(&VOLUME), 5);
//!
//! defaults.update(&HISTORY, |h| h.push("opened".into()));
//! assert_eq!(defaults.get(&HISTORY), Some(vec!["opened".to_string()]));
//! ```
//!
//! # Absence
//!
//! Every read that cannot produce a typed value (slot unset, wrong shape,
//! foreign archive) yields `None`. The `try_*` accessors report the cause.
//!
//! # Observation
//!
//! [`Defaults::observe`] delivers typed [`ObservedChange`]s until the
//! returned [`ObservationToken`] is invalidated or dropped.
//! [`Defaults::watch`] wraps the same mechanism in an async
//! [`ValueWatcher`], and [`Defaults::watch_keys`] signals changes to any
//! of several slots through a [`KeysWatcher`].
//!
//! [`RawStore`]: slotkit_store::RawStore
//! [`PrimitiveValue`]: slotkit_types::PrimitiveValue

pub mod defaults;
pub mod error;
pub mod key;
pub mod observation;
pub mod registration;
pub mod watcher;

pub use defaults::Defaults;
pub use error::{DefaultsError, DefaultsResult};
pub use key::{AnyKey, Key};
pub use observation::{ObservationRegistry, ObservationToken, ObservedChange};
pub use registration::Registration;
pub use watcher::{KeysWatcher, ValueWatcher};

pub use slotkit_codec::{Archivable, Archive, Json, Passthrough, TransformError, TransformerKind};
pub use slotkit_store::{InMemoryStore, RawStore, StoreConfig, WatchOptions};
pub use slotkit_types::{Concrete, Optionality, PrimitiveValue};
