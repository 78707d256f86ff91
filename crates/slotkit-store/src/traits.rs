use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use slotkit_types::PrimitiveValue;

bitflags! {
    /// What a watcher wants to hear about.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct WatchOptions: u8 {
        /// Include the value after the change.
        const NEW = 1 << 0;
        /// Include the value before the change.
        const OLD = 1 << 1;
        /// Deliver one notification immediately with the current value.
        const INITIAL = 1 << 2;
        /// Deliver an extra notification before each change is applied.
        const PRIOR = 1 << 3;
    }
}

impl Default for WatchOptions {
    fn default() -> Self {
        WatchOptions::OLD | WatchOptions::NEW
    }
}

/// One change notification for a single slot.
#[derive(Clone, Debug, PartialEq)]
pub struct RawChange {
    /// Slot name.
    pub name: String,
    /// Effective value before the change, if requested and present.
    pub old: Option<PrimitiveValue>,
    /// Effective value after the change, if requested and present.
    pub new: Option<PrimitiveValue>,
    /// `true` for the pre-change notification of a `PRIOR` watcher.
    pub is_prior: bool,
    /// `true` for the immediate notification of an `INITIAL` watcher.
    pub is_initial: bool,
}

impl RawChange {
    /// A regular post-change notification, with values filtered by `options`.
    pub fn filtered(
        name: &str,
        options: WatchOptions,
        old: Option<PrimitiveValue>,
        new: Option<PrimitiveValue>,
    ) -> Self {
        Self {
            name: name.to_string(),
            old: old.filter(|_| options.contains(WatchOptions::OLD)),
            new: new.filter(|_| options.contains(WatchOptions::NEW)),
            is_prior: false,
            is_initial: false,
        }
    }
}

/// Handle identifying one low-level watch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(u64);

impl WatchId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watch#{}", self.0)
    }
}

/// Callback invoked for every change to a watched slot.
pub type WatchCallback = Arc<dyn Fn(&RawChange) + Send + Sync>;

/// Untyped, string-keyed store of [`PrimitiveValue`]s.
///
/// Implementations must be thread-safe and keep a fully materialized view:
/// every operation completes synchronously. Watch callbacks must be invoked
/// with no internal lock held, so a callback may call back into the store
/// (including `raw_watch`/`raw_unwatch`).
pub trait RawStore: Send + Sync {
    /// Effective value of a slot: persistent domain first, then fallback.
    fn raw_get(&self, name: &str) -> Option<PrimitiveValue>;

    /// Write a slot in the persistent domain. `None` removes it.
    fn raw_set(&self, name: &str, value: Option<PrimitiveValue>);

    /// Whether the slot has an effective value.
    fn raw_contains(&self, name: &str) -> bool {
        self.raw_get(name).is_some()
    }

    /// Remove every slot of the persistent domain. Fallbacks survive.
    fn raw_remove_all(&self);

    /// Install a lower-priority fallback value for a slot.
    fn raw_register_fallback(&self, name: &str, value: PrimitiveValue);

    /// Install several fallback values.
    fn raw_register_fallbacks(&self, values: BTreeMap<String, PrimitiveValue>) {
        for (name, value) in values {
            self.raw_register_fallback(&name, value);
        }
    }

    /// Remove one slot's fallback value.
    fn raw_unregister_fallback(&self, name: &str);

    /// Remove every fallback value.
    fn raw_unregister_all(&self);

    /// Merged view of every slot with an effective value.
    fn raw_snapshot(&self) -> BTreeMap<String, PrimitiveValue>;

    /// Start watching one slot.
    fn raw_watch(&self, name: &str, options: WatchOptions, callback: WatchCallback) -> WatchId;

    /// Stop a watch. Returns `false` if it was not installed.
    fn raw_unwatch(&self, id: WatchId) -> bool;
}
