use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use slotkit_types::PrimitiveValue;
use tracing::debug;

use crate::config::StoreConfig;
use crate::error::StoreResult;
use crate::traits::{RawChange, RawStore, WatchCallback, WatchId, WatchOptions};

struct Watcher {
    id: WatchId,
    name: String,
    options: WatchOptions,
    callback: WatchCallback,
}

/// In-memory, layered key-value store.
///
/// Holds a persistent domain and a registration (fallback) domain, each a
/// `HashMap` behind its own `RwLock`. Locks are always taken persistent
/// first, then fallback. Watchers live behind a third lock that is never held
/// while a callback runs.
pub struct InMemoryStore {
    config: StoreConfig,
    persistent: RwLock<HashMap<String, PrimitiveValue>>,
    fallback: RwLock<HashMap<String, PrimitiveValue>>,
    watchers: RwLock<Vec<Watcher>>,
    next_watch: AtomicU64,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn effective(
    persistent: &HashMap<String, PrimitiveValue>,
    fallback: &HashMap<String, PrimitiveValue>,
    name: &str,
) -> Option<PrimitiveValue> {
    persistent.get(name).or_else(|| fallback.get(name)).cloned()
}

impl InMemoryStore {
    /// Create an empty store for the default domain.
    pub fn new() -> Self {
        Self::from_config(StoreConfig::default())
    }

    /// Create an empty store from a validated configuration.
    pub fn with_config(config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        Ok(Self::from_config(config))
    }

    fn from_config(config: StoreConfig) -> Self {
        Self {
            config,
            persistent: RwLock::new(HashMap::new()),
            fallback: RwLock::new(HashMap::new()),
            watchers: RwLock::new(Vec::new()),
            next_watch: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Name of the persistent domain this store owns.
    pub fn domain(&self) -> &str {
        &self.config.domain
    }

    /// Number of slots in the persistent domain.
    pub fn len(&self) -> usize {
        read(&self.persistent).len()
    }

    /// Returns `true` if the persistent domain is empty.
    pub fn is_empty(&self) -> bool {
        read(&self.persistent).is_empty()
    }

    /// Number of installed low-level watches.
    pub fn watch_count(&self) -> usize {
        read(&self.watchers).len()
    }

    /// Number of low-level watches on one slot.
    pub fn watch_count_for(&self, name: &str) -> usize {
        read(&self.watchers)
            .iter()
            .filter(|w| w.name == name)
            .count()
    }

    fn callbacks_for(&self, name: &str, required: WatchOptions) -> Vec<(WatchOptions, WatchCallback)> {
        read(&self.watchers)
            .iter()
            .filter(|w| w.name == name && w.options.contains(required))
            .map(|w| (w.options, w.callback.clone()))
            .collect()
    }

    /// Whether writing `value` would change what `name` reads as.
    fn would_change(&self, name: &str, value: Option<&PrimitiveValue>) -> bool {
        let persistent = read(&self.persistent);
        let fallback = read(&self.fallback);
        let after = value.or_else(|| fallback.get(name));
        effective(&persistent, &fallback, name).as_ref() != after
    }

    /// The old value is read before the write lock is taken, so a concurrent
    /// writer can land between this notification and the change it precedes.
    fn notify_prior(&self, name: &str) {
        let callbacks = self.callbacks_for(name, WatchOptions::PRIOR);
        if callbacks.is_empty() {
            return;
        }
        let old = self.raw_get(name);
        for (options, callback) in callbacks {
            let change = RawChange {
                is_prior: true,
                ..RawChange::filtered(name, options, old.clone(), None)
            };
            callback(&change);
        }
    }

    fn notify(&self, name: &str, old: Option<PrimitiveValue>, new: Option<PrimitiveValue>) {
        for (options, callback) in self.callbacks_for(name, WatchOptions::empty()) {
            callback(&RawChange::filtered(name, options, old.clone(), new.clone()));
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RawStore for InMemoryStore {
    fn raw_get(&self, name: &str) -> Option<PrimitiveValue> {
        let persistent = read(&self.persistent);
        let fallback = read(&self.fallback);
        effective(&persistent, &fallback, name)
    }

    fn raw_set(&self, name: &str, value: Option<PrimitiveValue>) {
        if self.config.notify_unchanged || self.would_change(name, value.as_ref()) {
            self.notify_prior(name);
        }

        let (old, new) = {
            let mut persistent = write(&self.persistent);
            let fallback = read(&self.fallback);
            let old = effective(&persistent, &fallback, name);
            match value {
                Some(value) => {
                    persistent.insert(name.to_string(), value);
                }
                None => {
                    persistent.remove(name);
                }
            }
            (old, effective(&persistent, &fallback, name))
        };

        debug!(domain = %self.config.domain, name, present = new.is_some(), "slot written");
        if old == new && !self.config.notify_unchanged {
            return;
        }
        self.notify(name, old, new);
    }

    fn raw_remove_all(&self) {
        let changes: Vec<(String, PrimitiveValue, Option<PrimitiveValue>)> = {
            let mut persistent = write(&self.persistent);
            let fallback = read(&self.fallback);
            persistent
                .drain()
                .map(|(name, old)| {
                    let new = fallback.get(&name).cloned();
                    (name, old, new)
                })
                .collect()
        };

        debug!(domain = %self.config.domain, removed = changes.len(), "domain cleared");
        for (name, old, new) in changes {
            self.notify(&name, Some(old), new);
        }
    }

    fn raw_register_fallback(&self, name: &str, value: PrimitiveValue) {
        let (old, new) = {
            let persistent = read(&self.persistent);
            let mut fallback = write(&self.fallback);
            let old = effective(&persistent, &fallback, name);
            fallback.insert(name.to_string(), value);
            (old, effective(&persistent, &fallback, name))
        };
        debug!(domain = %self.config.domain, name, "fallback registered");
        if old != new {
            self.notify(name, old, new);
        }
    }

    fn raw_unregister_fallback(&self, name: &str) {
        let (old, new) = {
            let persistent = read(&self.persistent);
            let mut fallback = write(&self.fallback);
            let old = effective(&persistent, &fallback, name);
            fallback.remove(name);
            (old, effective(&persistent, &fallback, name))
        };
        if old != new {
            self.notify(name, old, new);
        }
    }

    fn raw_unregister_all(&self) {
        let changes: Vec<(String, PrimitiveValue)> = {
            let persistent = read(&self.persistent);
            let mut fallback = write(&self.fallback);
            fallback
                .drain()
                .filter(|(name, _)| !persistent.contains_key(name))
                .collect()
        };
        debug!(domain = %self.config.domain, revealed = changes.len(), "fallbacks cleared");
        for (name, old) in changes {
            self.notify(&name, Some(old), None);
        }
    }

    fn raw_snapshot(&self) -> BTreeMap<String, PrimitiveValue> {
        let persistent = read(&self.persistent);
        let fallback = read(&self.fallback);
        let mut merged: BTreeMap<String, PrimitiveValue> = fallback
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        merged.extend(persistent.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    fn raw_watch(&self, name: &str, options: WatchOptions, callback: WatchCallback) -> WatchId {
        let id = WatchId::new(self.next_watch.fetch_add(1, Ordering::Relaxed));
        write(&self.watchers).push(Watcher {
            id,
            name: name.to_string(),
            options,
            callback: callback.clone(),
        });
        debug!(%id, name, "watch installed");

        if options.contains(WatchOptions::INITIAL) {
            let current = self.raw_get(name);
            let change = RawChange {
                is_initial: true,
                ..RawChange::filtered(name, options, None, current)
            };
            callback(&change);
        }
        id
    }

    fn raw_unwatch(&self, id: WatchId) -> bool {
        let mut watchers = write(&self.watchers);
        let before = watchers.len();
        watchers.retain(|w| w.id != id);
        let removed = watchers.len() != before;
        if removed {
            debug!(%id, "watch removed");
        }
        removed
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("domain", &self.config.domain)
            .field("slot_count", &self.len())
            .field("fallback_count", &read(&self.fallback).len())
            .field("watch_count", &self.watch_count())
            .finish()
    }
}
