//! Change observation.
//!
//! The store is watched at most once per slot name, however many typed
//! observers are interested in it. The [`ObservationRegistry`] owns those
//! low-level watches and fans each reported change out to its observers in
//! registration order. An [`ObservationToken`] represents one observer;
//! invalidating (or dropping) it detaches the observer, and the low-level
//! watch goes away with the last observer of its slot.
//!
//! There is one registry per store instance, shared by every accessor built
//! over that store.

use std::collections::hash_map::{Entry, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};

use slotkit_store::{RawChange, RawStore, WatchCallback, WatchId, WatchOptions};
use tracing::debug;

/// Handler invoked with a change already filtered by the observer's options.
pub(crate) type RawHandler = Arc<dyn Fn(&RawChange) + Send + Sync>;

/// A typed change notification.
#[derive(Clone, Debug, PartialEq)]
pub struct ObservedChange<T> {
    /// Value before the change. Absent if it was unset, undecodable, or not
    /// requested with [`WatchOptions::OLD`].
    pub old: Option<T>,
    /// Value after the change, under the same rules with
    /// [`WatchOptions::NEW`].
    pub new: Option<T>,
    /// Delivered before the change is applied.
    pub is_prior: bool,
    /// Delivered once at registration time.
    pub is_initial: bool,
}

impl<T: Clone + Default> ObservedChange<T> {
    pub fn old_or_default(&self) -> T {
        self.old.clone().unwrap_or_default()
    }

    pub fn new_or_default(&self) -> T {
        self.new.clone().unwrap_or_default()
    }
}

struct TokenState {
    id: u64,
    names: Vec<String>,
    valid: AtomicBool,
    registry: Weak<ObservationRegistry>,
}

impl TokenState {
    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }
}

/// Handle for one registered observer.
///
/// Dropping the token invalidates it. Keep it alive for as long as the
/// observer should receive changes.
pub struct ObservationToken {
    state: Arc<TokenState>,
}

impl ObservationToken {
    /// Stop delivery and detach from the store. Calling this again does
    /// nothing.
    pub fn invalidate(&self) {
        if !self.state.valid.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.state.registry.upgrade() {
            registry.detach(self.state.id, &self.state.names);
        }
    }

    pub fn is_valid(&self) -> bool {
        self.state.is_valid()
    }

    /// Slot names this token watches.
    pub fn names(&self) -> &[String] {
        &self.state.names
    }
}

impl Drop for ObservationToken {
    fn drop(&mut self) {
        self.invalidate();
    }
}

impl fmt::Debug for ObservationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservationToken")
            .field("id", &self.state.id)
            .field("names", &self.state.names)
            .field("valid", &self.is_valid())
            .finish()
    }
}

#[derive(Clone)]
struct Observer {
    state: Arc<TokenState>,
    options: WatchOptions,
    handler: RawHandler,
}

impl Observer {
    fn deliver(&self, change: &RawChange) {
        if change.is_prior && !self.options.contains(WatchOptions::PRIOR) {
            return;
        }
        // Checked as late as possible: a token invalidated on another thread
        // after the snapshot was taken must stay silent.
        if !self.state.is_valid() {
            return;
        }
        let filtered = RawChange {
            old: change
                .old
                .clone()
                .filter(|_| self.options.contains(WatchOptions::OLD)),
            new: change
                .new
                .clone()
                .filter(|_| self.options.contains(WatchOptions::NEW)),
            ..change.clone()
        };
        (self.handler)(&filtered);
    }
}

struct Slot {
    watch: WatchId,
    observers: Vec<Observer>,
}

/// Live registries by store address. An entry only counts while its registry
/// upgrades and still points at the same store.
type RegistryMap = HashMap<usize, Weak<ObservationRegistry>>;

fn registries() -> &'static Mutex<RegistryMap> {
    static REGISTRIES: OnceLock<Mutex<RegistryMap>> = OnceLock::new();
    REGISTRIES.get_or_init(Default::default)
}

fn store_address(store: &Arc<dyn RawStore>) -> usize {
    Arc::as_ptr(store) as *const () as usize
}

/// Multiplexes one store watch per slot name to any number of observers.
pub struct ObservationRegistry {
    store: Weak<dyn RawStore>,
    slots: Mutex<HashMap<String, Slot>>,
    next_id: AtomicU64,
}

impl ObservationRegistry {
    pub(crate) fn new(store: Weak<dyn RawStore>) -> Self {
        Self {
            store,
            slots: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// The registry shared by every accessor over `store`, created on first
    /// use.
    pub(crate) fn for_store(store: &Arc<dyn RawStore>) -> Arc<Self> {
        let address = store_address(store);
        let mut map = registries().lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = map.get(&address).and_then(Weak::upgrade) {
            if existing.serves(store) {
                return existing;
            }
        }
        map.retain(|_, registry| registry.strong_count() > 0);
        let registry = Arc::new(Self::new(Arc::downgrade(store)));
        map.insert(address, Arc::downgrade(&registry));
        registry
    }

    fn serves(&self, store: &Arc<dyn RawStore>) -> bool {
        std::ptr::addr_eq(self.store.as_ptr(), Arc::as_ptr(store))
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `handler` for every name in `names`.
    ///
    /// `INITIAL` in `options` is not handled here; callers deliver the
    /// initial notification themselves once the token exists.
    pub(crate) fn attach(
        self: &Arc<Self>,
        names: Vec<String>,
        options: WatchOptions,
        handler: RawHandler,
    ) -> ObservationToken {
        let mut unique: Vec<String> = Vec::with_capacity(names.len());
        for name in names {
            if !unique.contains(&name) {
                unique.push(name);
            }
        }

        let state = Arc::new(TokenState {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            names: unique,
            valid: AtomicBool::new(true),
            registry: Arc::downgrade(self),
        });

        let Some(store) = self.store.upgrade() else {
            state.valid.store(false, Ordering::Release);
            return ObservationToken { state };
        };

        let observer = Observer {
            state: Arc::clone(&state),
            options,
            handler,
        };

        let mut slots = self.slots();
        for name in &state.names {
            match slots.entry(name.clone()) {
                Entry::Occupied(mut entry) => {
                    entry.get_mut().observers.push(observer.clone());
                }
                Entry::Vacant(entry) => {
                    let registry = Arc::downgrade(self);
                    let callback: WatchCallback = Arc::new(move |change: &RawChange| {
                        if let Some(registry) = registry.upgrade() {
                            registry.dispatch(change);
                        }
                    });
                    let watch = store.raw_watch(
                        name,
                        WatchOptions::OLD | WatchOptions::NEW | WatchOptions::PRIOR,
                        callback,
                    );
                    debug!(name = name.as_str(), %watch, "slot watched");
                    entry.insert(Slot {
                        watch,
                        observers: vec![observer.clone()],
                    });
                }
            }
        }
        drop(slots);

        debug!(token = state.id, names = ?state.names, "observer attached");
        ObservationToken { state }
    }

    fn dispatch(&self, change: &RawChange) {
        let observers: Vec<Observer> = self
            .slots()
            .get(&change.name)
            .map(|slot| slot.observers.clone())
            .unwrap_or_default();
        for observer in &observers {
            observer.deliver(change);
        }
    }

    fn detach(&self, id: u64, names: &[String]) {
        let store = self.store.upgrade();
        let mut slots = self.slots();
        for name in names {
            let Some(slot) = slots.get_mut(name) else {
                continue;
            };
            slot.observers.retain(|o| o.state.id != id);
            if !slot.observers.is_empty() {
                continue;
            }
            if let Some(slot) = slots.remove(name) {
                if let Some(store) = &store {
                    store.raw_unwatch(slot.watch);
                }
                debug!(name = name.as_str(), watch = %slot.watch, "slot unwatched");
            }
        }
        debug!(token = id, "observer detached");
    }

    /// Number of slot names with a live store watch.
    pub fn watched_slots(&self) -> usize {
        self.slots().len()
    }

    /// Number of observers attached to one slot.
    pub fn observer_count(&self, name: &str) -> usize {
        self.slots()
            .get(name)
            .map(|slot| slot.observers.len())
            .unwrap_or(0)
    }
}

impl Drop for ObservationRegistry {
    fn drop(&mut self) {
        let slots = std::mem::take(
            self.slots
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let Some(store) = self.store.upgrade() else {
            return;
        };
        for (_, slot) in slots {
            store.raw_unwatch(slot.watch);
        }
    }
}

impl fmt::Debug for ObservationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservationRegistry")
            .field("watched_slots", &self.watched_slots())
            .field("store_alive", &(self.store.strong_count() > 0))
            .finish()
    }
}
