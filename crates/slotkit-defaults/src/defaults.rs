use std::collections::BTreeMap;
#[cfg(debug_assertions)]
use std::collections::hash_map::{Entry, HashMap};
use std::fmt;
use std::sync::Arc;
#[cfg(debug_assertions)]
use std::sync::{Mutex, PoisonError};

use slotkit_codec::{Transformer, ValueTransformer};
use slotkit_store::{InMemoryStore, RawChange, RawStore, StoreConfig, WatchOptions};
use slotkit_types::{Optionality, PrimitiveValue};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{DefaultsError, DefaultsResult};
use crate::key::{AnyKey, Key};
use crate::observation::{ObservationRegistry, ObservationToken, ObservedChange, RawHandler};
use crate::registration::Registration;
use crate::watcher::{KeysWatcher, ValueWatcher};

/// Typed access to a [`RawStore`].
///
/// Every operation takes a [`Key`], whose payload type and transformer decide
/// how values are encoded on the way in and decoded on the way out. Keys
/// declared over `Option<_>` (to any depth) collapse an empty value to "slot
/// absent" on write.
///
/// Reads never fail: a slot that is unset, or whose stored value cannot be
/// decoded as the key's type, reads as absent. Use [`try_get`](Self::try_get)
/// to find out which.
///
/// Cloning a `Defaults` is cheap and shares the store and its observers.
pub struct Defaults<S: RawStore + 'static = InMemoryStore> {
    store: Arc<S>,
    observers: Arc<ObservationRegistry>,
    #[cfg(debug_assertions)]
    declared: Arc<Mutex<HashMap<AnyKey, &'static str>>>,
}

impl Defaults<InMemoryStore> {
    /// Typed access over a fresh in-memory store.
    pub fn new() -> Self {
        Self::from_store(InMemoryStore::new())
    }

    pub fn with_config(config: StoreConfig) -> DefaultsResult<Self> {
        Ok(Self::from_store(InMemoryStore::with_config(config)?))
    }
}

impl Default for Defaults<InMemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: RawStore + 'static> Defaults<S> {
    pub fn from_store(store: S) -> Self {
        Self::from_arc(Arc::new(store))
    }

    /// Typed access over a store that is shared with other code.
    ///
    /// Every `Defaults` over the same store shares one
    /// [`ObservationRegistry`], so a slot is watched at most once per store.
    /// The registry holds the store weakly.
    pub fn from_arc(store: Arc<S>) -> Self {
        let erased: Arc<dyn RawStore> = store.clone();
        Self {
            observers: ObservationRegistry::for_store(&erased),
            store,
            #[cfg(debug_assertions)]
            declared: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn observers(&self) -> &ObservationRegistry {
        &self.observers
    }

    // -----------------------------------------------------------------------
    // Reading
    // -----------------------------------------------------------------------

    /// The slot's value, or `None` if it is unset or not decodable as `T`.
    pub fn get<T, X>(&self, key: &Key<T, X>) -> Option<T>
    where
        T: Optionality,
        X: ValueTransformer<T::Innermost>,
    {
        self.note_key(key);
        let raw = self.store.raw_get(key.name())?;
        key.transformer().deserialize(&raw).map(T::wrap_fully)
    }

    /// The slot's value, or `T::default()` if it is unset or not decodable.
    pub fn get_or_default<T, X>(&self, key: &Key<T, X>) -> T
    where
        T: Optionality + Default,
        X: ValueTransformer<T::Innermost>,
    {
        self.get(key).unwrap_or_default()
    }

    /// Like [`get`](Self::get), but reports why a present value could not be
    /// decoded.
    pub fn try_get<T, X>(&self, key: &Key<T, X>) -> DefaultsResult<Option<T>>
    where
        T: Optionality,
        X: ValueTransformer<T::Innermost>,
    {
        self.note_key(key);
        let Some(raw) = self.store.raw_get(key.name()) else {
            return Ok(None);
        };
        key.transformer()
            .decode(&raw)
            .map(|value| Some(T::wrap_fully(value)))
            .map_err(|e| DefaultsError::transform(key.name(), e))
    }

    /// Whether the slot holds a value, real or fallback.
    ///
    /// This reports presence in the store only. A key read with
    /// [`get_or_default`](Self::get_or_default) yields a value even when this
    /// returns `false`.
    pub fn contains<T, X: Transformer>(&self, key: &Key<T, X>) -> bool {
        self.store.raw_contains(key.name())
    }

    /// Merged view of every slot, fallbacks included.
    pub fn snapshot(&self) -> BTreeMap<String, PrimitiveValue> {
        self.store.raw_snapshot()
    }

    // -----------------------------------------------------------------------
    // Writing
    // -----------------------------------------------------------------------

    /// Store `value` in the slot.
    ///
    /// An empty optional removes the slot. A value the key's transformer
    /// cannot encode is dropped and the slot keeps its previous contents.
    pub fn set<T, X>(&self, key: &Key<T, X>, value: T)
    where
        T: Optionality,
        X: ValueTransformer<T::Innermost>,
    {
        self.note_key(key);
        let Some(inner) = value.unwrap_fully() else {
            self.store.raw_set(key.name(), None);
            return;
        };
        match key.transformer().serialize(&inner) {
            Some(raw) => self.store.raw_set(key.name(), Some(raw)),
            None => warn!(key = key.name(), transformer = %X::KIND, "value not encodable, write dropped"),
        }
    }

    /// Store `value`, or remove the slot when it is `None`.
    pub fn set_optional<T, X>(&self, key: &Key<T, X>, value: Option<T>)
    where
        T: Optionality,
        X: ValueTransformer<T::Innermost>,
    {
        match value {
            Some(value) => self.set(key, value),
            None => self.remove(key),
        }
    }

    /// Like [`set`](Self::set), but reports an encoding failure instead of
    /// logging it. The slot is left untouched on error.
    pub fn try_set<T, X>(&self, key: &Key<T, X>, value: T) -> DefaultsResult<()>
    where
        T: Optionality,
        X: ValueTransformer<T::Innermost>,
    {
        self.note_key(key);
        let raw = match value.unwrap_fully() {
            Some(inner) => Some(
                key.transformer()
                    .encode(&inner)
                    .map_err(|e| DefaultsError::transform(key.name(), e))?,
            ),
            None => None,
        };
        self.store.raw_set(key.name(), raw);
        Ok(())
    }

    /// Read the value (or its default), let `f` modify it and write it back.
    ///
    /// The read and the write are separate store operations; concurrent
    /// writers to the same slot can interleave.
    pub fn update<T, X, F>(&self, key: &Key<T, X>, f: F)
    where
        T: Optionality + Default,
        X: ValueTransformer<T::Innermost>,
        F: FnOnce(&mut T),
    {
        let mut value = self.get_or_default(key);
        f(&mut value);
        self.set(key, value);
    }

    pub fn remove<T, X: Transformer>(&self, key: &Key<T, X>) {
        self.store.raw_set(key.name(), None);
    }

    /// Remove every real value this store's domain owns. Fallbacks stay.
    pub fn remove_all(&self) {
        self.store.raw_remove_all();
    }

    // -----------------------------------------------------------------------
    // Fallbacks
    // -----------------------------------------------------------------------

    /// Install a batch of fallback values.
    ///
    /// Fallbacks sit below real values: they are only read when the slot has
    /// no real value, and installing one never overwrites a real value.
    pub fn register(&self, registration: Registration) {
        let count = registration.len();
        for (key, value) in registration {
            self.store.raw_register_fallback(key.name(), value);
        }
        debug!(count, "fallbacks registered");
    }

    /// Install already-encoded fallback values by slot name.
    pub fn register_raw(&self, values: BTreeMap<String, PrimitiveValue>) {
        self.store.raw_register_fallbacks(values);
    }

    /// Remove the slot's fallback value.
    pub fn unregister<T, X: Transformer>(&self, key: &Key<T, X>) {
        self.store.raw_unregister_fallback(key.name());
    }

    pub fn unregister_all(&self) {
        self.store.raw_unregister_all();
    }

    // -----------------------------------------------------------------------
    // Observation
    // -----------------------------------------------------------------------

    /// Call `handler` with the typed old/new values whenever the slot changes.
    ///
    /// Each observer decodes the raw change with its own key, so a value that
    /// does not decode as `T` shows up as `None` on that side of the pair.
    /// The handler may run on whichever thread performed the write.
    pub fn observe<T, X, F>(&self, key: &Key<T, X>, options: WatchOptions, handler: F) -> ObservationToken
    where
        T: Optionality + 'static,
        X: ValueTransformer<T::Innermost>,
        F: Fn(ObservedChange<T>) + Send + Sync + 'static,
    {
        self.note_key(key);
        let transformer = key.transformer();
        let decode = move |raw: &Option<PrimitiveValue>| -> Option<T> {
            raw.as_ref()
                .and_then(|raw| transformer.deserialize(raw))
                .map(T::wrap_fully)
        };
        let raw_handler: RawHandler = Arc::new(move |change: &RawChange| {
            handler(ObservedChange {
                old: decode(&change.old),
                new: decode(&change.new),
                is_prior: change.is_prior,
                is_initial: change.is_initial,
            });
        });

        let token = self
            .observers
            .attach(vec![key.name().to_string()], options, Arc::clone(&raw_handler));
        if options.contains(WatchOptions::INITIAL) && token.is_valid() {
            let current = self.store.raw_get(key.name());
            raw_handler(&RawChange {
                is_initial: true,
                ..RawChange::filtered(key.name(), options, None, current)
            });
        }
        token
    }

    /// Call `handler` whenever any of the given slots changes.
    ///
    /// The keys may carry unrelated payload types, so the handler gets no
    /// values; read them back through the usual accessors.
    pub fn observe_keys<F>(&self, keys: &[AnyKey], options: WatchOptions, handler: F) -> ObservationToken
    where
        F: Fn() + Send + Sync + 'static,
    {
        let names = keys.iter().map(|key| key.name().to_string()).collect();
        let handler = Arc::new(handler);
        let signal = Arc::clone(&handler);
        let token = self
            .observers
            .attach(names, options, Arc::new(move |_: &RawChange| signal()));
        if options.contains(WatchOptions::INITIAL) && token.is_valid() {
            handler();
        }
        token
    }

    /// An async stream of the slot's latest value.
    pub fn watch<T, X>(&self, key: &Key<T, X>) -> ValueWatcher<T>
    where
        T: Optionality + Clone + Send + Sync + 'static,
        X: ValueTransformer<T::Innermost>,
    {
        let (sender, mut receiver) = watch::channel(None);
        let token = self.observe(
            key,
            WatchOptions::NEW | WatchOptions::INITIAL,
            move |change: ObservedChange<T>| {
                sender.send_replace(change.new);
            },
        );
        drop(receiver.borrow_and_update());
        ValueWatcher::new(receiver, token)
    }

    /// An async change signal for a group of slots.
    ///
    /// Nothing is signalled at creation; the first
    /// [`changed`](KeysWatcher::changed) completes after the next write to any
    /// of the slots.
    pub fn watch_keys(&self, keys: &[AnyKey]) -> KeysWatcher {
        let (sender, receiver) = watch::channel(());
        let token = self.observe_keys(keys, WatchOptions::NEW, move || {
            sender.send_replace(());
        });
        KeysWatcher::new(receiver, token)
    }

    // -----------------------------------------------------------------------
    // Key bookkeeping
    // -----------------------------------------------------------------------

    #[cfg(debug_assertions)]
    fn note_key<T: Optionality, X: Transformer>(&self, key: &Key<T, X>) {
        let type_name = std::any::type_name::<T::Innermost>();
        let mut declared = self.declared.lock().unwrap_or_else(PoisonError::into_inner);
        match declared.entry(key.erase()) {
            Entry::Occupied(mut entry) => {
                let previous = *entry.get();
                if previous != type_name {
                    warn!(
                        key = key.name(),
                        transformer = %X::KIND,
                        previous,
                        current = type_name,
                        "differently typed keys share one slot"
                    );
                    entry.insert(type_name);
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(type_name);
            }
        }
    }

    #[cfg(not(debug_assertions))]
    #[inline]
    fn note_key<T: Optionality, X: Transformer>(&self, _key: &Key<T, X>) {}
}

impl<S: RawStore + 'static> Clone for Defaults<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            observers: Arc::clone(&self.observers),
            #[cfg(debug_assertions)]
            declared: Arc::clone(&self.declared),
        }
    }
}

impl<S: RawStore + fmt::Debug + 'static> fmt::Debug for Defaults<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Defaults")
            .field("store", &self.store)
            .field("observers", &self.observers)
            .finish()
    }
}
