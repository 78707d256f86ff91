use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};

use tracing::debug;

use crate::key::AssociateKey;

type Value = Box<dyn Any + Send + Sync>;

struct Associations {
    // Keeps the allocation (and so the address used as identity) reserved
    // until the entry is pruned.
    owner: Weak<dyn Any + Send + Sync>,
    values: HashMap<Cow<'static, str>, Value>,
}

impl Associations {
    fn is_live(&self) -> bool {
        self.owner.strong_count() > 0
    }
}

/// Per-object typed value bags.
///
/// Objects are identified by their `Arc` allocation, so every clone of an
/// `Arc` sees the same values. All operations lock one internal mutex and
/// never call user code while holding it, apart from dropping removed values.
pub struct SideTable {
    entries: Mutex<HashMap<usize, Associations>>,
}

fn identity<O>(owner: &Arc<O>) -> usize {
    Arc::as_ptr(owner) as *const () as usize
}

impl SideTable {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide table.
    pub fn global() -> &'static SideTable {
        static GLOBAL: OnceLock<SideTable> = OnceLock::new();
        GLOBAL.get_or_init(SideTable::new)
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<usize, Associations>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A copy of the value associated with `owner` under `key`.
    ///
    /// Returns `None` if nothing is associated, or if the stored value is of
    /// a different type than the key's.
    pub fn get<O, T>(&self, owner: &Arc<O>, key: &AssociateKey<T>) -> Option<T>
    where
        O: Send + Sync + 'static,
        T: Clone + 'static,
    {
        self.with(owner, key, |value| value.cloned())
    }

    /// Run `f` on a borrow of the associated value.
    ///
    /// The table stays locked while `f` runs; `f` must not use the table.
    pub fn with<O, T, R>(
        &self,
        owner: &Arc<O>,
        key: &AssociateKey<T>,
        f: impl FnOnce(Option<&T>) -> R,
    ) -> R
    where
        O: Send + Sync + 'static,
        T: 'static,
    {
        let entries = self.entries();
        let value = entries
            .get(&identity(owner))
            .and_then(|assoc| assoc.values.get(key.name()))
            .and_then(|value| value.downcast_ref::<T>());
        f(value)
    }

    /// Associate `value` with `owner` under `key`, replacing any previous
    /// value.
    pub fn set<O, T>(&self, owner: &Arc<O>, key: &AssociateKey<T>, value: T)
    where
        O: Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        let id = identity(owner);
        let replaced = {
            let mut entries = self.entries();
            if !entries.contains_key(&id) {
                let stale = prune_locked(&mut entries);
                if stale > 0 {
                    debug!(stale, "pruned associations of dropped owners");
                }
                let erased: Arc<dyn Any + Send + Sync> = owner.clone();
                entries.insert(
                    id,
                    Associations {
                        owner: Arc::downgrade(&erased),
                        values: HashMap::new(),
                    },
                );
            }
            entries
                .get_mut(&id)
                .and_then(|assoc| assoc.values.insert(key.slot(), Box::new(value)))
        };
        drop(replaced);
    }

    /// Remove and return the value under `key`.
    ///
    /// A value of a different type than the key's is removed all the same,
    /// and `None` is returned.
    pub fn remove<O, T>(&self, owner: &Arc<O>, key: &AssociateKey<T>) -> Option<T>
    where
        O: Send + Sync + 'static,
        T: 'static,
    {
        let removed = {
            let mut entries = self.entries();
            let id = identity(owner);
            let assoc = entries.get_mut(&id)?;
            let removed = assoc.values.remove(key.name());
            if assoc.values.is_empty() {
                entries.remove(&id);
            }
            removed
        };
        removed
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }

    /// Remove every value associated with `owner`.
    pub fn remove_all<O>(&self, owner: &Arc<O>)
    where
        O: Send + Sync + 'static,
    {
        let removed = self.entries().remove(&identity(owner));
        if let Some(assoc) = &removed {
            debug!(count = assoc.values.len(), "associations removed");
        }
    }

    /// Release the values of owners that have been dropped. Returns how many
    /// owners were released.
    pub fn prune(&self) -> usize {
        let stale = prune_locked(&mut self.entries());
        if stale > 0 {
            debug!(stale, "pruned associations of dropped owners");
        }
        stale
    }

    /// Number of live owners with at least one association.
    pub fn len(&self) -> usize {
        self.entries().values().filter(|a| a.is_live()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn prune_locked(entries: &mut HashMap<usize, Associations>) -> usize {
    let before = entries.len();
    entries.retain(|_, assoc| assoc.is_live());
    before - entries.len()
}

impl Default for SideTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SideTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries();
        f.debug_struct("SideTable")
            .field("owners", &entries.len())
            .field(
                "values",
                &entries.values().map(|a| a.values.len()).sum::<usize>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{DateTime, Utc};

    use super::*;

    struct Widget;

    const COUNT: AssociateKey<i64> = AssociateKey::new("count");
    const STAMP: AssociateKey<DateTime<Utc>> = AssociateKey::new("stamp");

    // -----------------------------------------------------------------------
    // Values
    // -----------------------------------------------------------------------

    #[test]
    fn value_type_round_trip() {
        let table = SideTable::new();
        let widget = Arc::new(Widget);
        assert_eq!(table.get(&widget, &COUNT), None);

        table.set(&widget, &COUNT, 10);
        assert_eq!(table.get(&widget, &COUNT), Some(10));
        table.set(&widget, &COUNT, 20);
        assert_eq!(table.get(&widget, &COUNT), Some(20));
    }

    #[test]
    fn shared_reference_round_trip() {
        let table = SideTable::new();
        let widget = Arc::new(Widget);
        let first = Arc::new(Utc::now());
        let key: AssociateKey<Arc<DateTime<Utc>>> = AssociateKey::new("shared_stamp");

        table.set(&widget, &key, Arc::clone(&first));
        let got = table.get(&widget, &key).unwrap();
        assert!(Arc::ptr_eq(&got, &first));
    }

    #[test]
    fn clones_of_an_arc_share_values() {
        let table = SideTable::new();
        let widget = Arc::new(Widget);
        let alias = Arc::clone(&widget);
        table.set(&widget, &COUNT, 1);
        assert_eq!(table.get(&alias, &COUNT), Some(1));

        let other = Arc::new(Widget);
        assert_eq!(table.get(&other, &COUNT), None);
    }

    #[test]
    fn remove_one_and_all() {
        let table = SideTable::new();
        let widget = Arc::new(Widget);
        table.set(&widget, &COUNT, 233);
        table.set(&widget, &STAMP, Utc::now());

        assert_eq!(table.remove(&widget, &COUNT), Some(233));
        assert_eq!(table.get(&widget, &COUNT), None);
        assert!(table.get(&widget, &STAMP).is_some());

        table.set(&widget, &COUNT, 1);
        table.remove_all(&widget);
        assert_eq!(table.get(&widget, &COUNT), None);
        assert_eq!(table.get(&widget, &STAMP), None);
        assert!(table.is_empty());
    }

    #[test]
    fn runtime_keys_match_constant_keys() {
        let table = SideTable::new();
        let widget = Arc::new(Widget);
        let dynamic: AssociateKey<i64> = AssociateKey::named(String::from("count"));
        let literal: AssociateKey<i64> = "count".into();

        table.set(&widget, &COUNT, 10);
        assert_eq!(table.get(&widget, &dynamic), Some(10));
        table.set(&widget, &literal, 20);
        assert_eq!(table.get(&widget, &COUNT), Some(20));
        assert_eq!(dynamic, COUNT);
    }

    #[test]
    fn mismatched_type_reads_as_absent() {
        let table = SideTable::new();
        let widget = Arc::new(Widget);
        let as_text: AssociateKey<String> = AssociateKey::new("count");
        table.set(&widget, &COUNT, 5);

        assert_eq!(table.get(&widget, &as_text), None);
        assert_eq!(table.with(&widget, &COUNT, |v| v.copied()), Some(5));
        assert_eq!(table.remove(&widget, &as_text), None);
        assert_eq!(table.get(&widget, &COUNT), None);
    }

    // -----------------------------------------------------------------------
    // Lifetimes
    // -----------------------------------------------------------------------

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn owner_is_not_kept_alive() {
        let table = SideTable::new();
        let widget = Arc::new(Widget);
        let weak = Arc::downgrade(&widget);
        table.set(&widget, &COUNT, 1);
        drop(widget);
        assert!(weak.upgrade().is_none());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn values_of_dropped_owners_are_pruned() {
        let table = SideTable::new();
        let drops = Arc::new(AtomicUsize::new(0));
        let key: AssociateKey<DropCounter> = AssociateKey::new("counter");

        let widget = Arc::new(Widget);
        table.set(&widget, &key, DropCounter(Arc::clone(&drops)));
        drop(widget);
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        assert_eq!(table.prune(), 1);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(table.prune(), 0);
    }

    #[test]
    fn adding_an_owner_prunes_stale_ones() {
        let table = SideTable::new();
        let drops = Arc::new(AtomicUsize::new(0));
        let key: AssociateKey<DropCounter> = AssociateKey::new("counter");

        let first = Arc::new(Widget);
        table.set(&first, &key, DropCounter(Arc::clone(&drops)));
        drop(first);

        let second = Arc::new(Widget);
        table.set(&second, &COUNT, 1);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn replaced_value_is_dropped() {
        let table = SideTable::new();
        let drops = Arc::new(AtomicUsize::new(0));
        let key: AssociateKey<DropCounter> = AssociateKey::new("counter");
        let widget = Arc::new(Widget);

        table.set(&widget, &key, DropCounter(Arc::clone(&drops)));
        table.set(&widget, &key, DropCounter(Arc::clone(&drops)));
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn global_table_is_shared() {
        let widget = Arc::new(Widget);
        SideTable::global().set(&widget, &COUNT, 7);
        assert_eq!(SideTable::global().get(&widget, &COUNT), Some(7));
        SideTable::global().remove_all(&widget);
    }

    #[test]
    fn concurrent_owners() {
        use std::thread;

        let table = Arc::new(SideTable::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    let widget = Arc::new(Widget);
                    table.set(&widget, &COUNT, i);
                    let got = table.get(&widget, &COUNT);
                    (widget, got)
                })
            })
            .collect();
        let results: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().expect("thread should not panic"))
            .collect();
        for (i, (_, got)) in results.iter().enumerate() {
            assert_eq!(*got, Some(i as i64));
        }
        assert_eq!(table.len(), 8);
    }
}
