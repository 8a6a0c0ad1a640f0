//! Thread-safe mapping from event category to registered listeners.
//!
//! All mutations and snapshots take a single exclusive lock and release it
//! before returning; nothing here ever calls a listener, so a slow or hung
//! callback can never hold the registry.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::category::{CategoryArg, EventCategory};
use crate::error::Result;
use crate::listener::{Listener, ListenerId};

/// A listener selected for one dispatch, with the categories it matched under.
#[derive(Debug, Clone)]
pub struct ResolvedListener {
    pub listener: Listener,
    /// Registry categories the listener was found under; at most the concrete
    /// category and the wildcard.
    pub categories: Vec<EventCategory>,
}

/// Registry of listeners keyed by category.
///
/// Each category holds a set of listeners, so registering the same handle
/// twice stores it once. A category whose set becomes empty is removed
/// immediately; the registry never holds empty entries.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    listeners: Mutex<HashMap<EventCategory, HashSet<Listener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` under `category`.
    ///
    /// Returns `true` if the listener was newly inserted, `false` if it was
    /// already registered there.
    ///
    /// # Errors
    ///
    /// [`EventsError::InvalidCategory`](crate::EventsError::InvalidCategory) or
    /// [`EventsError::InvalidArgumentType`](crate::EventsError::InvalidArgumentType)
    /// if `category` does not name a known category.
    pub fn add(&self, listener: Listener, category: impl Into<CategoryArg>) -> Result<bool> {
        let category = category.into().resolve()?;

        let inserted = self
            .listeners
            .lock()
            .entry(category)
            .or_default()
            .insert(listener.clone());

        tracing::debug!(%category, listener = %listener, inserted, "Listener registered");
        Ok(inserted)
    }

    /// Remove `listener` from `category`.
    ///
    /// Removing a listener that is not registered is not an error. Returns
    /// `true` if something was removed.
    ///
    /// # Errors
    ///
    /// Same validation errors as [`ListenerRegistry::add`].
    pub fn remove(&self, listener: &Listener, category: impl Into<CategoryArg>) -> Result<bool> {
        let category = category.into().resolve()?;

        let mut listeners = self.listeners.lock();
        let Some(set) = listeners.get_mut(&category) else {
            tracing::info!(%category, "Event category has no listeners, nothing to remove");
            return Ok(false);
        };

        let removed = set.remove(listener);
        if set.is_empty() {
            listeners.remove(&category);
        }
        drop(listeners);

        tracing::debug!(%category, listener = %listener, removed, "Listener unregistered");
        Ok(removed)
    }

    /// Snapshot of the listeners that should receive a notification of
    /// `category`: those registered under it plus those under the wildcard.
    ///
    /// A listener registered under both appears once, carrying both
    /// categories. `None` (an uncategorized notification) resolves to the
    /// wildcard listeners only.
    pub fn resolve(&self, category: Option<EventCategory>) -> Vec<ResolvedListener> {
        let concrete = category.filter(|c| !c.is_wildcard());

        let (concrete_members, wildcard_members) = {
            let listeners = self.listeners.lock();
            let members = |c: EventCategory| -> Vec<Listener> {
                listeners
                    .get(&c)
                    .map(|set| set.iter().cloned().collect())
                    .unwrap_or_default()
            };
            (
                concrete.map(|c| members(c)).unwrap_or_default(),
                members(EventCategory::All),
            )
        };

        let capacity = concrete_members.len() + wildcard_members.len();
        let mut resolved: Vec<ResolvedListener> = Vec::with_capacity(capacity);
        let mut positions: HashMap<ListenerId, usize> = HashMap::with_capacity(capacity);

        let groups = concrete
            .map(|c| (c, concrete_members))
            .into_iter()
            .chain(Some((EventCategory::All, wildcard_members)));

        for (lookup, members) in groups {
            for listener in members {
                match positions.entry(listener.id()) {
                    Entry::Occupied(slot) => resolved[*slot.get()].categories.push(lookup),
                    Entry::Vacant(slot) => {
                        slot.insert(resolved.len());
                        resolved.push(ResolvedListener {
                            listener,
                            categories: vec![lookup],
                        });
                    }
                }
            }
        }

        resolved
    }

    /// Whether `listener` is registered under `category`.
    pub fn contains(&self, listener: &Listener, category: EventCategory) -> bool {
        self.listeners
            .lock()
            .get(&category)
            .map_or(false, |set| set.contains(listener))
    }

    /// True iff no category has any listener.
    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    /// Total number of (category, listener) registrations.
    pub fn len(&self) -> usize {
        self.listeners.lock().values().map(HashSet::len).sum()
    }

    /// Listener count per category, in category order.
    pub fn categories(&self) -> Vec<(EventCategory, usize)> {
        let mut counts: Vec<_> = self
            .listeners
            .lock()
            .iter()
            .map(|(category, set)| (*category, set.len()))
            .collect();
        counts.sort();
        counts
    }

    /// Drop every registration, returning how many there were.
    pub fn clear(&self) -> usize {
        let drained = std::mem::take(&mut *self.listeners.lock());
        drained.values().map(HashSet::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EventsError;
    use proptest::prelude::*;

    fn listener() -> Listener {
        Listener::from_fn(|_| {})
    }

    fn ids(resolved: &[ResolvedListener]) -> Vec<u64> {
        let mut ids: Vec<u64> = resolved.iter().map(|r| r.listener.id().as_u64()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_new_registry_is_empty() {
        let registry = ListenerRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.categories().is_empty());
        assert!(registry.resolve(None).is_empty());
    }

    #[test]
    fn test_add_then_resolve() {
        let registry = ListenerRegistry::new();
        let a = listener();

        assert!(registry.add(a.clone(), "track_changed").unwrap());

        assert!(registry.contains(&a, EventCategory::TrackChanged));
        assert!(!registry.contains(&a, EventCategory::All));
        let resolved = registry.resolve(Some(EventCategory::TrackChanged));
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].listener, a);
        assert_eq!(resolved[0].categories, vec![EventCategory::TrackChanged]);
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_add_is_idempotent() {
        let registry = ListenerRegistry::new();
        let a = listener();

        assert!(registry.add(a.clone(), "ALL").unwrap());
        assert!(!registry.add(a.clone(), "all").unwrap());
        assert!(!registry.add(a.clone(), EventCategory::All).unwrap());

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.categories(), vec![(EventCategory::All, 1)]);
    }

    #[test]
    fn test_add_rejects_invalid_category() {
        let registry = ListenerRegistry::new();

        let result = registry.add(listener(), "volume");
        assert!(matches!(result, Err(EventsError::InvalidCategory { .. })));

        let result = registry.add(listener(), serde_json::json!(7));
        assert!(matches!(result, Err(EventsError::InvalidArgumentType { .. })));

        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_deletes_empty_category() {
        let registry = ListenerRegistry::new();
        let a = listener();
        let b = listener();
        registry.add(a.clone(), "ALL").unwrap();
        registry.add(b.clone(), "ALL").unwrap();
        registry.add(a.clone(), "TRACK_CHANGED").unwrap();

        assert!(registry.remove(&a, "TRACK_CHANGED").unwrap());
        assert_eq!(registry.categories(), vec![(EventCategory::All, 2)]);

        assert!(registry.remove(&a, "all").unwrap());
        assert!(registry.remove(&b, "all").unwrap());
        assert!(registry.is_empty());
        assert!(registry.categories().is_empty());
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let registry = ListenerRegistry::new();
        let a = listener();
        let b = listener();

        // Category with no entry at all
        assert!(!registry.remove(&a, "ALL").unwrap());

        // Category present, listener not in it
        registry.add(b.clone(), "ALL").unwrap();
        assert!(!registry.remove(&a, "ALL").unwrap());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_rejects_invalid_category() {
        let registry = ListenerRegistry::new();
        let a = listener();
        registry.add(a.clone(), "ALL").unwrap();

        assert!(matches!(
            registry.remove(&a, "everything"),
            Err(EventsError::InvalidCategory { .. })
        ));
        assert!(registry.contains(&a, EventCategory::All));
    }

    #[test]
    fn test_resolve_unions_concrete_and_wildcard() {
        let registry = ListenerRegistry::new();
        let a = listener();
        let b = listener();
        registry.add(a.clone(), "ALL").unwrap();
        registry.add(b.clone(), "TRACK_CHANGED").unwrap();

        assert_eq!(ids(&registry.resolve(None)), vec![a.id().as_u64()]);
        assert_eq!(
            ids(&registry.resolve(Some(EventCategory::All))),
            vec![a.id().as_u64()]
        );

        let mut both = vec![a.id().as_u64(), b.id().as_u64()];
        both.sort();
        assert_eq!(ids(&registry.resolve(Some(EventCategory::TrackChanged))), both);
    }

    #[test]
    fn test_resolve_merges_listener_registered_twice() {
        let registry = ListenerRegistry::new();
        let a = listener();
        registry.add(a.clone(), "ALL").unwrap();
        registry.add(a.clone(), "TRACK_CHANGED").unwrap();

        let resolved = registry.resolve(Some(EventCategory::TrackChanged));
        assert_eq!(resolved.len(), 1);
        assert_eq!(
            resolved[0].categories,
            vec![EventCategory::TrackChanged, EventCategory::All]
        );
    }

    #[test]
    fn test_resolve_merges_large_overlapping_sets() {
        let registry = ListenerRegistry::new();
        let shared: Vec<Listener> = (0..5_000).map(|_| listener()).collect();
        for l in &shared {
            registry.add(l.clone(), "ALL").unwrap();
            registry.add(l.clone(), "TRACK_CHANGED").unwrap();
        }
        for _ in 0..5_000 {
            registry.add(listener(), "ALL").unwrap();
        }

        let resolved = registry.resolve(Some(EventCategory::TrackChanged));

        assert_eq!(resolved.len(), 10_000);
        let merged = resolved.iter().filter(|r| r.categories.len() == 2).count();
        assert_eq!(merged, 5_000);
        assert!(resolved
            .iter()
            .filter(|r| r.categories.len() == 2)
            .all(|r| r.categories == vec![EventCategory::TrackChanged, EventCategory::All]));
    }

    #[test]
    fn test_resolve_is_a_snapshot() {
        let registry = ListenerRegistry::new();
        let a = listener();
        registry.add(a.clone(), "ALL").unwrap();

        let snapshot = registry.resolve(None);
        registry.remove(&a, "ALL").unwrap();
        registry.add(listener(), "ALL").unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].listener, a);
    }

    #[test]
    fn test_clear_returns_count() {
        let registry = ListenerRegistry::new();
        registry.add(listener(), "ALL").unwrap();
        registry.add(listener(), "ALL").unwrap();
        registry.add(listener(), "TRACK_CHANGED").unwrap();

        assert_eq!(registry.clear(), 3);
        assert!(registry.is_empty());
        assert_eq!(registry.clear(), 0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(usize, EventCategory),
        Remove(usize, EventCategory),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        let category = prop_oneof![Just(EventCategory::All), Just(EventCategory::TrackChanged)];
        (any::<bool>(), 0..4usize, category).prop_map(|(add, idx, category)| {
            if add {
                Op::Add(idx, category)
            } else {
                Op::Remove(idx, category)
            }
        })
    }

    proptest! {
        #[test]
        fn prop_registry_matches_set_model(ops in proptest::collection::vec(op_strategy(), 0..40)) {
            let registry = ListenerRegistry::new();
            let pool: Vec<Listener> = (0..4).map(|_| listener()).collect();
            let mut model: HashSet<(usize, EventCategory)> = HashSet::new();

            for op in ops {
                match op {
                    Op::Add(idx, category) => {
                        let inserted = registry.add(pool[idx].clone(), category).unwrap();
                        prop_assert_eq!(inserted, model.insert((idx, category)));
                    }
                    Op::Remove(idx, category) => {
                        let removed = registry.remove(&pool[idx], category).unwrap();
                        prop_assert_eq!(removed, model.remove(&(idx, category)));
                    }
                }

                prop_assert_eq!(registry.is_empty(), model.is_empty());
                prop_assert_eq!(registry.len(), model.len());
                for (category, count) in registry.categories() {
                    prop_assert!(count > 0);
                    prop_assert_eq!(count, model.iter().filter(|(_, c)| *c == category).count());
                }
                for (idx, member) in pool.iter().enumerate() {
                    for category in EventCategory::VALID {
                        prop_assert_eq!(
                            registry.contains(member, category),
                            model.contains(&(idx, category))
                        );
                    }
                }
            }
        }
    }
}
