//! Dependency Store
//!
//! A two-level side table: observed object -> property key -> set of
//! subscribed effects. The store holds no logic beyond lookup and insertion;
//! the runtime decides when edges are added and removed.
//!
//! # Ownership
//!
//! Objects are keyed by [`TargetId`], so an entry never keeps its observed
//! object alive. When the object is dropped it disposes its own entry.
//!
//! Each dependency set is owned by the store behind an `Rc`. Effects keep a
//! `Weak` back-reference to every set they joined, which lets cleanup remove
//! an effect from exactly the sets it is in without scanning the store.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::effect::EffectRunner;
use super::key::{EffectId, PropertyKey, TargetId};

/// The effects subscribed to one `(object, key)` pair, in subscription order.
#[derive(Default)]
pub(crate) struct DepSet {
    effects: RefCell<IndexMap<EffectId, EffectRunner>>,
}

impl DepSet {
    /// Add an effect. Returns `false` if it was already subscribed.
    pub(crate) fn insert(&self, runner: &EffectRunner) -> bool {
        let mut effects = self.effects.borrow_mut();
        if effects.contains_key(&runner.id()) {
            return false;
        }
        effects.insert(runner.id(), runner.clone());
        true
    }

    /// Remove an effect, handing it back so the caller drops it outside the borrow.
    pub(crate) fn remove(&self, id: EffectId) -> Option<EffectRunner> {
        self.effects.borrow_mut().shift_remove(&id)
    }

    /// Copy the subscribers, leaving out `exclude`.
    ///
    /// Running an effect unsubscribes and resubscribes it in this very set, so
    /// notification always iterates a copy.
    pub(crate) fn snapshot(&self, exclude: Option<EffectId>) -> SmallVec<[EffectRunner; 4]> {
        self.effects
            .borrow()
            .iter()
            .filter(|(id, _)| Some(**id) != exclude)
            .map(|(_, runner)| runner.clone())
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: EffectId) -> bool {
        self.effects.borrow().contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.effects.borrow().len()
    }
}

/// Dependency sets of one observed object, keyed by property.
pub(crate) type KeyMap = IndexMap<PropertyKey, Rc<DepSet>>;

/// Mapping from observed object to its per-key dependency sets.
#[derive(Default)]
pub(crate) struct DepStore {
    targets: HashMap<TargetId, KeyMap>,
}

impl DepStore {
    /// Get the dependency set for `(target, key)`, creating it if needed.
    pub(crate) fn dep_set(&mut self, target: TargetId, key: &PropertyKey) -> Rc<DepSet> {
        let keys = self.targets.entry(target).or_default();
        if let Some(set) = keys.get(key) {
            return Rc::clone(set);
        }
        let set = Rc::new(DepSet::default());
        keys.insert(key.clone(), Rc::clone(&set));
        set
    }

    /// Look up the dependency set for `(target, key)` without creating it.
    pub(crate) fn get(&self, target: TargetId, key: &PropertyKey) -> Option<Rc<DepSet>> {
        self.targets.get(&target)?.get(key).cloned()
    }

    /// Remove every entry for `target`.
    ///
    /// The removed sets are returned rather than dropped here: dropping them
    /// may release the last handle to an effect whose closure owns another
    /// observable, and that observable disposes itself through this store.
    #[must_use = "drop the removed entries after releasing the store borrow"]
    pub(crate) fn dispose(&mut self, target: TargetId) -> Option<KeyMap> {
        self.targets.remove(&target)
    }

    #[cfg(test)]
    pub(crate) fn contains_target(&self, target: TargetId) -> bool {
        self.targets.contains_key(&target)
    }

    pub(crate) fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Number of effects subscribed to `(target, key)`.
    pub(crate) fn subscriber_count(&self, target: TargetId, key: &PropertyKey) -> usize {
        self.get(target, key).map_or(0, |set| set.len())
    }
}
