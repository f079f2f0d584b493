//! Persistent cross-camera identity bookkeeping.
//!
//! The registry maps every `(view, track_id)` key it has seen to a global
//! identity. Global ids are allocated from one monotonically increasing
//! counter and are never reused or reassigned to a different object.
//!
//! The registry is single-writer: it is owned by whoever drives the pipeline
//! and mutated through `&mut self`. Share it behind a lock if several threads
//! need to register or look up keys.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::detection::IdentityKey;

/// Global identity shared by both views.
pub type GlobalId = u64;

/// The first global id handed out by a fresh registry.
pub const FIRST_GLOBAL_ID: GlobalId = 1000;

/// How `register` resolves a pair whose keys already hold different ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Keep both existing assignments; the first key's id is returned.
    #[default]
    KeepFirst,

    /// Move every key of the higher id onto the lower id.
    MergeLowest,
}

/// Maps `(view, track_id)` keys to global identities.
#[derive(Debug, Clone)]
pub struct IdentityRegistry {
    forward: HashMap<IdentityKey, GlobalId>,
    reverse: BTreeMap<GlobalId, BTreeSet<IdentityKey>>,
    next_id: GlobalId,
    policy: ConflictPolicy,
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::with_policy(ConflictPolicy::default())
    }

    pub fn with_policy(policy: ConflictPolicy) -> Self {
        Self {
            forward: HashMap::new(),
            reverse: BTreeMap::new(),
            next_id: FIRST_GLOBAL_ID,
            policy,
        }
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Record that `a` and `b` are the same physical object.
    ///
    /// - neither key known: both get a fresh id
    /// - one key known: the other key inherits its id
    /// - both known with the same id: nothing changes
    /// - both known with different ids: resolved by the [`ConflictPolicy`]
    ///
    /// Returns the global id now held by `a`. Calling it again with the same
    /// pair is a no-op returning the same id.
    pub fn register(&mut self, a: IdentityKey, b: IdentityKey) -> GlobalId {
        match (self.get(a), self.get(b)) {
            (None, None) => {
                let id = self.allocate();
                self.assign(a, id);
                self.assign(b, id);
                info!(global_id = id, first = %a, second = %b, "new global identity");
                id
            }
            (Some(id), None) => {
                self.assign(b, id);
                debug!(global_id = id, key = %b, "key joined existing identity");
                id
            }
            (None, Some(id)) => {
                self.assign(a, id);
                debug!(global_id = id, key = %a, "key joined existing identity");
                id
            }
            (Some(ia), Some(ib)) if ia == ib => ia,
            (Some(ia), Some(ib)) => match self.policy {
                ConflictPolicy::KeepFirst => {
                    warn!(
                        first = %a,
                        first_id = ia,
                        second = %b,
                        second_id = ib,
                        "matched keys hold different identities, keeping both"
                    );
                    ia
                }
                ConflictPolicy::MergeLowest => {
                    let (keep, drop) = (ia.min(ib), ia.max(ib));
                    self.merge(drop, keep);
                    warn!(kept = keep, merged = drop, "merged conflicting identities");
                    keep
                }
            },
        }
    }

    /// Global id of `key`, allocating a fresh one on first sight.
    ///
    /// Fresh ids come from the same counter as `register`, so ids are never
    /// shared between unrelated keys.
    pub fn lookup(&mut self, key: IdentityKey) -> GlobalId {
        if let Some(id) = self.get(key) {
            return id;
        }
        let id = self.allocate();
        self.assign(key, id);
        info!(global_id = id, key = %key, "new global identity");
        id
    }

    /// Global id of `key` without allocating.
    pub fn get(&self, key: IdentityKey) -> Option<GlobalId> {
        self.forward.get(&key).copied()
    }

    /// All keys currently mapped to `id`, in key order.
    pub fn members(&self, id: GlobalId) -> Vec<IdentityKey> {
        self.reverse
            .get(&id)
            .map(|keys| keys.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of known keys.
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Number of distinct global ids currently in use.
    pub fn identity_count(&self) -> usize {
        self.reverse.len()
    }

    /// Every `(key, id)` mapping, ordered by key.
    pub fn entries(&self) -> Vec<(IdentityKey, GlobalId)> {
        let mut out: Vec<_> = self.forward.iter().map(|(&k, &id)| (k, id)).collect();
        out.sort();
        out
    }

    fn allocate(&mut self) -> GlobalId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn assign(&mut self, key: IdentityKey, id: GlobalId) {
        if let Some(old) = self.forward.insert(key, id) {
            self.detach(key, old);
        }
        self.reverse.entry(id).or_default().insert(key);
    }

    fn detach(&mut self, key: IdentityKey, id: GlobalId) {
        if let Some(keys) = self.reverse.get_mut(&id) {
            keys.remove(&key);
            if keys.is_empty() {
                self.reverse.remove(&id);
            }
        }
    }

    fn merge(&mut self, from: GlobalId, into: GlobalId) {
        let keys = self.reverse.remove(&from).unwrap_or_default();
        for key in keys {
            self.forward.insert(key, into);
            self.reverse.entry(into).or_default().insert(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::View;

    fn k1(id: u32) -> IdentityKey {
        IdentityKey::new(View::First, id)
    }

    fn k2(id: u32) -> IdentityKey {
        IdentityKey::new(View::Second, id)
    }

    #[test]
    fn test_register_new_pair() {
        let mut reg = IdentityRegistry::new();
        let g = reg.register(k1(1), k2(7));
        assert_eq!(g, FIRST_GLOBAL_ID);
        assert_eq!(reg.get(k1(1)), Some(g));
        assert_eq!(reg.get(k2(7)), Some(g));
        assert_eq!(reg.members(g), vec![k1(1), k2(7)]);
    }

    #[test]
    fn test_register_idempotent() {
        let mut reg = IdentityRegistry::new();
        let g = reg.register(k1(1), k2(7));
        assert_eq!(reg.register(k1(1), k2(7)), g);
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.identity_count(), 1);
    }

    #[test]
    fn test_register_propagates_existing_id() {
        let mut reg = IdentityRegistry::new();
        let g = reg.register(k1(1), k2(7));

        // Track 7 was lost and reappeared as 8 in the second view
        assert_eq!(reg.register(k1(1), k2(8)), g);
        assert_eq!(reg.lookup(k2(8)), g);

        // Reverse direction
        assert_eq!(reg.register(k1(3), k2(8)), g);
        assert_eq!(reg.members(g), vec![k1(1), k1(3), k2(7), k2(8)]);
    }

    #[test]
    fn test_lookup_allocates_fresh_ids() {
        let mut reg = IdentityRegistry::new();
        let a = reg.lookup(k1(1));
        let b = reg.lookup(k2(1));
        assert_ne!(a, b);
        assert_eq!(reg.lookup(k1(1)), a);

        // Registration never reuses a lookup-allocated id
        let g = reg.register(k1(5), k2(5));
        assert!(g != a && g != b);
    }

    #[test]
    fn test_ids_monotonic() {
        let mut reg = IdentityRegistry::new();
        let ids: Vec<_> = (0..5).map(|i| reg.register(k1(i), k2(i))).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_conflict_keep_first() {
        let mut reg = IdentityRegistry::new();
        let ga = reg.register(k1(1), k2(1));
        let gb = reg.register(k1(2), k2(2));

        assert_eq!(reg.register(k1(1), k2(2)), ga);
        assert_eq!(reg.get(k2(2)), Some(gb));
        assert_eq!(reg.identity_count(), 2);
    }

    #[test]
    fn test_conflict_merge_lowest() {
        let mut reg = IdentityRegistry::with_policy(ConflictPolicy::MergeLowest);
        let ga = reg.register(k1(1), k2(1));
        let gb = reg.register(k1(2), k2(2));
        assert!(ga < gb);

        assert_eq!(reg.register(k1(2), k2(1)), ga);
        for key in [k1(1), k2(1), k1(2), k2(2)] {
            assert_eq!(reg.get(key), Some(ga));
        }
        assert!(reg.members(gb).is_empty());
        assert_eq!(reg.identity_count(), 1);

        // The merged id is never handed out again
        assert!(reg.lookup(k1(9)) > gb);
    }

    #[test]
    fn test_entries_sorted() {
        let mut reg = IdentityRegistry::new();
        reg.register(k1(2), k2(1));
        reg.lookup(k1(1));
        let keys: Vec<_> = reg.entries().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![k1(1), k1(2), k2(1)]);
    }
}
