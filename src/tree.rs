//! Concurrent hierarchical key-value store.
//!
//! A [`Tree`] maps variable-length key paths to values. Every node guards its
//! value slot and its child map with two independent locks, so readers and
//! writers on disjoint subtrees never contend, and value reads never block on
//! sibling-branch mutation. Locks are held for one node at a time - no
//! operation takes locks on two nodes simultaneously.
//!
//! # Handles and identity
//!
//! `Tree` is a cheap clonable handle onto a shared node; cloning the handle
//! does not copy the tree. Node identity (used by the self-graft check and by
//! the creation-race guarantee) is the identity of the shared allocation -
//! see [`Tree::same_node`].
//!
//! # Lazy creation
//!
//! [`Tree::set`] and [`Tree::touch`] create missing interior nodes on the
//! way down. Creation uses a shared-lock probe first and only upgrades to
//! the exclusive lock on a miss, re-checking the map after the upgrade:
//! under a creation race for the same key, exactly one new node survives and
//! every racing caller ends up holding it.

use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

struct Node<K, V> {
    /// Value slot, guarded separately from the child map.
    slot: RwLock<Option<Arc<V>>>,
    /// Child map; exclusive lock only for insert/remove.
    branches: RwLock<HashMap<K, Tree<K, V>>>,
}

impl<K, V> Node<K, V> {
    fn empty() -> Self {
        Self {
            slot: RwLock::new(None),
            branches: RwLock::new(HashMap::new()),
        }
    }
}

/// A handle to a node in a concurrent hierarchical store.
///
/// All operations take `&self` and are safe to call from any number of
/// threads or tasks. See the module docs for the locking discipline.
pub struct Tree<K, V> {
    node: Arc<Node<K, V>>,
}

impl<K, V> Clone for Tree<K, V> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

impl<K, V> Default for Tree<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Tree<K, V> {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self {
            node: Arc::new(Node::empty()),
        }
    }

    /// Whether two handles point at the same node.
    pub fn same_node(&self, other: &Tree<K, V>) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }

    /// The value stored at this node, if any.
    pub fn value(&self) -> Option<Arc<V>> {
        self.node.slot.read().clone()
    }

    /// Store a value at this node, replacing any previous one.
    pub fn set_value(&self, value: V) {
        *self.node.slot.write() = Some(Arc::new(value));
    }

    /// Get the value at this node, initializing the slot exactly once.
    ///
    /// Same double-checked pattern as child creation: shared-lock probe,
    /// then upgrade and re-check. Racing initializers all receive the one
    /// value that won.
    pub fn value_or_insert_with(&self, init: impl FnOnce() -> V) -> Arc<V> {
        if let Some(existing) = self.node.slot.read().clone() {
            return existing;
        }
        let mut slot = self.node.slot.write();
        slot.get_or_insert_with(|| Arc::new(init())).clone()
    }
}

impl<K, V> Tree<K, V>
where
    K: Clone + Eq + Hash,
{
    /// Return the child at `key`, creating it if necessary.
    ///
    /// The probe runs under the shared lock; on a miss the exclusive lock is
    /// taken and the map re-checked, because another caller may have created
    /// the child during the upgrade window. Only one created node survives a
    /// race - later racers discard theirs and adopt the winner.
    fn touch_one(&self, key: &K) -> Tree<K, V> {
        if let Some(child) = self.node.branches.read().get(key) {
            return child.clone();
        }

        let mut branches = self.node.branches.write();
        match branches.entry(key.clone()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => entry.insert(Tree::new()).clone(),
        }
    }

    /// Return the subtree at `path`, creating any missing nodes on the way.
    pub fn touch(&self, path: &[K]) -> Tree<K, V> {
        let mut current = self.clone();
        for key in path {
            current = current.touch_one(key);
        }
        current
    }

    /// Assign the value at `path`.
    ///
    /// Always succeeds, creating interior nodes as needed. An empty path
    /// assigns this node's own slot.
    pub fn set(&self, value: V, path: &[K]) {
        self.touch(path).set_value(value);
    }

    /// The value at `path`, or `None` if the path was never written.
    pub fn get(&self, path: &[K]) -> Option<Arc<V>> {
        self.branch(path)?.value()
    }

    /// The subtree at `path`, or `None` if it does not exist.
    ///
    /// Never creates nodes; navigation takes only shared locks.
    pub fn branch(&self, path: &[K]) -> Option<Tree<K, V>> {
        let mut current = self.clone();
        for key in path {
            let next = current.node.branches.read().get(key).cloned()?;
            current = next;
        }
        Some(current)
    }

    /// Detach and return the subtree at `path`.
    ///
    /// The detached subtree keeps its values and descendants and keeps
    /// working as an independent tree. An empty path returns this node
    /// itself without detaching anything (the root cannot leave itself);
    /// a missing path returns `None` and changes nothing.
    pub fn prune(&self, path: &[K]) -> Option<Tree<K, V>> {
        match path {
            [] => Some(self.clone()),
            [last] => self.node.branches.write().remove(last),
            [first, rest @ ..] => {
                let next = self.node.branches.read().get(first).cloned()?;
                next.prune(rest)
            }
        }
    }

    /// Merge `donor` into this tree at `path`.
    ///
    /// The donor wins wherever the two collide: its value slot replaces the
    /// destination's (even an empty donor slot clears the destination), and
    /// its branches are linked in wholesale where the destination lacks the
    /// key, or merged recursively where it doesn't. Linking transfers the
    /// node handle - no copying. Grafting a node onto itself is a no-op.
    ///
    /// Donor children are snapshotted once at the start of each level, so a
    /// concurrent mutation of the donor yields a point-in-time merge. No two
    /// node locks are ever held at once, so concurrent grafts - including
    /// opposite-direction grafts between the same two trees - cannot
    /// deadlock.
    pub fn graft(&self, donor: &Tree<K, V>, path: &[K]) {
        let dest = self.touch(path);
        if dest.same_node(donor) {
            return;
        }

        *dest.node.slot.write() = donor.node.slot.read().clone();

        let children: Vec<(K, Tree<K, V>)> = donor
            .node
            .branches
            .read()
            .iter()
            .map(|(key, child)| (key.clone(), child.clone()))
            .collect();

        for (key, child) in children {
            let existing = {
                let mut branches = dest.node.branches.write();
                match branches.entry(key) {
                    Entry::Vacant(entry) => {
                        entry.insert(child.clone());
                        None
                    }
                    Entry::Occupied(entry) => Some(entry.get().clone()),
                }
            };
            if let Some(existing) = existing {
                existing.graft(&child, &[]);
            }
        }
    }

    /// Visit every immediate child. Does not recurse.
    ///
    /// The child map is read-locked for the duration: the callback may
    /// freely mutate the children it is handed, but structural changes to
    /// this node (insert/remove of children) block until the visit ends.
    pub fn for_each(&self, mut visit: impl FnMut(&K, &Tree<K, V>)) {
        let branches = self.node.branches.read();
        for (key, child) in branches.iter() {
            visit(key, child);
        }
    }

    /// Number of immediate children.
    pub fn child_count(&self) -> usize {
        self.node.branches.read().len()
    }
}
