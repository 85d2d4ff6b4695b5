//! A fully persistent ordered map.
//!
//! [`PersistentMap`] is an unbalanced binary search tree whose nodes carry
//! bounded modification logs, so every mutation costs amortized O(1)
//! additional space instead of a full copy. Each mutating call branches a
//! fresh version in the map's shared version tree; earlier versions remain
//! navigable through [`Persistent::with_version`] and
//! [`Persistent::set_version`], and mutable in their own right (mutating an
//! old version branches a divergent timeline).

mod node;

use std::cmp::Ordering;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::pretty;
use crate::structure::{
    notify_changed, ChangeCause, ChangeScope, Notifiable, ParentLink, Persistent, PersistentValue,
    StructureCore, VersionedStructure,
};
use crate::version::context::VersionContext;
use crate::version::tree::VersionTree;
use crate::version::Version;

pub(crate) use node::{TreeCtx, TreeNode, TreeNodeRef, TreePayload};

/// A key-value pair read out of a [`PersistentMap`].
///
/// Both fields are by-value snapshots; a persistent `value` arrives wired to
/// the map it was read from, so mutating it produces a fresh map version.
pub struct Entry<K, V> {
    pub key: K,
    pub value: V,
}

/// A fully persistent ordered map backed by an unbalanced binary search tree
/// of fat nodes.
///
/// ## Examples
///
/// ```rust
/// use verso::{Persistent, PersistentMap};
///
/// let mut map = PersistentMap::new();
/// map.insert(2, "two");
/// let before = map.version();
/// map.insert(1, "one");
///
/// assert_eq!(map.len(), 2);
/// assert_eq!(map.get(&1), Some("one"));
///
/// // Keys come out in ascending order.
/// let keys: Vec<i32> = map.iter().map(|e| e.key).collect();
/// assert_eq!(keys, vec![1, 2]);
///
/// // The earlier version is still fully navigable.
/// let old = map.with_version(before);
/// assert_eq!(old.len(), 1);
/// assert_eq!(old.get(&1), None);
/// ```
///
/// Storing a persistent container as a value nests histories: mutating an
/// inner value read out of the map surfaces as a new version of the map.
///
/// ```rust
/// use verso::{Persistent, PersistentMap};
///
/// let mut outer: PersistentMap<i32, PersistentMap<i32, i32>> = PersistentMap::new();
/// outer.insert(0, PersistentMap::new());
/// let v0 = outer.version();
///
/// let mut inner = outer.find(&0).unwrap().value;
/// inner.insert(7, 7);
///
/// assert_eq!(outer.find(&0).unwrap().value.len(), 1);
/// assert_eq!(outer.with_version(v0).find(&0).unwrap().value.len(), 0);
/// ```
pub struct PersistentMap<K, V: PersistentValue> {
    shared: Rc<MapShared<K, V>>,
}

struct MapShared<K, V: PersistentValue> {
    vtree: Rc<VersionTree<TreePayload<K, V>>>,
    core: StructureCore<PersistentMap<K, V>>,
}

impl<K, V> PersistentMap<K, V>
where
    K: Ord + Clone + 'static,
    V: PersistentValue,
{
    /// Create an empty map with a fresh version tree.
    pub fn new() -> Self {
        let vtree = Rc::new(VersionTree::new(None));
        let root = vtree.root_version();
        Self {
            shared: Rc::new(MapShared {
                vtree,
                core: StructureCore::new(root),
            }),
        }
    }

    fn from_shared(shared: Rc<MapShared<K, V>>) -> Self {
        Self { shared }
    }

    fn ctx(&self) -> TreeCtx<K, V> {
        let shared_dyn: Rc<dyn VersionedStructure> = self.shared.clone();
        let structure: Weak<dyn VersionedStructure> = Rc::downgrade(&shared_dyn);
        VersionContext::new(structure, self.version(), self.shared.vtree.clone())
    }

    fn root(&self) -> TreePayload<K, V> {
        self.shared.vtree.get_value(&self.version())
    }

    /// Branch a child of the current version carrying the current root, and
    /// adopt it. Every mutating operation calls this exactly once.
    fn branch_version(&self) -> Version {
        let current = self.version();
        let root = self.shared.vtree.get_value(&current);
        let next = self.shared.vtree.insert(&current, root);
        *self.shared.core.current.borrow_mut() = next.clone();
        next
    }

    /// Walk to the node holding `key`, or to the node that would become its
    /// parent on insertion.
    fn descend(root: &TreeNodeRef<K, V>, key: &K, v: &Version) -> TreeNodeRef<K, V> {
        let mut current = TreeNode::resolve(root, v);
        loop {
            let child = match key.cmp(&current.key) {
                Ordering::Equal => return current,
                Ordering::Less => TreeNode::get_left(&current, v),
                Ordering::Greater => TreeNode::get_right(&current, v),
            };
            match child {
                Some(c) => current = c,
                None => return current,
            }
        }
    }

    fn find_exact(&self, key: &K) -> Option<TreeNodeRef<K, V>> {
        let root = self.root()?;
        let slot = Self::descend(&root, key, &self.version());
        (slot.key == *key).then_some(slot)
    }

    /// Look up `key`, returning its entry with parent hooks installed on the
    /// value.
    pub fn find(&self, key: &K) -> Option<Entry<K, V>> {
        let node = self.find_exact(key)?;
        Some(Entry {
            key: node.key.clone(),
            value: TreeNode::get_value(&node, &self.ctx()),
        })
    }

    /// Look up the value stored under `key`.
    pub fn get(&self, key: &K) -> Option<V> {
        self.find(key).map(|entry| entry.value)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.find_exact(key).is_some()
    }

    /// Insert or overwrite. Inserting a key already present with an equal
    /// value is a no-op and produces no new version; every other call
    /// branches exactly one new version.
    pub fn insert(&mut self, key: K, value: V) {
        let _scope = ChangeScope::new(self, ChangeCause::Mutation);
        let v0 = self.version();

        let Some(root) = self.root() else {
            let version = self.branch_version();
            let node = TreeNode::new(key, value, Weak::new());
            self.shared.vtree.update(&version, Some(node));
            return;
        };

        let slot = Self::descend(&root, &key, &v0);
        if slot.key == key {
            if TreeNode::read_value(&slot, &v0) == value {
                return;
            }
            self.branch_version();
            TreeNode::set_value(&slot, value, &self.ctx());
            return;
        }

        self.branch_version();
        let vc = self.ctx();
        let child = TreeNode::new(key, value, Rc::downgrade(&slot));
        match child.key.cmp(&slot.key) {
            Ordering::Less => TreeNode::set_left(&slot, Some(child), &vc),
            Ordering::Greater => TreeNode::set_right(&slot, Some(child), &vc),
            Ordering::Equal => unreachable!("equal keys handled above"),
        }
    }

    /// Remove `key`, returning its value. Absent keys are a no-op and produce
    /// no new version.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let _scope = ChangeScope::new(self, ChangeCause::Mutation);
        let v0 = self.version();
        let node = self.find_exact(key)?;
        let removed = TreeNode::read_value(&node, &v0);
        self.branch_version();
        self.unlink(&node, &self.ctx());
        Some(removed)
    }

    /// Standard BST deletion: splice when at most one child is present,
    /// otherwise promote the in-order successor.
    fn unlink(&self, node: &TreeNodeRef<K, V>, vc: &TreeCtx<K, V>) {
        let v = &vc.version;
        let node = TreeNode::resolve(node, v);
        let left = TreeNode::get_left(&node, v);
        let right = TreeNode::get_right(&node, v);

        match (left, right) {
            (None, None) => self.replace_child(&node, None, vc),
            (Some(l), None) => self.replace_child(&node, Some(l), vc),
            (None, Some(r)) => self.replace_child(&node, Some(r), vc),
            (Some(_), Some(r)) => {
                let successor = TreeNode::leftmost(&r, v);
                if !Rc::ptr_eq(&successor, &TreeNode::resolve(&r, v)) {
                    // The successor sits deeper in the right subtree and has no
                    // left child; splice it out of its parent first.
                    let parent = TreeNode::get_back_pointer(&successor, v)
                        .expect("successor below the right child has a parent");
                    let tail = TreeNode::get_right(&successor, v);
                    TreeNode::set_left(&parent, tail.clone(), vc);
                    if let Some(tail) = tail {
                        let parent = TreeNode::resolve(&parent, v);
                        TreeNode::set_back_pointer(&tail, Rc::downgrade(&parent), vc);
                    }
                    let right_now = TreeNode::get_right(&node, v);
                    TreeNode::set_right(&successor, right_now.clone(), vc);
                    if let Some(right_now) = right_now {
                        let successor = TreeNode::resolve(&successor, v);
                        TreeNode::set_back_pointer(&right_now, Rc::downgrade(&successor), vc);
                    }
                }
                let left_now = TreeNode::get_left(&node, v);
                TreeNode::set_left(&successor, left_now.clone(), vc);
                if let Some(left_now) = left_now {
                    let successor = TreeNode::resolve(&successor, v);
                    TreeNode::set_back_pointer(&left_now, Rc::downgrade(&successor), vc);
                }
                self.replace_child(&node, Some(TreeNode::resolve(&successor, v)), vc);
            }
        }
    }

    /// Retarget whatever points at `old` (its parent's child slot, or the
    /// version tree's root payload) to `new`, and fix `new`'s back pointer.
    fn replace_child(&self, old: &TreeNodeRef<K, V>, new: TreePayload<K, V>, vc: &TreeCtx<K, V>) {
        let v = &vc.version;
        match TreeNode::get_back_pointer(old, v) {
            Some(parent) => {
                let old = TreeNode::resolve(old, v);
                let from_left =
                    TreeNode::get_left(&parent, v).is_some_and(|l| Rc::ptr_eq(&l, &old));
                if from_left {
                    TreeNode::set_left(&parent, new.clone(), vc);
                } else {
                    debug_assert!(
                        TreeNode::get_right(&parent, v).is_some_and(|r| Rc::ptr_eq(&r, &old)),
                        "back pointer does not lead back to the removed node"
                    );
                    TreeNode::set_right(&parent, new.clone(), vc);
                }
                if let Some(new) = new {
                    let parent = TreeNode::resolve(&parent, v);
                    TreeNode::set_back_pointer(&new, Rc::downgrade(&parent), vc);
                }
            }
            None => {
                self.shared.vtree.update(v, new.clone());
                if let Some(new) = new {
                    TreeNode::set_back_pointer(&new, Weak::new(), vc);
                }
            }
        }
    }

    /// The `map[key]` contract: return the stored value, inserting the
    /// default (one new version) when the key is absent.
    pub fn get_or_insert_default(&mut self, key: K) -> V
    where
        V: Default,
    {
        if let Some(entry) = self.find(&key) {
            return entry.value;
        }
        self.insert(key.clone(), V::default());
        self.find(&key).expect("key was just inserted").value
    }

    /// Number of entries at the current version. O(n).
    pub fn len(&self) -> usize {
        match self.root() {
            Some(root) => TreeNode::subtree_size(&root, &self.version()),
            None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.root().is_none()
    }

    /// Height of the underlying tree at the current version.
    pub fn height(&self) -> usize {
        match self.root() {
            Some(root) => TreeNode::subtree_height(&root, &self.version()),
            None => 0,
        }
    }

    /// In-order iterator over the entries at the current version. Later
    /// mutations through this handle do not disturb a running iterator; it
    /// keeps reading at the version it was created at.
    pub fn iter(&self) -> Iter<K, V> {
        Iter {
            node: self
                .root()
                .map(|root| TreeNode::leftmost(&root, &self.version())),
            vc: self.ctx(),
        }
    }

    fn adopt(&self, v: Version) {
        assert!(!v.is_empty(), "cannot adopt the empty version");
        let _scope = ChangeScope::new(self, ChangeCause::Mutation);
        *self.shared.core.current.borrow_mut() = v;
    }
}

/// In-order iterator over map entries at a fixed version.
pub struct Iter<K, V: PersistentValue> {
    vc: TreeCtx<K, V>,
    node: Option<TreeNodeRef<K, V>>,
}

impl<K, V> Iterator for Iter<K, V>
where
    K: Ord + Clone + 'static,
    V: PersistentValue,
{
    type Item = Entry<K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.node.take()?;
        let entry = Entry {
            key: node.key.clone(),
            value: TreeNode::get_value(&node, &self.vc),
        };
        self.node = TreeNode::next_node(&node, &self.vc.version);
        Some(entry)
    }
}

impl<K, V> IntoIterator for &PersistentMap<K, V>
where
    K: Ord + Clone + 'static,
    V: PersistentValue,
{
    type Item = Entry<K, V>;
    type IntoIter = Iter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K, V> Default for PersistentMap<K, V>
where
    K: Ord + Clone + 'static,
    V: PersistentValue,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V: PersistentValue> Clone for PersistentMap<K, V> {
    /// Snapshot semantics: the clone shares the version tree but owns its
    /// current version, history and parent linkage.
    fn clone(&self) -> Self {
        Self {
            shared: Rc::new(MapShared {
                vtree: self.shared.vtree.clone(),
                core: self.shared.core.snapshot(),
            }),
        }
    }
}

impl<K, V: PersistentValue> PartialEq for PersistentMap<K, V> {
    /// Handles are equal when they navigate the same history at the same
    /// version.
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.shared.vtree, &other.shared.vtree)
            && *self.shared.core.current.borrow() == *other.shared.core.current.borrow()
    }
}

impl<K, V> Persistent for PersistentMap<K, V>
where
    K: Ord + Clone + 'static,
    V: PersistentValue,
{
    fn version(&self) -> Version {
        self.shared.core.current.borrow().clone()
    }

    fn set_version(&mut self, v: Version) {
        self.adopt(v);
    }

    fn with_version(&self, v: Version) -> Self {
        assert!(!v.is_empty(), "cannot pin a handle to the empty version");
        Self {
            shared: Rc::new(MapShared {
                vtree: self.shared.vtree.clone(),
                core: StructureCore::new(v),
            }),
        }
    }

    fn undo(&mut self) {
        let current = self.version();
        let target = self.shared.core.history.borrow_mut().undo(&current);
        if let Some(v) = target {
            *self.shared.core.current.borrow_mut() = v;
            notify_changed(self, &self.shared.core, ChangeCause::Navigation);
        }
    }

    fn redo(&mut self) {
        let current = self.version();
        let target = self.shared.core.history.borrow_mut().redo(&current);
        if let Some(v) = target {
            *self.shared.core.current.borrow_mut() = v;
            notify_changed(self, &self.shared.core, ChangeCause::Navigation);
        }
    }

    fn parent_version(&self) -> Version {
        self.shared.core.parent_version.borrow().clone()
    }
}

impl<K, V> PersistentValue for PersistentMap<K, V>
where
    K: Ord + Clone + 'static,
    V: PersistentValue,
{
    fn attach_parent(&self, link: ParentLink<Self>) {
        self.shared.core.install(link);
    }
}

impl<K, V> Notifiable for PersistentMap<K, V>
where
    K: Ord + Clone + 'static,
    V: PersistentValue,
{
    fn scope_version(&self) -> Version {
        self.version()
    }

    fn fire_changed(&self, cause: ChangeCause) {
        notify_changed(self, &self.shared.core, cause);
    }
}

impl<K, V> VersionedStructure for MapShared<K, V>
where
    K: Ord + Clone + 'static,
    V: PersistentValue,
{
    fn structure_version(&self) -> Version {
        self.core.current.borrow().clone()
    }

    fn adopt_version(self: Rc<Self>, v: Version) {
        PersistentMap::from_shared(self).adopt(v);
    }
}

impl<K, V> fmt::Display for PersistentMap<K, V>
where
    K: Ord + Clone + fmt::Display + 'static,
    V: PersistentValue,
{
    /// Renders the tree shape at the current version, one node per line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.root() {
            Some(root) => {
                let mut out = String::new();
                pretty::render_tree(&root, &self.version(), &mut out, "", true);
                f.write_str(&out)
            }
            None => writeln!(f, "(empty map)"),
        }
    }
}
