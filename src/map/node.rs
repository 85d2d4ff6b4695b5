use std::cell::RefCell;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::structure::{ParentLink, PersistentValue};
use crate::version::context::VersionContext;
use crate::version::Version;

/// Mod log capacity: twice the number of mutable fields
/// (value, back pointer, left, right).
pub(crate) const TREE_MOD_CAPACITY: usize = 8;

pub(crate) type TreeNodeRef<K, V> = Rc<TreeNode<K, V>>;
pub(crate) type TreePayload<K, V> = Option<TreeNodeRef<K, V>>;
pub(crate) type TreeCtx<K, V> = VersionContext<TreePayload<K, V>>;

#[derive(Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Value,
    BackPointer,
    Left,
    Right,
}

enum TreeField<K, V: PersistentValue> {
    Value(V),
    BackPointer(Weak<TreeNode<K, V>>),
    Left(TreePayload<K, V>),
    Right(TreePayload<K, V>),
}

impl<K, V: PersistentValue> TreeField<K, V> {
    fn kind(&self) -> FieldKind {
        match self {
            TreeField::Value(_) => FieldKind::Value,
            TreeField::BackPointer(_) => FieldKind::BackPointer,
            TreeField::Left(_) => FieldKind::Left,
            TreeField::Right(_) => FieldKind::Right,
        }
    }
}

impl<K, V: PersistentValue> Clone for TreeField<K, V> {
    fn clone(&self) -> Self {
        match self {
            TreeField::Value(v) => TreeField::Value(v.clone()),
            TreeField::BackPointer(bp) => TreeField::BackPointer(bp.clone()),
            TreeField::Left(n) => TreeField::Left(n.clone()),
            TreeField::Right(n) => TreeField::Right(n.clone()),
        }
    }
}

struct TreeMod<K, V: PersistentValue> {
    version: Version,
    field: TreeField<K, V>,
}

impl<K, V: PersistentValue> Clone for TreeMod<K, V> {
    fn clone(&self) -> Self {
        Self {
            version: self.version.clone(),
            field: self.field.clone(),
        }
    }
}

/// A BST fat node: an immutable key, baseline field values fixed at creation,
/// and a bounded log of `(field, version, new value)` records. Reads pick the
/// matching record with the greatest version at or below the queried one and
/// fall back to the baseline. A full log splits the node: a successor takes
/// over for the split version and later, reachable from the old node through
/// its forwarding table.
///
/// The back pointer is a non-owning edge; owning edges run root to leaf.
pub(crate) struct TreeNode<K, V: PersistentValue> {
    pub(crate) key: K,
    value: V,
    back_pointer: Weak<TreeNode<K, V>>,
    left: TreePayload<K, V>,
    right: TreePayload<K, V>,
    mods: RefCell<SmallVec<[TreeMod<K, V>; TREE_MOD_CAPACITY]>>,
    forwards: RefCell<Vec<(Version, TreeNodeRef<K, V>)>>,
}

impl<K, V> TreeNode<K, V>
where
    K: Clone + 'static,
    V: PersistentValue,
{
    pub(crate) fn new(key: K, value: V, back_pointer: Weak<TreeNode<K, V>>) -> TreeNodeRef<K, V> {
        Rc::new(TreeNode {
            key,
            value,
            back_pointer,
            left: None,
            right: None,
            mods: RefCell::new(SmallVec::new()),
            forwards: RefCell::new(Vec::new()),
        })
    }

    /// Latest matching-field record at or below `v`. Records on divergent
    /// branches are incomparable with `v` and never match; along the ancestor
    /// chain of `v` versions nest strictly, so the maximum is unique.
    fn latest_in<'a>(
        mods: &'a [TreeMod<K, V>],
        kind: FieldKind,
        v: &Version,
    ) -> Option<&'a TreeMod<K, V>> {
        let mut best: Option<&TreeMod<K, V>> = None;
        for entry in mods {
            if entry.field.kind() != kind || !(entry.version <= *v) {
                continue;
            }
            if best.map_or(true, |b| b.version <= entry.version) {
                best = Some(entry);
            }
        }
        best
    }

    /// Follow split forwards applicable at `v` to the node identity that holds
    /// the live log for that version.
    pub(crate) fn resolve(node: &TreeNodeRef<K, V>, v: &Version) -> TreeNodeRef<K, V> {
        let mut current = node.clone();
        loop {
            let next = {
                let forwards = current.forwards.borrow();
                let mut best: Option<&(Version, TreeNodeRef<K, V>)> = None;
                for entry in forwards.iter() {
                    if !(entry.0 <= *v) {
                        continue;
                    }
                    if best.map_or(true, |b| b.0 <= entry.0) {
                        best = Some(entry);
                    }
                }
                best.map(|(_, n)| n.clone())
            };
            match next {
                Some(n) => current = n,
                None => return current,
            }
        }
    }

    /// Value at `v`, without parent hooks. Used where the result is not handed
    /// back to a caller who could mutate it.
    pub(crate) fn read_value(node: &TreeNodeRef<K, V>, v: &Version) -> V {
        let node = Self::resolve(node, v);
        let mods = node.mods.borrow();
        match Self::latest_in(&mods, FieldKind::Value, v) {
            Some(m) => match &m.field {
                TreeField::Value(value) => value.clone(),
                _ => unreachable!("value record expected"),
            },
            None => node.value.clone(),
        }
    }

    /// Value at the context version, with parent hooks installed so that a
    /// nested persistent value propagates its mutations into this tree.
    pub(crate) fn get_value(node: &TreeNodeRef<K, V>, vc: &TreeCtx<K, V>) -> V {
        let node = Self::resolve(node, &vc.version);
        let value = Self::read_value(&node, &vc.version);
        Self::install_value_hooks(&node, &value, vc);
        value
    }

    pub(crate) fn get_left(node: &TreeNodeRef<K, V>, v: &Version) -> TreePayload<K, V> {
        let node = Self::resolve(node, v);
        let child = {
            let mods = node.mods.borrow();
            match Self::latest_in(&mods, FieldKind::Left, v) {
                Some(m) => match &m.field {
                    TreeField::Left(n) => n.clone(),
                    _ => unreachable!("left record expected"),
                },
                None => node.left.clone(),
            }
        };
        child.map(|n| Self::resolve(&n, v))
    }

    pub(crate) fn get_right(node: &TreeNodeRef<K, V>, v: &Version) -> TreePayload<K, V> {
        let node = Self::resolve(node, v);
        let child = {
            let mods = node.mods.borrow();
            match Self::latest_in(&mods, FieldKind::Right, v) {
                Some(m) => match &m.field {
                    TreeField::Right(n) => n.clone(),
                    _ => unreachable!("right record expected"),
                },
                None => node.right.clone(),
            }
        };
        child.map(|n| Self::resolve(&n, v))
    }

    pub(crate) fn get_back_pointer(node: &TreeNodeRef<K, V>, v: &Version) -> TreePayload<K, V> {
        let node = Self::resolve(node, v);
        let parent = {
            let mods = node.mods.borrow();
            match Self::latest_in(&mods, FieldKind::BackPointer, v) {
                Some(m) => match &m.field {
                    TreeField::BackPointer(bp) => bp.clone(),
                    _ => unreachable!("back pointer record expected"),
                },
                None => node.back_pointer.clone(),
            }
        };
        parent.upgrade().map(|n| Self::resolve(&n, v))
    }

    pub(crate) fn set_value(node: &TreeNodeRef<K, V>, value: V, vc: &TreeCtx<K, V>) {
        Self::set_field(node, TreeField::Value(value), vc);
    }

    pub(crate) fn set_left(node: &TreeNodeRef<K, V>, child: TreePayload<K, V>, vc: &TreeCtx<K, V>) {
        Self::set_field(node, TreeField::Left(child), vc);
    }

    pub(crate) fn set_right(node: &TreeNodeRef<K, V>, child: TreePayload<K, V>, vc: &TreeCtx<K, V>) {
        Self::set_field(node, TreeField::Right(child), vc);
    }

    pub(crate) fn set_back_pointer(
        node: &TreeNodeRef<K, V>,
        parent: Weak<TreeNode<K, V>>,
        vc: &TreeCtx<K, V>,
    ) {
        Self::set_field(node, TreeField::BackPointer(parent), vc);
    }

    fn set_field(node: &TreeNodeRef<K, V>, field: TreeField<K, V>, vc: &TreeCtx<K, V>) {
        let node = Self::resolve(node, &vc.version);
        let full = node.mods.borrow().len() == TREE_MOD_CAPACITY;
        if full {
            let successor = Self::split_and_update(&node, vc);
            return Self::set_field(&successor, field, vc);
        }
        node.mods.borrow_mut().push(TreeMod {
            version: vc.version.clone(),
            field,
        });
    }

    /// Split on overflow. The successor's baseline is the field snapshot at the
    /// split version computed from the first half of the log; the second half
    /// becomes its initial log. The old node keeps its full log so versions
    /// recorded before the split keep reading through it, and gains a
    /// forwarding entry so stale references resolve to the successor at the
    /// split version and later.
    fn split(node: &TreeNodeRef<K, V>, vc: &TreeCtx<K, V>) -> TreeNodeRef<K, V> {
        let successor = {
            let mods = node.mods.borrow();
            debug_assert_eq!(mods.len(), TREE_MOD_CAPACITY, "split of a non-full node");
            let head = &mods[..mods.len() / 2];
            let v = &vc.version;

            let value = match Self::latest_in(head, FieldKind::Value, v) {
                Some(m) => match &m.field {
                    TreeField::Value(value) => value.clone(),
                    _ => unreachable!(),
                },
                None => node.value.clone(),
            };
            let back_pointer = match Self::latest_in(head, FieldKind::BackPointer, v) {
                Some(m) => match &m.field {
                    TreeField::BackPointer(bp) => bp.clone(),
                    _ => unreachable!(),
                },
                None => node.back_pointer.clone(),
            };
            let left = match Self::latest_in(head, FieldKind::Left, v) {
                Some(m) => match &m.field {
                    TreeField::Left(n) => n.clone(),
                    _ => unreachable!(),
                },
                None => node.left.clone(),
            };
            let right = match Self::latest_in(head, FieldKind::Right, v) {
                Some(m) => match &m.field {
                    TreeField::Right(n) => n.clone(),
                    _ => unreachable!(),
                },
                None => node.right.clone(),
            };

            let tail: SmallVec<[TreeMod<K, V>; TREE_MOD_CAPACITY]> =
                mods[mods.len() / 2..].iter().cloned().collect();
            Rc::new(TreeNode {
                key: node.key.clone(),
                value,
                back_pointer,
                left,
                right,
                mods: RefCell::new(tail),
                forwards: RefCell::new(Vec::new()),
            })
        };
        node.forwards
            .borrow_mut()
            .push((vc.version.clone(), successor.clone()));
        successor
    }

    /// Split, then retarget everything that reaches the old node at the split
    /// version: the version tree's root payload, the parent's child slot and
    /// the children's back pointers.
    fn split_and_update(node: &TreeNodeRef<K, V>, vc: &TreeCtx<K, V>) -> TreeNodeRef<K, V> {
        let successor = Self::split(node, vc);

        if let Some(root) = vc.vtree.get_value(&vc.version) {
            if Rc::ptr_eq(&Self::resolve(&root, &vc.version), &successor) {
                vc.vtree.update(&vc.version, Some(successor.clone()));
            }
        }

        if let Some(parent) = Self::get_back_pointer(&successor, &vc.version) {
            let left = Self::get_left(&parent, &vc.version);
            if left.is_some_and(|l| Rc::ptr_eq(&l, &successor)) {
                Self::set_left(&parent, Some(successor.clone()), vc);
            } else {
                let right = Self::get_right(&parent, &vc.version);
                assert!(
                    right.is_some_and(|r| Rc::ptr_eq(&r, &successor)),
                    "back pointer does not lead back to the split node"
                );
                Self::set_right(&parent, Some(successor.clone()), vc);
            }
        }
        if let Some(left) = Self::get_left(&successor, &vc.version) {
            Self::set_back_pointer(&left, Rc::downgrade(&successor), vc);
        }
        if let Some(right) = Self::get_right(&successor, &vc.version) {
            Self::set_back_pointer(&right, Rc::downgrade(&successor), vc);
        }
        successor
    }

    /// Wire a nested persistent value to this node: mutating the value branches
    /// a fresh version of the enclosing tree carrying the updated value in this
    /// node's slot.
    fn install_value_hooks(node: &TreeNodeRef<K, V>, value: &V, vc: &TreeCtx<K, V>) {
        let slot = Rc::downgrade(node);
        let ctx = vc.clone();
        value.attach_parent(ParentLink {
            structure: vc.structure.clone(),
            parent_version: vc.version.clone(),
            notifier: Rc::new(move |_, new_value: &V| {
                let root = ctx.vtree.get_value(&ctx.version);
                let new_version = ctx.vtree.insert(&ctx.version, root);
                if let Some(node) = slot.upgrade() {
                    TreeNode::set_value(&node, new_value.clone(), &ctx.at(new_version.clone()));
                }
                new_version
            }),
        });
    }

    pub(crate) fn leftmost(node: &TreeNodeRef<K, V>, v: &Version) -> TreeNodeRef<K, V> {
        let mut current = Self::resolve(node, v);
        while let Some(left) = Self::get_left(&current, v) {
            current = left;
        }
        current
    }

    /// In-order successor.
    pub(crate) fn next_node(node: &TreeNodeRef<K, V>, v: &Version) -> TreePayload<K, V> {
        if let Some(right) = Self::get_right(node, v) {
            return Some(Self::leftmost(&right, v));
        }
        Self::next_parent(node, v)
    }

    fn next_parent(node: &TreeNodeRef<K, V>, v: &Version) -> TreePayload<K, V> {
        let mut current = Self::resolve(node, v);
        loop {
            let parent = Self::get_back_pointer(&current, v)?;
            let from_left = Self::get_left(&parent, v).is_some_and(|l| Rc::ptr_eq(&l, &current));
            if from_left {
                return Some(parent);
            }
            current = parent;
        }
    }

    pub(crate) fn subtree_size(node: &TreeNodeRef<K, V>, v: &Version) -> usize {
        let node = Self::resolve(node, v);
        let left = Self::get_left(&node, v).map_or(0, |n| Self::subtree_size(&n, v));
        let right = Self::get_right(&node, v).map_or(0, |n| Self::subtree_size(&n, v));
        left + right + 1
    }

    pub(crate) fn subtree_height(node: &TreeNodeRef<K, V>, v: &Version) -> usize {
        let node = Self::resolve(node, v);
        let left = Self::get_left(&node, v).map_or(0, |n| Self::subtree_height(&n, v));
        let right = Self::get_right(&node, v).map_or(0, |n| Self::subtree_height(&n, v));
        left.max(right) + 1
    }
}
