//! A fully persistent doubly linked list.
//!
//! [`PersistentList`] stores its elements in fat nodes with bounded
//! modification logs; the version tree's payload at each version is the head
//! node. Every mutation branches a fresh version, and earlier versions remain
//! navigable and independently mutable.

mod node;

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

pub(crate) use node::{ListCtx, ListNode, ListNodeRef, ListPayload};

/// A fully persistent doubly linked list.
///
/// ## Examples
///
/// ```rust
/// use verso::{Persistent, PersistentList};
///
/// let mut list = PersistentList::new();
/// list.push_front(2);
/// list.push_front(1);
/// let full = list.version();
///
/// assert_eq!(list.iter().collect::<Vec<_>>(), vec![1, 2]);
///
/// list.pop_front();
/// assert_eq!(list.len(), 1);
///
/// // The pre-pop version is still there.
/// assert_eq!(list.with_version(full).len(), 2);
/// ```
pub struct PersistentList<T: PersistentValue> {
    shared: Rc<ListShared<T>>,
}

struct ListShared<T: PersistentValue> {
    vtree: Rc<VersionTree<ListPayload<T>>>,
    core: StructureCore<PersistentList<T>>,
}

impl<T: PersistentValue> PersistentList<T> {
    /// Create an empty list with a fresh version tree.
    pub fn new() -> Self {
        let vtree = Rc::new(VersionTree::new(None));
        let root = vtree.root_version();
        Self {
            shared: Rc::new(ListShared {
                vtree,
                core: StructureCore::new(root),
            }),
        }
    }

    fn from_shared(shared: Rc<ListShared<T>>) -> Self {
        Self { shared }
    }

    fn ctx(&self) -> ListCtx<T> {
        let shared_dyn: Rc<dyn VersionedStructure> = self.shared.clone();
        let structure: Weak<dyn VersionedStructure> = Rc::downgrade(&shared_dyn);
        VersionContext::new(structure, self.version(), self.shared.vtree.clone())
    }

    fn head(&self) -> ListPayload<T> {
        self.shared.vtree.get_value(&self.version())
    }

    fn branch_version(&self) -> Version {
        let current = self.version();
        let head = self.shared.vtree.get_value(&current);
        let next = self.shared.vtree.insert(&current, head);
        *self.shared.core.current.borrow_mut() = next.clone();
        next
    }

    /// Prepend `value`. The new node becomes the head at the new version.
    pub fn push_front(&mut self, value: T) {
        let _scope = ChangeScope::new(self, ChangeCause::Mutation);
        let head = self.head();
        let version = self.branch_version();
        let vc = self.ctx();

        let node = ListNode::new(value, Weak::new(), head.clone());
        self.shared.vtree.update(&version, Some(node.clone()));
        if let Some(head) = head {
            ListNode::set_prev(&head, Rc::downgrade(&node), &vc);
        }
    }

    /// Remove and return the head element. No-op on an empty list.
    pub fn pop_front(&mut self) -> Option<T> {
        let _scope = ChangeScope::new(self, ChangeCause::Mutation);
        let head = self.head()?;
        let value = ListNode::read_value(&head, &self.version());
        self.branch_version();
        let vc = self.ctx();

        let next = ListNode::get_next(&head, &vc.version);
        if let Some(next) = &next {
            ListNode::set_prev(next, Weak::new(), &vc);
        }
        self.shared.vtree.update(&vc.version, next);
        Some(value)
    }

    /// The head element, with parent hooks installed.
    pub fn front(&self) -> Option<T> {
        let head = self.head()?;
        Some(ListNode::get_value(&head, &self.ctx()))
    }

    fn find_node(&self, value: &T) -> ListPayload<T> {
        let v = self.version();
        let mut current = self.head();
        while let Some(node) = current {
            if ListNode::read_value(&node, &v) == *value {
                return Some(node);
            }
            current = ListNode::get_next(&node, &v);
        }
        None
    }

    /// Whether `value` occurs in the list. Linear scan.
    pub fn contains(&self, value: &T) -> bool {
        self.find_node(value).is_some()
    }

    /// Remove the first occurrence of `value`. Returns whether anything was
    /// removed; a miss produces no new version.
    pub fn remove(&mut self, value: &T) -> bool {
        let _scope = ChangeScope::new(self, ChangeCause::Mutation);
        let Some(node) = self.find_node(value) else {
            return false;
        };
        self.branch_version();
        self.erase_node(&node, &self.ctx());
        true
    }

    /// Bridge the node's neighbors at the context version; erasing the head
    /// moves the version tree's payload to the next node.
    fn erase_node(&self, node: &ListNodeRef<T>, vc: &ListCtx<T>) {
        let v = &vc.version;
        let node = ListNode::resolve(node, v);
        let prev = ListNode::get_prev(&node, v);
        let next = ListNode::get_next(&node, v);

        if let Some(prev) = &prev {
            ListNode::set_next(prev, next.clone(), vc);
        }
        if let Some(next) = &next {
            let bridge = match &prev {
                Some(prev) => Rc::downgrade(&ListNode::resolve(prev, v)),
                None => Weak::new(),
            };
            ListNode::set_prev(next, bridge, vc);
        }
        if prev.is_none() {
            self.shared.vtree.update(v, next);
        }
    }

    /// Number of elements at the current version. O(n).
    pub fn len(&self) -> usize {
        let v = self.version();
        let mut count = 0;
        let mut current = self.head();
        while let Some(node) = current {
            count += 1;
            current = ListNode::get_next(&node, &v);
        }
        count
    }

    pub fn is_empty(&self) -> bool {
        self.head().is_none()
    }

    /// Head-to-tail iterator over the elements at the current version.
    pub fn iter(&self) -> Iter<T> {
        Iter {
            node: self.head(),
            vc: self.ctx(),
        }
    }

    fn adopt(&self, v: Version) {
        assert!(!v.is_empty(), "cannot adopt the empty version");
        let _scope = ChangeScope::new(self, ChangeCause::Mutation);
        *self.shared.core.current.borrow_mut() = v;
    }
}

/// Head-to-tail iterator over list elements at a fixed version.
pub struct Iter<T: PersistentValue> {
    vc: ListCtx<T>,
    node: ListPayload<T>,
}

impl<T: PersistentValue> Iterator for Iter<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.node.take()?;
        let value = ListNode::get_value(&node, &self.vc);
        self.node = ListNode::get_next(&node, &self.vc.version);
        Some(value)
    }
}

impl<T: PersistentValue> IntoIterator for &PersistentList<T> {
    type Item = T;
    type IntoIter = Iter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: PersistentValue> Default for PersistentList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PersistentValue> Clone for PersistentList<T> {
    /// Snapshot semantics, as for the other containers.
    fn clone(&self) -> Self {
        Self {
            shared: Rc::new(ListShared {
                vtree: self.shared.vtree.clone(),
                core: self.shared.core.snapshot(),
            }),
        }
    }
}

impl<T: PersistentValue> PartialEq for PersistentList<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.shared.vtree, &other.shared.vtree)
            && *self.shared.core.current.borrow() == *other.shared.core.current.borrow()
    }
}

impl<T: PersistentValue> Persistent for PersistentList<T> {
    fn version(&self) -> Version {
        self.shared.core.current.borrow().clone()
    }

    fn set_version(&mut self, v: Version) {
        self.adopt(v);
    }

    fn with_version(&self, v: Version) -> Self {
        assert!(!v.is_empty(), "cannot pin a handle to the empty version");
        Self {
            shared: Rc::new(ListShared {
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

impl<T: PersistentValue> PersistentValue for PersistentList<T> {
    fn attach_parent(&self, link: ParentLink<Self>) {
        self.shared.core.install(link);
    }
}

impl<T: PersistentValue> Notifiable for PersistentList<T> {
    fn scope_version(&self) -> Version {
        self.version()
    }

    fn fire_changed(&self, cause: ChangeCause) {
        notify_changed(self, &self.shared.core, cause);
    }
}

impl<T: PersistentValue> VersionedStructure for ListShared<T> {
    fn structure_version(&self) -> Version {
        self.core.current.borrow().clone()
    }

    fn adopt_version(self: Rc<Self>, v: Version) {
        PersistentList::from_shared(self).adopt(v);
    }
}

impl<T: PersistentValue + fmt::Display> fmt::Display for PersistentList<T> {
    /// Renders the elements at the current version, one per line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.head() {
            Some(head) => f.write_str(&pretty::render_list(&head, &self.version())),
            None => writeln!(f, "(empty list)"),
        }
    }
}
