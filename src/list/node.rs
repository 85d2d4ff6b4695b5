use std::cell::RefCell;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::structure::{ParentLink, PersistentValue};
use crate::version::context::VersionContext;
use crate::version::Version;

/// Mod log capacity: twice the number of mutable fields (value, prev, next).
pub(crate) const LIST_MOD_CAPACITY: usize = 6;

pub(crate) type ListNodeRef<T> = Rc<ListNode<T>>;
pub(crate) type ListPayload<T> = Option<ListNodeRef<T>>;
pub(crate) type ListCtx<T> = VersionContext<ListPayload<T>>;

#[derive(Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Value,
    Prev,
    Next,
}

enum ListField<T: PersistentValue> {
    Value(T),
    Prev(Weak<ListNode<T>>),
    Next(ListPayload<T>),
}

impl<T: PersistentValue> ListField<T> {
    fn kind(&self) -> FieldKind {
        match self {
            ListField::Value(_) => FieldKind::Value,
            ListField::Prev(_) => FieldKind::Prev,
            ListField::Next(_) => FieldKind::Next,
        }
    }
}

impl<T: PersistentValue> Clone for ListField<T> {
    fn clone(&self) -> Self {
        match self {
            ListField::Value(v) => ListField::Value(v.clone()),
            ListField::Prev(p) => ListField::Prev(p.clone()),
            ListField::Next(n) => ListField::Next(n.clone()),
        }
    }
}

struct ListMod<T: PersistentValue> {
    version: Version,
    field: ListField<T>,
}

impl<T: PersistentValue> Clone for ListMod<T> {
    fn clone(&self) -> Self {
        Self {
            version: self.version.clone(),
            field: self.field.clone(),
        }
    }
}

/// A doubly-linked-list fat node. The prev edge is non-owning; ownership runs
/// head to tail through next edges and the version tree's head payload.
pub(crate) struct ListNode<T: PersistentValue> {
    value: T,
    prev: Weak<ListNode<T>>,
    next: ListPayload<T>,
    mods: RefCell<SmallVec<[ListMod<T>; LIST_MOD_CAPACITY]>>,
    forwards: RefCell<Vec<(Version, ListNodeRef<T>)>>,
}

impl<T: PersistentValue> ListNode<T> {
    pub(crate) fn new(value: T, prev: Weak<ListNode<T>>, next: ListPayload<T>) -> ListNodeRef<T> {
        Rc::new(ListNode {
            value,
            prev,
            next,
            mods: RefCell::new(SmallVec::new()),
            forwards: RefCell::new(Vec::new()),
        })
    }

    fn latest_in<'a>(
        mods: &'a [ListMod<T>],
        kind: FieldKind,
        v: &Version,
    ) -> Option<&'a ListMod<T>> {
        let mut best: Option<&ListMod<T>> = None;
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

    pub(crate) fn resolve(node: &ListNodeRef<T>, v: &Version) -> ListNodeRef<T> {
        let mut current = node.clone();
        loop {
            let next = {
                let forwards = current.forwards.borrow();
                let mut best: Option<&(Version, ListNodeRef<T>)> = None;
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

    pub(crate) fn read_value(node: &ListNodeRef<T>, v: &Version) -> T {
        let node = Self::resolve(node, v);
        let mods = node.mods.borrow();
        match Self::latest_in(&mods, FieldKind::Value, v) {
            Some(m) => match &m.field {
                ListField::Value(value) => value.clone(),
                _ => unreachable!("value record expected"),
            },
            None => node.value.clone(),
        }
    }

    pub(crate) fn get_value(node: &ListNodeRef<T>, vc: &ListCtx<T>) -> T {
        let node = Self::resolve(node, &vc.version);
        let value = Self::read_value(&node, &vc.version);
        Self::install_value_hooks(&node, &value, vc);
        value
    }

    pub(crate) fn get_prev(node: &ListNodeRef<T>, v: &Version) -> ListPayload<T> {
        let node = Self::resolve(node, v);
        let prev = {
            let mods = node.mods.borrow();
            match Self::latest_in(&mods, FieldKind::Prev, v) {
                Some(m) => match &m.field {
                    ListField::Prev(p) => p.clone(),
                    _ => unreachable!("prev record expected"),
                },
                None => node.prev.clone(),
            }
        };
        prev.upgrade().map(|n| Self::resolve(&n, v))
    }

    pub(crate) fn get_next(node: &ListNodeRef<T>, v: &Version) -> ListPayload<T> {
        let node = Self::resolve(node, v);
        let next = {
            let mods = node.mods.borrow();
            match Self::latest_in(&mods, FieldKind::Next, v) {
                Some(m) => match &m.field {
                    ListField::Next(n) => n.clone(),
                    _ => unreachable!("next record expected"),
                },
                None => node.next.clone(),
            }
        };
        next.map(|n| Self::resolve(&n, v))
    }

    pub(crate) fn set_value(node: &ListNodeRef<T>, value: T, vc: &ListCtx<T>) {
        Self::set_field(node, ListField::Value(value), vc);
    }

    pub(crate) fn set_prev(node: &ListNodeRef<T>, prev: Weak<ListNode<T>>, vc: &ListCtx<T>) {
        Self::set_field(node, ListField::Prev(prev), vc);
    }

    pub(crate) fn set_next(node: &ListNodeRef<T>, next: ListPayload<T>, vc: &ListCtx<T>) {
        Self::set_field(node, ListField::Next(next), vc);
    }

    fn set_field(node: &ListNodeRef<T>, field: ListField<T>, vc: &ListCtx<T>) {
        let node = Self::resolve(node, &vc.version);
        let full = node.mods.borrow().len() == LIST_MOD_CAPACITY;
        if full {
            let successor = Self::split_and_update(&node, vc);
            return Self::set_field(&successor, field, vc);
        }
        node.mods.borrow_mut().push(ListMod {
            version: vc.version.clone(),
            field,
        });
    }

    /// Same construction as the tree node split: snapshot baseline from the
    /// first half of the log, second half carried over, full log retained on
    /// the old node for earlier versions, forwarding entry for stale refs.
    fn split(node: &ListNodeRef<T>, vc: &ListCtx<T>) -> ListNodeRef<T> {
        let successor = {
            let mods = node.mods.borrow();
            debug_assert_eq!(mods.len(), LIST_MOD_CAPACITY, "split of a non-full node");
            let head = &mods[..mods.len() / 2];
            let v = &vc.version;

            let value = match Self::latest_in(head, FieldKind::Value, v) {
                Some(m) => match &m.field {
                    ListField::Value(value) => value.clone(),
                    _ => unreachable!(),
                },
                None => node.value.clone(),
            };
            let prev = match Self::latest_in(head, FieldKind::Prev, v) {
                Some(m) => match &m.field {
                    ListField::Prev(p) => p.clone(),
                    _ => unreachable!(),
                },
                None => node.prev.clone(),
            };
            let next = match Self::latest_in(head, FieldKind::Next, v) {
                Some(m) => match &m.field {
                    ListField::Next(n) => n.clone(),
                    _ => unreachable!(),
                },
                None => node.next.clone(),
            };

            let tail: SmallVec<[ListMod<T>; LIST_MOD_CAPACITY]> =
                mods[mods.len() / 2..].iter().cloned().collect();
            Rc::new(ListNode {
                value,
                prev,
                next,
                mods: RefCell::new(tail),
                forwards: RefCell::new(Vec::new()),
            })
        };
        node.forwards
            .borrow_mut()
            .push((vc.version.clone(), successor.clone()));
        successor
    }

    fn split_and_update(node: &ListNodeRef<T>, vc: &ListCtx<T>) -> ListNodeRef<T> {
        let successor = Self::split(node, vc);

        // If the old node was the head at this version, the version tree's
        // payload has to follow the split.
        if let Some(head) = vc.vtree.get_value(&vc.version) {
            if Rc::ptr_eq(&Self::resolve(&head, &vc.version), &successor) {
                vc.vtree.update(&vc.version, Some(successor.clone()));
            }
        }

        if let Some(prev) = Self::get_prev(&successor, &vc.version) {
            Self::set_next(&prev, Some(successor.clone()), vc);
        }
        if let Some(next) = Self::get_next(&successor, &vc.version) {
            Self::set_prev(&next, Rc::downgrade(&successor), vc);
        }
        successor
    }

    fn install_value_hooks(node: &ListNodeRef<T>, value: &T, vc: &ListCtx<T>) {
        let slot = Rc::downgrade(node);
        let ctx = vc.clone();
        value.attach_parent(ParentLink {
            structure: vc.structure.clone(),
            parent_version: vc.version.clone(),
            notifier: Rc::new(move |_, new_value: &T| {
                let head = ctx.vtree.get_value(&ctx.version);
                let new_version = ctx.vtree.insert(&ctx.version, head);
                if let Some(node) = slot.upgrade() {
                    ListNode::set_value(&node, new_value.clone(), &ctx.at(new_version.clone()));
                }
                new_version
            }),
        });
    }
}
