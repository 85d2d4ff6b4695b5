//! The version tree: owner of every version of one container family.
//!
//! A [`VersionTree`] maps each version to a payload of type `T`, the root of the
//! container's node graph at that version. Handles over the same history share
//! one tree through `Rc`; the tree lives as long as the last handle does.
//!
//! Entries live in a push-only arena, so the index stored in each
//! [`Slot`](super::Slot) stays valid forever. Inserting a version carves a fresh
//! sub-interval out of the parent's free label range; when the free range is
//! exhausted, [`redistribute`](VersionTree::redistribute) re-spaces every
//! interval endpoint uniformly across the label universe, preserving nesting and
//! therefore every ordering observable through [`Version`] handles.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use itertools::Itertools;

use super::{Label, Slot, Version};

static NEXT_TREE_ID: AtomicU64 = AtomicU64::new(1);

struct Entry<T> {
    slot: Rc<Slot>,
    value: T,
}

/// Registry of all versions of one container family, mapping each version to
/// the container root stored at that version.
///
/// ## Examples
///
/// ```rust
/// use verso::VersionTree;
///
/// let tree = VersionTree::new("initial");
/// let root = tree.root_version();
///
/// let next = tree.insert(&root, "changed");
/// assert_eq!(tree.get_value(&root), "initial");
/// assert_eq!(tree.get_value(&next), "changed");
/// assert!(root < next);
/// ```
pub struct VersionTree<T> {
    id: u64,
    entries: RefCell<Vec<Entry<T>>>,
}

impl<T> VersionTree<T> {
    /// Create a tree holding a single root version with the given payload.
    pub fn new(root_value: T) -> Self {
        let id = NEXT_TREE_ID.fetch_add(1, Ordering::Relaxed);
        let slot = Rc::new(Slot {
            begin: Cell::new(1),
            end: Cell::new(Label::MAX),
            free: Cell::new(Label::MAX - 2),
            index: 0,
            tree: id,
        });
        Self {
            id,
            entries: RefCell::new(vec![Entry {
                slot,
                value: root_value,
            }]),
        }
    }

    /// The initial version created at construction.
    pub fn root_version(&self) -> Version {
        Version::from_slot(self.entries.borrow()[0].slot.clone())
    }

    /// Number of versions in this tree.
    pub fn version_count(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Fetch the payload stored at `v`.
    pub fn get_value(&self, v: &Version) -> T
    where
        T: Clone,
    {
        let slot = self.owned_slot(v);
        self.entries.borrow()[slot.index].value.clone()
    }

    /// Overwrite the payload stored at `v`.
    pub fn update(&self, v: &Version, value: T) {
        let slot = self.owned_slot(v);
        self.entries.borrow_mut()[slot.index].value = value;
    }

    /// Create a fresh child of `at` carrying `value`, ordered after `at` and
    /// before everything outside `at`'s interval.
    pub fn insert(&self, at: &Version, value: T) -> Version {
        let slot = self.owned_slot(at);
        if slot.free.get() < 2 {
            self.redistribute();
        }
        let end = slot.end.get();
        let free = slot.free.get();
        assert!(free >= 2, "version label space exhausted");

        // Carve a third of the free range for the child; the parent keeps the
        // labels above the child's end for later siblings.
        let step = (free + 1) / 3;
        assert!(step >= 1);
        let begin = end - free - 1 + step;
        let child_end = begin + step;
        assert!(child_end < end);
        slot.free.set(end - child_end - 1);

        let mut entries = self.entries.borrow_mut();
        let child = Rc::new(Slot {
            begin: Cell::new(begin),
            end: Cell::new(child_end),
            free: Cell::new(step - 1),
            index: entries.len(),
            tree: self.id,
        });
        entries.push(Entry {
            slot: child.clone(),
            value,
        });
        Version::from_slot(child)
    }

    /// Relabel every entry, spacing interval endpoints uniformly over the label
    /// universe. Endpoint order (and so nesting and all comparisons) is
    /// preserved; handles stay valid because labels are rewritten in place.
    fn redistribute(&self) {
        let entries = self.entries.borrow();
        let step = (Label::MAX - 1) / entries.len() as Label / 2;
        assert!(step > 1, "version label universe exhausted");

        let endpoints = entries
            .iter()
            .flat_map(|e| {
                [
                    (e.slot.begin.get(), &e.slot, false),
                    (e.slot.end.get(), &e.slot, true),
                ]
            })
            .sorted_by_key(|&(label, _, _)| label);

        // Skip label 0, reserved for the empty version.
        let mut label: Label = 1;
        for (_, slot, is_end) in endpoints {
            if is_end {
                slot.end.set(label);
                slot.free.set(step - 1);
            } else {
                slot.begin.set(label);
            }
            label += step;
        }
    }

    fn owned_slot(&self, v: &Version) -> Rc<Slot> {
        let slot = v.slot().expect("the empty version backs no entry");
        debug_assert_eq!(
            slot.tree, self.id,
            "version belongs to a different version tree"
        );
        slot.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_and_insert() {
        let tree = VersionTree::new(1);
        let root = tree.root_version();
        assert_eq!(tree.get_value(&root), 1);

        let v2 = tree.insert(&root, 2);
        assert!(root <= v2);
        assert!(root < v2);
        assert_eq!(tree.get_value(&v2), 2);
        assert_eq!(tree.get_value(&root), 1);
        assert_eq!(tree.version_count(), 2);
    }

    #[test]
    fn test_update_payload() {
        let tree = VersionTree::new(0);
        let root = tree.root_version();
        tree.update(&root, 7);
        assert_eq!(tree.get_value(&root), 7);
    }

    #[test]
    fn test_chain_stays_ordered() {
        let tree = VersionTree::new(0);
        let mut chain = vec![tree.root_version()];
        for i in 1..200 {
            let next = tree.insert(chain.last().unwrap(), i);
            chain.push(next);
        }
        for pair in chain.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        // Deep chains exhaust per-entry free ranges and force redistribution;
        // payloads and ordering must survive it.
        for (i, v) in chain.iter().enumerate() {
            assert_eq!(tree.get_value(v), i as i32);
        }
    }

    #[test]
    fn test_siblings_diverge() {
        let tree = VersionTree::new(0);
        let root = tree.root_version();
        let a = tree.insert(&root, 1);
        let b = tree.insert(&root, 2);
        assert!(root < a);
        assert!(root < b);
        assert!(a.partial_cmp(&b).is_none());
        assert_eq!(tree.get_value(&a), 1);
        assert_eq!(tree.get_value(&b), 2);
    }

    #[test]
    fn test_wide_fanout_redistributes() {
        let tree = VersionTree::new(0);
        let root = tree.root_version();
        let children: Vec<_> = (0..500).map(|i| tree.insert(&root, i)).collect();
        for (i, child) in children.iter().enumerate() {
            assert!(root < *child);
            assert_eq!(tree.get_value(child), i as i32);
        }
    }
}
