//! Fully persistent random-access sequences, in two flavors.
//!
//! [`PersistentVector`] versions the whole backing vector: the version tree's
//! payload at each version is a shared `Vec`, and every mutation clones the
//! previous payload and edits the clone. Simple, O(n) per mutation.
//!
//! [`FatVector`](fat::FatVector) instead keeps one fat cell per element, each
//! carrying its own bounded modification log, plus a versioned length. Reads
//! and in-place updates are O(1) in the element count; structural changes
//! edit the length and shift elements with versioned writes.

pub mod fat;

use std::fmt;
use std::rc::{Rc, Weak};

use crate::structure::{
    notify_changed, ChangeCause, ChangeScope, Notifiable, ParentLink, Persistent, PersistentValue,
    StructureCore, VersionedStructure,
};
use crate::version::tree::VersionTree;
use crate::version::Version;

type VecPayload<T> = Rc<Vec<T>>;

/// A fully persistent sequence versioning the whole backing vector per
/// mutation.
///
/// ## Examples
///
/// ```rust
/// use verso::{Persistent, PersistentVector};
///
/// let mut seq = PersistentVector::new();
/// seq.push_back(1);
/// seq.push_back(2);
///
/// seq.undo();
/// assert_eq!(seq.len(), 1);
///
/// seq.redo();
/// assert_eq!(seq.get(1), Some(2));
/// ```
pub struct PersistentVector<T: PersistentValue> {
    shared: Rc<VecShared<T>>,
}

struct VecShared<T: PersistentValue> {
    vtree: Rc<VersionTree<VecPayload<T>>>,
    core: StructureCore<PersistentVector<T>>,
}

impl<T: PersistentValue> PersistentVector<T> {
    /// Create an empty sequence with a fresh version tree.
    pub fn new() -> Self {
        let vtree = Rc::new(VersionTree::new(Rc::new(Vec::new())));
        let root = vtree.root_version();
        Self {
            shared: Rc::new(VecShared {
                vtree,
                core: StructureCore::new(root),
            }),
        }
    }

    fn from_shared(shared: Rc<VecShared<T>>) -> Self {
        Self { shared }
    }

    fn payload(&self) -> VecPayload<T> {
        self.shared.vtree.get_value(&self.version())
    }

    /// Clone the current payload, apply `edit`, and store the result under a
    /// fresh child version.
    fn mutate(&self, edit: impl FnOnce(&mut Vec<T>)) {
        let _scope = ChangeScope::new(self, ChangeCause::Mutation);
        let current = self.version();
        let mut vec = (*self.shared.vtree.get_value(&current)).clone();
        edit(&mut vec);
        let next = self.shared.vtree.insert(&current, Rc::new(vec));
        *self.shared.core.current.borrow_mut() = next;
    }

    pub fn len(&self) -> usize {
        self.payload().len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload().is_empty()
    }

    /// Element at `index`, with parent hooks installed so a nested persistent
    /// element propagates its mutations into this sequence.
    pub fn get(&self, index: usize) -> Option<T> {
        let value = self.payload().get(index)?.clone();
        self.install_element_hooks(index, &value);
        Some(value)
    }

    pub fn push_back(&mut self, value: T) {
        self.mutate(|vec| vec.push(value));
    }

    /// Overwrite the element at `index`. Panics when out of bounds.
    pub fn update(&mut self, index: usize, value: T) {
        assert!(index < self.len(), "index {index} out of bounds");
        self.mutate(|vec| vec[index] = value);
    }

    pub fn resize(&mut self, new_len: usize, fill: T) {
        self.mutate(|vec| vec.resize(new_len, fill));
    }

    /// Remove and return the element at `index`, shifting the tail left.
    /// Out-of-bounds indices are a no-op and produce no new version.
    pub fn remove(&mut self, index: usize) -> Option<T> {
        let removed = self.payload().get(index)?.clone();
        self.mutate(|vec| {
            vec.remove(index);
        });
        Some(removed)
    }

    /// Index-ascending iterator over a snapshot of the current version.
    pub fn iter(&self) -> Iter<T> {
        Iter {
            payload: self.payload(),
            index: 0,
        }
    }

    fn install_element_hooks(&self, index: usize, value: &T) {
        let vtree = self.shared.vtree.clone();
        let version = self.version();
        let shared_dyn: Rc<dyn VersionedStructure> = self.shared.clone();
        let structure: Weak<dyn VersionedStructure> = Rc::downgrade(&shared_dyn);
        let at = version.clone();
        value.attach_parent(ParentLink {
            structure,
            parent_version: version,
            notifier: Rc::new(move |_, new_value: &T| {
                let mut vec = (*vtree.get_value(&at)).clone();
                vec[index] = new_value.clone();
                vtree.insert(&at, Rc::new(vec))
            }),
        });
    }

    fn adopt(&self, v: Version) {
        assert!(!v.is_empty(), "cannot adopt the empty version");
        let _scope = ChangeScope::new(self, ChangeCause::Mutation);
        *self.shared.core.current.borrow_mut() = v;
    }
}

/// Index-ascending iterator over one version's payload.
pub struct Iter<T: PersistentValue> {
    payload: VecPayload<T>,
    index: usize,
}

impl<T: PersistentValue> Iterator for Iter<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        let value = self.payload.get(self.index)?.clone();
        self.index += 1;
        Some(value)
    }
}

impl<T: PersistentValue> IntoIterator for &PersistentVector<T> {
    type Item = T;
    type IntoIter = Iter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: PersistentValue> Default for PersistentVector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PersistentValue> Clone for PersistentVector<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::new(VecShared {
                vtree: self.shared.vtree.clone(),
                core: self.shared.core.snapshot(),
            }),
        }
    }
}

impl<T: PersistentValue> PartialEq for PersistentVector<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.shared.vtree, &other.shared.vtree)
            && *self.shared.core.current.borrow() == *other.shared.core.current.borrow()
    }
}

impl<T: PersistentValue> Persistent for PersistentVector<T> {
    fn version(&self) -> Version {
        self.shared.core.current.borrow().clone()
    }

    fn set_version(&mut self, v: Version) {
        self.adopt(v);
    }

    fn with_version(&self, v: Version) -> Self {
        assert!(!v.is_empty(), "cannot pin a handle to the empty version");
        Self {
            shared: Rc::new(VecShared {
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

impl<T: PersistentValue> PersistentValue for PersistentVector<T> {
    fn attach_parent(&self, link: ParentLink<Self>) {
        self.shared.core.install(link);
    }
}

impl<T: PersistentValue> Notifiable for PersistentVector<T> {
    fn scope_version(&self) -> Version {
        self.version()
    }

    fn fire_changed(&self, cause: ChangeCause) {
        notify_changed(self, &self.shared.core, cause);
    }
}

impl<T: PersistentValue> VersionedStructure for VecShared<T> {
    fn structure_version(&self) -> Version {
        self.core.current.borrow().clone()
    }

    fn adopt_version(self: Rc<Self>, v: Version) {
        PersistentVector::from_shared(self).adopt(v);
    }
}

impl<T: PersistentValue + fmt::Display> fmt::Display for PersistentVector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for value in self.iter() {
            writeln!(f, "{value}")?;
        }
        Ok(())
    }
}
