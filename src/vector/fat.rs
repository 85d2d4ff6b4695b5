//! The fat-node-backed sequence.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::list::PersistentList;
use crate::structure::{
    notify_changed, ChangeCause, ChangeScope, Notifiable, ParentLink, Persistent, PersistentValue,
    StructureCore, VersionedStructure,
};
use crate::version::tree::VersionTree;
use crate::version::Version;

/// Mod log capacity for a single-field cell.
pub(crate) const CELL_MOD_CAPACITY: usize = 4;

type SeqCellRef<T> = Rc<SeqCell<T>>;

struct CellMod<T> {
    version: Version,
    value: T,
}

impl<T: Clone> Clone for CellMod<T> {
    fn clone(&self) -> Self {
        Self {
            version: self.version.clone(),
            value: self.value.clone(),
        }
    }
}

/// A single-field fat cell holding one element's history. Cells stand alone:
/// a split has no neighbors or root to retarget, only the forwarding entry.
struct SeqCell<T: PersistentValue> {
    value: T,
    mods: RefCell<SmallVec<[CellMod<T>; CELL_MOD_CAPACITY]>>,
    forwards: RefCell<Vec<(Version, SeqCellRef<T>)>>,
}

impl<T: PersistentValue> SeqCell<T> {
    fn new(value: T) -> SeqCellRef<T> {
        Rc::new(SeqCell {
            value,
            mods: RefCell::new(SmallVec::new()),
            forwards: RefCell::new(Vec::new()),
        })
    }

    fn resolve(cell: &SeqCellRef<T>, v: &Version) -> SeqCellRef<T> {
        let mut current = cell.clone();
        loop {
            let next = {
                let forwards = current.forwards.borrow();
                let mut best: Option<&(Version, SeqCellRef<T>)> = None;
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

    fn latest_in<'a>(mods: &'a [CellMod<T>], v: &Version) -> Option<&'a CellMod<T>> {
        let mut best: Option<&CellMod<T>> = None;
        for entry in mods {
            if !(entry.version <= *v) {
                continue;
            }
            if best.map_or(true, |b| b.version <= entry.version) {
                best = Some(entry);
            }
        }
        best
    }

    fn read(cell: &SeqCellRef<T>, v: &Version) -> T {
        let cell = Self::resolve(cell, v);
        let mods = cell.mods.borrow();
        match Self::latest_in(&mods, v) {
            Some(m) => m.value.clone(),
            None => cell.value.clone(),
        }
    }

    fn write(cell: &SeqCellRef<T>, v: &Version, value: T) {
        let cell = Self::resolve(cell, v);
        let full = cell.mods.borrow().len() == CELL_MOD_CAPACITY;
        if full {
            let successor = Self::split(&cell, v);
            return Self::write(&successor, v, value);
        }
        cell.mods.borrow_mut().push(CellMod {
            version: v.clone(),
            value,
        });
    }

    fn split(cell: &SeqCellRef<T>, v: &Version) -> SeqCellRef<T> {
        let successor = {
            let mods = cell.mods.borrow();
            debug_assert_eq!(mods.len(), CELL_MOD_CAPACITY, "split of a non-full cell");
            let head = &mods[..mods.len() / 2];
            let baseline = match Self::latest_in(head, v) {
                Some(m) => m.value.clone(),
                None => cell.value.clone(),
            };
            let tail: SmallVec<[CellMod<T>; CELL_MOD_CAPACITY]> =
                mods[mods.len() / 2..].iter().cloned().collect();
            Rc::new(SeqCell {
                value: baseline,
                mods: RefCell::new(tail),
                forwards: RefCell::new(Vec::new()),
            })
        };
        cell.forwards
            .borrow_mut()
            .push((v.clone(), successor.clone()));
        successor
    }
}

/// A fully persistent sequence backed by one fat cell per element.
///
/// The version tree's payload is the sequence length at each version, so
/// structural history (push, resize, erase) restores correctly when
/// navigating versions; the cell table itself is shared across all versions
/// and only ever grows.
///
/// ## Examples
///
/// ```rust
/// use verso::{FatVector, Persistent};
///
/// let mut seq = FatVector::new();
/// seq.resize(3, 0);
/// seq.update(1, 7);
/// let filled = seq.version();
///
/// assert_eq!(seq.get(1), Some(7));
///
/// seq.remove(0);
/// assert_eq!(seq.len(), 2);
/// assert_eq!(seq.get(0), Some(7));
///
/// assert_eq!(seq.with_version(filled).get(0), Some(0));
/// ```
pub struct FatVector<T: PersistentValue> {
    shared: Rc<FatShared<T>>,
}

struct FatShared<T: PersistentValue> {
    vtree: Rc<VersionTree<usize>>,
    cells: Rc<RefCell<Vec<SeqCellRef<T>>>>,
    core: StructureCore<FatVector<T>>,
}

impl<T: PersistentValue> FatVector<T> {
    /// Create an empty sequence with a fresh version tree.
    pub fn new() -> Self {
        let vtree = Rc::new(VersionTree::new(0));
        let root = vtree.root_version();
        Self {
            shared: Rc::new(FatShared {
                vtree,
                cells: Rc::new(RefCell::new(Vec::new())),
                core: StructureCore::new(root),
            }),
        }
    }

    /// Snapshot a persistent list's current contents into a fresh sequence.
    pub fn from_list(list: &PersistentList<T>) -> Self {
        let values: Vec<T> = list.iter().collect();
        let vtree = Rc::new(VersionTree::new(values.len()));
        let root = vtree.root_version();
        let cells = values.into_iter().map(SeqCell::new).collect();
        Self {
            shared: Rc::new(FatShared {
                vtree,
                cells: Rc::new(RefCell::new(cells)),
                core: StructureCore::new(root),
            }),
        }
    }

    fn from_shared(shared: Rc<FatShared<T>>) -> Self {
        Self { shared }
    }

    /// Length at the current version.
    pub fn len(&self) -> usize {
        self.shared.vtree.get_value(&self.version())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn branch_version(&self, len: usize) -> Version {
        let current = self.version();
        let next = self.shared.vtree.insert(&current, len);
        *self.shared.core.current.borrow_mut() = next.clone();
        next
    }

    fn cell(&self, index: usize) -> SeqCellRef<T> {
        self.shared.cells.borrow()[index].clone()
    }

    /// Write `value` into slot `index` at version `v`, growing the cell table
    /// when the slot is brand new.
    fn place(&self, index: usize, value: T, v: &Version) {
        let cell = {
            let mut cells = self.shared.cells.borrow_mut();
            if index == cells.len() {
                cells.push(SeqCell::new(value));
                return;
            }
            debug_assert!(index < cells.len(), "cell table skipped an index");
            cells[index].clone()
        };
        SeqCell::write(&cell, v, value);
    }

    /// Element at `index`, with parent hooks installed.
    pub fn get(&self, index: usize) -> Option<T> {
        if index >= self.len() {
            return None;
        }
        let value = SeqCell::read(&self.cell(index), &self.version());
        self.install_element_hooks(index, &value);
        Some(value)
    }

    /// Overwrite the element at `index` in place. Panics when out of bounds.
    pub fn update(&mut self, index: usize, value: T) {
        assert!(index < self.len(), "index {index} out of bounds");
        let _scope = ChangeScope::new(self, ChangeCause::Mutation);
        let len = self.len();
        let version = self.branch_version(len);
        SeqCell::write(&self.cell(index), &version, value);
    }

    pub fn push_back(&mut self, value: T) {
        let _scope = ChangeScope::new(self, ChangeCause::Mutation);
        let len = self.len();
        let version = self.branch_version(len + 1);
        self.place(len, value, &version);
    }

    /// Grow or shrink to `new_len`; new slots are filled with `fill`.
    pub fn resize(&mut self, new_len: usize, fill: T) {
        let _scope = ChangeScope::new(self, ChangeCause::Mutation);
        let len = self.len();
        let version = self.branch_version(new_len);
        for index in len..new_len {
            self.place(index, fill.clone(), &version);
        }
    }

    /// Remove and return the element at `index`, shifting the tail left one
    /// versioned write per element. Out-of-bounds indices are a no-op.
    pub fn remove(&mut self, index: usize) -> Option<T> {
        let len = self.len();
        if index >= len {
            return None;
        }
        let _scope = ChangeScope::new(self, ChangeCause::Mutation);
        let removed = SeqCell::read(&self.cell(index), &self.version());
        let version = self.branch_version(len - 1);
        for i in index..len - 1 {
            let shifted = SeqCell::read(&self.cell(i + 1), &version);
            SeqCell::write(&self.cell(i), &version, shifted);
        }
        Some(removed)
    }

    /// Index-ascending iterator over the elements at the current version.
    pub fn iter(&self) -> Iter<T> {
        Iter {
            vec: self.clone(),
            index: 0,
        }
    }

    fn install_element_hooks(&self, index: usize, value: &T) {
        let vtree = self.shared.vtree.clone();
        let cells = self.shared.cells.clone();
        let shared_dyn: Rc<dyn VersionedStructure> = self.shared.clone();
        let structure: Weak<dyn VersionedStructure> = Rc::downgrade(&shared_dyn);
        let at = self.version();
        value.attach_parent(ParentLink {
            structure,
            parent_version: at.clone(),
            notifier: Rc::new(move |_, new_value: &T| {
                let len = vtree.get_value(&at);
                let next = vtree.insert(&at, len);
                let cell = cells.borrow()[index].clone();
                SeqCell::write(&cell, &next, new_value.clone());
                next
            }),
        });
    }

    fn adopt(&self, v: Version) {
        assert!(!v.is_empty(), "cannot adopt the empty version");
        let _scope = ChangeScope::new(self, ChangeCause::Mutation);
        *self.shared.core.current.borrow_mut() = v;
    }
}

/// Index-ascending iterator reading through a snapshot handle, so it keeps
/// yielding the version it was created at even while the source mutates.
pub struct Iter<T: PersistentValue> {
    vec: FatVector<T>,
    index: usize,
}

impl<T: PersistentValue> Iterator for Iter<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        let value = self.vec.get(self.index)?;
        self.index += 1;
        Some(value)
    }
}

impl<T: PersistentValue> IntoIterator for &FatVector<T> {
    type Item = T;
    type IntoIter = Iter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: PersistentValue> Default for FatVector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PersistentValue> Clone for FatVector<T> {
    /// Snapshot semantics; the cell table and version tree are shared.
    fn clone(&self) -> Self {
        Self {
            shared: Rc::new(FatShared {
                vtree: self.shared.vtree.clone(),
                cells: self.shared.cells.clone(),
                core: self.shared.core.snapshot(),
            }),
        }
    }
}

impl<T: PersistentValue> PartialEq for FatVector<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.shared.vtree, &other.shared.vtree)
            && *self.shared.core.current.borrow() == *other.shared.core.current.borrow()
    }
}

impl<T: PersistentValue> Persistent for FatVector<T> {
    fn version(&self) -> Version {
        self.shared.core.current.borrow().clone()
    }

    fn set_version(&mut self, v: Version) {
        self.adopt(v);
    }

    fn with_version(&self, v: Version) -> Self {
        assert!(!v.is_empty(), "cannot pin a handle to the empty version");
        Self {
            shared: Rc::new(FatShared {
                vtree: self.shared.vtree.clone(),
                cells: self.shared.cells.clone(),
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

impl<T: PersistentValue> PersistentValue for FatVector<T> {
    fn attach_parent(&self, link: ParentLink<Self>) {
        self.shared.core.install(link);
    }
}

impl<T: PersistentValue> Notifiable for FatVector<T> {
    fn scope_version(&self) -> Version {
        self.version()
    }

    fn fire_changed(&self, cause: ChangeCause) {
        notify_changed(self, &self.shared.core, cause);
    }
}

impl<T: PersistentValue> VersionedStructure for FatShared<T> {
    fn structure_version(&self) -> Version {
        self.core.current.borrow().clone()
    }

    fn adopt_version(self: Rc<Self>, v: Version) {
        FatVector::from_shared(self).adopt(v);
    }
}

impl<T: PersistentValue + fmt::Display> fmt::Display for FatVector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for value in self.iter() {
            writeln!(f, "{value}")?;
        }
        Ok(())
    }
}
