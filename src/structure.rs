//! The shared persistent-structure contract.
//!
//! Every container in this crate implements [`Persistent`]: a handle with a
//! current version, an undo/redo history, and optional parent linkage for when
//! the container is stored inside another persistent container. This module
//! holds the pieces they share:
//!
//! - [`Persistent`], the public handle contract;
//! - [`PersistentValue`], the capability trait that lets containers detect
//!   whether a stored value is itself persistent and wire change propagation
//!   into it (plain values take a no-op path);
//! - `StructureCore`, the per-handle state, and `notify_changed`, the
//!   post-mutation hook that records history, invokes the parent notifier and
//!   bubbles the new outer version up the parent chain;
//! - `ChangeScope`, the drop guard ensuring the hook fires exactly once per
//!   top-level mutation.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::version::history::VersionHistory;
use crate::version::Version;

/// Type-erased edge from a nested value back to its enclosing structure, used
/// to bubble a freshly branched outer version up the parent chain.
pub(crate) trait VersionedStructure {
    fn structure_version(&self) -> Version;
    /// Adopt `v` as the structure's current version, firing its own change
    /// chain in turn.
    fn adopt_version(self: Rc<Self>, v: Version);
}

/// Change notifier installed on a nested value. Receives the inner value's new
/// current version and the inner value itself; lifts the mutation into the
/// enclosing container and returns the resulting outer version.
pub(crate) type ChangeNotifier<S> = Rc<dyn Fn(&Version, &S) -> Version>;

/// Parent linkage handed to [`PersistentValue::attach_parent`] when a
/// persistent value is read out of a slot of an enclosing container.
pub struct ParentLink<S> {
    pub(crate) structure: Weak<dyn VersionedStructure>,
    pub(crate) parent_version: Version,
    pub(crate) notifier: ChangeNotifier<S>,
}

/// Capability trait for values stored inside persistent containers.
///
/// Containers implement it by installing the given [`ParentLink`], so that
/// mutating a value read out of a container surfaces as a fresh version of the
/// container as well. Plain values keep the default no-op. Custom value types
/// opt in with an empty impl:
///
/// ```rust
/// use verso::PersistentValue;
///
/// #[derive(Clone, PartialEq)]
/// struct Rgb(u8, u8, u8);
///
/// impl PersistentValue for Rgb {}
/// ```
pub trait PersistentValue: Clone + PartialEq + 'static {
    #[doc(hidden)]
    fn attach_parent(&self, link: ParentLink<Self>) {
        let _ = link;
    }
}

macro_rules! plain_persistent_value {
    ($($t:ty),* $(,)?) => {
        $(impl PersistentValue for $t {})*
    };
}

plain_persistent_value!(
    (),
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    f32,
    f64,
    String,
    &'static str,
);

/// The contract every persistent container handle implements.
///
/// A handle is a lightweight navigator over a shared history: cloning one
/// produces an independent snapshot over the same version tree, and
/// [`with_version`](Persistent::with_version) produces a sibling pinned to any
/// other version. Mutations through one handle never disturb what sibling
/// handles observe at their versions.
pub trait Persistent: Clone {
    /// The version this handle currently observes.
    fn version(&self) -> Version;

    /// Move this handle to another version of the same history, firing the
    /// change chain. `v` must be non-empty and belong to this history.
    fn set_version(&mut self, v: Version);

    /// A sibling handle over the same history pinned to `v`, with a fresh
    /// undo/redo history and no parent linkage. The receiver is untouched.
    fn with_version(&self, v: Version) -> Self;

    /// Step this handle back to the version before its latest recorded change.
    /// No-op when there is nothing to undo.
    fn undo(&mut self);

    /// Replay the most recently undone change. No-op when there is nothing to
    /// redo.
    fn redo(&mut self);

    /// The version of the enclosing container this value was read out of, or
    /// the empty version for a standalone handle.
    fn parent_version(&self) -> Version;
}

/// Why a change notification fired. Undo/redo navigation skips the history
/// record so it does not erase its own redo stack.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChangeCause {
    Mutation,
    Navigation,
}

/// Per-handle state shared by every container implementation.
pub(crate) struct StructureCore<S> {
    pub(crate) current: RefCell<Version>,
    pub(crate) parent_version: RefCell<Version>,
    pub(crate) parent: RefCell<Option<Weak<dyn VersionedStructure>>>,
    pub(crate) on_change: RefCell<Option<ChangeNotifier<S>>>,
    pub(crate) history: RefCell<VersionHistory>,
}

impl<S> StructureCore<S> {
    pub(crate) fn new(initial: Version) -> Self {
        Self {
            current: RefCell::new(initial.clone()),
            parent_version: RefCell::new(Version::default()),
            parent: RefCell::new(None),
            on_change: RefCell::new(None),
            history: RefCell::new(VersionHistory::new(initial)),
        }
    }

    /// Snapshot this handle's state for an independent sibling handle. The
    /// notifier and parent edge are shared, the version and history are copied.
    pub(crate) fn snapshot(&self) -> Self {
        Self {
            current: RefCell::new(self.current.borrow().clone()),
            parent_version: RefCell::new(self.parent_version.borrow().clone()),
            parent: RefCell::new(self.parent.borrow().clone()),
            on_change: RefCell::new(self.on_change.borrow().clone()),
            history: RefCell::new(self.history.borrow().clone()),
        }
    }

    pub(crate) fn install(&self, link: ParentLink<S>) {
        *self.parent.borrow_mut() = Some(link.structure);
        *self.parent_version.borrow_mut() = link.parent_version;
        *self.on_change.borrow_mut() = Some(link.notifier);
    }
}

/// The `version_changed` hook shared by all containers: record the new version
/// in the handle's history (mutations only), then, when this value lives inside
/// another persistent container, invoke the notifier to lift the change into a
/// fresh outer version and let the parent adopt it if it has not diverged from
/// the version the value was read at.
pub(crate) fn notify_changed<S>(container: &S, core: &StructureCore<S>, cause: ChangeCause) {
    let current = core.current.borrow().clone();
    if cause == ChangeCause::Mutation {
        core.history.borrow_mut().record(current.clone());
    }

    let notifier = core.on_change.borrow().clone();
    let Some(notifier) = notifier else {
        return;
    };

    let fixed = core.parent_version.borrow().clone();
    let new_parent = notifier(&current, container);
    *core.parent_version.borrow_mut() = new_parent.clone();

    let parent = core.parent.borrow().as_ref().and_then(Weak::upgrade);
    if let Some(parent) = parent {
        if parent.structure_version() == fixed {
            parent.adopt_version(new_parent);
        }
    }
}

/// Containers plug their state into [`ChangeScope`] through this trait.
pub(crate) trait Notifiable {
    fn scope_version(&self) -> Version;
    fn fire_changed(&self, cause: ChangeCause);
}

/// Stack guard around a top-level mutation. Captures the version on entry and
/// fires the change hook on exit iff the version moved, so every mutating
/// method notifies at most once no matter how many internal helpers branch.
pub(crate) struct ChangeScope<'a, S: Notifiable> {
    target: &'a S,
    before: Version,
    cause: ChangeCause,
}

impl<'a, S: Notifiable> ChangeScope<'a, S> {
    pub(crate) fn new(target: &'a S, cause: ChangeCause) -> Self {
        Self {
            before: target.scope_version(),
            target,
            cause,
        }
    }
}

impl<S: Notifiable> Drop for ChangeScope<'_, S> {
    fn drop(&mut self) {
        if self.target.scope_version() != self.before {
            self.target.fire_changed(self.cause);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Probe {
        version: RefCell<Version>,
        fired: Cell<usize>,
    }

    impl Notifiable for Probe {
        fn scope_version(&self) -> Version {
            self.version.borrow().clone()
        }

        fn fire_changed(&self, _cause: ChangeCause) {
            self.fired.set(self.fired.get() + 1);
        }
    }

    #[test]
    fn test_scope_fires_once_on_change() {
        let tree = crate::version::tree::VersionTree::new(0);
        let probe = Probe {
            version: RefCell::new(tree.root_version()),
            fired: Cell::new(0),
        };

        {
            let _scope = ChangeScope::new(&probe, ChangeCause::Mutation);
            let next = tree.insert(&tree.root_version(), 1);
            *probe.version.borrow_mut() = next;
        }
        assert_eq!(probe.fired.get(), 1);

        {
            let _scope = ChangeScope::new(&probe, ChangeCause::Mutation);
            // No version change, no notification.
        }
        assert_eq!(probe.fired.get(), 1);
    }

    #[test]
    fn test_plain_values_take_noop_path() {
        // The default attach_parent ignores the link entirely.
        let tree = crate::version::tree::VersionTree::new(0u32);
        let value = 17i32;
        let weak: Weak<dyn VersionedStructure> = Weak::<Dummy>::new();
        value.attach_parent(ParentLink {
            structure: weak,
            parent_version: tree.root_version(),
            notifier: Rc::new(|_, _| Version::default()),
        });
        assert_eq!(value, 17);
    }

    struct Dummy;

    impl VersionedStructure for Dummy {
        fn structure_version(&self) -> Version {
            Version::default()
        }

        fn adopt_version(self: Rc<Self>, _v: Version) {}
    }
}
