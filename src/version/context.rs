//! Per-call version context threaded through node operations.

use std::rc::{Rc, Weak};

use crate::structure::VersionedStructure;
use crate::version::tree::VersionTree;
use crate::version::Version;

/// The `(owning structure, version, version tree)` bundle every node-level call
/// receives. Node code never caches a context; nested-value change notifiers
/// close over one to re-enter the enclosing container at the right version.
///
/// `P` is the payload type of the version tree, i.e. the container's root
/// pointer type.
pub(crate) struct VersionContext<P> {
    pub(crate) structure: Weak<dyn VersionedStructure>,
    pub(crate) version: Version,
    pub(crate) vtree: Rc<VersionTree<P>>,
}

impl<P> VersionContext<P> {
    pub(crate) fn new(
        structure: Weak<dyn VersionedStructure>,
        version: Version,
        vtree: Rc<VersionTree<P>>,
    ) -> Self {
        Self {
            structure,
            version,
            vtree,
        }
    }

    /// The same structure and tree, rebased onto another version.
    pub(crate) fn at(&self, version: Version) -> Self {
        Self {
            structure: self.structure.clone(),
            version,
            vtree: self.vtree.clone(),
        }
    }
}

impl<P> Clone for VersionContext<P> {
    fn clone(&self) -> Self {
        self.at(self.version.clone())
    }
}
