//! Undo/redo stacks recording the progression of a handle's current version.

use crate::version::Version;

/// Two stacks of versions. The undo stack always holds the handle's initial
/// version at the bottom and its current version at the top; undoing exposes
/// the previous entry, redoing replays popped ones. Any recorded change clears
/// the redo stack.
#[derive(Clone, Default)]
pub(crate) struct VersionHistory {
    undo: Vec<Version>,
    redo: Vec<Version>,
}

impl VersionHistory {
    pub(crate) fn new(initial: Version) -> Self {
        Self {
            undo: vec![initial],
            redo: Vec::new(),
        }
    }

    /// Record a version adopted by a mutation or an explicit version switch.
    pub(crate) fn record(&mut self, v: Version) {
        if self.undo.last() != Some(&v) {
            self.undo.push(v);
        }
        self.redo.clear();
    }

    /// Step back. Entries equal to the current version are skipped; the seed
    /// entry never pops, so an exhausted stack is a no-op.
    pub(crate) fn undo(&mut self, current: &Version) -> Option<Version> {
        while self.undo.len() > 1 {
            let popped = self.undo.pop().expect("undo stack checked non-empty");
            self.redo.push(popped);
            let top = self.undo.last().expect("seed entry remains").clone();
            if top != *current {
                return Some(top);
            }
        }
        None
    }

    /// Step forward again. No-op when nothing was undone.
    pub(crate) fn redo(&mut self, current: &Version) -> Option<Version> {
        while let Some(v) = self.redo.pop() {
            self.undo.push(v.clone());
            if v != *current {
                return Some(v);
            }
        }
        None
    }
}
