use std::collections::HashSet;

use crate::comments::CommentId;

/// Per-comment "collapsed" flags. Unknown ids are expanded.
///
/// Flags are independent: collapsing a comment hides its subtree from the
/// visible order but leaves the descendants' own flags alone, so expanding
/// it again restores whatever they were.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollapseState {
    collapsed: HashSet<CommentId>,
}

impl CollapseState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_collapsed(&self, id: CommentId) -> bool {
        self.collapsed.contains(&id)
    }

    /// Flips the flag and returns the new value.
    pub fn toggle(&mut self, id: CommentId) -> bool {
        if self.collapsed.remove(&id) {
            false
        } else {
            self.collapsed.insert(id);
            true
        }
    }

    /// Returns whether anything changed.
    pub fn collapse(&mut self, id: CommentId) -> bool {
        self.collapsed.insert(id)
    }

    /// Returns whether anything changed.
    pub fn expand(&mut self, id: CommentId) -> bool {
        self.collapsed.remove(&id)
    }

    pub fn expand_all(&mut self) -> bool {
        let changed = !self.collapsed.is_empty();
        self.collapsed.clear();
        changed
    }

    pub fn collapsed_count(&self) -> usize {
        self.collapsed.len()
    }

    pub fn clear(&mut self) {
        self.collapsed.clear();
    }
}
