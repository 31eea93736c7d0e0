use crate::collapse::CollapseState;
use crate::comments::{Comment, CommentId, CommentTree, OrphanPolicy, TreeError};
use crate::visible::{self, VisibleComment};

/// Navigation state for the discussion of one story: the comment tree, its
/// collapse flags, the active comment and the load cycle that feeds them.
///
/// Everything here is reset when the story changes. The visible order is
/// never stored; every query walks the tree again.
#[derive(Debug, Clone, Default)]
pub struct ThreadView {
    story_id: Option<i64>,
    tree: CommentTree,
    collapse: CollapseState,
    active: Option<CommentId>,
    loading: bool,
    auto_select_armed: bool,
    orphan_policy: OrphanPolicy,
}

/// Result of handing a finished comment load to the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied,
    /// The comments belong to a story that is no longer open.
    Stale,
    /// The tree could not be built; the view is left empty.
    Rejected(TreeError),
}

impl ThreadView {
    pub fn new(orphan_policy: OrphanPolicy) -> Self {
        Self {
            orphan_policy,
            ..Self::default()
        }
    }

    pub fn story_id(&self) -> Option<i64> {
        self.story_id
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn tree(&self) -> &CommentTree {
        &self.tree
    }

    pub fn comment(&self, id: CommentId) -> Option<&Comment> {
        self.tree.get(id)
    }

    pub fn active_comment_id(&self) -> Option<CommentId> {
        self.active
    }

    /// Starts a load cycle for `story_id`. Switching stories discards the
    /// previous tree, collapse flags and selection.
    pub fn begin_load(&mut self, story_id: i64) {
        if self.story_id != Some(story_id) {
            tracing::debug!(story_id, previous = ?self.story_id, "switching thread");
            self.story_id = Some(story_id);
            self.tree = CommentTree::default();
            self.collapse.clear();
            self.active = None;
        }
        self.loading = true;
        self.auto_select_armed = true;
    }

    pub fn finish_load(&mut self, story_id: i64, comments: Vec<Comment>) -> LoadOutcome {
        if self.story_id != Some(story_id) {
            tracing::debug!(story_id, current = ?self.story_id, "discarding stale comments");
            return LoadOutcome::Stale;
        }

        self.loading = false;
        let outcome = match CommentTree::build(comments, self.orphan_policy) {
            Ok(tree) => {
                self.tree = tree;
                LoadOutcome::Applied
            }
            Err(err) => {
                tracing::warn!(story_id, error = %err, "comment thread rejected");
                self.tree = CommentTree::default();
                LoadOutcome::Rejected(err)
            }
        };

        if self.active.is_some_and(|id| !self.is_visible(id)) {
            self.active = None;
        }
        if self.auto_select_armed && self.active.is_none() {
            self.active = self.visible_order().first().copied();
        }
        self.auto_select_armed = false;
        outcome
    }

    /// Closes the thread entirely (no story selected).
    pub fn close(&mut self) {
        let policy = self.orphan_policy;
        *self = Self::new(policy);
    }

    pub fn visible_order(&self) -> Vec<CommentId> {
        visible::visible_order(&self.tree, &self.collapse)
    }

    pub fn visible_rows(&self) -> Vec<VisibleComment> {
        visible::visible_rows(&self.tree, &self.collapse)
    }

    pub fn is_visible(&self, id: CommentId) -> bool {
        self.visible_order().contains(&id)
    }

    pub fn is_collapsed(&self, id: CommentId) -> bool {
        self.collapse.is_collapsed(id)
    }

    pub fn descendant_count(&self, id: CommentId) -> usize {
        self.tree.descendant_count(id)
    }

    pub fn collapsed_count(&self) -> usize {
        self.collapse.collapsed_count()
    }

    /// Selects a visible comment. Returns whether the selection changed.
    pub fn select_comment(&mut self, id: CommentId) -> bool {
        if self.loading || !self.is_visible(id) || self.active == Some(id) {
            return false;
        }
        self.active = Some(id);
        true
    }

    pub fn clear_selection(&mut self) {
        self.active = None;
    }

    pub fn select_next(&mut self) -> Option<CommentId> {
        self.step(1)
    }

    pub fn select_previous(&mut self) -> Option<CommentId> {
        self.step(-1)
    }

    /// Moves the selection and returns the newly active comment, or `None`
    /// when nothing moved. No selection (or one that is no longer visible)
    /// lands on the first visible comment.
    fn step(&mut self, delta: isize) -> Option<CommentId> {
        if self.loading {
            return None;
        }
        let order = self.visible_order();
        let current = self
            .active
            .and_then(|id| visible::position_of(&order, id));
        let next = match current {
            None => order.first().copied(),
            Some(index) => {
                let last = order.len().saturating_sub(1) as isize;
                let target = (index as isize + delta).clamp(0, last) as usize;
                if target == index {
                    None
                } else {
                    order.get(target).copied()
                }
            }
        }?;
        self.active = Some(next);
        Some(next)
    }

    pub fn toggle(&mut self, id: CommentId) -> bool {
        if self.loading || !self.tree.contains(id) {
            return false;
        }
        self.collapse.toggle(id);
        self.drop_hidden_selection();
        true
    }

    pub fn collapse(&mut self, id: CommentId) -> bool {
        if self.loading || !self.tree.contains(id) {
            return false;
        }
        let changed = self.collapse.collapse(id);
        self.drop_hidden_selection();
        changed
    }

    pub fn expand(&mut self, id: CommentId) -> bool {
        if self.loading || !self.tree.contains(id) {
            return false;
        }
        self.collapse.expand(id)
    }

    pub fn expand_all(&mut self) -> bool {
        if self.loading {
            return false;
        }
        self.collapse.expand_all()
    }

    // A collapsed ancestor hides the active comment: the selection goes away
    // and auto-select stays disarmed.
    fn drop_hidden_selection(&mut self) {
        if let Some(id) = self.active {
            if !self.is_visible(id) {
                tracing::debug!(id, "active comment hidden by collapse");
                self.active = None;
            }
        }
    }
}
