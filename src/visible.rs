use std::collections::HashSet;

use crate::collapse::CollapseState;
use crate::comments::{CommentId, CommentTree};

/// A comment as it appears in the rendered thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleComment {
    pub id: CommentId,
    pub depth: usize,
}

/// Ids of the comments currently on screen, in reading order: a pre-order
/// walk from the roots that does not descend into collapsed comments.
pub fn visible_order(tree: &CommentTree, collapse: &CollapseState) -> Vec<CommentId> {
    visible_rows(tree, collapse)
        .into_iter()
        .map(|row| row.id)
        .collect()
}

pub fn visible_rows(tree: &CommentTree, collapse: &CollapseState) -> Vec<VisibleComment> {
    let mut rows = Vec::with_capacity(tree.len());
    let mut seen = HashSet::with_capacity(tree.len());
    let mut stack: Vec<VisibleComment> = tree
        .roots()
        .iter()
        .rev()
        .map(|&id| VisibleComment { id, depth: 0 })
        .collect();

    while let Some(row) = stack.pop() {
        if !seen.insert(row.id) {
            continue;
        }
        rows.push(row);
        if collapse.is_collapsed(row.id) {
            continue;
        }
        stack.extend(
            tree.children(Some(row.id))
                .iter()
                .rev()
                .map(|&id| VisibleComment {
                    id,
                    depth: row.depth + 1,
                }),
        );
    }

    rows
}

pub fn position_of(order: &[CommentId], id: CommentId) -> Option<usize> {
    order.iter().position(|candidate| *candidate == id)
}
