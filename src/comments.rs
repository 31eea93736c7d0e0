use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type CommentId = i64;

/// One comment as delivered by the story loader. Only `id` and `parent_id`
/// are interpreted; the rest is display data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    #[serde(default)]
    pub story_id: i64,
    #[serde(default)]
    pub parent_id: Option<CommentId>,
    #[serde(default, rename = "by")]
    pub author: String,
    #[serde(default, rename = "text")]
    pub body: String,
    #[serde(default, rename = "time")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Comment {
    pub fn new(id: CommentId, parent_id: Option<CommentId>) -> Self {
        Self {
            id,
            story_id: 0,
            parent_id,
            author: String::new(),
            body: String::new(),
            timestamp: None,
        }
    }
}

/// What to do with a comment whose parent is not part of the thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    #[default]
    Root,
    Drop,
    Reject,
}

impl OrphanPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "root" => Some(OrphanPolicy::Root),
            "drop" => Some(OrphanPolicy::Drop),
            "reject" => Some(OrphanPolicy::Reject),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("comment {id} references missing parent {parent}")]
    OrphanedComment { id: CommentId, parent: CommentId },
}

/// Arena of comments plus a `parent -> children` index built once per load.
///
/// Children keep the order in which they appeared in the input. `None` keys
/// the roots.
#[derive(Debug, Clone, Default)]
pub struct CommentTree {
    comments: Vec<Comment>,
    positions: HashMap<CommentId, usize>,
    children: HashMap<Option<CommentId>, Vec<CommentId>>,
}

impl CommentTree {
    pub fn new(comments: Vec<Comment>) -> Self {
        match Self::build(comments, OrphanPolicy::Root) {
            Ok(tree) => tree,
            // The root policy never rejects.
            Err(_) => Self::default(),
        }
    }

    pub fn build(comments: Vec<Comment>, policy: OrphanPolicy) -> Result<Self, TreeError> {
        let mut arena = Vec::with_capacity(comments.len());
        let mut positions = HashMap::with_capacity(comments.len());
        for comment in comments {
            if positions.contains_key(&comment.id) {
                tracing::warn!(id = comment.id, "skipping duplicate comment id");
                continue;
            }
            positions.insert(comment.id, arena.len());
            arena.push(comment);
        }

        let mut children: HashMap<Option<CommentId>, Vec<CommentId>> = HashMap::new();
        for comment in &arena {
            let key = match comment.parent_id {
                None => None,
                Some(parent) if positions.contains_key(&parent) => Some(parent),
                Some(parent) => match policy {
                    OrphanPolicy::Root => None,
                    OrphanPolicy::Drop => {
                        tracing::debug!(id = comment.id, parent, "dropping orphaned comment");
                        continue;
                    }
                    OrphanPolicy::Reject => {
                        return Err(TreeError::OrphanedComment {
                            id: comment.id,
                            parent,
                        });
                    }
                },
            };
            children.entry(key).or_default().push(comment.id);
        }

        let tree = Self {
            comments: arena,
            positions,
            children,
        };
        let detached = tree.detached_count();
        if detached > 0 {
            tracing::warn!(detached, "comments unreachable from any root");
        }
        Ok(tree)
    }

    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    pub fn contains(&self, id: CommentId) -> bool {
        self.positions.contains_key(&id)
    }

    pub fn get(&self, id: CommentId) -> Option<&Comment> {
        self.positions
            .get(&id)
            .and_then(|&index| self.comments.get(index))
    }

    /// Comments in input order, duplicates removed.
    pub fn iter(&self) -> impl Iterator<Item = &Comment> {
        self.comments.iter()
    }

    pub fn roots(&self) -> &[CommentId] {
        self.children(None)
    }

    /// Direct children of `parent` (`None` for roots) in input order.
    pub fn children(&self, parent: Option<CommentId>) -> &[CommentId] {
        self.children
            .get(&parent)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_children(&self, id: CommentId) -> bool {
        !self.children(Some(id)).is_empty()
    }

    /// Number of comments transitively below `id`.
    pub fn descendant_count(&self, id: CommentId) -> usize {
        let mut seen = HashSet::from([id]);
        let mut stack: Vec<CommentId> = self.children(Some(id)).to_vec();
        let mut count = 0;
        while let Some(next) = stack.pop() {
            if !seen.insert(next) {
                continue;
            }
            count += 1;
            stack.extend_from_slice(self.children(Some(next)));
        }
        count
    }

    /// Distance from the root along resolved parents. Bounded by the
    /// number of comments even when parents form a cycle.
    pub fn depth(&self, id: CommentId) -> usize {
        let mut depth = 0;
        let mut current = id;
        while let Some(parent) = self.resolved_parent(current) {
            depth += 1;
            if depth >= self.comments.len() {
                break;
            }
            current = parent;
        }
        depth
    }

    fn resolved_parent(&self, id: CommentId) -> Option<CommentId> {
        self.get(id)
            .and_then(|comment| comment.parent_id)
            .filter(|parent| self.contains(*parent))
    }

    /// Comments that a walk from the roots never reaches: members of parent
    /// cycles, their subtrees, and orphans removed by [`OrphanPolicy::Drop`].
    pub fn detached_count(&self) -> usize {
        let mut seen = HashSet::new();
        let mut stack: Vec<CommentId> = self.roots().to_vec();
        while let Some(next) = stack.pop() {
            if seen.insert(next) {
                stack.extend_from_slice(self.children(Some(next)));
            }
        }
        self.comments.len().saturating_sub(seen.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread(pairs: &[(CommentId, Option<CommentId>)]) -> Vec<Comment> {
        pairs
            .iter()
            .map(|(id, parent)| Comment::new(*id, *parent))
            .collect()
    }

    #[test]
    fn children_keep_input_order() {
        let tree = CommentTree::new(thread(&[
            (1, None),
            (5, Some(1)),
            (2, None),
            (3, Some(1)),
            (4, Some(1)),
        ]));
        assert_eq!(tree.roots(), &[1, 2]);
        assert_eq!(tree.children(Some(1)), &[5, 3, 4]);
        assert!(tree.children(Some(2)).is_empty());
    }

    #[test]
    fn descendant_count_is_transitive() {
        let tree = CommentTree::new(thread(&[(1, None), (2, Some(1)), (3, Some(1)), (4, Some(2))]));
        assert_eq!(tree.descendant_count(1), 3);
        assert_eq!(tree.descendant_count(2), 1);
        assert_eq!(tree.descendant_count(3), 0);
        assert_eq!(tree.descendant_count(99), 0);
    }

    #[test]
    fn orphan_becomes_root_by_default() {
        let tree = CommentTree::new(thread(&[(1, None), (2, Some(42)), (3, Some(2))]));
        assert_eq!(tree.roots(), &[1, 2]);
        assert_eq!(tree.descendant_count(2), 1);
        assert_eq!(tree.depth(3), 1);
    }

    #[test]
    fn orphan_drop_removes_subtree() {
        let tree = CommentTree::build(
            thread(&[(1, None), (2, Some(42)), (3, Some(2))]),
            OrphanPolicy::Drop,
        )
        .unwrap();
        assert_eq!(tree.roots(), &[1]);
        assert_eq!(tree.detached_count(), 2);
    }

    #[test]
    fn orphan_reject_reports_first_offender() {
        let err = CommentTree::build(thread(&[(1, None), (2, Some(42))]), OrphanPolicy::Reject)
            .unwrap_err();
        assert_eq!(err, TreeError::OrphanedComment { id: 2, parent: 42 });
    }

    #[test]
    fn duplicate_ids_keep_first_occurrence() {
        let mut comments = thread(&[(1, None), (2, Some(1))]);
        let mut dup = Comment::new(2, None);
        dup.body = "second".into();
        comments.push(dup);
        let tree = CommentTree::new(comments);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.roots(), &[1]);
        assert_eq!(tree.get(2).map(|c| c.parent_id), Some(Some(1)));
    }

    #[test]
    fn cycles_are_bounded() {
        // 2 and 3 point at each other; 4 hangs off the cycle.
        let tree = CommentTree::new(thread(&[(1, None), (2, Some(3)), (3, Some(2)), (4, Some(3))]));
        assert_eq!(tree.roots(), &[1]);
        assert_eq!(tree.descendant_count(2), 2);
        assert!(tree.depth(4) <= tree.len());
        assert_eq!(tree.detached_count(), 3);
    }

    #[test]
    fn self_parent_is_detached() {
        let tree = CommentTree::new(thread(&[(1, Some(1))]));
        assert!(tree.roots().is_empty());
        assert_eq!(tree.descendant_count(1), 0);
        assert_eq!(tree.detached_count(), 1);
    }

    #[test]
    fn deserializes_station_shape() {
        let raw = r#"[
            {"id": 10, "story_id": 7, "parent_id": null, "text": "<p>hi</p>", "by": "pg", "time": "2024-01-02T03:04:05Z"},
            {"id": 11, "story_id": 7, "parent_id": 10, "text": "reply", "by": "dang", "time": "2024-01-02T03:05:00Z"}
        ]"#;
        let comments: Vec<Comment> = serde_json::from_str(raw).unwrap();
        assert_eq!(comments[0].author, "pg");
        assert_eq!(comments[0].body, "<p>hi</p>");
        assert!(comments[0].timestamp.is_some());
        let tree = CommentTree::new(comments);
        assert_eq!(tree.children(Some(10)), &[11]);
    }
}
