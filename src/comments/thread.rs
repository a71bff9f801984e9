// Thread organizer: flat comment list -> ordered forest
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::comments::domain::{Comment, CommentId};

/// One comment in the forest. Children are indices into the same arena.
#[derive(Debug, Clone)]
pub struct ThreadNode {
    pub comment: Comment,
    pub children: Vec<usize>,
    /// Descendants at any depth
    pub total_replies: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CommentForest {
    nodes: Vec<ThreadNode>,
    roots: Vec<usize>,
}

/// Owned, serializable rendering of a forest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadView {
    #[serde(flatten)]
    pub comment: Comment,
    pub total_replies: usize,
    pub replies: Vec<ThreadView>,
}

impl CommentForest {
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    pub fn node(&self, idx: usize) -> &ThreadNode {
        &self.nodes[idx]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn find(&self, id: &CommentId) -> Option<usize> {
        self.nodes.iter().position(|n| &n.comment.id == id)
    }

    /// All descendants of a node, at any depth.
    pub fn total_replies(&self, idx: usize) -> usize {
        self.nodes[idx].total_replies
    }

    pub fn to_view(&self) -> Vec<ThreadView> {
        self.roots.iter().map(|&r| self.view_of(r)).collect()
    }

    fn view_of(&self, idx: usize) -> ThreadView {
        let node = &self.nodes[idx];
        ThreadView {
            comment: node.comment.clone(),
            total_replies: self.total_replies(idx),
            replies: node.children.iter().map(|&c| self.view_of(c)).collect(),
        }
    }
}

/// Arrange comments into a forest.
///
/// Every input comment appears exactly once. Comments whose parent is
/// missing from the input, points at itself, or closes a cycle become
/// roots. Roots and every sibling list are ordered by
/// `(created_at, seq, input position)`. Soft-deleted comments stay in place.
pub fn organize(comments: Vec<Comment>) -> CommentForest {
    let n = comments.len();

    let mut index: HashMap<CommentId, usize> = HashMap::with_capacity(n);
    for (i, comment) in comments.iter().enumerate() {
        index.entry(comment.id.clone()).or_insert(i);
    }

    let mut parent: Vec<Option<usize>> = comments
        .iter()
        .enumerate()
        .map(|(i, c)| {
            c.parent_id
                .as_ref()
                .and_then(|p| index.get(p).copied())
                .filter(|&p| p != i)
        })
        .collect();

    break_cycles(&mut parent, &comments);

    let sort_key = |i: &usize| -> (DateTime<Utc>, i64, usize) {
        (comments[*i].created_at, comments[*i].seq, *i)
    };

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut roots = Vec::new();
    for (i, p) in parent.iter().enumerate() {
        match p {
            Some(p) => children[*p].push(i),
            None => roots.push(i),
        }
    }
    roots.sort_by_key(sort_key);
    for list in children.iter_mut() {
        list.sort_by_key(sort_key);
    }

    let totals = descendant_counts(&roots, &children, &parent);

    let nodes = comments
        .into_iter()
        .zip(children)
        .zip(totals)
        .map(|((comment, children), total_replies)| ThreadNode {
            comment,
            children,
            total_replies,
        })
        .collect();

    CommentForest { nodes, roots }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    Unseen,
    OnPath,
    Done,
}

/// Cut one link in every parent cycle, in a single pass over the input. The
/// lowest-positioned member of each cycle becomes a root.
fn break_cycles(parent: &mut [Option<usize>], comments: &[Comment]) {
    let mut state = vec![Visit::Unseen; parent.len()];
    let mut path = Vec::new();

    for start in 0..parent.len() {
        if state[start] != Visit::Unseen {
            continue;
        }

        let mut cursor = Some(start);
        while let Some(c) = cursor {
            match state[c] {
                Visit::Unseen => {
                    state[c] = Visit::OnPath;
                    path.push(c);
                    cursor = parent[c];
                }
                Visit::OnPath => {
                    let from = path.iter().position(|&p| p == c).unwrap_or(0);
                    if let Some(&cut) = path[from..].iter().min() {
                        tracing::warn!(
                            "Comment {} is part of a reply cycle, treating as root",
                            comments[cut].id
                        );
                        parent[cut] = None;
                    }
                    break;
                }
                Visit::Done => break,
            }
        }

        for p in path.drain(..) {
            state[p] = Visit::Done;
        }
    }
}

/// Descendant count per node, from one breadth-first order walked backwards.
fn descendant_counts(
    roots: &[usize],
    children: &[Vec<usize>],
    parent: &[Option<usize>],
) -> Vec<usize> {
    let mut order = Vec::with_capacity(children.len());
    order.extend_from_slice(roots);
    let mut next = 0;
    while next < order.len() {
        order.extend_from_slice(&children[order[next]]);
        next += 1;
    }

    let mut totals = vec![0; children.len()];
    for &i in order.iter().rev() {
        if let Some(p) = parent[i] {
            totals[p] += totals[i] + 1;
        }
    }
    totals
}
