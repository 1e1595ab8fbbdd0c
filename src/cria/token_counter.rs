//! Token counting with identity-keyed memoization.
//!
//! [`SubtreeSummary`] is the cached aggregate the fit loop uses to avoid
//! re-scanning unchanged branches after a strategy rewrite: combining two
//! sibling summaries only needs their boundary-adjacent messages, not every
//! message in between.

use std::collections::HashMap;

use super::layout::{finalize_message, FinalizedMessage, PromptLayout, ShapeError};
use super::node::{Node, NodeId};
use super::provider::TokenCounter;

/// Cached aggregate for a subtree: total token cost, message count, the
/// messages at either edge (needed to price the boundary when this subtree
/// is merged with a sibling), and the highest-priority active reducer
/// within it.
#[derive(Debug, Clone)]
pub struct SubtreeSummary {
    pub total_tokens: u64,
    pub message_count: u64,
    pub first_message: Option<FinalizedMessage>,
    pub last_message: Option<FinalizedMessage>,
    /// Maximum `priority` of any descendant scope whose own `strategy` is
    /// defined (including the scope itself), or `None` if none.
    pub max_reducer_priority: Option<i64>,
}

impl SubtreeSummary {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            total_tokens: 0,
            message_count: 0,
            first_message: None,
            last_message: None,
            max_reducer_priority: None,
        }
    }
}

fn max_opt(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

fn merge(counter: &dyn TokenCounter, a: SubtreeSummary, b: SubtreeSummary) -> SubtreeSummary {
    if a.message_count == 0 {
        return b;
    }
    if b.message_count == 0 {
        return a;
    }
    let boundary = counter.count_boundary_tokens(a.last_message.as_ref(), b.first_message.as_ref());
    SubtreeSummary {
        total_tokens: a.total_tokens + b.total_tokens + boundary,
        message_count: a.message_count + b.message_count,
        first_message: a.first_message,
        last_message: b.last_message,
        max_reducer_priority: max_opt(a.max_reducer_priority, b.max_reducer_priority),
    }
}

/// Per-render memoization: message token counts and subtree summaries,
/// both keyed by [`NodeId`]. Scoped
/// to the lifetime of one `render`/fit-loop call; dropped when it returns.
#[derive(Default)]
pub struct SummarizeCache {
    message_tokens: HashMap<NodeId, u64>,
    subtree: HashMap<NodeId, SubtreeSummary>,
}

impl SummarizeCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Recursively compute the [`SubtreeSummary`] of `node`, consulting and
/// populating `cache` along the way. Because the cache is keyed by node
/// identity, a strategy rewrite that leaves a sibling subtree untouched
/// (same [`NodeId`]s throughout) makes its second summarization a cache
/// hit.
pub fn summarize(
    node: &Node,
    counter: &dyn TokenCounter,
    cache: &mut SummarizeCache,
) -> Result<SubtreeSummary, ShapeError> {
    let id = node.identity();
    if let Some(cached) = cache.subtree.get(&id) {
        return Ok(cached.clone());
    }

    let summary = match node {
        Node::Message(message) => {
            let finalized = finalize_message(message)?;
            let tokens = *cache
                .message_tokens
                .entry(id)
                .or_insert_with(|| counter.count_message_tokens(&finalized));
            SubtreeSummary {
                total_tokens: tokens,
                message_count: 1,
                first_message: Some(finalized.clone()),
                last_message: Some(finalized),
                max_reducer_priority: None,
            }
        }
        Node::Scope(scope) => {
            let mut acc = SubtreeSummary::empty();
            for child in &scope.children {
                let child_summary = summarize(child, counter, cache)?;
                acc = merge(counter, acc, child_summary);
            }
            let own_priority = scope.strategy.as_ref().map(|_| scope.priority);
            acc.max_reducer_priority = max_opt(acc.max_reducer_priority, own_priority);
            acc
        }
    };

    cache.subtree.insert(id, summary.clone());
    Ok(summary)
}

/// Total token cost of a finalized layout:
/// `Σ count_message_tokens(m_i) + Σ count_boundary_tokens(m_i, m_{i+1})`
///. Used to verify the budget-respect property independently of
/// the fit loop's incremental [`SubtreeSummary`] bookkeeping.
#[must_use]
pub fn total_tokens(layout: &PromptLayout, counter: &dyn TokenCounter) -> u64 {
    let mut total = 0u64;
    let mut prev: Option<&FinalizedMessage> = None;
    for message in &layout.messages {
        total += counter.count_message_tokens(message);
        total += counter.count_boundary_tokens(prev, Some(message));
        prev = Some(message);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cria::node::{Part, Role};

    struct WordCounter;
    impl TokenCounter for WordCounter {
        fn count_message_tokens(&self, message: &FinalizedMessage) -> u64 {
            let text = match message {
                FinalizedMessage::SystemLike { text, .. } => text.clone(),
                FinalizedMessage::Assistant { text, .. } => text.clone(),
                FinalizedMessage::Tool { .. } => String::new(),
            };
            text.split_whitespace().count() as u64
        }
        fn count_boundary_tokens(
            &self,
            prev: Option<&FinalizedMessage>,
            next: Option<&FinalizedMessage>,
        ) -> u64 {
            match (prev, next) {
                (Some(_), Some(_)) => 1,
                _ => 0,
            }
        }
    }

    #[test]
    fn summary_combines_children_with_boundary_cost() {
        let tree = Node::scope(
            0,
            vec![
                Node::message(Role::User, vec![Part::text("one two")]),
                Node::message(Role::User, vec![Part::text("three")]),
            ],
        );
        let counter = WordCounter;
        let mut cache = SummarizeCache::new();
        let summary = summarize(&tree, &counter, &mut cache).unwrap();
        // 2 + 1 (words) + 1 (boundary) = 4
        assert_eq!(summary.total_tokens, 4);
        assert_eq!(summary.message_count, 2);
    }

    #[test]
    fn cache_hit_returns_identical_summary_for_same_node() {
        let tree = Node::message(Role::User, vec![Part::text("a b c")]);
        let counter = WordCounter;
        let mut cache = SummarizeCache::new();
        let first = summarize(&tree, &counter, &mut cache).unwrap();
        let second = summarize(&tree, &counter, &mut cache).unwrap();
        assert_eq!(first.total_tokens, second.total_tokens);
    }

    #[test]
    fn max_reducer_priority_ignores_scopes_without_strategy() {
        let tree = Node::scope(
            5,
            vec![Node::message(Role::User, vec![Part::text("hi")])],
        );
        let counter = WordCounter;
        let mut cache = SummarizeCache::new();
        let summary = summarize(&tree, &counter, &mut cache).unwrap();
        assert_eq!(summary.max_reducer_priority, None);
    }
}
